//! Resident user cache
//!
//! Uses DashMap for the id → slot table (per-shard locking) and a
//! `OnceCell` per slot so that concurrent first access to the same id runs
//! exactly one load/insert while other ids proceed independently.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::storage::UserStore;
use crate::user::{self, User};
use crate::{Error, Result};

type Slot = Arc<OnceCell<Arc<User>>>;

/// Outcome of one pass over the dirty users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Users written successfully
    pub saved: usize,
    /// Users whose write failed; they stay dirty
    pub failed: usize,
    /// Users that became clean before their turn came
    pub skipped: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved == 0 && self.failed == 0 && self.skipped == 0
    }
}

/// Process-wide table of live user records.
///
/// Built once by the composition root and shared as `Arc<UserCache>`. The
/// cache is the only reader of the store for live data, and
/// [`UserCache::flush_dirty`] is the only path that writes to it.
pub struct UserCache {
    store: Arc<dyn UserStore>,
    users: DashMap<i64, Slot>,
    flush_lock: Mutex<()>,
}

impl UserCache {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            users: DashMap::new(),
            flush_lock: Mutex::new(()),
        }
    }

    /// Return the live record for `id`, loading or creating it on first use.
    ///
    /// `name` is only used when the row has to be created. Blocks on storage
    /// I/O only for the first access to an id; concurrent callers for that id
    /// wait for the same load. A failed load is not cached, so the next call
    /// tries again.
    pub fn get_or_create(&self, id: i64, name: &str) -> Result<Arc<User>> {
        // Clone the slot out so the shard lock is released before any I/O
        let slot: Slot = Arc::clone(self.users.entry(id).or_default().value());
        let user = slot.get_or_try_init(|| self.load_or_insert(id, name))?;
        Ok(Arc::clone(user))
    }

    fn load_or_insert(&self, id: i64, name: &str) -> Result<Arc<User>> {
        let started = Instant::now();

        let row = match self.store.get(id)? {
            Some(row) => {
                debug!(user_id = id, elapsed = ?started.elapsed(), "Loaded user");
                row
            }
            None => match self.store.insert(id, name) {
                Ok(row) => {
                    debug!(user_id = id, user_name = name, "Created user");
                    row
                }
                Err(Error::ConcurrentCreateConflict(_)) => {
                    debug!(user_id = id, "User created concurrently, loading existing row");
                    self.store.get(id)?.ok_or(Error::RecordNotFound(id))?
                }
                Err(e) => return Err(e),
            },
        };

        Ok(Arc::new(User::from_row(row)))
    }

    /// Resident record for `id`, without touching storage.
    pub fn get(&self, id: i64) -> Option<Arc<User>> {
        self.users
            .get(&id)
            .and_then(|slot| slot.get().cloned())
    }

    /// All resident records.
    pub fn resident(&self) -> Vec<Arc<User>> {
        self.users
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect()
    }

    /// Number of resident records.
    pub fn len(&self) -> usize {
        self.users
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.resident().iter().filter(|u| u.is_dirty()).count()
    }

    /// Move money between two resident-or-loadable users.
    pub fn transfer(&self, from: (i64, &str), to: (i64, &str), amount: f64) -> Result<()> {
        let source = self.get_or_create(from.0, from.1)?;
        let target = self.get_or_create(to.0, to.1)?;
        user::transfer(&source, &target, amount)
    }

    /// Save every dirty user.
    ///
    /// Passes are serialized: the scheduler and the shutdown flush never
    /// write concurrently. Each save is independent; a failure is logged and
    /// leaves that user dirty for the next pass.
    pub fn flush_dirty(&self) -> FlushReport {
        let _pass = self.flush_lock.lock();

        let dirty: Vec<Arc<User>> = self
            .resident()
            .into_iter()
            .filter(|u| u.is_dirty())
            .collect();

        let mut report = FlushReport::default();
        for user in dirty {
            match user.save_to(self.store.as_ref()) {
                Ok(true) => report.saved += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(user_id = user.id(), error = %e, "Failed to save user, will retry");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
