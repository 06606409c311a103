//! Instrumented store for exercising the cache, scheduler and flush guard.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{SqliteStore, UserStore};
use crate::Result;
use crate::user::UserRow;

type UpdateHook = Box<dyn Fn(&UserRow) + Send + Sync>;

/// Wraps an in-memory [`SqliteStore`], counting calls and injecting faults.
pub(crate) struct InstrumentedStore {
    inner: SqliteStore,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    updated_ids: Mutex<Vec<i64>>,
    failing: Mutex<HashSet<i64>>,
    rival_inserts: Mutex<HashSet<i64>>,
    insert_delay: Mutex<Option<Duration>>,
    update_delay: Mutex<Option<Duration>>,
    on_update: Mutex<Option<UpdateHook>>,
}

impl InstrumentedStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            updated_ids: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            rival_inserts: Mutex::new(HashSet::new()),
            insert_delay: Mutex::new(None),
            update_delay: Mutex::new(None),
            on_update: Mutex::new(None),
        }
    }

    pub(crate) fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    /// Successful inserts issued by callers (rival inserts excluded).
    pub(crate) fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Successful updates.
    pub(crate) fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub(crate) fn updated_ids(&self) -> Vec<i64> {
        self.updated_ids.lock().clone()
    }

    pub(crate) fn fail_updates_for(&self, id: i64) {
        self.failing.lock().insert(id);
    }

    pub(crate) fn heal(&self, id: i64) {
        self.failing.lock().remove(&id);
    }

    /// The next `get` for `id` misses, but another writer inserts the row
    /// right after, so the caller's insert collides.
    pub(crate) fn race_insert(&self, id: i64) {
        self.rival_inserts.lock().insert(id);
    }

    pub(crate) fn slow_inserts(&self, delay: Duration) {
        *self.insert_delay.lock() = Some(delay);
    }

    pub(crate) fn slow_updates(&self, delay: Duration) {
        *self.update_delay.lock() = Some(delay);
    }

    /// Run `hook` inside every update, before the row is written.
    pub(crate) fn on_update(&self, hook: impl Fn(&UserRow) + Send + Sync + 'static) {
        *self.on_update.lock() = Some(Box::new(hook));
    }
}

impl UserStore for InstrumentedStore {
    fn get(&self, id: i64) -> Result<Option<UserRow>> {
        if self.rival_inserts.lock().remove(&id) {
            self.inner.insert(id, "rival")?;
            return Ok(None);
        }
        self.inner.get(id)
    }

    fn insert(&self, id: i64, name: &str) -> Result<UserRow> {
        let delay = *self.insert_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let row = self.inner.insert(id, name)?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    fn update(&self, row: &UserRow) -> Result<()> {
        if self.failing.lock().contains(&row.id) {
            return Err(rusqlite::Error::InvalidQuery.into());
        }
        if let Some(hook) = self.on_update.lock().as_ref() {
            hook(row);
        }
        let delay = *self.update_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.inner.update(row)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.updated_ids.lock().push(row.id);
        Ok(())
    }
}
