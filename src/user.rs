//! User records - the one entity the cache manages
//!
//! A [`User`] is shared by every handler that touches the same id. Its
//! fields sit behind a per-user mutex; every mutator bumps a revision
//! counter, and a save records the revision it wrote. The user is dirty
//! while the two differ, so a mutation that lands during a save keeps the
//! user dirty instead of being cleared along with it.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::storage::UserStore;
use crate::{Error, Result};

/// Messages needed to advance from `level` to `level + 1`, or `None` once
/// the threshold no longer fits in a `u64` and the next level is unreachable.
pub fn messages_for_next_level(level: u32) -> Option<u64> {
    let level = u64::from(level);
    level
        .checked_mul(level)?
        .checked_mul(2)?
        .checked_add(level.checked_mul(50)?)?
        .checked_add(100)
}

/// Plain copy of a user's persisted columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub money: f64,
    pub prestige: u32,
    pub level: u32,
    pub message_count: u64,
}

impl UserRow {
    /// A row with the table's default values
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            money: 0.0,
            prestige: 0,
            level: 0,
            message_count: 0,
        }
    }
}

#[derive(Debug)]
struct UserState {
    name: String,
    money: f64,
    prestige: u32,
    level: u32,
    message_count: u64,
    revision: u64,
}

/// A resident user record.
///
/// Obtain one through [`crate::UserCache::get_or_create`]; there is exactly
/// one `User` per id for the lifetime of the cache.
#[derive(Debug)]
pub struct User {
    id: i64,
    state: Mutex<UserState>,
    saved_revision: AtomicU64,
}

impl User {
    /// Build a clean record from a stored row.
    pub(crate) fn from_row(row: UserRow) -> Self {
        Self {
            id: row.id,
            state: Mutex::new(UserState {
                name: row.name,
                money: row.money,
                prestige: row.prestige,
                level: row.level,
                message_count: row.message_count,
                revision: 0,
            }),
            saved_revision: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Lock the record for a sequence of reads and writes.
    ///
    /// Hold the guard across check-then-act sequences such as "check the
    /// balance, then debit".
    pub fn lock(&self) -> UserGuard<'_> {
        UserGuard {
            id: self.id,
            state: self.state.lock(),
        }
    }

    /// Consistent copy of all fields.
    pub fn snapshot(&self) -> UserRow {
        self.lock().to_row()
    }

    /// True while in-memory state may differ from the last successful save.
    pub fn is_dirty(&self) -> bool {
        let state = self.state.lock();
        state.revision != self.saved_revision.load(Ordering::Acquire)
    }

    pub fn name(&self) -> String {
        self.lock().name().to_string()
    }

    pub fn money(&self) -> f64 {
        self.lock().money()
    }

    pub fn prestige(&self) -> u32 {
        self.lock().prestige()
    }

    pub fn level(&self) -> u32 {
        self.lock().level()
    }

    pub fn message_count(&self) -> u64 {
        self.lock().message_count()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().set_name(name);
    }

    pub fn set_money(&self, value: f64) -> Result<()> {
        self.lock().set_money(value)
    }

    pub fn deposit(&self, amount: f64) -> Result<()> {
        self.lock().deposit(amount)
    }

    pub fn withdraw(&self, amount: f64) -> Result<()> {
        self.lock().withdraw(amount)
    }

    pub fn add_prestige(&self, points: u32) {
        self.lock().add_prestige(points);
    }

    pub fn increment_message_count(&self) {
        self.lock().increment_message_count();
    }

    /// See [`UserGuard::level_up_if_able`].
    pub fn level_up_if_able(&self) -> bool {
        self.lock().level_up_if_able()
    }

    /// See [`UserGuard::record_message`].
    pub fn record_message(&self) -> bool {
        self.lock().record_message()
    }

    /// Write the current state to `store` if dirty.
    ///
    /// Returns `Ok(false)` without touching the store when clean. Only the
    /// revision captured with the snapshot is marked saved, so mutations made
    /// while the write is in flight keep the record dirty. Callers must not
    /// run two saves of the same record concurrently; the cache's flush lock
    /// takes care of that.
    pub(crate) fn save_to(&self, store: &dyn UserStore) -> Result<bool> {
        let (row, revision) = {
            let state = self.state.lock();
            if state.revision == self.saved_revision.load(Ordering::Acquire) {
                return Ok(false);
            }
            (state.to_row(self.id), state.revision)
        };

        store.update(&row)?;
        self.saved_revision.fetch_max(revision, Ordering::AcqRel);
        Ok(true)
    }
}

/// Exclusive access to one user's fields.
///
/// Every mutator that changes something marks the user dirty. Rejected or
/// no-op calls leave it untouched.
pub struct UserGuard<'a> {
    id: i64,
    state: MutexGuard<'a, UserState>,
}

impl UserGuard<'_> {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn money(&self) -> f64 {
        self.state.money
    }

    pub fn prestige(&self) -> u32 {
        self.state.prestige
    }

    pub fn level(&self) -> u32 {
        self.state.level
    }

    pub fn message_count(&self) -> u64 {
        self.state.message_count
    }

    pub fn to_row(&self) -> UserRow {
        self.state.to_row(self.id)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.state.name {
            self.state.name = name;
            self.touch();
        }
    }

    /// Replace the balance. Negative and non-finite values are rejected.
    pub fn set_money(&mut self, value: f64) -> Result<()> {
        check_amount("money", value)?;
        self.state.money = value;
        self.touch();
        Ok(())
    }

    pub fn deposit(&mut self, amount: f64) -> Result<()> {
        check_amount("deposit", amount)?;
        self.state.money += amount;
        self.touch();
        Ok(())
    }

    /// Debit `amount`, failing if the balance doesn't cover it.
    pub fn withdraw(&mut self, amount: f64) -> Result<()> {
        check_amount("withdrawal", amount)?;
        if amount > self.state.money {
            return Err(Error::InsufficientFunds {
                needed: amount,
                available: self.state.money,
            });
        }
        self.state.money -= amount;
        self.touch();
        Ok(())
    }

    pub fn add_prestige(&mut self, points: u32) {
        if points > 0 {
            self.state.prestige = self.state.prestige.saturating_add(points);
            self.touch();
        }
    }

    pub fn increment_message_count(&mut self) {
        self.state.message_count = self.state.message_count.saturating_add(1);
        self.touch();
    }

    /// Advance one level if the message count reaches the threshold.
    ///
    /// At most one level per call, even when several thresholds have been
    /// crossed; handlers call this once per message.
    pub fn level_up_if_able(&mut self) -> bool {
        let Some(required) = messages_for_next_level(self.state.level) else {
            return false;
        };
        let Some(next) = self.state.level.checked_add(1) else {
            return false;
        };
        if self.state.message_count < required {
            return false;
        }

        self.state.level = next;
        self.touch();
        true
    }

    /// Count one received message and check for a level-up. Returns true
    /// if the user levelled up.
    pub fn record_message(&mut self) -> bool {
        self.increment_message_count();
        self.level_up_if_able()
    }

    fn touch(&mut self) {
        self.state.revision += 1;
    }
}

impl UserState {
    fn to_row(&self, id: i64) -> UserRow {
        UserRow {
            id,
            name: self.name.clone(),
            money: self.money,
            prestige: self.prestige,
            level: self.level,
            message_count: self.message_count,
        }
    }
}

fn check_amount(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::InvalidInput(format!("{what} must be a finite number")));
    }
    if value < 0.0 {
        return Err(Error::InvalidInput(format!("{what} must not be negative")));
    }
    Ok(())
}

/// Lock two distinct users in ascending id order.
///
/// Guards come back in argument order. Always going through this function
/// for two-user operations keeps lock acquisition deadlock-free.
pub fn lock_pair<'a>(a: &'a User, b: &'a User) -> Result<(UserGuard<'a>, UserGuard<'a>)> {
    if a.id == b.id {
        return Err(Error::InvalidInput(format!(
            "user {} cannot be paired with itself",
            a.id
        )));
    }

    if a.id < b.id {
        let first = a.lock();
        let second = b.lock();
        Ok((first, second))
    } else {
        let second = b.lock();
        let first = a.lock();
        Ok((first, second))
    }
}

/// Move `amount` from `from` to `to` as one atomic step.
pub fn transfer(from: &User, to: &User, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidInput(
            "transfer amount must be a positive number".to_string(),
        ));
    }

    let (mut source, mut target) = lock_pair(from, to)?;
    source.withdraw(amount)?;
    target.deposit(amount)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::InstrumentedStore;
    use std::sync::Arc;

    fn user(id: i64) -> User {
        User::from_row(UserRow::new(id, format!("user{id}")))
    }

    #[test]
    fn test_threshold_formula() {
        assert_eq!(messages_for_next_level(0), Some(100));
        assert_eq!(messages_for_next_level(1), Some(152));
        assert_eq!(messages_for_next_level(10), Some(800));
    }

    #[test]
    fn test_threshold_past_u64_is_unreachable() {
        assert!(messages_for_next_level(3_000_000_000).is_some());
        assert_eq!(messages_for_next_level(3_500_000_000), None);
        assert_eq!(messages_for_next_level(u32::MAX), None);
    }

    #[test]
    fn test_huge_stored_level_does_not_overflow() {
        let store = InstrumentedStore::new();
        let mut row = store.inner().insert(1, "veteran").unwrap();
        row.level = 3_500_000_000;
        row.message_count = 1_000_000;
        store.inner().update(&row).unwrap();

        let u = User::from_row(store.inner().get(1).unwrap().unwrap());
        assert!(!u.record_message());
        assert_eq!(u.level(), 3_500_000_000);
        assert_eq!(u.message_count(), 1_000_001);

        let capped = User::from_row(UserRow {
            level: u32::MAX,
            message_count: u64::MAX,
            ..UserRow::new(2, "capped")
        });
        assert!(!capped.level_up_if_able());
        assert_eq!(capped.level(), u32::MAX);
    }

    #[test]
    fn test_levels_up_at_threshold() {
        let at_threshold = User::from_row(UserRow {
            message_count: 100,
            ..UserRow::new(1, "a")
        });
        assert!(at_threshold.level_up_if_able());
        assert_eq!(at_threshold.level(), 1);

        let below = User::from_row(UserRow {
            message_count: 99,
            ..UserRow::new(2, "b")
        });
        assert!(!below.level_up_if_able());
        assert_eq!(below.level(), 0);
        assert!(!below.is_dirty());
    }

    #[test]
    fn test_one_level_per_check() {
        let u = User::from_row(UserRow {
            message_count: 10_000,
            ..UserRow::new(1, "a")
        });
        assert!(u.level_up_if_able());
        assert_eq!(u.level(), 1);
        assert!(u.level_up_if_able());
        assert_eq!(u.level(), 2);
    }

    #[test]
    fn test_record_message_levels_on_hundredth() {
        let u = user(1);
        for _ in 0..99 {
            assert!(!u.record_message());
        }
        assert!(u.record_message());
        assert_eq!(u.level(), 1);
        assert_eq!(u.message_count(), 100);
    }

    #[test]
    fn test_mutators_mark_dirty() {
        let u = user(1);
        assert!(!u.is_dirty());

        u.deposit(5.0).unwrap();
        assert!(u.is_dirty());
    }

    #[test]
    fn test_rejects_bad_amounts() {
        let u = user(1);
        assert!(matches!(u.set_money(-1.0), Err(Error::InvalidInput(_))));
        assert!(matches!(u.set_money(f64::NAN), Err(Error::InvalidInput(_))));
        assert!(matches!(u.deposit(f64::INFINITY), Err(Error::InvalidInput(_))));
        assert!(matches!(u.withdraw(-3.0), Err(Error::InvalidInput(_))));
        assert_eq!(u.money(), 0.0);
        assert!(!u.is_dirty());
    }

    #[test]
    fn test_withdraw_checks_balance() {
        let u = user(1);
        u.set_money(10.0).unwrap();

        let err = u.withdraw(10.5).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(u.money(), 10.0);

        u.withdraw(10.0).unwrap();
        assert_eq!(u.money(), 0.0);
    }

    #[test]
    fn test_set_same_name_is_clean() {
        let u = user(1);
        u.set_name("user1");
        assert!(!u.is_dirty());
        u.set_name("renamed");
        assert!(u.is_dirty());
    }

    #[test]
    fn test_save_clears_dirty() {
        let store = InstrumentedStore::new();
        store.inner().insert(1, "user1").unwrap();
        let u = user(1);

        assert!(!u.save_to(&store).unwrap());
        assert_eq!(store.update_count(), 0);

        u.deposit(2.5).unwrap();
        assert!(u.save_to(&store).unwrap());
        assert!(!u.is_dirty());
        assert_eq!(store.inner().get(1).unwrap().unwrap().money, 2.5);
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let store = InstrumentedStore::new();
        store.inner().insert(1, "user1").unwrap();
        store.fail_updates_for(1);
        let u = user(1);
        u.deposit(1.0).unwrap();

        assert!(u.save_to(&store).is_err());
        assert!(u.is_dirty());
    }

    #[test]
    fn test_mutation_during_save_keeps_dirty() {
        let store = InstrumentedStore::new();
        store.inner().insert(1, "user1").unwrap();
        let u = Arc::new(user(1));
        u.set_money(10.0).unwrap();

        let during = Arc::clone(&u);
        store.on_update(move |row| {
            // The row being written was captured before this deposit
            if row.money == 10.0 {
                during.deposit(5.0).unwrap();
            }
        });

        assert!(u.save_to(&store).unwrap());
        assert_eq!(store.inner().get(1).unwrap().unwrap().money, 10.0);
        assert!(u.is_dirty());

        assert!(u.save_to(&store).unwrap());
        assert_eq!(store.inner().get(1).unwrap().unwrap().money, 15.0);
        assert!(!u.is_dirty());
    }

    #[test]
    fn test_transfer_moves_money() {
        let a = user(1);
        let b = user(2);
        a.set_money(100.0).unwrap();

        transfer(&a, &b, 40.0).unwrap();
        assert_eq!(a.money(), 60.0);
        assert_eq!(b.money(), 40.0);

        let err = transfer(&b, &a, 41.0).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(a.money() + b.money(), 100.0);
    }

    #[test]
    fn test_transfer_rejects_self_and_bad_amounts() {
        let a = user(1);
        a.set_money(5.0).unwrap();
        assert!(matches!(transfer(&a, &a, 1.0), Err(Error::InvalidInput(_))));
        let b = user(2);
        assert!(matches!(transfer(&a, &b, 0.0), Err(Error::InvalidInput(_))));
        assert!(matches!(transfer(&a, &b, f64::NAN), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_lock_pair_returns_argument_order() {
        let low = user(1);
        let high = user(9);
        let (first, second) = lock_pair(&high, &low).unwrap();
        assert_eq!(first.id(), 9);
        assert_eq!(second.id(), 1);
    }

    #[test]
    fn test_opposing_transfers_do_not_deadlock() {
        let a = Arc::new(user(1));
        let b = Arc::new(user(2));
        a.set_money(1_000.0).unwrap();
        b.set_money(1_000.0).unwrap();

        std::thread::scope(|s| {
            for i in 0..4 {
                let (a, b) = (Arc::clone(&a), Arc::clone(&b));
                s.spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            transfer(&a, &b, 1.0).unwrap();
                        } else {
                            transfer(&b, &a, 1.0).unwrap();
                        }
                    }
                });
            }
        });

        assert_eq!(a.money() + b.money(), 2_000.0);
    }
}
