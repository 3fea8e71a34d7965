// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Lock Manager Port and Lock-State Machine
//!
//! A lock manager prevents two concurrent runs, possibly on different
//! machines, from materialising into the same stage at once. Backends vary
//! (no-op, lock files, coordination services), but all of them report lock
//! health through one explicit state machine:
//!
//! ```text
//!   UNLOCKED --acquire()-->         LOCKED
//!   LOCKED   --release()-->         UNLOCKED
//!   LOCKED   --backend suspended--> UNCERTAIN
//!   UNCERTAIN --backend restored--> LOCKED
//!   UNCERTAIN --backend lost    --> INVALID
//!   LOCKED    --backend lost    --> INVALID
//!   INVALID   --explicit reset  --> UNLOCKED   (only on release)
//! ```
//!
//! While a lock is `UNCERTAIN`, work depending on the resource must pause;
//! once `INVALID`, the resource must be considered corrupted and the
//! in-flight run aborted. These transitions are the in-band cancellation
//! signal for running tasks.
//!
//! Every state change fans out `(lockable, old_state, new_state)` to the
//! registered listeners. Callbacks run synchronously under the lock-state
//! mutex, so listeners must not call back into the lock manager.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::Stage;
use crate::StoreError;

/// Current state of a lock, as believed by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Not acquired by this manager; another process may hold the resource.
    Unlocked,
    /// Acquired and, as far as the backend knows, still valid.
    Locked,
    /// The backend cannot currently vouch for the lock (for example, its
    /// connection dropped). Pause work depending on the resource.
    Uncertain,
    /// A lock that was held has been lost for an unexpected reason. Abort
    /// work depending on the resource.
    Invalid,
}

impl Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Unlocked => "UNLOCKED",
            LockState::Locked => "LOCKED",
            LockState::Uncertain => "UNCERTAIN",
            LockState::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// Anything the lock manager can lock: a stage, or an opaque name.
///
/// Equality is by value, so independently constructed lockables for the same
/// stage coordinate on the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lockable {
    /// A pipeline stage, identified by its stable name.
    Stage(String),
    /// An arbitrary named resource.
    Name(String),
}

impl Lockable {
    /// The name used for lock files and coordinator lock paths.
    pub fn key(&self) -> &str {
        match self {
            Lockable::Stage(name) | Lockable::Name(name) => name,
        }
    }
}

impl From<&Stage> for Lockable {
    fn from(stage: &Stage) -> Self {
        Lockable::Stage(stage.name().to_string())
    }
}

impl From<&str> for Lockable {
    fn from(name: &str) -> Self {
        Lockable::Name(name.to_string())
    }
}

impl Display for Lockable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Observer of lock-state transitions.
pub trait LockStateListener: Send + Sync {
    /// Called with the affected lockable, the old state, and the new state.
    fn on_state_change(&self, lockable: &Lockable, old: LockState, new: LockState);
}

/// Shared bookkeeping for lock states and listener fanout.
///
/// Backends own one tracker each and report every transition through
/// [`set_state`](Self::set_state); the provided methods of [`LockManager`]
/// delegate queries and listener registration here.
#[derive(Default)]
pub struct LockStateTracker {
    inner: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    states: HashMap<Lockable, LockState>,
    listeners: Vec<Arc<dyn LockStateListener>>,
}

impl LockStateTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state transition and notifies listeners when the state
    /// actually changed.
    ///
    /// Absent entries count as `Unlocked`, and an entry is purged when it
    /// transitions back to `Unlocked`, keeping the map bounded by the number
    /// of currently held locks.
    pub fn set_state(&self, lockable: &Lockable, new: LockState) {
        let mut inner = self.inner.lock();
        let old = inner
            .states
            .get(lockable)
            .copied()
            .unwrap_or(LockState::Unlocked);
        if new == LockState::Unlocked {
            inner.states.remove(lockable);
        } else {
            inner.states.insert(lockable.clone(), new);
        }
        if old != new {
            // listeners run synchronously under the state mutex; they must
            // not call back into the lock manager
            for listener in &inner.listeners {
                listener.on_state_change(lockable, old, new);
            }
        }
    }

    /// Returns the state of a lock without mutating the map; absent entries
    /// read as `Unlocked`.
    pub fn get_state(&self, lockable: &Lockable) -> LockState {
        self.inner
            .lock()
            .states
            .get(lockable)
            .copied()
            .unwrap_or(LockState::Unlocked)
    }

    /// Registers a listener; registering the same listener (by identity)
    /// twice is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn LockStateListener>) {
        let mut inner = self.inner.lock();
        if inner
            .listeners
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &listener))
        {
            return;
        }
        inner.listeners.push(listener);
    }

    /// Removes a previously registered listener.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotRegistered`] if the listener (by identity)
    /// is not present.
    pub fn remove_listener(
        &self,
        listener: &Arc<dyn LockStateListener>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let position = inner
            .listeners
            .iter()
            .position(|existing| Arc::ptr_eq(existing, listener));
        match position {
            Some(index) => {
                inner.listeners.remove(index);
                Ok(())
            }
            None => Err(StoreError::NotRegistered(
                "lock state listener was never registered".to_string(),
            )),
        }
    }
}

impl fmt::Debug for LockStateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LockStateTracker")
            .field("states", &inner.states)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

/// Port for acquiring and releasing locks on stages and named resources.
///
/// `acquire` may block arbitrarily long; the other entry points return
/// promptly. Implementations must guarantee that releasing a never-acquired
/// lockable fails with [`StoreError::LockError`] without emitting a state
/// transition.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires a lock, blocking until it is held.
    async fn acquire(&self, lockable: &Lockable) -> Result<(), StoreError>;

    /// Releases a previously acquired lock.
    async fn release(&self, lockable: &Lockable) -> Result<(), StoreError>;

    /// The backend's lock-state bookkeeping.
    fn state_tracker(&self) -> &LockStateTracker;

    /// Registers a lock-state listener (idempotent on identity).
    fn add_state_listener(&self, listener: Arc<dyn LockStateListener>) {
        self.state_tracker().add_listener(listener);
    }

    /// Removes a lock-state listener.
    fn remove_state_listener(
        &self,
        listener: &Arc<dyn LockStateListener>,
    ) -> Result<(), StoreError> {
        self.state_tracker().remove_listener(listener)
    }

    /// Returns the current state of a lock.
    fn get_state(&self, lockable: &Lockable) -> LockState {
        self.state_tracker().get_state(lockable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Lockable, LockState, LockState)>>,
    }

    impl LockStateListener for Recorder {
        fn on_state_change(&self, lockable: &Lockable, old: LockState, new: LockState) {
            self.events.lock().push((lockable.clone(), old, new));
        }
    }

    fn lockable() -> Lockable {
        Lockable::Name("resource".to_string())
    }

    /// Acquire, suspension, and loss fan out to listeners as
    /// `UNLOCKED→LOCKED`, `LOCKED→UNCERTAIN`, `UNCERTAIN→INVALID`.
    #[test]
    fn test_listener_fanout_follows_state_machine() {
        let tracker = LockStateTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker.add_listener(recorder.clone());

        let lock = lockable();
        tracker.set_state(&lock, LockState::Locked);
        tracker.set_state(&lock, LockState::Uncertain);
        tracker.set_state(&lock, LockState::Invalid);

        let events = recorder.events.lock();
        assert_eq!(
            *events,
            vec![
                (lock.clone(), LockState::Unlocked, LockState::Locked),
                (lock.clone(), LockState::Locked, LockState::Uncertain),
                (lock.clone(), LockState::Uncertain, LockState::Invalid),
            ]
        );
    }

    /// Two acquire/release cycles emit exactly four transitions.
    #[test]
    fn test_double_cycle_emits_four_transitions() {
        let tracker = LockStateTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker.add_listener(recorder.clone());

        let lock = lockable();
        for _ in 0..2 {
            tracker.set_state(&lock, LockState::Locked);
            tracker.set_state(&lock, LockState::Unlocked);
        }

        let events = recorder.events.lock();
        assert_eq!(events.len(), 4);
        assert_eq!(tracker.get_state(&lock), LockState::Unlocked);
    }

    /// Reading the state of an unknown lockable neither fails nor inserts.
    #[test]
    fn test_get_state_is_read_only() {
        let tracker = LockStateTracker::new();
        let lock = lockable();
        assert_eq!(tracker.get_state(&lock), LockState::Unlocked);
        // setting to unlocked purges rather than stores
        tracker.set_state(&lock, LockState::Locked);
        tracker.set_state(&lock, LockState::Unlocked);
        assert_eq!(tracker.get_state(&lock), LockState::Unlocked);
    }

    #[test]
    fn test_listener_registration_is_idempotent() {
        let tracker = LockStateTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker.add_listener(recorder.clone());
        tracker.add_listener(recorder.clone());

        tracker.set_state(&lockable(), LockState::Locked);
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_remove_listener_requires_registration() {
        let tracker = LockStateTracker::new();
        let recorder: Arc<dyn LockStateListener> = Arc::new(Recorder::default());
        assert!(matches!(
            tracker.remove_listener(&recorder),
            Err(StoreError::NotRegistered(_))
        ));

        tracker.add_listener(recorder.clone());
        tracker.remove_listener(&recorder).unwrap();
        assert!(tracker.remove_listener(&recorder).is_err());
    }

    #[test]
    fn test_no_fanout_without_change() {
        let tracker = LockStateTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker.add_listener(recorder.clone());

        let lock = lockable();
        tracker.set_state(&lock, LockState::Locked);
        tracker.set_state(&lock, LockState::Locked);
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_lockable_equality_is_by_value() {
        let stage = Stage::new("raw").unwrap();
        assert_eq!(Lockable::from(&stage), Lockable::Stage("raw".to_string()));
        assert_ne!(Lockable::from("raw"), Lockable::from(&stage));
    }
}
