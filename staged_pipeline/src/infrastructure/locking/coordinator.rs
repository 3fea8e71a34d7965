// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Coordinator Lock Manager
//!
//! Lock manager backed by a distributed coordination service. Locks are
//! ephemeral and coordinator-managed: if the run crashes, the coordinator
//! expires its session and the locks release themselves. Each lockable maps
//! to the lock path `/pipedag/locks/<name>`.
//!
//! The coordinator wire protocol sits behind the [`CoordinatorClient`] port:
//! anything that can hold ephemeral locks by path and report session health
//! can back this manager. Session events map onto the lock-state machine for
//! every lock the manager believes it holds:
//!
//! - session suspended → `UNCERTAIN` (pause work on the resources)
//! - session lost → `INVALID` (abort the in-flight run)
//! - session (re)connected → `LOCKED`
//!
//! [`InProcessCoordinator`] is the in-memory implementation used by tests
//! and local development, playing the role an in-memory repository plays for
//! a SQL store.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use staged_pipeline_domain::{LockManager, LockState, LockStateTracker, Lockable, StoreError};

/// Path prefix for coordinator-managed locks.
pub const LOCK_PATH_PREFIX: &str = "/pipedag/locks/";

/// Health of the coordinator session, as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is (again) established.
    Connected,
    /// The connection dropped; the session may still be alive.
    Suspended,
    /// The session expired; all ephemeral locks are gone.
    Lost,
}

/// Callback invoked with every session event.
pub type SessionListener = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Port to a coordination service holding ephemeral locks by path.
#[async_trait]
pub trait CoordinatorClient: Send + Sync + 'static {
    /// Acquires the ephemeral lock at `path`, blocking until held.
    async fn acquire_lock(&self, path: &str) -> Result<(), StoreError>;

    /// Releases the ephemeral lock at `path`.
    async fn release_lock(&self, path: &str) -> Result<(), StoreError>;

    /// Registers a session-event listener.
    fn subscribe(&self, listener: SessionListener);
}

/// Lock manager holding ephemeral locks through a coordinator session.
pub struct CoordinatorLockManager<C: CoordinatorClient> {
    client: Arc<C>,
    shared: Arc<Shared>,
}

struct Shared {
    tracker: LockStateTracker,
    held: Mutex<HashSet<Lockable>>,
}

impl<C: CoordinatorClient> CoordinatorLockManager<C> {
    /// Creates the manager and subscribes to the client's session events.
    pub fn new(client: Arc<C>) -> Self {
        let shared = Arc::new(Shared {
            tracker: LockStateTracker::new(),
            held: Mutex::new(HashSet::new()),
        });

        let session_shared = Arc::clone(&shared);
        client.subscribe(Arc::new(move |event| {
            let state = match event {
                SessionEvent::Suspended => LockState::Uncertain,
                SessionEvent::Lost => LockState::Invalid,
                SessionEvent::Connected => LockState::Locked,
            };
            // only locks this manager believes it holds change state
            let held = session_shared.held.lock();
            for lockable in held.iter() {
                session_shared.tracker.set_state(lockable, state);
            }
        }));

        CoordinatorLockManager { client, shared }
    }

    /// The coordinator lock path for a lockable.
    pub fn lock_path(lockable: &Lockable) -> String {
        format!("{LOCK_PATH_PREFIX}{}", lockable.key())
    }
}

#[async_trait]
impl<C: CoordinatorClient> LockManager for CoordinatorLockManager<C> {
    async fn acquire(&self, lockable: &Lockable) -> Result<(), StoreError> {
        let path = Self::lock_path(lockable);
        tracing::info!(lock = %lockable, path = %path, "locking");
        self.client
            .acquire_lock(&path)
            .await
            .map_err(|err| {
                StoreError::lock_error(format!("failed to acquire lock '{lockable}': {err}"))
            })?;
        self.shared.held.lock().insert(lockable.clone());
        self.shared.tracker.set_state(lockable, LockState::Locked);
        Ok(())
    }

    async fn release(&self, lockable: &Lockable) -> Result<(), StoreError> {
        if !self.shared.held.lock().contains(lockable) {
            return Err(StoreError::lock_error(format!(
                "no lock '{lockable}' found"
            )));
        }
        tracing::info!(lock = %lockable, "unlocking");
        self.client.release_lock(&Self::lock_path(lockable)).await?;
        self.shared.held.lock().remove(lockable);
        self.shared.tracker.set_state(lockable, LockState::Unlocked);
        Ok(())
    }

    fn state_tracker(&self) -> &LockStateTracker {
        &self.shared.tracker
    }
}

/// In-memory coordinator for tests and local development.
///
/// Locks are plain entries in a shared set; session events are fired
/// explicitly through [`emit`](Self::emit) to simulate suspension, loss, and
/// reconnection.
#[derive(Default)]
pub struct InProcessCoordinator {
    held: tokio::sync::Mutex<HashSet<String>>,
    released: Notify,
    listeners: Mutex<Vec<SessionListener>>,
}

impl InProcessCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires a session event to every subscriber.
    pub fn emit(&self, event: SessionEvent) {
        let listeners: Vec<SessionListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

#[async_trait]
impl CoordinatorClient for InProcessCoordinator {
    async fn acquire_lock(&self, path: &str) -> Result<(), StoreError> {
        loop {
            // register for wakeups before checking, so a release between the
            // check and the await is not missed
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut held = self.held.lock().await;
                if held.insert(path.to_string()) {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    async fn release_lock(&self, path: &str) -> Result<(), StoreError> {
        let mut held = self.held.lock().await;
        if !held.remove(path) {
            return Err(StoreError::lock_error(format!(
                "lock path '{path}' is not held"
            )));
        }
        drop(held);
        self.released.notify_waiters();
        Ok(())
    }

    fn subscribe(&self, listener: SessionListener) {
        self.listeners.lock().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> CoordinatorLockManager<InProcessCoordinator> {
        CoordinatorLockManager::new(Arc::new(InProcessCoordinator::new()))
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let manager = manager();
        let lock = Lockable::from("resource");

        manager.acquire(&lock).await.unwrap();
        assert_eq!(manager.get_state(&lock), LockState::Locked);
        manager.release(&lock).await.unwrap();
        assert_eq!(manager.get_state(&lock), LockState::Unlocked);
    }

    #[tokio::test]
    async fn test_release_without_acquire_fails() {
        let manager = manager();
        let err = manager.release(&Lockable::from("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::LockError(_)));
    }

    /// Session suspension, loss, and reconnection map onto the lock-state
    /// machine for held locks.
    #[tokio::test]
    async fn test_session_events_map_to_lock_states() {
        let coordinator = Arc::new(InProcessCoordinator::new());
        let manager = CoordinatorLockManager::new(Arc::clone(&coordinator));
        let lock = Lockable::from("resource");
        manager.acquire(&lock).await.unwrap();

        coordinator.emit(SessionEvent::Suspended);
        assert_eq!(manager.get_state(&lock), LockState::Uncertain);

        coordinator.emit(SessionEvent::Connected);
        assert_eq!(manager.get_state(&lock), LockState::Locked);

        coordinator.emit(SessionEvent::Suspended);
        coordinator.emit(SessionEvent::Lost);
        assert_eq!(manager.get_state(&lock), LockState::Invalid);
    }

    /// Session events leave locks this manager does not hold untouched.
    #[tokio::test]
    async fn test_session_events_ignore_unheld_locks() {
        let coordinator = Arc::new(InProcessCoordinator::new());
        let manager = CoordinatorLockManager::new(Arc::clone(&coordinator));
        let lock = Lockable::from("resource");

        coordinator.emit(SessionEvent::Lost);
        assert_eq!(manager.get_state(&lock), LockState::Unlocked);
    }

    /// Two managers on one coordinator exclude each other.
    #[tokio::test]
    async fn test_mutual_exclusion_between_managers() {
        let coordinator = Arc::new(InProcessCoordinator::new());
        let first = CoordinatorLockManager::new(Arc::clone(&coordinator));
        let second = Arc::new(CoordinatorLockManager::new(Arc::clone(&coordinator)));
        let lock = Lockable::from("resource");

        first.acquire(&lock).await.unwrap();

        let contender = Arc::clone(&second);
        let contender_lock = lock.clone();
        let pending =
            tokio::spawn(async move { contender.acquire(&contender_lock).await });

        // the second manager stays blocked while the first holds the lock
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        first.release(&lock).await.unwrap();
        pending.await.unwrap().unwrap();
        assert_eq!(second.get_state(&lock), LockState::Locked);
    }
}
