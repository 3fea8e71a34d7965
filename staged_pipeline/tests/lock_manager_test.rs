//! # Lock Manager Integration Tests
//!
//! Backend-independent laws of the lock-manager port, exercised against the
//! shipped backends: state transitions fan out to listeners, double
//! acquire/release cycles emit exactly four transitions, and releasing a
//! never-acquired lockable fails without a state change.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test lock_manager_test
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use staged_pipeline::infrastructure::locking::{
    CoordinatorLockManager, FileLockManager, InProcessCoordinator, NoOpLockManager, SessionEvent,
};
use staged_pipeline_domain::{
    LockManager, LockState, LockStateListener, Lockable, Stage, StoreError,
};

/// Records every `(lockable, old, new)` transition it observes.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(Lockable, LockState, LockState)>>,
}

impl Recorder {
    fn transitions(&self) -> Vec<(LockState, LockState)> {
        self.events.lock().iter().map(|(_, o, n)| (*o, *n)).collect()
    }
}

impl LockStateListener for Recorder {
    fn on_state_change(&self, lockable: &Lockable, old: LockState, new: LockState) {
        self.events.lock().push((lockable.clone(), old, new));
    }
}

async fn assert_double_cycle_law(manager: &dyn LockManager) {
    let recorder = Arc::new(Recorder::default());
    manager.add_state_listener(recorder.clone());

    let lock = Lockable::from("cycle");
    for _ in 0..2 {
        manager.acquire(&lock).await.unwrap();
        manager.release(&lock).await.unwrap();
    }

    assert_eq!(manager.get_state(&lock), LockState::Unlocked);
    assert_eq!(
        recorder.transitions(),
        vec![
            (LockState::Unlocked, LockState::Locked),
            (LockState::Locked, LockState::Unlocked),
            (LockState::Unlocked, LockState::Locked),
            (LockState::Locked, LockState::Unlocked),
        ]
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_double_cycle_law_noop() {
        assert_double_cycle_law(&NoOpLockManager::new()).await;
    }

    #[tokio::test]
    async fn test_double_cycle_law_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_double_cycle_law(&FileLockManager::new(dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn test_double_cycle_law_coordinator() {
        let manager = CoordinatorLockManager::new(Arc::new(InProcessCoordinator::new()));
        assert_double_cycle_law(&manager).await;
    }

    /// A registered listener observes acquire, backend suspension, and
    /// backend loss as the canonical three transitions.
    #[tokio::test]
    async fn test_lock_state_fanout_through_session_events() {
        let coordinator = Arc::new(InProcessCoordinator::new());
        let manager = CoordinatorLockManager::new(Arc::clone(&coordinator));
        let recorder = Arc::new(Recorder::default());
        manager.add_state_listener(recorder.clone());

        let stage = Stage::new("raw").unwrap();
        let lock = Lockable::from(&stage);
        manager.acquire(&lock).await.unwrap();
        coordinator.emit(SessionEvent::Suspended);
        coordinator.emit(SessionEvent::Lost);

        assert_eq!(
            recorder.transitions(),
            vec![
                (LockState::Unlocked, LockState::Locked),
                (LockState::Locked, LockState::Uncertain),
                (LockState::Uncertain, LockState::Invalid),
            ]
        );
        assert_eq!(manager.get_state(&lock), LockState::Invalid);
    }

    /// Releasing a lockable that was never acquired fails with `LockError`
    /// on every backend and emits no transition.
    #[tokio::test]
    async fn test_release_of_unheld_lock_fails_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let managers: Vec<Box<dyn LockManager>> = vec![
            Box::new(NoOpLockManager::new()),
            Box::new(FileLockManager::new(dir.path()).unwrap()),
            Box::new(CoordinatorLockManager::new(Arc::new(
                InProcessCoordinator::new(),
            ))),
        ];

        for manager in &managers {
            let recorder = Arc::new(Recorder::default());
            manager.add_state_listener(recorder.clone());

            let err = manager.release(&Lockable::from("ghost")).await.unwrap_err();
            assert!(matches!(err, StoreError::LockError(_)));
            assert!(recorder.events.lock().is_empty());
            assert_eq!(
                manager.get_state(&Lockable::from("ghost")),
                LockState::Unlocked
            );
        }
    }

    /// Removing a listener that was never added fails with `NotRegistered`;
    /// adding the same listener twice registers it once.
    #[tokio::test]
    async fn test_listener_registration_rules() {
        let manager = NoOpLockManager::new();
        let recorder: Arc<dyn LockStateListener> = Arc::new(Recorder::default());

        assert!(matches!(
            manager.remove_state_listener(&recorder),
            Err(StoreError::NotRegistered(_))
        ));

        manager.add_state_listener(recorder.clone());
        manager.add_state_listener(recorder.clone());
        manager.remove_state_listener(&recorder).unwrap();
        assert!(manager.remove_state_listener(&recorder).is_err());
    }
}
