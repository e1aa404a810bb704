//! Collectible-context teardown.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Mutex,
};

const ALIVE: u8 = 0;
const UNLOADING: u8 = 1;
const UNLOADED: u8 = 2;

/// Callback run once during teardown, standing in for the release of the
/// loader allocator that backed the context's code and metadata.
pub type TeardownCallback = Box<dyn FnOnce() + Send>;

/// Lifecycle state of a load context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The context accepts binds.
    Alive,
    /// Teardown has begun; new binds are fenced off.
    Unloading,
    /// Teardown completed; the cache has been released.
    Unloaded,
}

/// Ties a collectible binder's destruction to the collection of its owning
/// managed context.
///
/// The GC collaborator reports "context unreachable" through
/// [`notify_collected`](crate::binder::LoadContextBinder::notify_collected)
/// once it has confirmed no code loaded through the context is still
/// executing. The notification is consumed synchronously: the lifecycle moves
/// `Alive -> Unloading`, the binder releases its cache and runs the teardown
/// callback exactly once, and the state settles at `Unloaded`.
///
/// Any bind attempted after the transition out of `Alive` fails with
/// [`Error::ContextUnloading`](crate::Error::ContextUnloading) without
/// touching the released cache.
pub struct CollectibleLifecycle {
    state: AtomicU8,
    teardown: Mutex<Option<TeardownCallback>>,
}

impl CollectibleLifecycle {
    /// Create a lifecycle in the `Alive` state with no teardown callback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ALIVE),
            teardown: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            ALIVE => LifecycleState::Alive,
            UNLOADING => LifecycleState::Unloading,
            _ => LifecycleState::Unloaded,
        }
    }

    /// Whether the context still accepts binds.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) == ALIVE
    }

    /// Register the teardown callback. Later registrations replace earlier
    /// ones; once teardown has run the callback slot stays empty.
    pub fn set_teardown(&self, callback: TeardownCallback) {
        if let Ok(mut slot) = self.teardown.lock() {
            *slot = Some(callback);
        }
    }

    /// Attempt the `Alive -> Unloading` transition.
    ///
    /// Returns `true` for exactly one caller; every later caller sees `false`
    /// and must not repeat the teardown work.
    pub fn begin_unload(&self) -> bool {
        self.state
            .compare_exchange(ALIVE, UNLOADING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Take the registered teardown callback, leaving the slot empty.
    pub fn take_teardown(&self) -> Option<TeardownCallback> {
        self.teardown.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Mark teardown complete: `Unloading -> Unloaded`.
    pub fn finish_unload(&self) {
        self.state.store(UNLOADED, Ordering::Release);
    }
}

impl Default for CollectibleLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CollectibleLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectibleLifecycle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    };

    #[test]
    fn test_starts_alive() {
        let lifecycle = CollectibleLifecycle::new();
        assert!(lifecycle.is_alive());
        assert_eq!(lifecycle.state(), LifecycleState::Alive);
    }

    #[test]
    fn test_begin_unload_wins_once() {
        let lifecycle = CollectibleLifecycle::new();

        assert!(lifecycle.begin_unload());
        assert!(!lifecycle.begin_unload());
        assert_eq!(lifecycle.state(), LifecycleState::Unloading);

        lifecycle.finish_unload();
        assert_eq!(lifecycle.state(), LifecycleState::Unloaded);
        assert!(!lifecycle.begin_unload());
    }

    #[test]
    fn test_teardown_taken_once() {
        let lifecycle = CollectibleLifecycle::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        lifecycle.set_teardown(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        if let Some(callback) = lifecycle.take_teardown() {
            callback();
        }
        assert!(lifecycle.take_teardown().is_none());
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_unload_single_winner() {
        let lifecycle = Arc::new(CollectibleLifecycle::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if lifecycle.begin_unload() {
                        winners.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(AtomicOrdering::SeqCst), 1);
    }
}
