//! Watcher lifecycle states.
//!
//! Every watcher moves through three states. Initializing permits discovery
//! but suppresses consumer emission, Alive emits normally, and Disposed is
//! terminal: all operations become no-ops and new events are dropped.

use tokio::sync::RwLock;

/// The three watcher lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Initial discovery in progress; no events reach the consumer.
    Initializing,

    /// Normal operation.
    Alive,

    /// Terminal state after `close()` or a failed initialization.
    Disposed,
}

/// Shared lifecycle cell with guarded transitions.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: RwLock<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Initializing),
        }
    }

    pub async fn get(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn is_alive(&self) -> bool {
        self.get().await == LifecycleState::Alive
    }

    pub async fn is_disposed(&self) -> bool {
        self.get().await == LifecycleState::Disposed
    }

    /// Transition Initializing -> Alive. Returns false if the watcher was
    /// disposed (or already alive) in the meantime.
    pub async fn make_alive(&self) -> bool {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Initializing {
            *state = LifecycleState::Alive;
            true
        } else {
            false
        }
    }

    /// Transition to Disposed from any state. Returns false if already
    /// disposed, which makes `close()` idempotent.
    pub async fn dispose(&self) -> bool {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Disposed {
            false
        } else {
            *state = LifecycleState::Disposed;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initializing_to_alive() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.get().await, LifecycleState::Initializing);
        assert!(lifecycle.make_alive().await);
        assert!(lifecycle.is_alive().await);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.dispose().await);
        assert!(!lifecycle.dispose().await);
        assert!(lifecycle.is_disposed().await);
    }

    #[tokio::test]
    async fn test_no_revival_after_dispose() {
        let lifecycle = Lifecycle::new();
        lifecycle.dispose().await;
        assert!(!lifecycle.make_alive().await);
        assert_eq!(lifecycle.get().await, LifecycleState::Disposed);
    }
}
