//! Abortable contexts.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The cancellation handle bound to one in-flight loader or action call.
#[derive(Debug, Clone)]
pub struct AbortableContext {
    id: Uuid,
    owner: String,
    token: CancellationToken,
}

impl AbortableContext {
    /// A context with its own root token (fetchers).
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_token(owner, CancellationToken::new())
    }

    /// A context cancelled whenever `parent` is (navigation loaders).
    pub fn child_of(parent: &CancellationToken, owner: impl Into<String>) -> Self {
        Self::with_token(owner, parent.child_token())
    }

    fn with_token(owner: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Route id (or fetcher key) this context guards.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(context = %self.id, owner = %self.owner, "Cancelling context");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }
}

/// Read-only view of a context's cancellation, handed to handlers.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the owning context is cancelled.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_cancels_children() {
        let parent = CancellationToken::new();
        let a = AbortableContext::child_of(&parent, "a");
        let b = AbortableContext::child_of(&parent, "b");
        assert_ne!(a.id(), b.id());

        parent.cancel();
        assert!(a.is_cancelled());
        assert!(b.signal().is_aborted());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let a = AbortableContext::child_of(&parent, "a");
        a.cancel();
        assert!(!parent.is_cancelled());
        assert_eq!(a.owner(), "a");
    }

    #[tokio::test]
    async fn test_signal_resolves_on_cancel() {
        let ctx = AbortableContext::new("fetcher");
        let signal = ctx.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        ctx.cancel();
        waiter.await.unwrap();
    }
}
