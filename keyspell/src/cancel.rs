use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a long-running
/// operation. The operation polls [`is_cancelled`](Self::is_cancelled) at
/// stage or batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    own: Arc<AtomicBool>,
    linked: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// A new token that also reports cancelled once `self` or `other` is.
    /// Cancelling the new token affects neither.
    pub fn linked_with(&self, other: &CancellationToken) -> CancellationToken {
        let mut linked = vec![self.own.clone(), other.own.clone()];
        linked.extend(self.linked.iter().cloned());
        linked.extend(other.linked.iter().cloned());

        CancellationToken {
            own: Arc::new(AtomicBool::new(false)),
            linked,
        }
    }

    pub fn cancel(&self) {
        self.own.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::Acquire) || self.linked.iter().any(|f| f.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_tokens() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let both = a.linked_with(&b);
        assert!(!both.is_cancelled());

        both.cancel();
        assert!(both.is_cancelled());
        assert!(!a.is_cancelled() && !b.is_cancelled());

        let both = a.linked_with(&b);
        b.cancel();
        assert!(both.is_cancelled());
        assert!(!a.is_cancelled());
    }
}
