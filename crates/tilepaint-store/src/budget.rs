//! Shared limit on allocated tiles.
//!
//! One [`TileBudget`] can be shared by every store of a document. Each
//! allocated tile takes one slot; freeing a tile gives it back. Running out
//! is a resource-exhaustion error for the operation that asked.

use std::sync::atomic::{AtomicUsize, Ordering};
use tilepaint_core::{Error, Result};

/// Atomic tile counter with an optional ceiling.
#[derive(Debug, Default)]
pub struct TileBudget {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl TileBudget {
    /// Budget without a ceiling; still counts.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Budget allowing at most `limit` tiles.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            used: AtomicUsize::new(0),
        }
    }

    /// Takes one slot, or fails when the ceiling is reached.
    pub fn acquire(&self) -> Result<()> {
        match self.limit {
            None => {
                self.used.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Some(limit) => self
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
                .map(|_| ())
                .map_err(|_| Error::TileBudgetExhausted { limit }),
        }
    }

    /// Takes `n` slots ignoring the ceiling. Used when undo puts tiles back.
    pub fn force_acquire(&self, n: usize) {
        self.used.fetch_add(n, Ordering::AcqRel);
    }

    /// Returns `n` slots.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| Some(u.saturating_sub(n)));
    }

    /// Tiles currently counted.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Ceiling, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Slots left, `None` when unlimited.
    pub fn remaining(&self) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(self.used()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit() {
        let budget = TileBudget::with_limit(2);
        budget.acquire().unwrap();
        budget.acquire().unwrap();
        let err = budget.acquire().unwrap_err();
        assert!(matches!(err, Error::TileBudgetExhausted { limit: 2 }));
        budget.release(1);
        assert_eq!(budget.remaining(), Some(1));
        budget.acquire().unwrap();
    }

    #[test]
    fn test_unlimited_counts() {
        let budget = TileBudget::unlimited();
        for _ in 0..10 {
            budget.acquire().unwrap();
        }
        budget.release(4);
        assert_eq!(budget.used(), 6);
        assert_eq!(budget.remaining(), None);
        budget.release(100);
        assert_eq!(budget.used(), 0);
    }
}
