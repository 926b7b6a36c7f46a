//! Cooperative cancellation for long-running bulk operations.
//!
//! Bulk operations poll a [`CancellationToken`] at row granularity and
//! report [`Completion::Interrupted`] instead of blocking. Whatever was
//! written before the stop stays written; tiles are never left half
//! allocated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Polls a token every `every` rows.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    token: &'a CancellationToken,
    every: u32,
    rows: u32,
}

impl<'a> Checkpoint<'a> {
    /// Checkpoint polling after every `every` rows (at least one).
    pub fn new(token: &'a CancellationToken, every: u32) -> Self {
        Self {
            token,
            every: every.max(1),
            rows: 0,
        }
    }

    /// Call after each row; `true` means stop now.
    #[inline]
    pub fn row_done(&mut self) -> bool {
        self.rows += 1;
        if self.rows >= self.every {
            self.rows = 0;
            self.token.is_cancelled()
        } else {
            false
        }
    }

    /// Immediate poll, ignoring the interval.
    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Outcome of a cancellable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Completion<T> {
    /// Ran to the end.
    Finished(T),
    /// Stopped early; the value is the partial result.
    Interrupted(T),
}

impl<T> Completion<T> {
    /// Whether the operation ran to the end.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Whether the operation stopped early.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// The (possibly partial) result.
    pub fn into_inner(self) -> T {
        match self {
            Self::Finished(v) | Self::Interrupted(v) => v,
        }
    }

    /// Maps the result, keeping the state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Self::Finished(v) => Completion::Finished(f(v)),
            Self::Interrupted(v) => Completion::Interrupted(f(v)),
        }
    }
}
