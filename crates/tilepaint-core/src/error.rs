//! Error types for tilepaint operations.
//!
//! Errors are reported at the granularity of whole operations (a fill, an
//! iterator construction, a tile allocation). Per-pixel code never fails.
//!
//! # Categories
//!
//! - **Resource exhaustion**: [`AllocationFailed`](Error::AllocationFailed),
//!   [`TileBudgetExhausted`](Error::TileBudgetExhausted). Fatal for the
//!   in-flight operation; the caller is expected to abort the stroke.
//! - **Layout errors**: [`ChannelMismatch`](Error::ChannelMismatch),
//!   [`ColorSpaceMismatch`](Error::ColorSpaceMismatch),
//!   [`BufferTooSmall`](Error::BufferTooSmall).
//! - **Lookup errors**: [`UnknownColorSpace`](Error::UnknownColorSpace).
//!
//! Degenerate or out-of-range rectangles are never errors; they are clipped
//! or treated as no-ops by the operations that receive them.
//!
//! # Usage
//!
//! ```rust
//! use tilepaint_core::{Error, Result};
//!
//! fn check_len(buf: &[u8], needed: usize) -> Result<()> {
//!     if buf.len() < needed {
//!         return Err(Error::buffer_too_small(needed, buf.len()));
//!     }
//!     Ok(())
//! }
//! assert!(check_len(&[0u8; 4], 8).is_err());
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by pixel, tile and device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Memory allocation for pixel data failed.
    ///
    /// Returned when a tile buffer cannot be reserved. Never swallowed:
    /// silently handing back the default tile would corrupt the stroke.
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
    },

    /// The configured tile budget has no room for another tile.
    #[error("tile budget exhausted ({limit} tiles)")]
    TileBudgetExhausted {
        /// Configured tile limit
        limit: usize,
    },

    /// Channel count mismatch between source and destination layouts.
    #[error("channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch {
        /// Expected channel count
        expected: u8,
        /// Actual channel count
        got: u8,
    },

    /// Two buffers in different color spaces met without a conversion step.
    #[error("color space mismatch: source {src}, destination {dst}")]
    ColorSpaceMismatch {
        /// Source color space id
        src: String,
        /// Destination color space id
        dst: String,
    },

    /// Color space id is not registered.
    #[error("unknown color space: {0}")]
    UnknownColorSpace(String),

    /// A caller-provided buffer is shorter than the operation requires.
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Bytes needed
        needed: usize,
        /// Bytes provided
        got: usize,
    },

    /// Invalid dimensions for a derived device (thumbnail, LOD level).
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::AllocationFailed`] error.
    #[inline]
    pub fn allocation_failed(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::ChannelMismatch`] error.
    #[inline]
    pub fn channel_mismatch(expected: u8, got: u8) -> Self {
        Self::ChannelMismatch { expected, got }
    }

    /// Creates an [`Error::ColorSpaceMismatch`] error.
    #[inline]
    pub fn color_space_mismatch(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self::ColorSpaceMismatch {
            src: src.into(),
            dst: dst.into(),
        }
    }

    /// Creates an [`Error::BufferTooSmall`] error.
    #[inline]
    pub fn buffer_too_small(needed: usize, got: usize) -> Self {
        Self::BufferTooSmall { needed, got }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` for resource exhaustion (allocation or budget).
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. } | Self::TileBudgetExhausted { .. }
        )
    }

    /// Returns `true` if two color spaces met without conversion.
    #[inline]
    pub fn is_color_space_mismatch(&self) -> bool {
        matches!(self, Self::ColorSpaceMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failed() {
        let err = Error::allocation_failed(16384, "out of memory");
        assert!(err.to_string().contains("out of memory"));
        assert!(err.to_string().contains("16384"));
        assert!(err.is_allocation_error());
    }

    #[test]
    fn test_budget_is_allocation_error() {
        let err = Error::TileBudgetExhausted { limit: 8 };
        assert!(err.is_allocation_error());
        assert!(err.to_string().contains('8'));
    }

    #[test]
    fn test_color_space_mismatch() {
        let err = Error::color_space_mismatch("rgba-u8", "rgba-u16");
        let msg = err.to_string();
        assert!(msg.contains("rgba-u8"));
        assert!(msg.contains("rgba-u16"));
        assert!(err.is_color_space_mismatch());
        assert!(!err.is_allocation_error());
    }
}
