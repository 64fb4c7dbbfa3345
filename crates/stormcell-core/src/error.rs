//! Error types for the stormcell system.
//!
//! Two kinds of failures exist in a detection/tracking run and they are kept
//! strictly apart:
//!
//! - **Structural errors** ([`CoreError`]): mismatched feature-variable sets,
//!   broken time order. These abort the whole run and bubble to the caller of
//!   the run entry point. No partial mutation is performed.
//! - **Per-point / per-pair conditions**: failed grid lookups and constraint
//!   exclusions. These are *not* errors — lookups return `Option` and
//!   constraint exclusions are logged at trace level and skipped.

use thiserror::Error;

/// A specialized `Result` type for stormcell operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for detection and tracking runs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Configuration error: the two lists are structurally incompatible
    /// (different feature variables) or a named tracking variable is missing.
    /// Fatal; the run is aborted without mutating either list.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Timestamps of the two lists are non-monotonic or too far apart.
    /// The run is aborted and the current list left untouched, but the
    /// caller may continue with the next time step.
    #[error("Temporal order violation: delta_t = {delta_t}s (allowed 1..={max_delta_t}s)")]
    TemporalOrder {
        /// Observed time difference in seconds (may be negative)
        delta_t: i64,
        /// Maximum allowed time difference in seconds
        max_delta_t: i64,
    },

    /// Validation error for input data.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what validation failed
        message: String,
    },

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl CoreError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new temporal-order error.
    #[must_use]
    pub fn temporal_order(delta_t: i64, max_delta_t: i64) -> Self {
        Self::TemporalOrder {
            delta_t,
            max_delta_t,
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller can sensibly continue with the next
    /// time step after this error.
    ///
    /// A [`CoreError::TemporalOrder`] aborts one run but leaves both lists
    /// intact; a [`CoreError::Configuration`] means the inputs themselves
    /// are unusable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::TemporalOrder { .. } => true,
            Self::Configuration { .. } | Self::Validation { .. } | Self::Internal { .. } => false,
        }
    }
}
