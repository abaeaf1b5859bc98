//! Error types for rekv.
//!
//! The store itself has two failure modes, both about the shape of the data
//! it is handed: a non-record initial state and a non-record update. Effects
//! and user hooks add their own variants so they can fail through the same
//! `StoreResult` channel.

use thiserror::Error;

/// Top-level error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The initial state handed to a store constructor was not a plain record.
    #[error("Initial state is not a plain record (got {found})")]
    InvalidInit {
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// The resolved update, after before-hooks ran, was not a plain record.
    #[error("setState() only accepts a plain record (got {found})")]
    InvalidUpdate {
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// No effect with this name is registered on the store.
    #[error("Unknown effect: {name}")]
    UnknownEffect {
        /// Requested effect name.
        name: String,
    },

    /// A delegate hook or effect reported a failure.
    #[error("Hook failed: {message}")]
    Hook {
        /// Failure description supplied by the hook.
        message: String,
    },
}

impl StoreError {
    /// Creates a hook failure.
    #[must_use]
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    /// Returns true if this is a construction-time shape error.
    #[must_use]
    pub const fn is_invalid_init(&self) -> bool {
        matches!(self, Self::InvalidInit { .. })
    }

    /// Returns true if this is a mutation-time shape error.
    #[must_use]
    pub const fn is_invalid_update(&self) -> bool {
        matches!(self, Self::InvalidUpdate { .. })
    }

    /// Returns true if this error was raised by user code (hook or effect).
    #[must_use]
    pub const fn is_hook(&self) -> bool {
        matches!(self, Self::Hook { .. })
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
