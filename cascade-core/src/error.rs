//! Error types for the reactive engine.
//!
//! Only invariant violations surface as errors. Misuse of an otherwise
//! valid handle (pausing a stopped effect, writing a named field on an
//! array) is reported through `tracing::warn!` and the call becomes a no-op.
//! Panics raised inside user bodies are never caught here.

use thiserror::Error;

/// Errors raised by the reactive engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    /// Only objects and arrays can be wrapped in a reactive cell.
    #[error("cannot wrap a value of kind `{kind}` in a reactive cell")]
    NotWrappable { kind: &'static str },

    /// A watch source must be a boxed value, a getter or a reactive cell.
    #[error("invalid watch source: expected a boxed value, getter or reactive cell, found {kind}")]
    InvalidWatchSource { kind: &'static str },

    /// A multi-source watch was given an empty list.
    #[error("watch requires at least one source")]
    EmptyWatchSources,

    /// A synchronous flush kept producing work past the configured limit.
    #[error("flush did not settle after {cycles} drain cycles; an effect is probably rescheduling itself")]
    FlushLimitExceeded { cycles: usize },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_kind() {
        let err = ReactiveError::NotWrappable { kind: "int" };
        assert_eq!(err.to_string(), "cannot wrap a value of kind `int` in a reactive cell");

        let err = ReactiveError::InvalidWatchSource { kind: "string" };
        assert!(err.to_string().contains("found string"));
    }

    #[test]
    fn flush_limit_reports_cycles() {
        let err = ReactiveError::FlushLimitExceeded { cycles: 1000 };
        assert!(err.to_string().contains("1000 drain cycles"));
    }
}
