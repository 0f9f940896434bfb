//! Error types used by the tagvisor runtime and its limit operations.
//!
//! This module defines two main error enums:
//!
//! - [`LimitError`]: errors raised by registry, ledger and coordinator calls.
//! - [`RuntimeError`]: errors raised by the runtime itself (shutdown).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! A saturated tag is **not** an error: acquisition returns
//! [`Acquisition::Denied`](crate::Acquisition::Denied) inside `Ok`.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by limit operations.
///
/// Registry-level errors surface to the caller unchanged. Multi-tag
/// acquisition rolls back every slot it took before returning any of these.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Unknown tag, deleted tag, or unknown holder on renew.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up (tag, id or holder).
        what: String,
    },

    /// A limit for this tag already exists.
    #[error("limit for tag {tag:?} already exists")]
    AlreadyExists {
        /// The duplicated tag.
        tag: String,
    },

    /// Negative ceiling, empty tag, empty tag set, and similar caller mistakes.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// The holder already holds a slot for this tag.
    #[error("holder {holder:?} already holds a slot for tag {tag:?}")]
    Conflict {
        /// Tag of the existing slot.
        tag: String,
        /// Holder that tried to acquire twice.
        holder: String,
    },

    /// The backing limit store failed.
    #[error("limit store failure: {error}")]
    Store {
        /// The underlying error message.
        error: String,
    },
}

impl LimitError {
    pub(crate) fn tag_not_found(tag: &str) -> Self {
        LimitError::NotFound {
            what: format!("tag {tag:?}"),
        }
    }

    pub(crate) fn holder_not_found(tag: &str, holder: &str) -> Self {
        LimitError::NotFound {
            what: format!("holder {holder:?} on tag {tag:?}"),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        LimitError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tagvisor::LimitError;
    ///
    /// let err = LimitError::AlreadyExists { tag: "db".into() };
    /// assert_eq!(err.as_label(), "limit_already_exists");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LimitError::NotFound { .. } => "limit_not_found",
            LimitError::AlreadyExists { .. } => "limit_already_exists",
            LimitError::InvalidArgument { .. } => "limit_invalid_argument",
            LimitError::Conflict { .. } => "limit_conflict",
            LimitError::Store { .. } => "limit_store_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LimitError::NotFound { what } => format!("not found: {what}"),
            LimitError::AlreadyExists { tag } => format!("already exists: tag={tag}"),
            LimitError::InvalidArgument { reason } => format!("invalid argument: {reason}"),
            LimitError::Conflict { tag, holder } => {
                format!("conflict: holder={holder} already holds tag={tag}")
            }
            LimitError::Store { error } => format!("store: {error}"),
        }
    }

    /// True for [`LimitError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, LimitError::NotFound { .. })
    }
}

/// # Errors produced by the tagvisor runtime.
///
/// These represent failures of the runtime itself,
/// such as a shutdown sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; background workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the workers that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tagvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck workers={stuck:?}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            LimitError::tag_not_found("a").as_label(),
            "limit_not_found"
        );
        assert_eq!(LimitError::invalid("x").as_label(), "limit_invalid_argument");
        assert_eq!(
            LimitError::Conflict {
                tag: "a".into(),
                holder: "h".into()
            }
            .as_label(),
            "limit_conflict"
        );
    }

    #[test]
    fn holder_not_found_names_both_sides() {
        let err = LimitError::holder_not_found("db", "run-1");
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("run-1"));
        assert!(msg.contains("db"));
    }
}
