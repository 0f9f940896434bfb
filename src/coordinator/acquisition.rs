use chrono::{DateTime, Utc};

/// Outcome of a multi-tag acquisition.
///
/// `Denied` is an ordinary result, not a failure: callers are expected to
/// branch on it and retry or give up according to their own policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acquisition {
    /// Every requested tag granted a slot.
    Granted {
        /// Common lease deadline of the new slots (`None` = never expires).
        lease_expires_at: Option<DateTime<Utc>>,
    },
    /// A tag was saturated; nothing is held by this attempt.
    Denied {
        /// First tag (in sorted order) that refused.
        blocking_tag: String,
    },
}

impl Acquisition {
    #[inline]
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquisition::Granted { .. })
    }

    /// Blocking tag of a denial.
    #[inline]
    pub fn blocking_tag(&self) -> Option<&str> {
        match self {
            Acquisition::Denied { blocking_tag } => Some(blocking_tag),
            Acquisition::Granted { .. } => None,
        }
    }
}
