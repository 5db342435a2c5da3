//! Job and piece outcomes.

use std::fmt;

/// Result classification of a transfer or of one chunk/segment of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Bytes were transferred and the artifact is complete.
    Success,
    /// The transfer did not complete; partial pieces are kept for resume.
    Failure,
    /// The local artifact already matched the remote; nothing was transferred.
    AlreadyComplete,
    /// Handler-internal placeholder. Never returned through a `JobHandle`.
    Unknown,
}

impl Outcome {
    /// True for `Success` and `AlreadyComplete`.
    pub fn is_success_like(self) -> bool {
        matches!(self, Outcome::Success | Outcome::AlreadyComplete)
    }

    /// True when every outcome is success-like. An empty set counts as success.
    pub fn all_success_like<I>(outcomes: I) -> bool
    where
        I: IntoIterator<Item = Outcome>,
    {
        outcomes.into_iter().all(Outcome::is_success_like)
    }

    /// Collapses `Unknown` into `Failure` before an outcome leaves the engine.
    pub(crate) fn settled(self) -> Self {
        match self {
            Outcome::Unknown => Outcome::Failure,
            other => other,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::AlreadyComplete => "already complete",
            Outcome::Unknown => "unknown",
        };
        f.pad(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_like() {
        assert!(Outcome::Success.is_success_like());
        assert!(Outcome::AlreadyComplete.is_success_like());
        assert!(!Outcome::Failure.is_success_like());
        assert!(!Outcome::Unknown.is_success_like());
    }

    #[test]
    fn aggregate_requires_every_piece() {
        assert!(Outcome::all_success_like([
            Outcome::Success,
            Outcome::AlreadyComplete,
            Outcome::Success,
        ]));
        assert!(!Outcome::all_success_like([
            Outcome::Success,
            Outcome::Failure,
        ]));
        assert!(Outcome::all_success_like(Vec::new()));
    }

    #[test]
    fn unknown_settles_to_failure() {
        assert_eq!(Outcome::Unknown.settled(), Outcome::Failure);
        assert_eq!(Outcome::AlreadyComplete.settled(), Outcome::AlreadyComplete);
    }
}
