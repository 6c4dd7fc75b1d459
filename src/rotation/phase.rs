// Phase algebra for a rotation: PENDING -> CREATING -> NOTIFYING -> DELETING -> DONE

use std::fmt;

/// One resumable step of the rotation lifecycle.
///
/// The phase is persisted as a plain string on the request status. Values the
/// engine does not know are kept verbatim in [`Phase::Unrecognized`] so they
/// can be reported, but no work is ever done for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Pending,
    Creating,
    Notifying,
    Deleting,
    Done,
    Unrecognized(String),
}

impl Phase {
    pub const PENDING: &'static str = "PENDING";
    pub const CREATING: &'static str = "CREATING";
    pub const NOTIFYING: &'static str = "NOTIFYING";
    pub const DELETING: &'static str = "DELETING";
    pub const DONE: &'static str = "DONE";

    /// Interpret a persisted phase. An unset or blank phase is a request seen
    /// for the first time and starts in PENDING.
    pub fn parse(raw: Option<&str>) -> Phase {
        match raw.map(str::trim) {
            None | Some("") => Phase::Pending,
            Some(Self::PENDING) => Phase::Pending,
            Some(Self::CREATING) => Phase::Creating,
            Some(Self::NOTIFYING) => Phase::Notifying,
            Some(Self::DELETING) => Phase::Deleting,
            Some(Self::DONE) => Phase::Done,
            Some(other) => Phase::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::Pending => Self::PENDING,
            Phase::Creating => Self::CREATING,
            Phase::Notifying => Self::NOTIFYING,
            Phase::Deleting => Self::DELETING,
            Phase::Done => Self::DONE,
            Phase::Unrecognized(raw) => raw,
        }
    }

    /// Phase reached when this phase's work succeeds, `None` for phases
    /// that do no work.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Pending => Some(Phase::Creating),
            Phase::Creating => Some(Phase::Notifying),
            Phase::Notifying => Some(Phase::Deleting),
            Phase::Deleting => Some(Phase::Done),
            Phase::Done | Phase::Unrecognized(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
