use std::fmt;

/// Lifecycle of the candidate gatherer.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGathererState {
    #[default]
    Unspecified = 0,
    New = 1,
    Gathering = 2,
    Complete = 3,
    Closed = 4,
}

impl From<u8> for IceGathererState {
    fn from(v: u8) -> Self {
        match v {
            1 => IceGathererState::New,
            2 => IceGathererState::Gathering,
            3 => IceGathererState::Complete,
            4 => IceGathererState::Closed,
            _ => IceGathererState::Unspecified,
        }
    }
}

impl fmt::Display for IceGathererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceGathererState::New => "new",
            IceGathererState::Gathering => "gathering",
            IceGathererState::Complete => "complete",
            IceGathererState::Closed => "closed",
            IceGathererState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
