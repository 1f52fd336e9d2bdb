use std::fmt;

/// Gathering state as exposed on the PeerConnection.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    #[default]
    Unspecified,
    New,
    Gathering,
    Complete,
}

impl From<&str> for IceGatheringState {
    fn from(raw: &str) -> Self {
        match raw {
            "new" => IceGatheringState::New,
            "gathering" => IceGatheringState::Gathering,
            "complete" => IceGatheringState::Complete,
            _ => IceGatheringState::Unspecified,
        }
    }
}

impl fmt::Display for IceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceGatheringState::New => "new",
            IceGatheringState::Gathering => "gathering",
            IceGatheringState::Complete => "complete",
            IceGatheringState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
