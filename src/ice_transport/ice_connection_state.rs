use std::fmt;

/// Aggregate ICE state as surfaced on the PeerConnection.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    #[default]
    Unspecified = 0,
    New = 1,
    Checking = 2,
    Connected = 3,
    Completed = 4,
    Disconnected = 5,
    Failed = 6,
    Closed = 7,
}

impl From<u8> for IceConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => IceConnectionState::New,
            2 => IceConnectionState::Checking,
            3 => IceConnectionState::Connected,
            4 => IceConnectionState::Completed,
            5 => IceConnectionState::Disconnected,
            6 => IceConnectionState::Failed,
            7 => IceConnectionState::Closed,
            _ => IceConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
            IceConnectionState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
