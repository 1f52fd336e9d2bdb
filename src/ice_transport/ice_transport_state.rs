use std::fmt;

use ice::state::ConnectionState;

/// State of the ICE transport itself, fed by the agent.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceTransportState {
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

impl From<u8> for IceTransportState {
    fn from(v: u8) -> Self {
        match v {
            1 => IceTransportState::New,
            2 => IceTransportState::Checking,
            3 => IceTransportState::Connected,
            4 => IceTransportState::Completed,
            5 => IceTransportState::Disconnected,
            6 => IceTransportState::Failed,
            7 => IceTransportState::Closed,
            _ => IceTransportState::Unspecified,
        }
    }
}

impl From<ConnectionState> for IceTransportState {
    fn from(raw: ConnectionState) -> Self {
        match raw {
            ConnectionState::New => IceTransportState::New,
            ConnectionState::Checking => IceTransportState::Checking,
            ConnectionState::Connected => IceTransportState::Connected,
            ConnectionState::Completed => IceTransportState::Completed,
            ConnectionState::Disconnected => IceTransportState::Disconnected,
            ConnectionState::Failed => IceTransportState::Failed,
            ConnectionState::Closed => IceTransportState::Closed,
            _ => IceTransportState::Unspecified,
        }
    }
}

impl fmt::Display for IceTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceTransportState::New => "new",
            IceTransportState::Checking => "checking",
            IceTransportState::Connected => "connected",
            IceTransportState::Completed => "completed",
            IceTransportState::Disconnected => "disconnected",
            IceTransportState::Failed => "failed",
            IceTransportState::Closed => "closed",
            IceTransportState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
