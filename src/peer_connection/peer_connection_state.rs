use std::fmt;

/// Overall connection state derived from the ICE and DTLS transports
/// (<https://www.w3.org/TR/webrtc/#rtcpeerconnectionstate-enum>).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    #[default]
    Unspecified = 0,
    New = 1,
    Connecting = 2,
    Connected = 3,
    Disconnected = 4,
    Failed = 5,
    Closed = 6,
}

impl From<u8> for PeerConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => PeerConnectionState::New,
            2 => PeerConnectionState::Connecting,
            3 => PeerConnectionState::Connected,
            4 => PeerConnectionState::Disconnected,
            5 => PeerConnectionState::Failed,
            6 => PeerConnectionState::Closed,
            _ => PeerConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
            PeerConnectionState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// Bookkeeping for the debounced negotiation-needed signal.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NegotiationNeededState {
    /// No negotiation-needed op is queued or running.
    #[default]
    Empty = 0,

    /// An op finished while another mutation arrived; run once more.
    Queue = 1,

    /// An op is queued or running.
    Run = 2,
}

impl From<u8> for NegotiationNeededState {
    fn from(v: u8) -> Self {
        match v {
            1 => NegotiationNeededState::Queue,
            2 => NegotiationNeededState::Run,
            _ => NegotiationNeededState::Empty,
        }
    }
}
