use std::fmt;

/// Lifecycle of the SCTP transport
/// (<https://www.w3.org/TR/webrtc/#dom-rtcsctptransportstate>).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SctpTransportState {
    #[default]
    Unspecified = 0,

    /// Association handshake in flight.
    Connecting = 1,

    /// Streams may be opened.
    Connected = 2,

    /// Shut down; no reconnect at this layer.
    Closed = 3,
}

impl From<u8> for SctpTransportState {
    fn from(v: u8) -> Self {
        match v {
            1 => SctpTransportState::Connecting,
            2 => SctpTransportState::Connected,
            3 => SctpTransportState::Closed,
            _ => SctpTransportState::Unspecified,
        }
    }
}

impl fmt::Display for SctpTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SctpTransportState::Connecting => "connecting",
            SctpTransportState::Connected => "connected",
            SctpTransportState::Closed => "closed",
            SctpTransportState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
