use std::fmt;

/// Lifecycle of the DTLS transport.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsTransportState {
    #[default]
    Unspecified = 0,

    /// Handshake has not begun.
    New = 1,

    /// Handshake in progress.
    Connecting = 2,

    /// Handshake finished and the remote fingerprint verified.
    Connected = 3,

    /// Transport shut down on purpose.
    Closed = 4,

    /// Handshake or fingerprint validation failed.
    Failed = 5,
}

const DTLS_TRANSPORT_STATE_NEW_STR: &str = "new";
const DTLS_TRANSPORT_STATE_CONNECTING_STR: &str = "connecting";
const DTLS_TRANSPORT_STATE_CONNECTED_STR: &str = "connected";
const DTLS_TRANSPORT_STATE_CLOSED_STR: &str = "closed";
const DTLS_TRANSPORT_STATE_FAILED_STR: &str = "failed";

impl From<&str> for DtlsTransportState {
    fn from(raw: &str) -> Self {
        match raw {
            DTLS_TRANSPORT_STATE_NEW_STR => DtlsTransportState::New,
            DTLS_TRANSPORT_STATE_CONNECTING_STR => DtlsTransportState::Connecting,
            DTLS_TRANSPORT_STATE_CONNECTED_STR => DtlsTransportState::Connected,
            DTLS_TRANSPORT_STATE_CLOSED_STR => DtlsTransportState::Closed,
            DTLS_TRANSPORT_STATE_FAILED_STR => DtlsTransportState::Failed,
            _ => DtlsTransportState::Unspecified,
        }
    }
}

impl From<u8> for DtlsTransportState {
    fn from(v: u8) -> Self {
        match v {
            1 => DtlsTransportState::New,
            2 => DtlsTransportState::Connecting,
            3 => DtlsTransportState::Connected,
            4 => DtlsTransportState::Closed,
            5 => DtlsTransportState::Failed,
            _ => DtlsTransportState::Unspecified,
        }
    }
}

impl fmt::Display for DtlsTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtlsTransportState::New => DTLS_TRANSPORT_STATE_NEW_STR,
            DtlsTransportState::Connecting => DTLS_TRANSPORT_STATE_CONNECTING_STR,
            DtlsTransportState::Connected => DTLS_TRANSPORT_STATE_CONNECTED_STR,
            DtlsTransportState::Closed => DTLS_TRANSPORT_STATE_CLOSED_STR,
            DtlsTransportState::Failed => DTLS_TRANSPORT_STATE_FAILED_STR,
            DtlsTransportState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
