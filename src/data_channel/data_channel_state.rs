use std::fmt;

/// Ready-state of a data channel.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    #[default]
    Unspecified = 0,

    /// Transport is being established.
    Connecting = 1,

    /// Messages flow.
    Open = 2,

    /// Shutdown started locally or remotely.
    Closing = 3,

    /// No more messages, ever.
    Closed = 4,
}

impl From<u8> for DataChannelState {
    fn from(v: u8) -> Self {
        match v {
            1 => DataChannelState::Connecting,
            2 => DataChannelState::Open,
            3 => DataChannelState::Closing,
            4 => DataChannelState::Closed,
            _ => DataChannelState::Unspecified,
        }
    }
}

impl From<&str> for DataChannelState {
    fn from(raw: &str) -> Self {
        match raw {
            "connecting" => DataChannelState::Connecting,
            "open" => DataChannelState::Open,
            "closing" => DataChannelState::Closing,
            "closed" => DataChannelState::Closed,
            _ => DataChannelState::Unspecified,
        }
    }
}

impl fmt::Display for DataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataChannelState::Connecting => "connecting",
            DataChannelState::Open => "open",
            DataChannelState::Closing => "closing",
            DataChannelState::Closed => "closed",
            DataChannelState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
