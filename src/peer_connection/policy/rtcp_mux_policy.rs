use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether RTCP is multiplexed with RTP. Only `require` is supported:
/// everything this stack produces runs on one flow.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RtcpMuxPolicy {
    #[default]
    Unspecified = 0,

    #[serde(rename = "negotiate")]
    Negotiate = 1,

    #[serde(rename = "require")]
    Require = 2,
}

impl From<&str> for RtcpMuxPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            "negotiate" => RtcpMuxPolicy::Negotiate,
            "require" => RtcpMuxPolicy::Require,
            _ => RtcpMuxPolicy::Unspecified,
        }
    }
}

impl fmt::Display for RtcpMuxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RtcpMuxPolicy::Negotiate => "negotiate",
            RtcpMuxPolicy::Require => "require",
            RtcpMuxPolicy::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
