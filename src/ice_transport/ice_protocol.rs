use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of an ICE candidate.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceProtocol {
    #[default]
    Unspecified,

    #[serde(rename = "udp")]
    Udp,

    #[serde(rename = "tcp")]
    Tcp,
}

const ICE_PROTOCOL_UDP_STR: &str = "udp";
const ICE_PROTOCOL_TCP_STR: &str = "tcp";

impl From<&str> for IceProtocol {
    fn from(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case(ICE_PROTOCOL_UDP_STR) {
            IceProtocol::Udp
        } else if raw.eq_ignore_ascii_case(ICE_PROTOCOL_TCP_STR) {
            IceProtocol::Tcp
        } else {
            IceProtocol::Unspecified
        }
    }
}

impl fmt::Display for IceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceProtocol::Udp => ICE_PROTOCOL_UDP_STR,
            IceProtocol::Tcp => ICE_PROTOCOL_TCP_STR,
            IceProtocol::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
