use std::fmt;

use serde::{Deserialize, Serialize};

/// Which candidate types the gatherer may use.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceTransportPolicy {
    /// Any candidate type.
    #[default]
    #[serde(rename = "all")]
    All = 0,

    /// Relay candidates only; hides host addresses from the peer.
    #[serde(rename = "relay")]
    Relay = 1,
}

/// The gatherer-facing alias the ORTC surface uses.
pub type IceGatherPolicy = IceTransportPolicy;

impl From<&str> for IceTransportPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            "relay" => IceTransportPolicy::Relay,
            _ => IceTransportPolicy::All,
        }
    }
}

impl fmt::Display for IceTransportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceTransportPolicy::All => "all",
            IceTransportPolicy::Relay => "relay",
        };
        write!(f, "{s}")
    }
}
