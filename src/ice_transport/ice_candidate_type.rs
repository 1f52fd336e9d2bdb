use std::fmt;

use ice::candidate::CandidateType;
use serde::{Deserialize, Serialize};

/// The ICE candidate types of RFC 8445 §5.1.1.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceCandidateType {
    #[default]
    Unspecified,

    /// Directly bound local address.
    #[serde(rename = "host")]
    Host,

    /// Server reflexive, learned through STUN.
    #[serde(rename = "srflx")]
    Srflx,

    /// Peer reflexive, learned from a connectivity check.
    #[serde(rename = "prflx")]
    Prflx,

    /// Relayed through TURN.
    #[serde(rename = "relay")]
    Relay,
}

const ICE_CANDIDATE_TYPE_HOST_STR: &str = "host";
const ICE_CANDIDATE_TYPE_SRFLX_STR: &str = "srflx";
const ICE_CANDIDATE_TYPE_PRFLX_STR: &str = "prflx";
const ICE_CANDIDATE_TYPE_RELAY_STR: &str = "relay";

impl From<&str> for IceCandidateType {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CANDIDATE_TYPE_HOST_STR => IceCandidateType::Host,
            ICE_CANDIDATE_TYPE_SRFLX_STR => IceCandidateType::Srflx,
            ICE_CANDIDATE_TYPE_PRFLX_STR => IceCandidateType::Prflx,
            ICE_CANDIDATE_TYPE_RELAY_STR => IceCandidateType::Relay,
            _ => IceCandidateType::Unspecified,
        }
    }
}

impl From<CandidateType> for IceCandidateType {
    fn from(typ: CandidateType) -> Self {
        match typ {
            CandidateType::Host => IceCandidateType::Host,
            CandidateType::ServerReflexive => IceCandidateType::Srflx,
            CandidateType::PeerReflexive => IceCandidateType::Prflx,
            CandidateType::Relay => IceCandidateType::Relay,
            _ => IceCandidateType::Unspecified,
        }
    }
}

impl fmt::Display for IceCandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceCandidateType::Host => ICE_CANDIDATE_TYPE_HOST_STR,
            IceCandidateType::Srflx => ICE_CANDIDATE_TYPE_SRFLX_STR,
            IceCandidateType::Prflx => ICE_CANDIDATE_TYPE_PRFLX_STR,
            IceCandidateType::Relay => ICE_CANDIDATE_TYPE_RELAY_STR,
            IceCandidateType::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
