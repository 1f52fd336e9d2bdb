use std::fmt;

use serde::{Deserialize, Serialize};

/// The four JSEP description types.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdpType {
    #[default]
    Unspecified = 0,

    /// Starts a negotiation round.
    #[serde(rename = "offer")]
    Offer = 1,

    /// Provisional answer; may change until the final answer.
    #[serde(rename = "pranswer")]
    Pranswer = 2,

    /// Final answer, settles the round.
    #[serde(rename = "answer")]
    Answer = 3,

    /// Discards the pending local or remote offer.
    #[serde(rename = "rollback")]
    Rollback = 4,
}

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_PRANSWER_STR: &str = "pranswer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const SDP_TYPE_ROLLBACK_STR: &str = "rollback";

impl From<&str> for SdpType {
    fn from(raw: &str) -> Self {
        match raw {
            SDP_TYPE_OFFER_STR => SdpType::Offer,
            SDP_TYPE_PRANSWER_STR => SdpType::Pranswer,
            SDP_TYPE_ANSWER_STR => SdpType::Answer,
            SDP_TYPE_ROLLBACK_STR => SdpType::Rollback,
            _ => SdpType::Unspecified,
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdpType::Offer => SDP_TYPE_OFFER_STR,
            SdpType::Pranswer => SDP_TYPE_PRANSWER_STR,
            SdpType::Answer => SDP_TYPE_ANSWER_STR,
            SdpType::Rollback => SDP_TYPE_ROLLBACK_STR,
            SdpType::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
