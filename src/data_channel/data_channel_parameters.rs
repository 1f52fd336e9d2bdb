use serde::{Deserialize, Serialize};

/// The resolved parameters a channel is constructed with, after the
/// init dictionary's defaults are applied.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct DataChannelParameters {
    pub label: String,
    pub protocol: String,
    pub ordered: bool,

    /// At most one of the two reliability knobs is set; both `None`
    /// means fully reliable.
    pub max_packet_life_time: Option<u16>,
    pub max_retransmits: Option<u16>,

    pub negotiated: bool,

    /// Pre-agreed stream id for negotiated channels; in-band channels
    /// get theirs assigned when SCTP comes up.
    pub id: Option<u16>,
}
