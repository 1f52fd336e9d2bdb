use serde::{Deserialize, Serialize};

/// Options accepted by `PeerConnection::create_data_channel`
/// (<https://w3c.github.io/webrtc-pc/#dom-rtcdatachannelinit>).
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct DataChannelInit {
    /// In-order delivery; defaults to true.
    pub ordered: Option<bool>,

    /// Bound the time (ms) a message may be retransmitted.
    pub max_packet_life_time: Option<u16>,

    /// Bound the number of retransmissions.
    pub max_retransmits: Option<u16>,

    /// Application sub-protocol name.
    pub protocol: Option<String>,

    /// Skip DCEP; both sides create the channel with the same id.
    pub negotiated: Option<bool>,

    /// Stream id, required iff `negotiated` is true.
    pub id: Option<u16>,
}
