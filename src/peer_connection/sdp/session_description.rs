use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer_connection::sdp::sdp_type::SdpType;

/// One side of an offer/answer exchange: the raw SDP plus its type,
/// in the JSON shape signaling channels pass around. The parsed form
/// is filled in lazily and never serialized.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,

    /// Parsed form of `sdp`; populated by `set_local_description` /
    /// `set_remote_description`.
    #[serde(skip)]
    pub(crate) parsed: Option<sdp::description::session::SessionDescription>,
}

impl SessionDescription {
    /// Wraps an SDP string produced by a remote `create_offer`.
    pub fn offer(sdp: String) -> Result<SessionDescription> {
        SessionDescription::new(sdp, SdpType::Offer)
    }

    /// Wraps an SDP string produced by a remote `create_pranswer`.
    pub fn pranswer(sdp: String) -> Result<SessionDescription> {
        SessionDescription::new(sdp, SdpType::Pranswer)
    }

    /// Wraps an SDP string produced by a remote `create_answer`.
    pub fn answer(sdp: String) -> Result<SessionDescription> {
        SessionDescription::new(sdp, SdpType::Answer)
    }

    fn new(sdp: String, sdp_type: SdpType) -> Result<SessionDescription> {
        let mut desc = SessionDescription {
            sdp,
            sdp_type,
            parsed: None,
        };

        // Surface malformed input here rather than at apply time.
        let parsed = desc.unmarshal()?;
        desc.parsed = Some(parsed);

        Ok(desc)
    }

    /// Parses the SDP body.
    pub fn unmarshal(&self) -> Result<sdp::description::session::SessionDescription> {
        let mut reader = Cursor::new(self.sdp.as_bytes());
        Ok(sdp::description::session::SessionDescription::unmarshal(
            &mut reader,
        )?)
    }
}

impl PartialEq for SessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL_SDP: &str = "v=0\r\n\
o=- 4596489990601351948 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n";

    #[test]
    fn test_session_description_json_roundtrip() {
        let sd = SessionDescription::offer(MINIMAL_SDP.to_owned()).expect("valid sdp");
        let json = serde_json::to_string(&sd).expect("serialize");
        assert!(json.contains("\"type\":\"offer\""));

        let parsed: SessionDescription = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, sd);
        // The parsed form is a cache, not part of the value.
        assert!(parsed.parsed.is_none());
    }

    #[test]
    fn test_session_description_rejects_garbage() {
        assert!(SessionDescription::offer("not sdp".to_owned()).is_err());
    }

    #[test]
    fn test_unmarshal_keeps_media_order() {
        let sdp = format!(
            "{MINIMAL_SDP}m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\n"
        );
        let sd = SessionDescription::offer(sdp).expect("valid sdp");
        let parsed = sd.parsed.expect("parsed");
        assert_eq!(parsed.media_descriptions.len(), 2);
        assert_eq!(parsed.media_descriptions[0].media_name.media, "audio");
        assert_eq!(parsed.media_descriptions[1].media_name.media, "video");
    }
}
