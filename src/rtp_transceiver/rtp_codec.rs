use std::fmt;

use crate::api::media_engine::{
    MIME_TYPE_G722, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_PCMA, MIME_TYPE_PCMU, MIME_TYPE_VP8,
    MIME_TYPE_VP9,
};
use crate::error::{Error, Result};
use crate::rtp_transceiver::fmtp::{fmtp_consist, parse_fmtp};
use crate::rtp_transceiver::PayloadType;

/// Whether a codec (and its m-section) carries audio or video.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RtpCodecKind {
    #[default]
    Unspecified = 0,
    Audio = 1,
    Video = 2,
}

impl From<&str> for RtpCodecKind {
    fn from(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("audio") {
            RtpCodecKind::Audio
        } else if raw.eq_ignore_ascii_case("video") {
            RtpCodecKind::Video
        } else {
            RtpCodecKind::Unspecified
        }
    }
}

impl fmt::Display for RtpCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RtpCodecKind::Audio => "audio",
            RtpCodecKind::Video => "video",
            RtpCodecKind::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// RTCP feedback mechanisms a codec supports
/// (<https://draft.ortc.org/#dom-rtcrtcpfeedback>).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RtcpFeedback {
    pub typ: String,
    pub parameter: String,
}

/// Static description of a codec
/// (<https://w3c.github.io/webrtc-pc/#dictionary-rtcrtpcodeccapability-members>).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RtpCodecCapability {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    /// The packetizer able to frame this codec's samples into RTP
    /// payloads.
    pub(crate) fn payloader_for_codec(
        &self,
    ) -> Result<Box<dyn rtp::packetizer::Payloader + Send + Sync>> {
        let mime_type = self.mime_type.to_lowercase();
        if mime_type == MIME_TYPE_H264.to_lowercase() {
            Ok(Box::<rtp::codecs::h264::H264Payloader>::default())
        } else if mime_type == MIME_TYPE_VP8.to_lowercase() {
            Ok(Box::<rtp::codecs::vp8::Vp8Payloader>::default())
        } else if mime_type == MIME_TYPE_VP9.to_lowercase() {
            Ok(Box::<rtp::codecs::vp9::Vp9Payloader>::default())
        } else if mime_type == MIME_TYPE_OPUS.to_lowercase() {
            Ok(Box::<rtp::codecs::opus::OpusPayloader>::default())
        } else if mime_type == MIME_TYPE_G722.to_lowercase()
            || mime_type == MIME_TYPE_PCMU.to_lowercase()
            || mime_type == MIME_TYPE_PCMA.to_lowercase()
        {
            Ok(Box::<rtp::codecs::g7xx::G7xxPayloader>::default())
        } else {
            Err(Error::ErrNoPayloaderForCodec)
        }
    }
}

/// A header extension the local endpoint is willing to negotiate.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RtpHeaderExtensionCapability {
    pub uri: String,
}

/// A header extension after negotiation pinned it to an id.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RtpHeaderExtensionParameter {
    pub uri: String,
    pub id: isize,
}

/// A codec plus the payload type negotiation assigned to it
/// (<https://w3c.github.io/webrtc-pc/#rtcrtpcodecparameters>).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RtpCodecParameters {
    pub capability: RtpCodecCapability,
    pub payload_type: PayloadType,
}

/// The negotiated codecs and header extensions for one direction of an
/// m-section.
#[derive(Default, Debug, Clone)]
pub struct RtpParameters {
    pub header_extensions: Vec<RtpHeaderExtensionParameter>,
    pub codecs: Vec<RtpCodecParameters>,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CodecMatch {
    #[default]
    None = 0,
    Partial = 1,
    Exact = 2,
}

/// Fuzzy codec lookup: exact means mime type and fmtp agree, partial
/// means only the mime type does.
pub(crate) fn codec_parameters_fuzzy_search(
    needle: &RtpCodecParameters,
    haystack: &[RtpCodecParameters],
) -> (RtpCodecParameters, CodecMatch) {
    let needle_fmtp = parse_fmtp(&needle.capability.sdp_fmtp_line);

    for c in haystack {
        if c.capability
            .mime_type
            .eq_ignore_ascii_case(&needle.capability.mime_type)
            && fmtp_consist(&needle_fmtp, &parse_fmtp(&c.capability.sdp_fmtp_line))
        {
            return (c.clone(), CodecMatch::Exact);
        }
    }

    for c in haystack {
        if c.capability
            .mime_type
            .eq_ignore_ascii_case(&needle.capability.mime_type)
        {
            return (c.clone(), CodecMatch::Partial);
        }
    }

    (RtpCodecParameters::default(), CodecMatch::None)
}

#[cfg(test)]
mod test {
    use super::*;

    fn vp8(fmtp: &str, pt: PayloadType) -> RtpCodecParameters {
        RtpCodecParameters {
            capability: RtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                sdp_fmtp_line: fmtp.to_owned(),
                ..Default::default()
            },
            payload_type: pt,
        }
    }

    #[test]
    fn test_fuzzy_search_exact_beats_partial() {
        let haystack = vec![vp8("", 94), vp8("max-fs=12288", 96)];
        let (found, kind) = codec_parameters_fuzzy_search(&vp8("max-fs=12288", 0), &haystack);
        assert_eq!(kind, CodecMatch::Exact);
        assert_eq!(found.payload_type, 96);
    }

    #[test]
    fn test_fuzzy_search_partial_on_mime_only() {
        let haystack = vec![vp8("max-fs=12288", 96)];
        let (found, kind) = codec_parameters_fuzzy_search(&vp8("max-fs=4096", 0), &haystack);
        assert_eq!(kind, CodecMatch::Partial);
        assert_eq!(found.payload_type, 96);
    }

    #[test]
    fn test_fuzzy_search_none() {
        let haystack = vec![vp8("", 96)];
        let needle = RtpCodecParameters {
            capability: RtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        let (_, kind) = codec_parameters_fuzzy_search(&needle, &haystack);
        assert_eq!(kind, CodecMatch::None);
    }
}
