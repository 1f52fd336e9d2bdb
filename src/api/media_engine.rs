use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use sdp::description::session::SessionDescription;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::{
    codecs_from_media_description, rtp_extensions_from_media_description,
};
use crate::rtp_transceiver::rtp_codec::{
    codec_parameters_fuzzy_search, CodecMatch, RtcpFeedback, RtpCodecCapability, RtpCodecKind,
    RtpCodecParameters, RtpHeaderExtensionCapability, RtpHeaderExtensionParameter, RtpParameters,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::{fmtp, PayloadType};

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_G722: &str = "audio/G722";
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
pub const MIME_TYPE_PCMA: &str = "audio/PCMA";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_VP9: &str = "video/VP9";
pub const MIME_TYPE_H264: &str = "video/H264";
pub const MIME_TYPE_RTX: &str = "video/rtx";

const VALID_EXT_IDS: Range<isize> = 1..15;

#[derive(Default, Debug, Clone)]
pub(crate) struct MediaEngineHeaderExtension {
    pub(crate) uri: String,
    pub(crate) is_audio: bool,
    pub(crate) is_video: bool,
    pub(crate) allowed_directions: Vec<RtpTransceiverDirection>,
}

impl MediaEngineHeaderExtension {
    pub fn is_matching_direction(&self, dir: RtpTransceiverDirection) -> bool {
        self.allowed_directions.is_empty() || self.allowed_directions.contains(&dir)
    }
}

/// MediaEngine holds the codec registry and, once a remote description
/// has been applied, the subset both sides agreed on. An Api hands each
/// PeerConnection its own copy so negotiation state never leaks across
/// connections.
#[derive(Default)]
pub struct MediaEngine {
    pub(crate) negotiated_video: AtomicBool,
    pub(crate) negotiated_audio: AtomicBool,

    pub(crate) video_codecs: Vec<RtpCodecParameters>,
    pub(crate) audio_codecs: Vec<RtpCodecParameters>,
    pub(crate) negotiated_video_codecs: Mutex<Vec<RtpCodecParameters>>,
    pub(crate) negotiated_audio_codecs: Mutex<Vec<RtpCodecParameters>>,

    pub(crate) header_extensions: Vec<MediaEngineHeaderExtension>,
    pub(crate) negotiated_header_extensions: Mutex<HashMap<isize, MediaEngineHeaderExtension>>,
}

impl MediaEngine {
    /// Registers the codecs a fresh engine ships with: Opus/G.722/PCM
    /// for audio, VP8/VP9/H.264 with RTX for video.
    pub fn register_default_codecs(&mut self) -> Result<()> {
        let audio_rtcp_feedback = vec![];
        for codec in [
            RtpCodecParameters {
                capability: RtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: audio_rtcp_feedback.clone(),
                },
                payload_type: 111,
            },
            RtpCodecParameters {
                capability: RtpCodecCapability {
                    mime_type: MIME_TYPE_G722.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: audio_rtcp_feedback.clone(),
                },
                payload_type: 9,
            },
            RtpCodecParameters {
                capability: RtpCodecCapability {
                    mime_type: MIME_TYPE_PCMU.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: audio_rtcp_feedback.clone(),
                },
                payload_type: 0,
            },
            RtpCodecParameters {
                capability: RtpCodecCapability {
                    mime_type: MIME_TYPE_PCMA.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: audio_rtcp_feedback,
                },
                payload_type: 8,
            },
        ] {
            self.register_codec(codec, RtpCodecKind::Audio)?;
        }

        let video_rtcp_feedback = vec![
            RtcpFeedback {
                typ: "goog-remb".to_owned(),
                parameter: "".to_owned(),
            },
            RtcpFeedback {
                typ: "ccm".to_owned(),
                parameter: "fir".to_owned(),
            },
            RtcpFeedback {
                typ: "nack".to_owned(),
                parameter: "".to_owned(),
            },
            RtcpFeedback {
                typ: "nack".to_owned(),
                parameter: "pli".to_owned(),
            },
        ];
        for (primary, primary_pt, rtx_pt, fmtp_line) in [
            (MIME_TYPE_VP8, 96u8, 97u8, "".to_owned()),
            (MIME_TYPE_VP9, 98, 99, "profile-id=0".to_owned()),
            (
                MIME_TYPE_H264,
                102,
                103,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f".to_owned(),
            ),
        ] {
            self.register_codec(
                RtpCodecParameters {
                    capability: RtpCodecCapability {
                        mime_type: primary.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: fmtp_line,
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    payload_type: primary_pt,
                },
                RtpCodecKind::Video,
            )?;
            self.register_codec(
                RtpCodecParameters {
                    capability: RtpCodecCapability {
                        mime_type: MIME_TYPE_RTX.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: format!("apt={primary_pt}"),
                        rtcp_feedback: vec![],
                    },
                    payload_type: rtx_pt,
                },
                RtpCodecKind::Video,
            )?;
        }

        Ok(())
    }

    fn add_codec(codecs: &mut Vec<RtpCodecParameters>, codec: RtpCodecParameters) {
        if !codecs.iter().any(|c| {
            c.capability.mime_type == codec.capability.mime_type
                && c.payload_type == codec.payload_type
        }) {
            codecs.push(codec);
        }
    }

    /// Adds a codec to the registry. Registration must happen before
    /// the engine is handed to an Api.
    pub fn register_codec(&mut self, codec: RtpCodecParameters, typ: RtpCodecKind) -> Result<()> {
        match typ {
            RtpCodecKind::Audio => {
                MediaEngine::add_codec(&mut self.audio_codecs, codec);
                Ok(())
            }
            RtpCodecKind::Video => {
                MediaEngine::add_codec(&mut self.video_codecs, codec);
                Ok(())
            }
            _ => Err(Error::ErrUnknownType),
        }
    }

    /// Attaches an RTCP feedback mechanism to every registered codec of
    /// the given kind.
    pub fn register_feedback(&mut self, feedback: RtcpFeedback, typ: RtpCodecKind) {
        let codecs = match typ {
            RtpCodecKind::Audio => &mut self.audio_codecs,
            RtpCodecKind::Video => &mut self.video_codecs,
            _ => return,
        };
        for codec in codecs {
            codec.capability.rtcp_feedback.push(feedback.clone());
        }
    }

    /// Registers an RFC 5285 header extension for one or both kinds.
    pub fn register_header_extension(
        &mut self,
        extension: RtpHeaderExtensionCapability,
        typ: RtpCodecKind,
        allowed_directions: Vec<RtpTransceiverDirection>,
    ) -> Result<()> {
        for direction in &allowed_directions {
            if *direction != RtpTransceiverDirection::Recvonly
                && *direction != RtpTransceiverDirection::Sendonly
            {
                return Err(Error::ErrRegisterHeaderExtensionInvalidDirection);
            }
        }

        if let Some(existing) = self
            .header_extensions
            .iter_mut()
            .find(|e| e.uri == extension.uri)
        {
            match typ {
                RtpCodecKind::Audio => existing.is_audio = true,
                RtpCodecKind::Video => existing.is_video = true,
                _ => {}
            }
            return Ok(());
        }

        self.header_extensions.push(MediaEngineHeaderExtension {
            uri: extension.uri,
            is_audio: typ == RtpCodecKind::Audio,
            is_video: typ == RtpCodecKind::Video,
            allowed_directions,
        });

        Ok(())
    }

    /// A fresh engine with the same registry and no negotiation state.
    pub(crate) fn clone_to(&self) -> Self {
        MediaEngine {
            video_codecs: self.video_codecs.clone(),
            audio_codecs: self.audio_codecs.clone(),
            header_extensions: self.header_extensions.clone(),
            ..Default::default()
        }
    }

    pub(crate) async fn get_codecs_by_kind(&self, typ: RtpCodecKind) -> Vec<RtpCodecParameters> {
        match typ {
            RtpCodecKind::Video => {
                if self.negotiated_video.load(Ordering::SeqCst) {
                    let negotiated = self.negotiated_video_codecs.lock().await;
                    negotiated.clone()
                } else {
                    self.video_codecs.clone()
                }
            }
            RtpCodecKind::Audio => {
                if self.negotiated_audio.load(Ordering::SeqCst) {
                    let negotiated = self.negotiated_audio_codecs.lock().await;
                    negotiated.clone()
                } else {
                    self.audio_codecs.clone()
                }
            }
            _ => vec![],
        }
    }

    pub(crate) async fn get_rtp_parameters_by_kind(
        &self,
        typ: RtpCodecKind,
        direction: RtpTransceiverDirection,
    ) -> RtpParameters {
        let mut header_extensions = vec![];

        let negotiated = match typ {
            RtpCodecKind::Video => self.negotiated_video.load(Ordering::SeqCst),
            RtpCodecKind::Audio => self.negotiated_audio.load(Ordering::SeqCst),
            _ => false,
        };

        if negotiated {
            let negotiated_header_extensions = self.negotiated_header_extensions.lock().await;
            for (id, e) in &*negotiated_header_extensions {
                if e.is_matching_direction(direction)
                    && ((e.is_audio && typ == RtpCodecKind::Audio)
                        || (e.is_video && typ == RtpCodecKind::Video))
                {
                    header_extensions.push(RtpHeaderExtensionParameter {
                        id: *id,
                        uri: e.uri.clone(),
                    });
                }
            }
        } else {
            for (id, e) in self.header_extensions.iter().enumerate() {
                if e.is_matching_direction(direction)
                    && ((e.is_audio && typ == RtpCodecKind::Audio)
                        || (e.is_video && typ == RtpCodecKind::Video))
                {
                    header_extensions.push(RtpHeaderExtensionParameter {
                        id: id as isize + 1,
                        uri: e.uri.clone(),
                    });
                }
            }
        }

        RtpParameters {
            header_extensions,
            codecs: self.get_codecs_by_kind(typ).await,
        }
    }

    pub(crate) async fn get_rtp_parameters_by_payload_type(
        &self,
        payload_type: PayloadType,
    ) -> Result<RtpParameters> {
        for typ in [RtpCodecKind::Audio, RtpCodecKind::Video] {
            for codec in self.get_codecs_by_kind(typ).await {
                if codec.payload_type == payload_type {
                    let mut params = self
                        .get_rtp_parameters_by_kind(typ, RtpTransceiverDirection::Recvonly)
                        .await;
                    params.codecs = vec![codec];
                    return Ok(params);
                }
            }
        }

        Err(Error::ErrCodecNotFound)
    }

    pub(crate) async fn get_header_extension_id(
        &self,
        extension: RtpHeaderExtensionCapability,
    ) -> (isize, bool, bool) {
        let negotiated_header_extensions = self.negotiated_header_extensions.lock().await;
        for (id, e) in &*negotiated_header_extensions {
            if e.uri == extension.uri {
                return (*id, e.is_audio, e.is_video);
            }
        }

        (0, false, false)
    }

    /// Records one remote codec. An exact fmtp match wins; a partial
    /// (mime-only) match is kept as fallback; RTX entries are matched
    /// through their `apt` target.
    pub(crate) async fn match_remote_codec(
        &self,
        remote_codec: &RtpCodecParameters,
        typ: RtpCodecKind,
        exact_matches: &[RtpCodecParameters],
        partial_matches: &[RtpCodecParameters],
    ) -> Result<CodecMatch> {
        let codecs = match typ {
            RtpCodecKind::Audio => &self.audio_codecs,
            RtpCodecKind::Video => &self.video_codecs,
            _ => return Err(Error::ErrUnknownType),
        };

        if remote_codec
            .capability
            .mime_type
            .eq_ignore_ascii_case(MIME_TYPE_RTX)
        {
            let fmtp = fmtp::parse_fmtp(&remote_codec.capability.sdp_fmtp_line);
            let apt = match fmtp.get("apt").and_then(|v| v.parse::<u8>().ok()) {
                Some(apt) => apt,
                None => return Ok(CodecMatch::None),
            };

            let mut apt_match = CodecMatch::None;
            for codec in exact_matches {
                if codec.payload_type == apt {
                    apt_match = CodecMatch::Exact;
                    break;
                }
            }
            if apt_match == CodecMatch::None {
                for codec in partial_matches {
                    if codec.payload_type == apt {
                        apt_match = CodecMatch::Partial;
                        break;
                    }
                }
            }

            return Ok(apt_match);
        }

        let (_, match_type) = codec_parameters_fuzzy_search(remote_codec, codecs);
        Ok(match_type)
    }

    async fn push_codecs(&self, codecs: Vec<RtpCodecParameters>, typ: RtpCodecKind) {
        for codec in codecs {
            match typ {
                RtpCodecKind::Audio => {
                    let mut negotiated = self.negotiated_audio_codecs.lock().await;
                    MediaEngine::add_codec(&mut negotiated, codec);
                }
                RtpCodecKind::Video => {
                    let mut negotiated = self.negotiated_video_codecs.lock().await;
                    MediaEngine::add_codec(&mut negotiated, codec);
                }
                _ => {}
            }
        }
    }

    async fn update_header_extension(
        &self,
        id: isize,
        extension: &str,
        typ: RtpCodecKind,
    ) -> Result<()> {
        for local_extension in &self.header_extensions {
            if local_extension.uri != extension {
                continue;
            }
            if !VALID_EXT_IDS.contains(&id) {
                continue;
            }

            let mut negotiated_header_extensions = self.negotiated_header_extensions.lock().await;
            let entry = negotiated_header_extensions
                .entry(id)
                .or_insert_with(|| MediaEngineHeaderExtension {
                    uri: extension.to_owned(),
                    is_audio: false,
                    is_video: false,
                    allowed_directions: local_extension.allowed_directions.clone(),
                });
            if typ == RtpCodecKind::Audio {
                entry.is_audio = true;
            }
            if typ == RtpCodecKind::Video {
                entry.is_video = true;
            }
        }
        Ok(())
    }

    /// Folds the remote description into the engine: codecs both sides
    /// know become the negotiated set, keyed by the remote's payload
    /// types.
    pub(crate) async fn update_from_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<()> {
        for media in &desc.media_descriptions {
            let typ = RtpCodecKind::from(media.media_name.media.as_str());
            match typ {
                RtpCodecKind::Audio if self.negotiated_audio.load(Ordering::SeqCst) => continue,
                RtpCodecKind::Video if self.negotiated_video.load(Ordering::SeqCst) => continue,
                RtpCodecKind::Audio | RtpCodecKind::Video => {}
                _ => continue,
            }

            let codecs = codecs_from_media_description(media)?;

            let mut exact_matches: Vec<RtpCodecParameters> = vec![];
            let mut partial_matches: Vec<RtpCodecParameters> = vec![];

            for codec in codecs {
                let match_type = self
                    .match_remote_codec(&codec, typ, &exact_matches, &partial_matches)
                    .await?;

                if match_type == CodecMatch::Exact {
                    exact_matches.push(codec);
                } else if match_type == CodecMatch::Partial {
                    partial_matches.push(codec);
                }
            }

            // Use exact matches when they exist, partial otherwise.
            let negotiated_codecs = if !exact_matches.is_empty() {
                exact_matches
            } else if !partial_matches.is_empty() {
                partial_matches
            } else {
                // No common codecs for this kind; nothing to record.
                continue;
            };
            self.push_codecs(negotiated_codecs, typ).await;

            let extensions = rtp_extensions_from_media_description(media)?;
            for (extension, id) in extensions {
                self.update_header_extension(id, &extension, typ).await?;
            }

            match typ {
                RtpCodecKind::Audio => self.negotiated_audio.store(true, Ordering::SeqCst),
                RtpCodecKind::Video => self.negotiated_video.store(true, Ordering::SeqCst),
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod media_engine_test;
