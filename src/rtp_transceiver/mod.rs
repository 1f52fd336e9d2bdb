pub(crate) mod fmtp;
pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;
pub(crate) mod srtp_writer_future;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use interceptor::stream_info::{RTCPFeedback, RTPHeaderExtension, StreamInfo};
use smol_str::SmolStr;
use tokio::sync::Mutex;

use crate::api::media_engine::{MediaEngine, MIME_TYPE_RTX};
use crate::error::{Error, Result};
use crate::rtp_transceiver::fmtp::parse_fmtp;
use crate::rtp_transceiver::rtp_codec::{
    RtpCodecCapability, RtpCodecKind, RtpCodecParameters, RtpHeaderExtensionParameter,
};
use crate::rtp_transceiver::rtp_receiver::RtpReceiver;
use crate::rtp_transceiver::rtp_sender::RtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;

/// RTP synchronization source identifier.
pub type SSRC = u32;

/// RTP payload type.
pub type PayloadType = u8;

pub(crate) type TriggerNegotiationNeededFnOption =
    Option<Box<dyn (Fn() -> Pin<Box<dyn Future<Output = ()> + Send + Sync>>) + Send + Sync>>;

/// One encoding of a track (we do not negotiate simulcast layers).
#[derive(Default, Debug, Clone)]
pub struct RtpCodingParameters {
    pub rid: SmolStr,
    pub ssrc: SSRC,
    pub payload_type: PayloadType,
}

/// Parameters for `RtpReceiver::receive`.
#[derive(Default, Debug, Clone)]
pub struct RtpReceiveParameters {
    pub encodings: Vec<RtpCodingParameters>,
}

/// Parameters for `RtpSender::send`.
#[derive(Default, Debug, Clone)]
pub struct RtpSendParameters {
    pub rtp_parameters: rtp_codec::RtpParameters,
    pub encodings: Vec<RtpCodingParameters>,
}

/// Options for adding a transceiver.
#[derive(Default, Debug, Clone)]
pub struct RtpTransceiverInit {
    pub direction: RtpTransceiverDirection,
    pub send_encodings: Vec<RtpCodingParameters>,
}

pub(crate) fn create_stream_info(
    id: String,
    ssrc: SSRC,
    payload_type: PayloadType,
    codec: RtpCodecCapability,
    webrtc_header_extensions: &[RtpHeaderExtensionParameter],
) -> StreamInfo {
    let header_extensions: Vec<RTPHeaderExtension> = webrtc_header_extensions
        .iter()
        .map(|h| RTPHeaderExtension {
            id: h.id,
            uri: h.uri.clone(),
        })
        .collect();

    let feedbacks: Vec<RTCPFeedback> = codec
        .rtcp_feedback
        .iter()
        .map(|f| RTCPFeedback {
            typ: f.typ.clone(),
            parameter: f.parameter.clone(),
        })
        .collect();

    StreamInfo {
        id,
        attributes: interceptor::Attributes::new(),
        ssrc,
        payload_type,
        rtp_header_extensions: header_extensions,
        mime_type: codec.mime_type,
        clock_rate: codec.clock_rate,
        channels: codec.channels,
        sdp_fmtp_line: codec.sdp_fmtp_line,
        rtcp_feedback: feedbacks,
        ..Default::default()
    }
}

/// RtpTransceiver pairs a sender and a receiver with a direction and a
/// mid; one per m-section. Transceivers are never removed, only
/// stopped.
pub struct RtpTransceiver {
    mid: Mutex<String>,
    sender: Mutex<Option<Arc<RtpSender>>>,
    receiver: Mutex<Option<Arc<RtpReceiver>>>,
    direction: AtomicU8,

    /// Codec preferences; empty falls back to the media engine.
    codecs: Mutex<Vec<RtpCodecParameters>>,

    pub(crate) stopped: AtomicBool,
    pub(crate) kind: RtpCodecKind,

    media_engine: Arc<MediaEngine>,

    trigger_negotiation_needed: Mutex<TriggerNegotiationNeededFnOption>,
}

impl RtpTransceiver {
    pub(crate) async fn new(
        receiver: Option<Arc<RtpReceiver>>,
        sender: Option<Arc<RtpSender>>,
        direction: RtpTransceiverDirection,
        kind: RtpCodecKind,
        codecs: Vec<RtpCodecParameters>,
        media_engine: Arc<MediaEngine>,
        trigger_negotiation_needed: TriggerNegotiationNeededFnOption,
    ) -> Arc<Self> {
        let t = Arc::new(RtpTransceiver {
            mid: Mutex::new(String::new()),
            sender: Mutex::new(None),
            receiver: Mutex::new(receiver),
            direction: AtomicU8::new(direction as u8),
            codecs: Mutex::new(codecs),
            stopped: AtomicBool::new(false),
            kind,
            media_engine,
            trigger_negotiation_needed: Mutex::new(trigger_negotiation_needed),
        });

        t.set_sender(sender).await;
        t
    }

    /// Overrides the codecs offered for this section. Every entry must
    /// exist in the media engine; an empty list restores defaults.
    pub async fn set_codec_preferences(&self, codecs: Vec<RtpCodecParameters>) -> Result<()> {
        let registered = self.media_engine.get_codecs_by_kind(self.kind).await;
        for codec in &codecs {
            let (_, match_type) =
                rtp_codec::codec_parameters_fuzzy_search(codec, &registered);
            if match_type == rtp_codec::CodecMatch::None {
                return Err(Error::ErrRTPTransceiverCodecUnsupported);
            }
        }

        {
            let mut c = self.codecs.lock().await;
            *c = codecs;
        }
        Ok(())
    }

    /// The codecs this section will offer: the preference list (with
    /// orphaned RTX entries dropped) or the engine's set.
    pub(crate) async fn get_codecs(&self) -> Vec<RtpCodecParameters> {
        let codecs = self.codecs.lock().await;
        if codecs.is_empty() {
            return self.media_engine.get_codecs_by_kind(self.kind).await;
        }

        // An RTX entry only makes sense when its apt target made the
        // list too.
        let payload_types: Vec<PayloadType> = codecs
            .iter()
            .filter(|c| !c.capability.mime_type.eq_ignore_ascii_case(MIME_TYPE_RTX))
            .map(|c| c.payload_type)
            .collect();

        codecs
            .iter()
            .filter(|c| {
                if !c.capability.mime_type.eq_ignore_ascii_case(MIME_TYPE_RTX) {
                    return true;
                }
                parse_fmtp(&c.capability.sdp_fmtp_line)
                    .get("apt")
                    .and_then(|v| v.parse::<PayloadType>().ok())
                    .map(|apt| payload_types.contains(&apt))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub async fn sender(&self) -> Option<Arc<RtpSender>> {
        let sender = self.sender.lock().await;
        sender.clone()
    }

    pub(crate) async fn set_sender(self: &Arc<Self>, s: Option<Arc<RtpSender>>) {
        if let Some(sender) = &s {
            sender.set_rtp_transceiver(Some(Arc::downgrade(self)));
        }

        let prev = {
            let mut sender = self.sender.lock().await;
            std::mem::replace(&mut *sender, s)
        };
        if let Some(prev) = prev {
            prev.set_rtp_transceiver(None);
        }
    }

    pub async fn receiver(&self) -> Option<Arc<RtpReceiver>> {
        let receiver = self.receiver.lock().await;
        receiver.clone()
    }

    pub(crate) async fn set_receiver(&self, r: Option<Arc<RtpReceiver>>) {
        let mut receiver = self.receiver.lock().await;
        *receiver = r;
    }

    /// Replaces sender and track together; used by add_track on a
    /// recycled transceiver.
    pub(crate) async fn set_sending_track(
        self: &Arc<Self>,
        track: Option<Arc<dyn crate::track::track_local::TrackLocal + Send + Sync>>,
    ) -> Result<()> {
        let track_is_none = track.is_none();
        {
            let sender = self.sender.lock().await;
            if let Some(s) = &*sender {
                s.replace_track(track).await?;
            }
        }

        let direction = self.direction();
        let new_direction = match (track_is_none, direction) {
            (true, RtpTransceiverDirection::Sendrecv) => RtpTransceiverDirection::Recvonly,
            (true, RtpTransceiverDirection::Sendonly) => RtpTransceiverDirection::Inactive,
            (false, RtpTransceiverDirection::Recvonly) => RtpTransceiverDirection::Sendrecv,
            (false, RtpTransceiverDirection::Inactive) => RtpTransceiverDirection::Sendonly,
            _ => direction,
        };
        self.direction.store(new_direction as u8, Ordering::SeqCst);

        Ok(())
    }

    /// The mid, empty until negotiation assigns one.
    pub async fn mid(&self) -> String {
        let mid = self.mid.lock().await;
        mid.clone()
    }

    /// Binds the mid; it cannot change afterwards.
    pub(crate) async fn set_mid(&self, new_mid: String) -> Result<()> {
        let mut mid = self.mid.lock().await;
        if !mid.is_empty() {
            return Err(Error::ErrRTPTransceiverCannotChangeMid);
        }
        *mid = new_mid;
        Ok(())
    }

    pub fn kind(&self) -> RtpCodecKind {
        self.kind
    }

    pub fn direction(&self) -> RtpTransceiverDirection {
        self.direction.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn set_direction(&self, d: RtpTransceiverDirection) {
        let previous: RtpTransceiverDirection =
            self.direction.swap(d as u8, Ordering::SeqCst).into();
        if d != previous {
            let trigger = self.trigger_negotiation_needed.lock().await;
            if let Some(f) = &*trigger {
                f().await;
            }
        }
    }

    /// Used while applying a remote description, where firing
    /// negotiation-needed would loop.
    pub(crate) fn set_direction_internal(&self, d: RtpTransceiverDirection) {
        self.direction.store(d as u8, Ordering::SeqCst);
    }

    /// Irreversibly stops both halves; direction becomes inactive.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let sender = self.sender.lock().await;
            if let Some(s) = &*sender {
                s.stop().await?;
            }
        }
        {
            let receiver = self.receiver.lock().await;
            if let Some(r) = &*receiver {
                r.stop().await?;
            }
        }

        self.set_direction_internal(RtpTransceiverDirection::Inactive);

        Ok(())
    }
}

/// Picks the transceiver negotiation tied to a mid.
pub(crate) async fn find_by_mid(
    mid: &str,
    local_transceivers: &mut Vec<Arc<RtpTransceiver>>,
) -> Option<Arc<RtpTransceiver>> {
    for (i, t) in local_transceivers.iter().enumerate() {
        if t.mid().await == mid {
            return Some(local_transceivers.remove(i));
        }
    }

    None
}

/// Finds an unbound transceiver that can satisfy a remote m-section of
/// the given kind and direction, per the JSEP recycling rules.
pub(crate) async fn satisfy_type_and_direction(
    remote_kind: RtpCodecKind,
    remote_direction: RtpTransceiverDirection,
    local_transceivers: &mut Vec<Arc<RtpTransceiver>>,
) -> Option<Arc<RtpTransceiver>> {
    let needed_direction = match remote_direction {
        RtpTransceiverDirection::Sendrecv => RtpTransceiverDirection::Sendrecv,
        RtpTransceiverDirection::Sendonly => RtpTransceiverDirection::Recvonly,
        RtpTransceiverDirection::Recvonly => RtpTransceiverDirection::Sendonly,
        _ => RtpTransceiverDirection::Inactive,
    };

    for (i, t) in local_transceivers.iter().enumerate() {
        if t.mid().await.is_empty()
            && t.kind() == remote_kind
            && (t.direction() == needed_direction
                || (needed_direction == RtpTransceiverDirection::Sendrecv
                    && (t.direction() == RtpTransceiverDirection::Sendonly
                        || t.direction() == RtpTransceiverDirection::Recvonly)))
        {
            return Some(local_transceivers.remove(i));
        }
    }

    None
}

#[cfg(test)]
mod rtp_transceiver_test;
