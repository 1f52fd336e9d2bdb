pub mod track_local_static_rtp;
pub mod track_local_static_sample;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use interceptor::{Attributes, RTPWriter};
use tokio::sync::Mutex;
use util::marshal::Unmarshal;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{RtpCodecKind, RtpCodecParameters, RtpParameters};
use crate::rtp_transceiver::{PayloadType, SSRC};

/// Sink for a local track's outbound RTP packets.
#[async_trait]
pub trait TrackLocalWriter: fmt::Debug {
    /// Encrypts and writes one RTP packet.
    async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize>;

    /// Same, for an already-marshaled packet.
    async fn write(&self, b: &[u8]) -> Result<usize>;
}

/// Context a track is bound with; carries the negotiated parameters and
/// the write path the track must use.
#[derive(Default, Debug, Clone)]
pub struct TrackLocalContext {
    pub(crate) id: String,
    pub(crate) params: RtpParameters,
    pub(crate) ssrc: SSRC,
    pub(crate) write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
}

impl TrackLocalContext {
    /// Codecs both peers support, with negotiated payload types.
    pub fn codec_parameters(&self) -> &[RtpCodecParameters] {
        &self.params.codecs
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    pub fn write_stream(&self) -> Option<Arc<dyn TrackLocalWriter + Send + Sync>> {
        self.write_stream.clone()
    }

    /// Identifier used to pair bind and unbind calls.
    pub fn id(&self) -> String {
        self.id.clone()
    }
}

/// A source of outbound media. Implementations decide how data reaches
/// the track; binding decides how it leaves.
#[async_trait]
pub trait TrackLocal {
    /// Called once negotiation settled the codec set; the track stores
    /// the binding and starts writing through it.
    async fn bind(&self, t: &TrackLocalContext) -> Result<RtpCodecParameters>;

    /// Tears the binding down after the track is stopped.
    async fn unbind(&self, t: &TrackLocalContext) -> Result<()>;

    /// Track identifier, unique within its stream.
    fn id(&self) -> &str;

    /// The stream (msid) this track belongs to.
    fn stream_id(&self) -> &str;

    fn kind(&self) -> RtpCodecKind;

    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

/// One bind result, kept so writes know ssrc/payload type per
/// connection.
#[derive(Default, Debug, Clone)]
pub(crate) struct TrackBinding {
    id: String,
    pub(crate) ssrc: SSRC,
    pub(crate) payload_type: PayloadType,
    pub(crate) write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
}

/// Adapts the interceptor chain's RTP writer into the TrackLocalWriter
/// a bound track writes to.
pub(crate) struct InterceptorToTrackLocalWriter {
    pub(crate) interceptor_rtp_writer: Mutex<Option<Arc<dyn RTPWriter + Send + Sync>>>,
}

impl InterceptorToTrackLocalWriter {
    pub(crate) fn new() -> Self {
        InterceptorToTrackLocalWriter {
            interceptor_rtp_writer: Mutex::new(None),
        }
    }
}

impl fmt::Debug for InterceptorToTrackLocalWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorToTrackLocalWriter").finish()
    }
}

#[async_trait]
impl TrackLocalWriter for InterceptorToTrackLocalWriter {
    async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        let interceptor_rtp_writer = self.interceptor_rtp_writer.lock().await;
        if let Some(writer) = &*interceptor_rtp_writer {
            let a = Attributes::new();
            Ok(writer.write(pkt, &a).await?)
        } else {
            Ok(0)
        }
    }

    async fn write(&self, b: &[u8]) -> Result<usize> {
        let mut buf = Bytes::copy_from_slice(b);
        let pkt = rtp::packet::Packet::unmarshal(&mut buf)?;
        self.write_rtp(&pkt).await
    }
}

pub(crate) fn find_binding(bindings: &[TrackBinding], t: &TrackLocalContext) -> Option<usize> {
    bindings.iter().position(|b| b.id == t.id)
}
