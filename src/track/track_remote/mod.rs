use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use interceptor::{Attributes, RTPReader};
use tokio::sync::Mutex;

use crate::api::media_engine::MediaEngine;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{RtpCodecKind, RtpCodecParameters, RtpParameters};
use crate::rtp_transceiver::{PayloadType, SSRC};

/// A track received from the remote peer: an inbound SRTP stream plus
/// the codec description resolved from its payload type.
pub struct TrackRemote {
    id: Mutex<String>,
    stream_id: Mutex<String>,

    kind: RtpCodecKind,
    ssrc: SSRC,
    payload_type: AtomicU8,

    params: Mutex<RtpParameters>,
    codec: Mutex<RtpCodecParameters>,

    media_engine: Arc<MediaEngine>,
    rtp_interceptor: Mutex<Option<Arc<dyn RTPReader + Send + Sync>>>,
    peeked: Mutex<Option<(rtp::packet::Packet, Attributes)>>,

    receive_mtu: usize,
}

impl TrackRemote {
    pub(crate) fn new(
        receive_mtu: usize,
        kind: RtpCodecKind,
        ssrc: SSRC,
        media_engine: Arc<MediaEngine>,
    ) -> Self {
        TrackRemote {
            id: Mutex::new(String::new()),
            stream_id: Mutex::new(String::new()),
            kind,
            ssrc,
            payload_type: AtomicU8::new(0),
            params: Mutex::new(RtpParameters::default()),
            codec: Mutex::new(RtpCodecParameters::default()),
            media_engine,
            rtp_interceptor: Mutex::new(None),
            peeked: Mutex::new(None),
            receive_mtu,
        }
    }

    /// The track identifier carried in the remote's msid line.
    pub async fn id(&self) -> String {
        let id = self.id.lock().await;
        id.clone()
    }

    pub(crate) async fn set_id(&self, s: String) {
        let mut id = self.id.lock().await;
        *id = s;
    }

    /// The stream (msid) this track belongs to.
    pub async fn stream_id(&self) -> String {
        let stream_id = self.stream_id.lock().await;
        stream_id.clone()
    }

    pub(crate) async fn set_stream_id(&self, s: String) {
        let mut stream_id = self.stream_id.lock().await;
        *stream_id = s;
    }

    pub fn kind(&self) -> RtpCodecKind {
        self.kind
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type.load(Ordering::SeqCst)
    }

    /// The codec resolved once the first packet arrived.
    pub async fn codec(&self) -> RtpCodecParameters {
        let codec = self.codec.lock().await;
        codec.clone()
    }

    pub(crate) async fn set_rtp_reader(&self, reader: Arc<dyn RTPReader + Send + Sync>) {
        let mut rtp_interceptor = self.rtp_interceptor.lock().await;
        *rtp_interceptor = Some(reader);
    }

    /// Reads the next RTP packet for this track, in receive order.
    pub async fn read(&self, b: &mut [u8]) -> Result<(rtp::packet::Packet, Attributes)> {
        {
            let mut peeked = self.peeked.lock().await;
            if let Some((pkt, attributes)) = peeked.take() {
                return Ok((pkt, attributes));
            }
        }

        let reader = {
            let rtp_interceptor = self.rtp_interceptor.lock().await;
            rtp_interceptor
                .clone()
                .ok_or(Error::ErrRTPReceiverForSSRCTrackStreamNotFound)?
        };

        let a = Attributes::new();
        Ok(reader.read(b, &a).await?)
    }

    /// Reads one packet and puts it back, so the next `read` returns
    /// it again. Used to sniff the payload type before dispatching the
    /// track to the application.
    pub(crate) async fn peek(&self, b: &mut [u8]) -> Result<(rtp::packet::Packet, Attributes)> {
        let (pkt, attributes) = self.read(b).await?;

        {
            let mut peeked = self.peeked.lock().await;
            *peeked = Some((pkt.clone(), attributes.clone()));
        }

        Ok((pkt, attributes))
    }

    /// Resolves the codec for the payload type seen on the wire.
    pub(crate) async fn check_and_update_track(&self, pkt: &rtp::packet::Packet) -> Result<()> {
        if pkt.header.payload_type == self.payload_type() {
            return Ok(());
        }

        let params = self
            .media_engine
            .get_rtp_parameters_by_payload_type(pkt.header.payload_type)
            .await?;

        self.payload_type
            .store(pkt.header.payload_type, Ordering::SeqCst);
        {
            let mut codec = self.codec.lock().await;
            *codec = params
                .codecs
                .first()
                .cloned()
                .ok_or(Error::ErrCodecNotFound)?;
        }
        {
            let mut p = self.params.lock().await;
            *p = params;
        }

        Ok(())
    }

    pub(crate) fn receive_mtu(&self) -> usize {
        self.receive_mtu
    }
}
