use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use interceptor::stream_info::StreamInfo;
use interceptor::{Attributes, Interceptor, RTCPReader, RTPReader};
use tokio::sync::Mutex;

use crate::api::media_engine::MediaEngine;
use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RtpCodecKind;
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::{create_stream_info, RtpReceiveParameters};
use crate::track::track_remote::TrackRemote;

/// One inbound SSRC's plumbing.
pub(crate) struct TrackStream {
    pub(crate) track: Arc<TrackRemote>,
    pub(crate) stream_info: StreamInfo,
    pub(crate) rtp_read_stream: Arc<srtp::stream::Stream>,
    pub(crate) rtp_interceptor: Arc<dyn RTPReader + Send + Sync>,
    pub(crate) rtcp_read_stream: Arc<srtp::stream::Stream>,
    pub(crate) rtcp_interceptor: Arc<dyn RTCPReader + Send + Sync>,
}

/// RtpReceiver owns the inbound streams of one m-section and the
/// remote tracks they surface as.
pub struct RtpReceiver {
    receive_mtu: usize,
    kind: RtpCodecKind,
    transport: Arc<DtlsTransport>,

    pub(crate) media_engine: Arc<MediaEngine>,
    interceptor: Arc<dyn Interceptor + Send + Sync>,

    received: AtomicBool,
    stopped: AtomicBool,

    streams: Mutex<Vec<TrackStream>>,
}

impl RtpReceiver {
    pub fn new(
        receive_mtu: usize,
        kind: RtpCodecKind,
        transport: Arc<DtlsTransport>,
        media_engine: Arc<MediaEngine>,
        interceptor: Arc<dyn Interceptor + Send + Sync>,
    ) -> Self {
        RtpReceiver {
            receive_mtu,
            kind,
            transport,
            media_engine,
            interceptor,
            received: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            streams: Mutex::new(vec![]),
        }
    }

    pub fn kind(&self) -> RtpCodecKind {
        self.kind
    }

    pub fn transport(&self) -> Arc<DtlsTransport> {
        Arc::clone(&self.transport)
    }

    /// Opens the SRTP/SRTCP streams for every described encoding.
    /// One-shot.
    pub async fn receive(&self, parameters: &RtpReceiveParameters) -> Result<()> {
        if self.received.swap(true, Ordering::SeqCst) {
            return Err(Error::ErrRTPReceiverReceiveAlreadyCalled);
        }

        for encoding in &parameters.encodings {
            let params = self
                .media_engine
                .get_rtp_parameters_by_kind(self.kind, RtpTransceiverDirection::Recvonly)
                .await;
            let codec = params.codecs.first().cloned().unwrap_or_default();

            let stream_info = create_stream_info(
                String::new(),
                encoding.ssrc,
                codec.payload_type,
                codec.capability.clone(),
                &params.header_extensions,
            );

            let (rtp_read_stream, rtp_interceptor, rtcp_read_stream, rtcp_interceptor) = self
                .transport
                .streams_for_ssrc(encoding.ssrc, &stream_info, &self.interceptor)
                .await?;

            let track = Arc::new(TrackRemote::new(
                self.receive_mtu,
                self.kind,
                encoding.ssrc,
                Arc::clone(&self.media_engine),
            ));
            track.set_rtp_reader(Arc::clone(&rtp_interceptor)).await;

            let mut streams = self.streams.lock().await;
            streams.push(TrackStream {
                track,
                stream_info,
                rtp_read_stream,
                rtp_interceptor,
                rtcp_read_stream,
                rtcp_interceptor,
            });
        }

        Ok(())
    }

    /// The first (and, without simulcast, only) remote track.
    pub async fn track(&self) -> Option<Arc<TrackRemote>> {
        let streams = self.streams.lock().await;
        streams.first().map(|s| Arc::clone(&s.track))
    }

    pub async fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        let streams = self.streams.lock().await;
        streams.iter().map(|s| Arc::clone(&s.track)).collect()
    }

    /// Reads an incoming RTCP batch for this receiver's streams.
    pub async fn read_rtcp(
        &self,
    ) -> Result<(Vec<Box<dyn rtcp::packet::Packet + Send + Sync>>, Attributes)> {
        let rtcp_interceptor = {
            let streams = self.streams.lock().await;
            streams
                .first()
                .map(|s| Arc::clone(&s.rtcp_interceptor))
                .ok_or(Error::ErrRTPReceiverForSSRCTrackStreamNotFound)?
        };

        let mut b = vec![0u8; self.receive_mtu];
        let a = Attributes::new();
        Ok(rtcp_interceptor.read(&mut b, &a).await?)
    }

    pub(crate) async fn have_received(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }

    /// Closes every stream and unbinds them from the interceptor
    /// chain. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let streams = {
            let mut streams = self.streams.lock().await;
            std::mem::take(&mut *streams)
        };

        let mut errs = vec![];
        for stream in streams {
            if let Err(err) = stream.rtp_read_stream.close().await {
                errs.push(Error::Srtp(err));
            }
            if let Err(err) = stream.rtcp_read_stream.close().await {
                errs.push(Error::Srtp(err));
            }
            self.interceptor
                .unbind_remote_stream(&stream.stream_info)
                .await;
        }

        crate::error::flatten_errs(errs)
    }
}
