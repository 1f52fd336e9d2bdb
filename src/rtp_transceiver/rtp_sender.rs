use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use interceptor::stream_info::StreamInfo;
use interceptor::{Attributes, Interceptor, RTCPReader, RTPWriter};
use tokio::sync::{Mutex, Notify};

use crate::api::media_engine::MediaEngine;
use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, Result};
use crate::math_rand_alpha;
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::srtp_writer_future::SrtpWriterFuture;
use crate::rtp_transceiver::{
    create_stream_info, PayloadType, RtpCodingParameters, RtpSendParameters, RtpTransceiver, SSRC,
};
use crate::track::track_local::{
    InterceptorToTrackLocalWriter, TrackLocal, TrackLocalContext, TrackLocalWriter,
};

/// RtpSender pushes one local track's RTP onto the transport, through
/// the interceptor chain and the deferred SRTP writer.
pub struct RtpSender {
    pub(crate) track: Mutex<Option<Arc<dyn TrackLocal + Send + Sync>>>,

    pub(crate) srtp_stream: Arc<SrtpWriterFuture>,
    pub(crate) rtcp_interceptor: Arc<dyn RTCPReader + Send + Sync>,
    pub(crate) stream_info: Mutex<StreamInfo>,
    pub(crate) context: Mutex<TrackLocalContext>,

    pub(crate) transport: Arc<DtlsTransport>,

    pub(crate) payload_type: AtomicU8,
    pub(crate) ssrc: SSRC,
    receive_mtu: usize,

    /// Set when the transceiver was described in a local SDP; only
    /// negotiated senders start sending.
    negotiated: AtomicBool,

    pub(crate) media_engine: Arc<MediaEngine>,
    interceptor: Arc<dyn Interceptor + Send + Sync>,

    pub(crate) id: String,

    rtp_transceiver: std::sync::Mutex<Option<Weak<RtpTransceiver>>>,

    send_called: AtomicBool,
    stop_called_signal: Arc<AtomicBool>,
    stop_called: Arc<Notify>,
}

impl RtpSender {
    pub(crate) async fn new(
        receive_mtu: usize,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        transport: Arc<DtlsTransport>,
        media_engine: Arc<MediaEngine>,
        interceptor: Arc<dyn Interceptor + Send + Sync>,
    ) -> Self {
        let ssrc = rand::random::<u32>();
        let stop_called_signal = Arc::new(AtomicBool::new(false));
        let stop_called = Arc::new(Notify::new());

        let srtp_stream = Arc::new(SrtpWriterFuture::new(
            ssrc,
            Arc::clone(&transport),
            Arc::clone(&stop_called_signal),
            Arc::clone(&stop_called),
        ));

        let srtp_rtcp_reader = Arc::clone(&srtp_stream) as Arc<dyn RTCPReader + Send + Sync>;
        let rtcp_interceptor = interceptor.bind_rtcp_reader(srtp_rtcp_reader).await;

        RtpSender {
            track: Mutex::new(track),
            srtp_stream,
            rtcp_interceptor,
            stream_info: Mutex::new(StreamInfo::default()),
            context: Mutex::new(TrackLocalContext::default()),
            transport,
            payload_type: AtomicU8::new(0),
            ssrc,
            receive_mtu,
            negotiated: AtomicBool::new(false),
            media_engine,
            interceptor,
            id: math_rand_alpha(32),
            rtp_transceiver: std::sync::Mutex::new(None),
            send_called: AtomicBool::new(false),
            stop_called_signal,
            stop_called,
        }
    }

    pub(crate) fn is_negotiated(&self) -> bool {
        self.negotiated.load(Ordering::SeqCst)
    }

    pub(crate) fn set_negotiated(&self) {
        self.negotiated.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_rtp_transceiver(&self, transceiver: Option<Weak<RtpTransceiver>>) {
        let mut t = self.rtp_transceiver.lock().unwrap();
        *t = transceiver;
    }

    pub(crate) fn rtp_transceiver(&self) -> Option<Arc<RtpTransceiver>> {
        let t = self.rtp_transceiver.lock().unwrap();
        t.as_ref().and_then(|t| t.upgrade())
    }

    /// The transport RTP is sent over.
    pub fn transport(&self) -> Arc<DtlsTransport> {
        Arc::clone(&self.transport)
    }

    /// The track this sender reads from, if any.
    pub async fn track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        let track = self.track.lock().await;
        track.clone()
    }

    /// Swaps the outgoing track. With sending underway the old track
    /// is unbound and the new one bound in place.
    pub async fn replace_track(
        &self,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
    ) -> Result<()> {
        if self.has_sent().await {
            let context = self.context.lock().await;
            if let Some(t) = &*self.track.lock().await {
                t.unbind(&context).await?;
            }
        }

        if let (true, Some(t)) = (self.has_sent().await, &track) {
            let context = self.context.lock().await;
            t.bind(&context).await?;
        }

        let mut tr = self.track.lock().await;
        *tr = track;
        Ok(())
    }

    /// The parameters this sender would be (or was) negotiated with.
    pub async fn get_parameters(&self) -> RtpSendParameters {
        let kind = {
            let track = self.track.lock().await;
            track.as_ref().map(|t| t.kind()).unwrap_or_default()
        };

        let rtp_parameters = self
            .media_engine
            .get_rtp_parameters_by_kind(kind, RtpTransceiverDirection::Sendonly)
            .await;

        RtpSendParameters {
            rtp_parameters,
            encodings: vec![RtpCodingParameters {
                ssrc: self.ssrc,
                payload_type: self.payload_type.load(Ordering::SeqCst) as PayloadType,
                ..Default::default()
            }],
        }
    }

    /// Starts the track flowing with the given parameters. One-shot.
    pub async fn send(&self, parameters: &RtpSendParameters) -> Result<()> {
        if self.has_sent().await {
            return Err(Error::ErrRTPSenderSendAlreadyCalled);
        }
        if self.stop_called_signal.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let track = {
            let track = self.track.lock().await;
            track.clone().ok_or(Error::ErrRTPSenderTrackNil)?
        };

        let write_stream = Arc::new(InterceptorToTrackLocalWriter::new());
        let context = TrackLocalContext {
            id: self.id.clone(),
            params: self
                .media_engine
                .get_rtp_parameters_by_kind(track.kind(), RtpTransceiverDirection::Sendonly)
                .await,
            ssrc: parameters.encodings[0].ssrc,
            write_stream: Some(
                Arc::clone(&write_stream) as Arc<dyn TrackLocalWriter + Send + Sync>
            ),
        };

        let codec = track.bind(&context).await?;
        self.payload_type
            .store(codec.payload_type, Ordering::SeqCst);

        let stream_info = create_stream_info(
            self.id.clone(),
            parameters.encodings[0].ssrc,
            codec.payload_type,
            codec.capability.clone(),
            &parameters.rtp_parameters.header_extensions,
        );

        let srtp_rtp_writer = Arc::clone(&self.srtp_stream) as Arc<dyn RTPWriter + Send + Sync>;
        let rtp_interceptor = self
            .interceptor
            .bind_local_stream(&stream_info, srtp_rtp_writer)
            .await;
        {
            let mut interceptor_rtp_writer = write_stream.interceptor_rtp_writer.lock().await;
            *interceptor_rtp_writer = Some(rtp_interceptor);
        }

        {
            let mut ctx = self.context.lock().await;
            *ctx = context;
        }
        {
            let mut si = self.stream_info.lock().await;
            *si = stream_info;
        }

        self.send_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Irreversibly stops the sender: the track unbinds and the
    /// interceptor stream is released. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stop_called_signal.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_called.notify_waiters();

        if self.has_sent().await {
            let context = self.context.lock().await;
            if let Some(t) = &*self.track.lock().await {
                let _ = t.unbind(&context).await;
            }

            let stream_info = self.stream_info.lock().await;
            self.interceptor.unbind_local_stream(&stream_info).await;
        }

        self.srtp_stream.close().await
    }

    /// Reads an incoming RTCP batch for this sender's SSRC.
    pub async fn read_rtcp(
        &self,
    ) -> Result<(Vec<Box<dyn rtcp::packet::Packet + Send + Sync>>, Attributes)> {
        let mut b = vec![0u8; self.receive_mtu];
        let a = Attributes::new();
        Ok(self.rtcp_interceptor.read(&mut b, &a).await?)
    }

    pub(crate) async fn has_sent(&self) -> bool {
        self.send_called.load(Ordering::SeqCst)
    }
}
