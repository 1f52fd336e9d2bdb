use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use interceptor::{Attributes, Interceptor, RTCPWriter};
use tokio::sync::Mutex;

use crate::api::media_engine::MediaEngine;
use crate::api::setting_engine::SettingEngine;
use crate::api::Api;
use crate::data_channel::data_channel_state::DataChannelState;
use crate::dtls_transport::dtls_fingerprint::DtlsFingerprint;
use crate::dtls_transport::dtls_parameters::DtlsParameters;
use crate::dtls_transport::dtls_role::{DtlsRole, DEFAULT_DTLS_ROLE_OFFER};
use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, Result};
use crate::ice_transport::ice_connection_state::IceConnectionState;
use crate::ice_transport::ice_gatherer::IceGatherer;
use crate::ice_transport::ice_gatherer_state::IceGathererState;
use crate::ice_transport::ice_gathering_state::IceGatheringState;
use crate::ice_transport::ice_parameters::IceParameters;
use crate::ice_transport::ice_role::IceRole;
use crate::ice_transport::ice_transport_state::IceTransportState;
use crate::ice_transport::IceTransport;
use crate::peer_connection::configuration::Configuration;
use crate::peer_connection::operation::{Operation, Operations};
use crate::peer_connection::peer_connection_state::{
    NegotiationNeededState, PeerConnectionState,
};
use crate::peer_connection::sdp::sdp_type::SdpType;
use crate::peer_connection::sdp::session_description::SessionDescription;
use crate::peer_connection::sdp::*;
use crate::peer_connection::signaling_state::SignalingState;
use crate::peer_connection::{
    OnDataChannelHdlrFn, OnIceConnectionStateChangeHdlrFn, OnNegotiationNeededHdlrFn,
    OnPeerConnectionStateChangeHdlrFn, OnSignalingStateChangeHdlrFn, OnTrackHdlrFn,
    MEDIA_SECTION_APPLICATION,
};
use crate::rtp_transceiver::rtp_codec::RtpCodecKind;
use crate::rtp_transceiver::rtp_receiver::RtpReceiver;
use crate::rtp_transceiver::rtp_sender::RtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::{
    find_by_mid, satisfy_type_and_direction, RtpCodingParameters, RtpReceiveParameters,
    RtpTransceiver, RtpTransceiverInit, SSRC,
};
use crate::sctp_transport::sctp_transport_capabilities::SctpTransportCapabilities;
use crate::sctp_transport::SctpTransport;
use crate::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use crate::track::track_local::TrackLocal;
use crate::track::track_remote::TrackRemote;
use crate::math_rand_alpha;

/// The shared core every background task hangs off. The public
/// PeerConnection wraps this in an Arc; callbacks capture only the
/// individually Arc'd fields they need, so nothing keeps the whole
/// core alive by accident.
pub(crate) struct PeerConnectionInner {
    /// Highest numeric mid handed out; JSEP requires fresh mids per
    /// reuse.
    pub(super) greater_mid: AtomicIsize,
    pub(super) sdp_origin: Mutex<::sdp::description::session::Origin>,
    pub(super) last_offer: Mutex<String>,
    pub(super) last_answer: Mutex<String>,

    pub(super) ops: Arc<Operations>,
    pub(super) is_closed: Arc<AtomicBool>,
    pub(super) is_negotiation_needed: Arc<AtomicBool>,
    pub(super) negotiation_needed_state: Arc<AtomicU8>,
    pub(super) signaling_state: Arc<AtomicU8>,
    pub(super) ice_connection_state: Arc<AtomicU8>,
    pub(super) peer_connection_state: Arc<AtomicU8>,

    pub(super) ice_gatherer: Arc<IceGatherer>,
    pub(super) ice_transport: Arc<IceTransport>,
    pub(super) dtls_transport: Arc<DtlsTransport>,
    pub(super) sctp_transport: Arc<SctpTransport>,

    pub(super) rtp_transceivers: Arc<Mutex<Vec<Arc<RtpTransceiver>>>>,

    pub(super) current_local_description: Arc<Mutex<Option<SessionDescription>>>,
    pub(super) pending_local_description: Arc<Mutex<Option<SessionDescription>>>,
    pub(super) current_remote_description: Arc<Mutex<Option<SessionDescription>>>,
    pub(super) pending_remote_description: Arc<Mutex<Option<SessionDescription>>>,

    pub(super) on_signaling_state_change_handler:
        Arc<ArcSwapOption<Mutex<OnSignalingStateChangeHdlrFn>>>,
    pub(super) on_ice_connection_state_change_handler:
        Arc<ArcSwapOption<Mutex<OnIceConnectionStateChangeHdlrFn>>>,
    pub(super) on_peer_connection_state_change_handler:
        Arc<ArcSwapOption<Mutex<OnPeerConnectionStateChangeHdlrFn>>>,
    pub(super) on_data_channel_handler: Arc<ArcSwapOption<Mutex<OnDataChannelHdlrFn>>>,
    pub(super) on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    pub(super) on_negotiation_needed_handler:
        Arc<ArcSwapOption<Mutex<OnNegotiationNeededHdlrFn>>>,

    pub(super) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: Arc<MediaEngine>,
    pub(super) interceptor: Weak<dyn Interceptor + Send + Sync>,
}

impl PeerConnectionInner {
    pub(super) async fn new(
        api: &Api,
        interceptor: Weak<dyn Interceptor + Send + Sync>,
        mut configuration: Configuration,
    ) -> Result<(Arc<Self>, Configuration)> {
        let setting_engine = Arc::clone(&api.setting_engine);
        let media_engine = if !setting_engine.disable_media_engine_copy {
            Arc::new(api.media_engine.clone_to())
        } else {
            Arc::clone(&api.media_engine)
        };

        let ice_gatherer = Arc::new(api.new_ice_gatherer(
            crate::ice_transport::ice_gatherer::IceGatherOptions {
                ice_servers: configuration.get_ice_servers(),
                ice_gather_policy: configuration.ice_transport_policy,
            },
        )?);

        let ice_transport = Arc::new(api.new_ice_transport(Arc::clone(&ice_gatherer)));

        let certificates = configuration.certificates.drain(..).collect();
        let dtls_transport =
            Arc::new(api.new_dtls_transport(Arc::clone(&ice_transport), certificates)?);

        let sctp_transport = Arc::new(api.new_sctp_transport(Arc::clone(&dtls_transport))?);

        let inner = Arc::new(PeerConnectionInner {
            greater_mid: AtomicIsize::new(-1),
            sdp_origin: Mutex::new(Default::default()),
            last_offer: Mutex::new(String::new()),
            last_answer: Mutex::new(String::new()),

            ops: Arc::new(Operations::new()),
            is_closed: Arc::new(AtomicBool::new(false)),
            is_negotiation_needed: Arc::new(AtomicBool::new(false)),
            negotiation_needed_state: Arc::new(AtomicU8::new(
                NegotiationNeededState::Empty as u8,
            )),
            signaling_state: Arc::new(AtomicU8::new(SignalingState::Stable as u8)),
            ice_connection_state: Arc::new(AtomicU8::new(IceConnectionState::New as u8)),
            peer_connection_state: Arc::new(AtomicU8::new(PeerConnectionState::New as u8)),

            ice_gatherer,
            ice_transport,
            dtls_transport,
            sctp_transport,

            rtp_transceivers: Arc::new(Mutex::new(vec![])),

            current_local_description: Arc::new(Mutex::new(None)),
            pending_local_description: Arc::new(Mutex::new(None)),
            current_remote_description: Arc::new(Mutex::new(None)),
            pending_remote_description: Arc::new(Mutex::new(None)),

            on_signaling_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_ice_connection_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_peer_connection_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_data_channel_handler: Arc::new(ArcSwapOption::empty()),
            on_track_handler: Arc::new(ArcSwapOption::empty()),
            on_negotiation_needed_handler: Arc::new(ArcSwapOption::empty()),

            setting_engine,
            media_engine,
            interceptor,
        });

        inner.wire_ice_connection_state();
        inner.wire_sctp_on_data_channel();

        Ok((inner, configuration))
    }

    /// Routes agent state through the ICE-connection-state slot and
    /// re-derives the aggregate connection state.
    fn wire_ice_connection_state(self: &Arc<Self>) {
        let ice_connection_state = Arc::clone(&self.ice_connection_state);
        let peer_connection_state = Arc::clone(&self.peer_connection_state);
        let is_closed = Arc::clone(&self.is_closed);
        let dtls_transport = Arc::clone(&self.dtls_transport);
        let on_ice_connection_state_change_handler =
            Arc::clone(&self.on_ice_connection_state_change_handler);
        let on_peer_connection_state_change_handler =
            Arc::clone(&self.on_peer_connection_state_change_handler);

        self.ice_transport
            .on_connection_state_change(Box::new(move |state: IceTransportState| {
                let cs = match state {
                    IceTransportState::New => IceConnectionState::New,
                    IceTransportState::Checking => IceConnectionState::Checking,
                    IceTransportState::Connected => IceConnectionState::Connected,
                    IceTransportState::Completed => IceConnectionState::Completed,
                    IceTransportState::Disconnected => IceConnectionState::Disconnected,
                    IceTransportState::Failed => IceConnectionState::Failed,
                    IceTransportState::Closed => IceConnectionState::Closed,
                    IceTransportState::Unspecified => {
                        log::warn!("on_connection_state_change: unhandled ICE state {state}");
                        return Box::pin(async {});
                    }
                };

                let ice_connection_state = Arc::clone(&ice_connection_state);
                let peer_connection_state = Arc::clone(&peer_connection_state);
                let is_closed = Arc::clone(&is_closed);
                let dtls_transport_state = dtls_transport.state();
                let on_ice_connection_state_change_handler =
                    Arc::clone(&on_ice_connection_state_change_handler);
                let on_peer_connection_state_change_handler =
                    Arc::clone(&on_peer_connection_state_change_handler);

                Box::pin(async move {
                    do_ice_connection_state_change(
                        &on_ice_connection_state_change_handler,
                        &ice_connection_state,
                        cs,
                    )
                    .await;
                    update_connection_state(
                        &on_peer_connection_state_change_handler,
                        &is_closed,
                        &peer_connection_state,
                        cs,
                        dtls_transport_state,
                    )
                    .await;
                })
            }));
    }

    fn wire_sctp_on_data_channel(self: &Arc<Self>) {
        let on_data_channel_handler = Arc::clone(&self.on_data_channel_handler);
        self.sctp_transport.on_data_channel(Box::new(move |d| {
            let on_data_channel_handler = Arc::clone(&on_data_channel_handler);
            Box::pin(async move {
                if let Some(handler) = &*on_data_channel_handler.load() {
                    let mut f = handler.lock().await;
                    f(d).await;
                }
            })
        }));
    }

    pub(super) fn signaling_state(&self) -> SignalingState {
        self.signaling_state.load(Ordering::SeqCst).into()
    }

    pub(super) fn ice_gathering_state(&self) -> IceGatheringState {
        match self.ice_gatherer.state() {
            IceGathererState::New => IceGatheringState::New,
            IceGathererState::Gathering => IceGatheringState::Gathering,
            _ => IceGatheringState::Complete,
        }
    }

    pub(super) async fn remote_description(&self) -> Option<SessionDescription> {
        let pending = self.pending_remote_description.lock().await;
        if pending.is_some() {
            pending.clone()
        } else {
            let current = self.current_remote_description.lock().await;
            current.clone()
        }
    }

    // ---------------------------------------------------------------
    // negotiation-needed (debounced through the operations queue)
    // ---------------------------------------------------------------

    /// Flags that the described m-sections may have changed and, if no
    /// check is in flight yet, queues one.
    pub(crate) async fn trigger_negotiation_needed(self: &Arc<Self>) {
        // https://w3c.github.io/webrtc-pc/#updating-the-negotiation-needed-flag
        let state: NegotiationNeededState =
            self.negotiation_needed_state.load(Ordering::SeqCst).into();
        match state {
            NegotiationNeededState::Run => {
                self.negotiation_needed_state
                    .store(NegotiationNeededState::Queue as u8, Ordering::SeqCst);
                return;
            }
            NegotiationNeededState::Queue => return,
            NegotiationNeededState::Empty => {
                self.negotiation_needed_state
                    .store(NegotiationNeededState::Run as u8, Ordering::SeqCst);
            }
        }

        let inner = Arc::clone(self);
        let _ = self
            .ops
            .enqueue(Operation(Box::new(move || {
                let inner = Arc::clone(&inner);
                Box::pin(async move { inner.negotiation_needed_op().await })
            })))
            .await;
    }

    /// Trailing queue op: decides whether the effective description
    /// changed and fires the application callback at most once per
    /// settled change. Returning true re-queues it behind newer ops.
    async fn negotiation_needed_op(self: Arc<Self>) -> bool {
        if self.on_negotiation_needed_handler.load().is_none() {
            self.after_negotiation_needed_op().await;
            return false;
        }

        if self.is_closed.load(Ordering::SeqCst) {
            return false;
        }

        // Let every mutation already queued settle first.
        if !self.ops.is_empty().await {
            return true;
        }

        if self.signaling_state() != SignalingState::Stable {
            return self.after_negotiation_needed_op().await;
        }

        if !self.check_negotiation_needed().await {
            self.is_negotiation_needed.store(false, Ordering::SeqCst);
            return self.after_negotiation_needed_op().await;
        }

        if self.is_negotiation_needed.load(Ordering::SeqCst) {
            return self.after_negotiation_needed_op().await;
        }

        self.is_negotiation_needed.store(true, Ordering::SeqCst);
        if let Some(handler) = &*self.on_negotiation_needed_handler.load() {
            let mut f = handler.lock().await;
            f().await;
        }

        self.after_negotiation_needed_op().await
    }

    /// Re-arms the debounce; a mutation that arrived while the op ran
    /// schedules one more pass.
    async fn after_negotiation_needed_op(self: &Arc<Self>) -> bool {
        let old_state: NegotiationNeededState =
            self.negotiation_needed_state.load(Ordering::SeqCst).into();
        self.negotiation_needed_state
            .store(NegotiationNeededState::Empty as u8, Ordering::SeqCst);

        if old_state == NegotiationNeededState::Queue {
            self.negotiation_needed_state
                .store(NegotiationNeededState::Run as u8, Ordering::SeqCst);
            let inner = Arc::clone(self);
            let _ = self
                .ops
                .enqueue(Operation(Box::new(move || {
                    let inner = Arc::clone(&inner);
                    Box::pin(async move { inner.negotiation_needed_op().await })
                })))
                .await;
        }
        false
    }

    /// The JSEP "check if negotiation is needed" algorithm, reduced to
    /// what this stack negotiates.
    async fn check_negotiation_needed(&self) -> bool {
        let current_local_description = {
            let current = self.current_local_description.lock().await;
            current.clone()
        };

        let local_desc = match &current_local_description {
            Some(desc) => desc,
            None => return true,
        };

        let data_channel_count = {
            let data_channels = self.sctp_transport.data_channels.lock().await;
            data_channels.len()
        };
        if data_channel_count != 0 && have_data_channel(local_desc).is_none() {
            return true;
        }

        let transceivers = {
            let transceivers = self.rtp_transceivers.lock().await;
            transceivers.clone()
        };
        for t in &transceivers {
            let mid = t.mid().await;
            let m = get_by_mid(&mid, local_desc);

            if !t.stopped.load(Ordering::SeqCst) && m.is_none() {
                return true;
            }

            if !t.stopped.load(Ordering::SeqCst) {
                if let Some(m) = m {
                    let t_direction = t.direction();
                    if t_direction == RtpTransceiverDirection::Sendrecv
                        || t_direction == RtpTransceiverDirection::Sendonly
                    {
                        let desc_msid = m
                            .attribute(::sdp::description::session::ATTR_KEY_MSID)
                            .flatten();
                        let sender_track = match t.sender().await {
                            Some(sender) => sender.track().await,
                            None => None,
                        };
                        match (desc_msid, sender_track) {
                            (Some(desc_msid), Some(track)) => {
                                if desc_msid
                                    != format!("{} {}", track.stream_id(), track.id())
                                {
                                    return true;
                                }
                            }
                            _ => return true,
                        }
                    }

                    match local_desc.sdp_type {
                        SdpType::Offer => {
                            let current_remote = {
                                let current = self.current_remote_description.lock().await;
                                current.clone()
                            };
                            if let Some(remote_desc) = &current_remote {
                                match get_by_mid(&mid, remote_desc) {
                                    Some(rm) => {
                                        if get_peer_direction(m) != t_direction
                                            && get_peer_direction(rm) != t_direction.reverse()
                                        {
                                            return true;
                                        }
                                    }
                                    None => return true,
                                }
                            }
                        }
                        SdpType::Answer => {
                            if m.attribute(t_direction.to_string().as_str()).is_none() {
                                return true;
                            }
                        }
                        _ => {}
                    }
                }
            }

            if t.stopped.load(Ordering::SeqCst) && !mid.is_empty() {
                let current_remote = {
                    let current = self.current_remote_description.lock().await;
                    current.clone()
                };
                if let Some(remote_desc) = &current_remote {
                    if get_by_mid(&mid, local_desc).is_some()
                        || get_by_mid(&mid, remote_desc).is_some()
                    {
                        return true;
                    }
                }
            }
        }

        false
    }

    // ---------------------------------------------------------------
    // transceiver management
    // ---------------------------------------------------------------

    pub(super) async fn add_transceiver_from_kind(
        self: &Arc<Self>,
        kind: RtpCodecKind,
        init: &[RtpTransceiverInit],
    ) -> Result<Arc<RtpTransceiver>> {
        if self.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let direction = match init.len() {
            0 => RtpTransceiverDirection::Sendrecv,
            1 => init[0].direction,
            _ => return Err(Error::ErrAddTransceiverFromKindOnlyAcceptsOne),
        };

        let t = match direction {
            RtpTransceiverDirection::Sendrecv | RtpTransceiverDirection::Sendonly => {
                let codecs = self.media_engine.get_codecs_by_kind(kind).await;
                if codecs.is_empty() {
                    return Err(Error::ErrNoCodecsAvailable);
                }
                let track = Arc::new(TrackLocalStaticSample::new(
                    codecs[0].capability.clone(),
                    math_rand_alpha(16),
                    math_rand_alpha(16),
                ));
                self.new_transceiver_from_track(direction, track).await?
            }
            RtpTransceiverDirection::Recvonly => {
                let interceptor = self
                    .interceptor
                    .upgrade()
                    .ok_or(Error::ErrInterceptorNotBind)?;
                let receiver = Arc::new(RtpReceiver::new(
                    self.setting_engine.get_receive_mtu(),
                    kind,
                    Arc::clone(&self.dtls_transport),
                    Arc::clone(&self.media_engine),
                    interceptor,
                ));

                RtpTransceiver::new(
                    Some(receiver),
                    None,
                    RtpTransceiverDirection::Recvonly,
                    kind,
                    vec![],
                    Arc::clone(&self.media_engine),
                    Some(Box::new(self.make_negotiation_needed_trigger())),
                )
                .await
            }
            _ => return Err(Error::ErrAddTransceiverFromKindSupport),
        };

        self.add_rtp_transceiver(Arc::clone(&t)).await;
        Ok(t)
    }

    pub(super) async fn new_transceiver_from_track(
        self: &Arc<Self>,
        direction: RtpTransceiverDirection,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> Result<Arc<RtpTransceiver>> {
        let interceptor = self
            .interceptor
            .upgrade()
            .ok_or(Error::ErrInterceptorNotBind)?;

        let (r, s) = match direction {
            RtpTransceiverDirection::Sendrecv => {
                let r = Some(Arc::new(RtpReceiver::new(
                    self.setting_engine.get_receive_mtu(),
                    track.kind(),
                    Arc::clone(&self.dtls_transport),
                    Arc::clone(&self.media_engine),
                    Arc::clone(&interceptor),
                )));
                let s = Some(Arc::new(
                    RtpSender::new(
                        self.setting_engine.get_receive_mtu(),
                        Some(Arc::clone(&track)),
                        Arc::clone(&self.dtls_transport),
                        Arc::clone(&self.media_engine),
                        Arc::clone(&interceptor),
                    )
                    .await,
                ));
                (r, s)
            }
            RtpTransceiverDirection::Sendonly => {
                let s = Some(Arc::new(
                    RtpSender::new(
                        self.setting_engine.get_receive_mtu(),
                        Some(Arc::clone(&track)),
                        Arc::clone(&self.dtls_transport),
                        Arc::clone(&self.media_engine),
                        Arc::clone(&interceptor),
                    )
                    .await,
                ));
                (None, s)
            }
            _ => return Err(Error::ErrAddTransceiverFromTrackSupport),
        };

        Ok(RtpTransceiver::new(
            r,
            s,
            direction,
            track.kind(),
            vec![],
            Arc::clone(&self.media_engine),
            Some(Box::new(self.make_negotiation_needed_trigger())),
        )
        .await)
    }

    pub(super) async fn add_rtp_transceiver(self: &Arc<Self>, t: Arc<RtpTransceiver>) {
        {
            let mut transceivers = self.rtp_transceivers.lock().await;
            transceivers.push(t);
        }
        self.trigger_negotiation_needed().await;
    }

    pub(crate) fn make_negotiation_needed_trigger(
        self: &Arc<Self>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + Sync>>
           + Send
           + Sync {
        let weak = Arc::downgrade(self);
        move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.trigger_negotiation_needed().await;
                }
            })
        }
    }

    // ---------------------------------------------------------------
    // transport startup
    // ---------------------------------------------------------------

    /// Starts ICE and DTLS against the remote parameters; runs inside
    /// the operations queue.
    pub(super) async fn start_transports(
        self: &Arc<Self>,
        ice_role: IceRole,
        dtls_role: DtlsRole,
        remote_ufrag: String,
        remote_pwd: String,
        fingerprint: String,
        fingerprint_hash: String,
    ) {
        if let Err(err) = self
            .ice_transport
            .start(
                &IceParameters {
                    username_fragment: remote_ufrag,
                    password: remote_pwd,
                    ice_lite: false,
                },
                Some(ice_role),
            )
            .await
        {
            log::warn!("failed to start ICE: {err}");
            return;
        }

        let result = self
            .dtls_transport
            .start(DtlsParameters {
                role: dtls_role,
                fingerprints: vec![DtlsFingerprint {
                    algorithm: fingerprint_hash,
                    value: fingerprint,
                }],
            })
            .await;

        update_connection_state(
            &self.on_peer_connection_state_change_handler,
            &self.is_closed,
            &self.peer_connection_state,
            self.ice_connection_state.load(Ordering::SeqCst).into(),
            self.dtls_transport.state(),
        )
        .await;

        if let Err(err) = result {
            log::warn!("failed to start DTLS: {err}");
        }
    }

    /// Brings up media and data for a freshly applied remote
    /// description.
    pub(super) async fn start_rtp(
        self: &Arc<Self>,
        is_renegotiation: bool,
        remote_desc: Arc<SessionDescription>,
    ) -> Result<()> {
        let mut track_details = match &remote_desc.parsed {
            Some(parsed) => track_details_from_sdp(parsed),
            None => vec![],
        };

        let current_transceivers = {
            let transceivers = self.rtp_transceivers.lock().await;
            transceivers.clone()
        };

        if !is_renegotiation {
            self.undeclared_media_processor();
        }

        self.start_rtp_receivers(&mut track_details, &current_transceivers)
            .await?;

        if let Some(parsed) = &remote_desc.parsed {
            if have_application_media_section(parsed) {
                self.start_sctp(extract_sctp_max_message_size(parsed)).await;
            }
        }

        Ok(())
    }

    /// Opens the inbound streams every declared remote track needs and
    /// dispatches on_track once media actually arrives.
    async fn start_rtp_receivers(
        self: &Arc<Self>,
        incoming_tracks: &mut Vec<TrackDetails>,
        local_transceivers: &[Arc<RtpTransceiver>],
    ) -> Result<()> {
        // Skip sources a receiver already owns.
        let mut filtered_tracks = incoming_tracks.clone();
        for incoming_track in incoming_tracks.iter() {
            for t in local_transceivers {
                if let Some(receiver) = t.receiver().await {
                    for track in receiver.tracks().await {
                        if track.ssrc() == incoming_track.ssrc {
                            filter_track_with_ssrc(&mut filtered_tracks, incoming_track.ssrc);
                        }
                    }
                }
            }
        }

        for incoming_track in filtered_tracks.iter() {
            for t in local_transceivers {
                if t.mid().await != incoming_track.mid {
                    continue;
                }
                if incoming_track.kind != t.kind()
                    || (t.direction() != RtpTransceiverDirection::Recvonly
                        && t.direction() != RtpTransceiverDirection::Sendrecv)
                {
                    continue;
                }

                if let Some(receiver) = t.receiver().await {
                    if receiver.have_received().await {
                        continue;
                    }
                    self.start_receiver(incoming_track, receiver).await;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn start_receiver(
        self: &Arc<Self>,
        incoming: &TrackDetails,
        receiver: Arc<RtpReceiver>,
    ) {
        if let Err(err) = receiver
            .receive(&RtpReceiveParameters {
                encodings: vec![RtpCodingParameters {
                    ssrc: incoming.ssrc,
                    ..Default::default()
                }],
            })
            .await
        {
            log::warn!("RtpReceiver receive failed: {err}");
            return;
        }

        if let Some(track) = receiver.track().await {
            track.set_id(incoming.id.clone()).await;
            track.set_stream_id(incoming.stream_id.clone()).await;
        }

        for track in receiver.tracks().await {
            if track.ssrc() == 0 {
                continue;
            }

            let receiver = Arc::clone(&receiver);
            let on_track_handler = Arc::clone(&self.on_track_handler);
            tokio::spawn(async move {
                let mut b = vec![0u8; track.receive_mtu()];
                let pkt = match track.peek(&mut b).await {
                    Ok((pkt, _)) => pkt,
                    Err(err) => {
                        log::warn!(
                            "could not determine PayloadType for SSRC {} ({err})",
                            track.ssrc()
                        );
                        return;
                    }
                };

                if let Err(err) = track.check_and_update_track(&pkt).await {
                    log::warn!(
                        "failed to set codec settings for track SSRC {} ({err})",
                        track.ssrc()
                    );
                    return;
                }

                do_track(on_track_handler, track, receiver).await;
            });
        }
    }

    /// Fallback for RTP arriving on SSRCs no a=ssrc line declared.
    /// With exactly one media section the source is unambiguous;
    /// anything else is logged and dropped (simulcast probing is out
    /// of scope).
    fn undeclared_media_processor(self: &Arc<Self>) {
        let dtls_transport = Arc::clone(&self.dtls_transport);
        let is_closed = Arc::clone(&self.is_closed);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let srtp_session = match dtls_transport.get_srtp_session().await {
                    Some(s) => s,
                    None => {
                        // Wait for the handshake to finish.
                        let ready = {
                            let mut rx = dtls_transport.srtp_ready_rx.lock().await;
                            match &mut *rx {
                                Some(rx) => {
                                    rx.recv().await;
                                    true
                                }
                                None => true,
                            }
                        };
                        if !ready || is_closed.load(Ordering::SeqCst) {
                            return;
                        }
                        continue;
                    }
                };

                let stream = match srtp_session.accept().await {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::info!("undeclared media reader done: {err}");
                        return;
                    }
                };

                if is_closed.load(Ordering::SeqCst) {
                    let _ = stream.close().await;
                    return;
                }

                let ssrc = stream.get_ssrc();
                if let Err(err) = inner.handle_undeclared_ssrc(ssrc).await {
                    log::warn!("incoming unhandled RTP ssrc({ssrc}), on_track will not fire: {err}");
                    let _ = stream.close().await;
                }
            }
        });

        let dtls_transport = Arc::clone(&self.dtls_transport);
        tokio::spawn(async move {
            loop {
                let srtcp_session = match dtls_transport.get_srtcp_session().await {
                    Some(s) => s,
                    None => return,
                };
                match srtcp_session.accept().await {
                    Ok(stream) => {
                        log::warn!(
                            "incoming unhandled RTCP ssrc({}), on_track will not fire",
                            stream.get_ssrc()
                        );
                    }
                    Err(err) => {
                        log::info!("undeclared RTCP reader done: {err}");
                        return;
                    }
                }
            }
        });
    }

    async fn handle_undeclared_ssrc(self: &Arc<Self>, ssrc: SSRC) -> Result<()> {
        let remote_description = match self.remote_description().await {
            Some(r) => r,
            None => return Err(Error::ErrNoRemoteDescription),
        };
        let parsed = match &remote_description.parsed {
            Some(parsed) => parsed,
            None => return Err(Error::ErrNoRemoteDescription),
        };

        // Undeclared SSRCs are only acceptable when the description
        // has exactly one media section without explicit sources.
        if parsed.media_descriptions.len() != 1 {
            return Err(Error::ErrSingleMediaSectionHasExplicitSSRC);
        }
        let only_media_section = &parsed.media_descriptions[0];

        let mut stream_id = "";
        let mut id = "";
        for a in &only_media_section.attributes {
            match a.key.as_str() {
                ::sdp::description::session::ATTR_KEY_MSID => {
                    if let Some(value) = &a.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        if split.len() == 2 {
                            stream_id = split[0];
                            id = split[1];
                        }
                    }
                }
                ::sdp::description::session::ATTR_KEY_SSRC => {
                    return Err(Error::ErrSingleMediaSectionHasExplicitSSRC);
                }
                _ => {}
            }
        }

        let mut incoming = TrackDetails {
            ssrc,
            kind: RtpCodecKind::Video,
            stream_id: stream_id.to_owned(),
            id: id.to_owned(),
            ..Default::default()
        };
        if only_media_section.media_name.media == RtpCodecKind::Audio.to_string() {
            incoming.kind = RtpCodecKind::Audio;
        }

        let t = self
            .add_transceiver_from_kind(
                incoming.kind,
                &[RtpTransceiverInit {
                    direction: RtpTransceiverDirection::Sendrecv,
                    send_encodings: vec![],
                }],
            )
            .await?;

        if let Some(receiver) = t.receiver().await {
            self.start_receiver(&incoming, receiver).await;
        }
        Ok(())
    }

    /// Starts every sender negotiation has described.
    pub(super) async fn start_rtp_senders(&self) -> Result<()> {
        let transceivers = self.rtp_transceivers.lock().await;
        for t in &*transceivers {
            if let Some(sender) = t.sender().await {
                if sender.is_negotiated() && !sender.has_sent().await {
                    let params = sender.get_parameters().await;
                    sender.send(&params).await?;
                }
            }
        }
        Ok(())
    }

    /// Opens the SCTP association and dials every waiting channel.
    async fn start_sctp(self: &Arc<Self>, remote_max_message_size: u32) {
        if let Err(err) = self
            .sctp_transport
            .start(SctpTransportCapabilities {
                max_message_size: remote_max_message_size,
            })
            .await
        {
            log::warn!("failed to start SCTP: {err}");
            if let Err(err) = self.sctp_transport.stop().await {
                log::warn!("failed to stop SCTP after failed start: {err}");
            }
            return;
        }

        let data_channels = self.sctp_transport.connecting_data_channels().await;
        let mut opened = 0u32;
        for d in data_channels {
            if d.ready_state() == DataChannelState::Connecting {
                if let Err(err) = d.open(Arc::clone(&self.sctp_transport)).await {
                    log::warn!("failed to open data channel: {err}");
                    continue;
                }
                opened += 1;
            }
        }
        self.sctp_transport
            .data_channels_opened
            .fetch_add(opened, Ordering::SeqCst);
    }

    // ---------------------------------------------------------------
    // SDP generation
    // ---------------------------------------------------------------

    /// Builds an offer with no remote state to mirror; the first
    /// offer of a session.
    pub(super) async fn generate_unmatched_sdp(
        &self,
        local_transceivers: Vec<Arc<RtpTransceiver>>,
    ) -> Result<::sdp::description::session::SessionDescription> {
        let d = ::sdp::description::session::SessionDescription::new_jsep_session_description(
            false,
        );

        let ice_params = self.ice_gatherer.get_local_parameters().await?;
        let candidates = self.ice_gatherer.get_local_candidates().await?;

        let mut media_sections = vec![];

        for t in &local_transceivers {
            if t.stopped.load(Ordering::SeqCst) {
                continue;
            }

            if let Some(sender) = t.sender().await {
                sender.set_negotiated();
            }
            media_sections.push(MediaSection {
                id: t.mid().await,
                transceivers: vec![Arc::clone(t)],
                ..Default::default()
            });
        }

        if self
            .sctp_transport
            .data_channels_requested
            .load(Ordering::SeqCst)
            != 0
        {
            media_sections.push(MediaSection {
                id: format!("{}", media_sections.len()),
                data: true,
                ..Default::default()
            });
        }

        let dtls_fingerprints =
            if let Some(cert) = self.dtls_transport.certificates.first() {
                cert.get_fingerprints()
            } else {
                return Err(Error::ErrNoCertificate);
            };

        let params = PopulateSdpParams {
            is_plan_b: false,
            media_description_fingerprint: self.setting_engine.sdp_media_level_fingerprints,
            is_icelite: self.setting_engine.candidates.ice_lite,
            connection_role: DEFAULT_DTLS_ROLE_OFFER.to_connection_role(),
            ice_gathering_state: self.ice_gathering_state(),
            max_message_size: self.sctp_transport.advertised_max_message_size(),
        };
        populate_sdp(
            d,
            &dtls_fingerprints,
            &self.media_engine,
            &candidates,
            &ice_params,
            &media_sections,
            params,
        )
        .await
    }

    /// Builds a description mirroring the remote's m-section order;
    /// used for answers and re-offers.
    pub(super) async fn generate_matched_sdp(
        self: &Arc<Self>,
        mut local_transceivers: Vec<Arc<RtpTransceiver>>,
        include_unmatched: bool,
        connection_role: ::sdp::util::ConnectionRole,
    ) -> Result<::sdp::description::session::SessionDescription> {
        let d = ::sdp::description::session::SessionDescription::new_jsep_session_description(
            false,
        );

        let ice_params = self.ice_gatherer.get_local_parameters().await?;
        let candidates = self.ice_gatherer.get_local_candidates().await?;

        let remote_description = self.remote_description().await;
        let detected_plan_b = description_is_plan_b(remote_description.as_ref())?;
        let mut media_sections = vec![];
        let mut already_have_application_media_section = false;

        if let Some(remote) = remote_description.as_ref() {
            if let Some(parsed) = &remote.parsed {
                for media in &parsed.media_descriptions {
                    let mid_value = match get_mid_value(media) {
                        Some(mid) if !mid.is_empty() => mid,
                        _ => return Err(Error::ErrRemoteDescriptionWithoutMidValue),
                    };

                    if media.media_name.media == MEDIA_SECTION_APPLICATION {
                        media_sections.push(MediaSection {
                            id: mid_value.to_owned(),
                            data: true,
                            ..Default::default()
                        });
                        already_have_application_media_section = true;
                        continue;
                    }

                    let kind = RtpCodecKind::from(media.media_name.media.as_str());
                    let direction = get_peer_direction(media);
                    if kind == RtpCodecKind::Unspecified
                        || direction == RtpTransceiverDirection::Unspecified
                    {
                        continue;
                    }

                    if detected_plan_b {
                        // Answering a plan-b offer: pool every local
                        // transceiver of this kind into the section.
                        let mut media_transceivers = vec![];
                        while let Some(t) =
                            satisfy_type_and_direction(kind, direction, &mut local_transceivers)
                                .await
                        {
                            if let Some(sender) = t.sender().await {
                                sender.set_negotiated();
                            }
                            media_transceivers.push(t);
                        }
                        if media_transceivers.is_empty() {
                            let t = RtpTransceiver::new(
                                None,
                                None,
                                RtpTransceiverDirection::Inactive,
                                kind,
                                vec![],
                                Arc::clone(&self.media_engine),
                                Some(Box::new(self.make_negotiation_needed_trigger())),
                            )
                            .await;
                            media_transceivers.push(t);
                        }
                        media_sections.push(MediaSection {
                            id: mid_value.to_owned(),
                            transceivers: media_transceivers,
                            ..Default::default()
                        });
                    } else if let Some(t) =
                        find_by_mid(mid_value, &mut local_transceivers).await
                    {
                        if let Some(sender) = t.sender().await {
                            sender.set_negotiated();
                        }
                        media_sections.push(MediaSection {
                            id: mid_value.to_owned(),
                            transceivers: vec![t],
                            offered_direction: (!include_unmatched).then_some(direction),
                            ..Default::default()
                        });
                    } else {
                        return Err(Error::ErrTransceiverMidUnmatched);
                    }
                }
            }
        }

        // A re-offer also describes local transceivers the remote has
        // not seen yet.
        if include_unmatched {
            if !detected_plan_b {
                for t in &local_transceivers {
                    if let Some(sender) = t.sender().await {
                        sender.set_negotiated();
                    }
                    media_sections.push(MediaSection {
                        id: t.mid().await,
                        transceivers: vec![Arc::clone(t)],
                        ..Default::default()
                    });
                }
            }

            if self
                .sctp_transport
                .data_channels_requested
                .load(Ordering::SeqCst)
                != 0
                && !already_have_application_media_section
            {
                let id = if detected_plan_b {
                    "data".to_owned()
                } else {
                    format!("{}", media_sections.len())
                };
                media_sections.push(MediaSection {
                    id,
                    data: true,
                    ..Default::default()
                });
            }
        }

        let dtls_fingerprints =
            if let Some(cert) = self.dtls_transport.certificates.first() {
                cert.get_fingerprints()
            } else {
                return Err(Error::ErrNoCertificate);
            };

        let params = PopulateSdpParams {
            is_plan_b: detected_plan_b,
            media_description_fingerprint: self.setting_engine.sdp_media_level_fingerprints,
            is_icelite: self.setting_engine.candidates.ice_lite,
            connection_role,
            ice_gathering_state: self.ice_gathering_state(),
            max_message_size: self.sctp_transport.advertised_max_message_size(),
        };
        populate_sdp(
            d,
            &dtls_fingerprints,
            &self.media_engine,
            &candidates,
            &ice_params,
            &media_sections,
            params,
        )
        .await
    }

    /// True when local transceivers diverged from the description
    /// while it was being generated.
    pub(super) async fn has_local_description_changed(&self, desc: &SessionDescription) -> bool {
        let transceivers = self.rtp_transceivers.lock().await;
        for t in &*transceivers {
            let mid = t.mid().await;
            match get_by_mid(&mid, desc) {
                Some(m) => {
                    if get_peer_direction(m) != t.direction() {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }
}

// -------------------------------------------------------------------
// state plumbing shared by callbacks and the public surface
// -------------------------------------------------------------------

pub(super) async fn do_track(
    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    track: Arc<TrackRemote>,
    receiver: Arc<RtpReceiver>,
) {
    log::debug!("got new track {}", track.ssrc());

    if let Some(handler) = &*on_track_handler.load() {
        let mut f = handler.lock().await;
        f(track, receiver).await;
    } else {
        log::warn!("on_track unset, unable to handle incoming media streams");
    }
}

pub(super) async fn do_ice_connection_state_change(
    handler: &Arc<ArcSwapOption<Mutex<OnIceConnectionStateChangeHdlrFn>>>,
    ice_connection_state: &Arc<AtomicU8>,
    cs: IceConnectionState,
) {
    // No callback for a state we are already in.
    if ice_connection_state.swap(cs as u8, Ordering::SeqCst) == cs as u8 {
        return;
    }

    log::info!("ICE connection state changed: {cs}");
    if let Some(handler) = &*handler.load() {
        let mut f = handler.lock().await;
        f(cs).await;
    }
}

/// Derives the aggregate connection state from its parts and fires the
/// callback exactly once per distinct value
/// (<https://www.w3.org/TR/webrtc/#rtcpeerconnectionstate-enum>).
pub(super) async fn update_connection_state(
    on_peer_connection_state_change_handler: &Arc<
        ArcSwapOption<Mutex<OnPeerConnectionStateChangeHdlrFn>>,
    >,
    is_closed: &Arc<AtomicBool>,
    peer_connection_state: &Arc<AtomicU8>,
    ice_connection_state: IceConnectionState,
    dtls_transport_state: crate::dtls_transport::dtls_transport_state::DtlsTransportState,
) {
    use crate::dtls_transport::dtls_transport_state::DtlsTransportState;

    let connection_state = if is_closed.load(Ordering::SeqCst) {
        PeerConnectionState::Closed
    } else if ice_connection_state == IceConnectionState::Failed
        || dtls_transport_state == DtlsTransportState::Failed
    {
        PeerConnectionState::Failed
    } else if ice_connection_state == IceConnectionState::Disconnected {
        PeerConnectionState::Disconnected
    } else if (ice_connection_state == IceConnectionState::Connected
        || ice_connection_state == IceConnectionState::Completed)
        && dtls_transport_state == DtlsTransportState::Connected
    {
        PeerConnectionState::Connected
    } else if ice_connection_state == IceConnectionState::Checking
        || dtls_transport_state == DtlsTransportState::Connecting
    {
        PeerConnectionState::Connecting
    } else {
        PeerConnectionState::New
    };

    if peer_connection_state.swap(connection_state as u8, Ordering::SeqCst)
        == connection_state as u8
    {
        return;
    }

    log::info!("peer connection state changed: {connection_state}");
    if let Some(handler) = &*on_peer_connection_state_change_handler.load() {
        let mut f = handler.lock().await;
        f(connection_state).await;
    }
}

#[async_trait]
impl RTCPWriter for PeerConnectionInner {
    async fn write(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
        _a: &Attributes,
    ) -> std::result::Result<usize, interceptor::Error> {
        Ok(self.dtls_transport.write_rtcp(pkts).await?)
    }
}
