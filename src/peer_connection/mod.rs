pub mod configuration;
pub(crate) mod inner;
pub mod offer_answer_options;
pub(crate) mod operation;
pub mod peer_connection_state;
pub mod policy;
pub mod sdp;
pub mod signaling_state;

#[cfg(test)]
mod peer_connection_test;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ::sdp::description::session::ATTR_KEY_ICELITE;
use ::sdp::util::ConnectionRole;
use ice::candidate::candidate_base::unmarshal_candidate;
use ice::candidate::Candidate;
use interceptor::{Attributes, Interceptor, RTCPWriter};
use rcgen::KeyPair;
use tokio::sync::{mpsc, Mutex};

use crate::api::Api;
use crate::certificate::Certificate;
use crate::data_channel::data_channel_init::DataChannelInit;
use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::DataChannel;
use crate::dtls_transport::dtls_role::{
    DtlsRole, DEFAULT_DTLS_ROLE_ANSWER, DEFAULT_DTLS_ROLE_OFFER,
};
use crate::error::{flatten_errs, Error, Result};
use crate::ice_transport::ice_candidate::{IceCandidate, IceCandidateInit};
use crate::ice_transport::ice_connection_state::IceConnectionState;
use crate::ice_transport::ice_gatherer::{
    OnIceGathererStateChangeHdlrFn, OnLocalCandidateHdlrFn,
};
use crate::ice_transport::ice_gatherer_state::IceGathererState;
use crate::ice_transport::ice_gathering_state::IceGatheringState;
use crate::ice_transport::ice_role::IceRole;
use crate::peer_connection::configuration::Configuration;
use crate::peer_connection::inner::{update_connection_state, PeerConnectionInner};
use crate::peer_connection::offer_answer_options::{AnswerOptions, OfferOptions};
use crate::peer_connection::operation::Operation;
use crate::peer_connection::peer_connection_state::PeerConnectionState;
use crate::peer_connection::sdp::sdp_type::SdpType;
use crate::peer_connection::sdp::session_description::SessionDescription;
use crate::peer_connection::sdp::*;
use crate::peer_connection::signaling_state::{
    check_next_signaling_state, SignalingState, StateChangeOp,
};
use crate::rtp_transceiver::rtp_codec::RtpCodecKind;
use crate::rtp_transceiver::rtp_receiver::RtpReceiver;
use crate::rtp_transceiver::rtp_sender::RtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::{RtpTransceiver, RtpTransceiverInit};
use crate::sctp_transport::sctp_transport_state::SctpTransportState;
use crate::sctp_transport::SctpTransport;
use crate::track::track_local::TrackLocal;
use crate::track::track_remote::TrackRemote;

pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";

pub type OnSignalingStateChangeHdlrFn = Box<
    dyn (FnMut(SignalingState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnIceConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(IceConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnPeerConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(PeerConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<DataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnTrackHdlrFn = Box<
    dyn (FnMut(
            Arc<TrackRemote>,
            Arc<RtpReceiver>,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnNegotiationNeededHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// PeerConnection negotiates and runs one secure multiplexed transport
/// to another peer: the JSEP state machine on top of ICE, DTLS, SCTP
/// and SRTP.
pub struct PeerConnection {
    configuration: Configuration,

    interceptor: Arc<dyn Interceptor + Send + Sync>,
    interceptor_rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,

    pub(crate) inner: Arc<PeerConnectionInner>,
}

impl PeerConnection {
    /// Builds a connection from an Api's engines; called through
    /// `Api::new_peer_connection`.
    pub(crate) async fn new(api: &Api, mut configuration: Configuration) -> Result<Self> {
        PeerConnection::init_configuration(&mut configuration)?;

        let interceptor = api.interceptor_registry.build("")?;
        let (inner, configuration) =
            PeerConnectionInner::new(api, Arc::downgrade(&interceptor), configuration).await?;

        let inner_rtcp_writer = Arc::clone(&inner) as Arc<dyn RTCPWriter + Send + Sync>;
        let interceptor_rtcp_writer = interceptor.bind_rtcp_writer(inner_rtcp_writer).await;

        Ok(PeerConnection {
            configuration,
            interceptor,
            interceptor_rtcp_writer,
            inner,
        })
    }

    /// Validates the configuration and fills in a generated identity
    /// when the application brought none.
    fn init_configuration(configuration: &mut Configuration) -> Result<()> {
        for server in &configuration.ice_servers {
            server.validate()?;
        }

        if configuration.certificates.is_empty() {
            let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
            configuration.certificates = vec![Certificate::from_key_pair(kp)?];
        } else {
            let now = std::time::SystemTime::now();
            for cert in &configuration.certificates {
                cert.expires()
                    .duration_since(now)
                    .map_err(|_| Error::ErrCertificateExpired)?;
            }
        }

        Ok(())
    }

    /// Sets the handler fired on every signaling state transition.
    pub fn on_signaling_state_change(&self, f: OnSignalingStateChangeHdlrFn) {
        self.inner
            .on_signaling_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    async fn do_signaling_state_change(&self, new_state: SignalingState) {
        log::info!("signaling state changed to {new_state}");
        if let Some(handler) = &*self.inner.on_signaling_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(new_state).await;
        }
    }

    /// Sets the handler fired for every data channel the remote opens.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.inner
            .on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler fired when the set of described m-sections no
    /// longer matches the current local description.
    pub fn on_negotiation_needed(&self, f: OnNegotiationNeededHdlrFn) {
        self.inner
            .on_negotiation_needed_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler fired per gathered candidate; a `None`
    /// candidate ends the trickle.
    pub fn on_ice_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.inner.ice_gatherer.on_local_candidate(f)
    }

    /// Sets the handler fired when candidate gathering changes state.
    pub fn on_ice_gathering_state_change(&self, f: OnIceGathererStateChangeHdlrFn) {
        self.inner.ice_gatherer.on_state_change(f)
    }

    /// Sets the handler fired when a remote track starts flowing.
    pub fn on_track(&self, f: OnTrackHdlrFn) {
        self.inner
            .on_track_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler fired on ICE connection state changes.
    pub fn on_ice_connection_state_change(&self, f: OnIceConnectionStateChangeHdlrFn) {
        self.inner
            .on_ice_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler fired on aggregate connection state changes.
    pub fn on_peer_connection_state_change(&self, f: OnPeerConnectionStateChangeHdlrFn) {
        self.inner
            .on_peer_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn get_configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Generates an offer describing the local transceivers and
    /// pending data channels
    /// (<https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createoffer>).
    pub async fn create_offer(
        &self,
        options: Option<OfferOptions>,
    ) -> Result<SessionDescription> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        if let Some(options) = options {
            if options.ice_restart {
                self.inner.ice_transport.restart().await?;
            }
        }

        // Local media may mutate while the offer is generated; retry
        // until the description settles.
        let mut count = 0;
        let offer = loop {
            let current_transceivers = {
                let transceivers = self.inner.rtp_transceivers.lock().await;
                transceivers.clone()
            };

            // Assign fresh numeric mids, accounting for any greater
            // mid the remote introduced.
            {
                let current_remote_description =
                    self.inner.current_remote_description.lock().await;
                if let Some(d) = &*current_remote_description {
                    if let Some(parsed) = &d.parsed {
                        for media in &parsed.media_descriptions {
                            if let Some(mid) = get_mid_value(media) {
                                if let Ok(numeric_mid) = mid.parse::<isize>() {
                                    if numeric_mid
                                        > self.inner.greater_mid.load(Ordering::SeqCst)
                                    {
                                        self.inner
                                            .greater_mid
                                            .store(numeric_mid, Ordering::SeqCst);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            for t in &current_transceivers {
                if !t.mid().await.is_empty() {
                    continue;
                }
                let greater_mid = self.inner.greater_mid.fetch_add(1, Ordering::SeqCst);
                t.set_mid(format!("{}", greater_mid + 1)).await?;
            }

            let current_remote_description_is_none = {
                let current_remote_description =
                    self.inner.current_remote_description.lock().await;
                current_remote_description.is_none()
            };

            let mut d = if current_remote_description_is_none {
                self.inner
                    .generate_unmatched_sdp(current_transceivers)
                    .await?
            } else {
                self.inner
                    .generate_matched_sdp(
                        current_transceivers,
                        true, /* include unmatched */
                        DEFAULT_DTLS_ROLE_OFFER.to_connection_role(),
                    )
                    .await?
            };

            {
                let mut sdp_origin = self.inner.sdp_origin.lock().await;
                update_sdp_origin(&mut sdp_origin, &mut d);
            }
            let sdp = d.marshal();

            let offer = SessionDescription {
                sdp_type: SdpType::Offer,
                sdp,
                parsed: Some(d),
            };

            if !self.inner.has_local_description_changed(&offer).await {
                break offer;
            }
            count += 1;
            if count >= 128 {
                return Err(Error::ErrExcessiveRetries);
            }
        };

        {
            let mut last_offer = self.inner.last_offer.lock().await;
            *last_offer = offer.sdp.clone();
        }
        Ok(offer)
    }

    /// Generates an answer to the pending remote offer.
    pub async fn create_answer(
        &self,
        _options: Option<AnswerOptions>,
    ) -> Result<SessionDescription> {
        if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        } else if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        } else if self.signaling_state() != SignalingState::HaveRemoteOffer
            && self.signaling_state() != SignalingState::HaveLocalPranswer
        {
            return Err(Error::ErrIncorrectSignalingState);
        }

        let mut connection_role = self
            .inner
            .setting_engine
            .answering_dtls_role
            .to_connection_role();
        if connection_role == ConnectionRole::Unspecified {
            connection_role = DEFAULT_DTLS_ROLE_ANSWER.to_connection_role();
        }

        let local_transceivers = self.get_transceivers().await;
        let mut d = self
            .inner
            .generate_matched_sdp(
                local_transceivers,
                false, /* include unmatched */
                connection_role,
            )
            .await?;

        {
            let mut sdp_origin = self.inner.sdp_origin.lock().await;
            update_sdp_origin(&mut sdp_origin, &mut d);
        }
        let sdp = d.marshal();

        let answer = SessionDescription {
            sdp_type: SdpType::Answer,
            sdp,
            parsed: Some(d),
        };

        {
            let mut last_answer = self.inner.last_answer.lock().await;
            *last_answer = answer.sdp.clone();
        }
        Ok(answer)
    }

    /// 4.4.1.6 Set the SessionDescription: runs the JSEP transition
    /// table and moves pending/current descriptions accordingly.
    pub(crate) async fn set_description(
        &self,
        sd: &SessionDescription,
        op: StateChangeOp,
    ) -> Result<()> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        } else if sd.sdp_type == SdpType::Unspecified {
            return Err(Error::ErrSessionDescriptionInvalidType);
        }

        let cur = self.signaling_state();

        let next_state = match op {
            StateChangeOp::SetLocal => match sd.sdp_type {
                SdpType::Offer => {
                    let matches_last_offer = {
                        let last_offer = self.inner.last_offer.lock().await;
                        sd.sdp == *last_offer
                    };
                    if !matches_last_offer {
                        Err(Error::ErrSDPDoesNotMatchOffer)
                    } else {
                        let next = check_next_signaling_state(
                            cur,
                            SignalingState::HaveLocalOffer,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        );
                        if next.is_ok() {
                            let mut pending = self.inner.pending_local_description.lock().await;
                            *pending = Some(sd.clone());
                        }
                        next
                    }
                }
                SdpType::Answer => {
                    let matches_last_answer = {
                        let last_answer = self.inner.last_answer.lock().await;
                        sd.sdp == *last_answer
                    };
                    if !matches_last_answer {
                        Err(Error::ErrSDPDoesNotMatchAnswer)
                    } else {
                        let next = check_next_signaling_state(
                            cur,
                            SignalingState::Stable,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        );
                        if next.is_ok() {
                            let pending_remote = {
                                let mut pending =
                                    self.inner.pending_remote_description.lock().await;
                                pending.take()
                            };
                            {
                                let mut pending =
                                    self.inner.pending_local_description.lock().await;
                                pending.take();
                            }
                            {
                                let mut current =
                                    self.inner.current_local_description.lock().await;
                                *current = Some(sd.clone());
                            }
                            {
                                let mut current =
                                    self.inner.current_remote_description.lock().await;
                                *current = pending_remote;
                            }
                        }
                        next
                    }
                }
                SdpType::Rollback => {
                    let next = check_next_signaling_state(
                        cur,
                        SignalingState::Stable,
                        StateChangeOp::SetLocal,
                        sd.sdp_type,
                    );
                    if next.is_ok() {
                        let mut pending = self.inner.pending_local_description.lock().await;
                        *pending = None;
                    }
                    next
                }
                SdpType::Pranswer => {
                    let matches_last_answer = {
                        let last_answer = self.inner.last_answer.lock().await;
                        sd.sdp == *last_answer
                    };
                    if !matches_last_answer {
                        Err(Error::ErrSDPDoesNotMatchAnswer)
                    } else {
                        let next = check_next_signaling_state(
                            cur,
                            SignalingState::HaveLocalPranswer,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        );
                        if next.is_ok() {
                            let mut pending = self.inner.pending_local_description.lock().await;
                            *pending = Some(sd.clone());
                        }
                        next
                    }
                }
                _ => Err(Error::ErrSessionDescriptionInvalidType),
            },
            StateChangeOp::SetRemote => match sd.sdp_type {
                SdpType::Offer => {
                    let next = check_next_signaling_state(
                        cur,
                        SignalingState::HaveRemoteOffer,
                        StateChangeOp::SetRemote,
                        sd.sdp_type,
                    );
                    if next.is_ok() {
                        let mut pending = self.inner.pending_remote_description.lock().await;
                        *pending = Some(sd.clone());
                    }
                    next
                }
                SdpType::Answer => {
                    let next = check_next_signaling_state(
                        cur,
                        SignalingState::Stable,
                        StateChangeOp::SetRemote,
                        sd.sdp_type,
                    );
                    if next.is_ok() {
                        let pending_local = {
                            let mut pending = self.inner.pending_local_description.lock().await;
                            pending.take()
                        };
                        {
                            let mut pending =
                                self.inner.pending_remote_description.lock().await;
                            pending.take();
                        }
                        {
                            let mut current =
                                self.inner.current_remote_description.lock().await;
                            *current = Some(sd.clone());
                        }
                        {
                            let mut current = self.inner.current_local_description.lock().await;
                            *current = pending_local;
                        }
                    }
                    next
                }
                SdpType::Rollback => {
                    let next = check_next_signaling_state(
                        cur,
                        SignalingState::Stable,
                        StateChangeOp::SetRemote,
                        sd.sdp_type,
                    );
                    if next.is_ok() {
                        let mut pending = self.inner.pending_remote_description.lock().await;
                        *pending = None;
                    }
                    next
                }
                SdpType::Pranswer => {
                    let next = check_next_signaling_state(
                        cur,
                        SignalingState::HaveRemotePranswer,
                        StateChangeOp::SetRemote,
                        sd.sdp_type,
                    );
                    if next.is_ok() {
                        let mut pending = self.inner.pending_remote_description.lock().await;
                        *pending = Some(sd.clone());
                    }
                    next
                }
                _ => Err(Error::ErrSessionDescriptionInvalidType),
            },
        };

        match next_state {
            Ok(next_state) => {
                self.inner
                    .signaling_state
                    .store(next_state as u8, Ordering::SeqCst);
                if next_state == SignalingState::Stable {
                    self.inner
                        .is_negotiation_needed
                        .store(false, Ordering::SeqCst);
                    self.inner.trigger_negotiation_needed().await;
                }
                self.do_signaling_state_change(next_state).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Applies a local description (<https://w3c.github.io/webrtc-pc/#dom-peerconnection-setlocaldescription>).
    pub async fn set_local_description(&self, mut desc: SessionDescription) -> Result<()> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let have_local_description = {
            let current = self.inner.current_local_description.lock().await;
            current.is_some()
        };

        // JSEP 5.4: an empty SDP re-applies the last generated one.
        if desc.sdp.is_empty() {
            match desc.sdp_type {
                SdpType::Answer | SdpType::Pranswer => {
                    let last_answer = self.inner.last_answer.lock().await;
                    desc.sdp = last_answer.clone();
                }
                SdpType::Offer => {
                    let last_offer = self.inner.last_offer.lock().await;
                    desc.sdp = last_offer.clone();
                }
                _ => return Err(Error::ErrSessionDescriptionInvalidType),
            }
        }

        desc.parsed = Some(desc.unmarshal()?);
        self.set_description(&desc, StateChangeOp::SetLocal).await?;

        let we_answer = desc.sdp_type == SdpType::Answer;
        if we_answer {
            if let Some(remote_desc) = self.remote_description().await {
                self.inner.start_rtp_senders().await?;

                let inner = Arc::clone(&self.inner);
                let remote_desc = Arc::new(remote_desc);
                self.inner
                    .ops
                    .enqueue(Operation(Box::new(move || {
                        let inner = Arc::clone(&inner);
                        let remote_desc = Arc::clone(&remote_desc);
                        Box::pin(async move {
                            let _ = inner.start_rtp(have_local_description, remote_desc).await;
                            false
                        })
                    })))
                    .await?;
            }
        }

        if self.inner.ice_gatherer.state() == IceGathererState::New {
            self.inner.ice_gatherer.gather().await
        } else {
            Ok(())
        }
    }

    /// Applies a remote description and, once enough is known, starts
    /// the transports through the operations queue.
    pub async fn set_remote_description(&self, mut desc: SessionDescription) -> Result<()> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let is_renegotiation = {
            let current = self.inner.current_remote_description.lock().await;
            current.is_some()
        };

        desc.parsed = Some(desc.unmarshal()?);
        self.set_description(&desc, StateChangeOp::SetRemote).await?;

        let parsed = desc.parsed.as_ref().expect("parsed above");

        self.inner
            .media_engine
            .update_from_remote_description(parsed)
            .await?;

        let we_offer = desc.sdp_type == SdpType::Answer;
        let detected_plan_b = description_is_plan_b(Some(&desc))?;

        // Mirror the remote's m-sections onto transceivers.
        if !we_offer && !detected_plan_b {
            let mut local_transceivers = self.get_transceivers().await;
            for media in &parsed.media_descriptions {
                let mid_value = match get_mid_value(media) {
                    Some(m) if !m.is_empty() => m,
                    _ => return Err(Error::ErrRemoteDescriptionWithoutMidValue),
                };

                if media.media_name.media == MEDIA_SECTION_APPLICATION {
                    continue;
                }

                let kind = RtpCodecKind::from(media.media_name.media.as_str());
                let direction = get_peer_direction(media);
                if kind == RtpCodecKind::Unspecified
                    || direction == RtpTransceiverDirection::Unspecified
                {
                    continue;
                }

                let t = if let Some(t) =
                    crate::rtp_transceiver::find_by_mid(mid_value, &mut local_transceivers).await
                {
                    if direction == RtpTransceiverDirection::Inactive {
                        t.stop().await?;
                    }
                    Some(t)
                } else {
                    crate::rtp_transceiver::satisfy_type_and_direction(
                        kind,
                        direction,
                        &mut local_transceivers,
                    )
                    .await
                };

                match t {
                    Some(t) => {
                        if direction == RtpTransceiverDirection::Recvonly {
                            if t.direction() == RtpTransceiverDirection::Sendrecv {
                                t.set_direction_internal(RtpTransceiverDirection::Sendonly);
                            }
                        } else if direction == RtpTransceiverDirection::Sendrecv
                            && t.direction() == RtpTransceiverDirection::Sendonly
                        {
                            t.set_direction_internal(RtpTransceiverDirection::Sendrecv);
                        }

                        if t.mid().await.is_empty() {
                            t.set_mid(mid_value.to_owned()).await?;
                        }
                    }
                    None => {
                        let local_direction =
                            if direction == RtpTransceiverDirection::Recvonly {
                                RtpTransceiverDirection::Sendonly
                            } else {
                                RtpTransceiverDirection::Recvonly
                            };

                        let interceptor = self
                            .inner
                            .interceptor
                            .upgrade()
                            .ok_or(Error::ErrInterceptorNotBind)?;
                        let receiver = Arc::new(RtpReceiver::new(
                            self.inner.setting_engine.get_receive_mtu(),
                            kind,
                            Arc::clone(&self.inner.dtls_transport),
                            Arc::clone(&self.inner.media_engine),
                            interceptor,
                        ));

                        let t = RtpTransceiver::new(
                            Some(receiver),
                            None,
                            local_direction,
                            kind,
                            vec![],
                            Arc::clone(&self.inner.media_engine),
                            Some(Box::new(self.inner.make_negotiation_needed_trigger())),
                        )
                        .await;

                        self.inner.add_rtp_transceiver(Arc::clone(&t)).await;

                        if t.mid().await.is_empty() {
                            t.set_mid(mid_value.to_owned()).await?;
                        }
                    }
                }
            }
        }

        let (remote_ufrag, remote_pwd, candidates) = extract_ice_details(parsed)?;

        if is_renegotiation
            && self
                .inner
                .ice_transport
                .have_remote_credentials_change(&remote_ufrag, &remote_pwd)
                .await
        {
            // An ICE restart happens implicitly when the remote's
            // offer carries fresh credentials.
            if !we_offer {
                self.inner.ice_transport.restart().await?;
            }
            self.inner
                .ice_transport
                .set_remote_credentials(remote_ufrag.clone(), remote_pwd.clone())
                .await?;
        }

        for candidate in candidates {
            self.inner
                .ice_transport
                .add_remote_candidate(Some(candidate))
                .await?;
        }

        if is_renegotiation {
            if we_offer {
                self.inner.start_rtp_senders().await?;

                let inner = Arc::clone(&self.inner);
                let remote_desc = Arc::new(desc);
                self.inner
                    .ops
                    .enqueue(Operation(Box::new(move || {
                        let inner = Arc::clone(&inner);
                        let remote_desc = Arc::clone(&remote_desc);
                        Box::pin(async move {
                            let _ = inner.start_rtp(true, remote_desc).await;
                            false
                        })
                    })))
                    .await?;
            }
            return Ok(());
        }

        let remote_is_lite = parsed
            .attributes
            .iter()
            .any(|a| a.key.trim() == ATTR_KEY_ICELITE);

        let (fingerprint, fingerprint_hash) = extract_fingerprint(parsed)?;

        // If one agent is lite and the other is not, the full agent
        // controls; otherwise the offerer does (RFC 8445 §6.1.1).
        let local_is_lite = self.inner.setting_engine.candidates.ice_lite;
        let ice_role = if (we_offer && remote_is_lite == local_is_lite)
            || (remote_is_lite && !local_is_lite)
        {
            IceRole::Controlling
        } else {
            IceRole::Controlled
        };

        if we_offer {
            self.inner.start_rtp_senders().await?;
        }

        let inner = Arc::clone(&self.inner);
        let dtls_role = DtlsRole::from(parsed);
        let remote_desc = Arc::new(desc);
        self.inner
            .ops
            .enqueue(Operation(Box::new(move || {
                let inner = Arc::clone(&inner);
                let remote_desc = Arc::clone(&remote_desc);
                let remote_ufrag = remote_ufrag.clone();
                let remote_pwd = remote_pwd.clone();
                let fingerprint = fingerprint.clone();
                let fingerprint_hash = fingerprint_hash.clone();
                Box::pin(async move {
                    log::trace!("start_transports: ice_role={ice_role}, dtls_role={dtls_role}");
                    inner
                        .start_transports(
                            ice_role,
                            dtls_role,
                            remote_ufrag,
                            remote_pwd,
                            fingerprint,
                            fingerprint_hash,
                        )
                        .await;

                    if we_offer {
                        let _ = inner.start_rtp(false, remote_desc).await;
                    }
                    false
                })
            })))
            .await?;

        Ok(())
    }

    /// The local description in flight or, failing that, the settled
    /// one.
    pub async fn local_description(&self) -> Option<SessionDescription> {
        if let Some(pending) = self.pending_local_description().await {
            return Some(pending);
        }
        self.current_local_description().await
    }

    /// The remote description in flight or, failing that, the settled
    /// one.
    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.remote_description().await
    }

    /// Adds a trickled remote candidate.
    pub async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }

        let candidate_value = candidate
            .candidate
            .strip_prefix("candidate:")
            .unwrap_or(candidate.candidate.as_str());

        let ice_candidate = if candidate_value.is_empty() {
            None
        } else {
            let candidate: Arc<dyn Candidate + Send + Sync> =
                Arc::new(unmarshal_candidate(candidate_value)?);
            Some(IceCandidate::from(&candidate))
        };

        self.inner
            .ice_transport
            .add_remote_candidate(ice_candidate)
            .await
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.inner.ice_connection_state.load(Ordering::SeqCst).into()
    }

    pub async fn get_senders(&self) -> Vec<Arc<RtpSender>> {
        let mut senders = vec![];
        let transceivers = self.inner.rtp_transceivers.lock().await;
        for t in &*transceivers {
            if let Some(sender) = t.sender().await {
                senders.push(sender);
            }
        }
        senders
    }

    pub async fn get_receivers(&self) -> Vec<Arc<RtpReceiver>> {
        let mut receivers = vec![];
        let transceivers = self.inner.rtp_transceivers.lock().await;
        for t in &*transceivers {
            if let Some(receiver) = t.receiver().await {
                receivers.push(receiver);
            }
        }
        receivers
    }

    pub async fn get_transceivers(&self) -> Vec<Arc<RtpTransceiver>> {
        let transceivers = self.inner.rtp_transceivers.lock().await;
        transceivers.clone()
    }

    /// Adds an outgoing track, recycling a kind-compatible transceiver
    /// when one is free.
    pub async fn add_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> Result<Arc<RtpSender>> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let free_transceiver = {
            let transceivers = self.inner.rtp_transceivers.lock().await;
            let mut found = None;
            for t in &*transceivers {
                if !t.stopped.load(Ordering::SeqCst)
                    && t.kind() == track.kind()
                    && t.sender().await.is_none()
                {
                    found = Some(Arc::clone(t));
                    break;
                }
            }
            found
        };

        if let Some(t) = free_transceiver {
            let interceptor = self
                .inner
                .interceptor
                .upgrade()
                .ok_or(Error::ErrInterceptorNotBind)?;
            let sender = Arc::new(
                RtpSender::new(
                    self.inner.setting_engine.get_receive_mtu(),
                    Some(Arc::clone(&track)),
                    Arc::clone(&self.inner.dtls_transport),
                    Arc::clone(&self.inner.media_engine),
                    interceptor,
                )
                .await,
            );

            t.set_sender(Some(Arc::clone(&sender))).await;
            t.set_sending_track(Some(Arc::clone(&track))).await?;

            self.inner.trigger_negotiation_needed().await;
            return Ok(sender);
        }

        let transceiver = self
            .inner
            .new_transceiver_from_track(RtpTransceiverDirection::Sendrecv, track)
            .await?;
        self.inner
            .add_rtp_transceiver(Arc::clone(&transceiver))
            .await;

        match transceiver.sender().await {
            Some(sender) => Ok(sender),
            None => Err(Error::ErrRTPSenderNil),
        }
    }

    /// Stops sending on the sender's transceiver; the transceiver
    /// itself stays, direction adjusted.
    pub async fn remove_track(&self, sender: &Arc<RtpSender>) -> Result<()> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let mut transceiver = None;
        {
            let transceivers = self.inner.rtp_transceivers.lock().await;
            for t in &*transceivers {
                if let Some(s) = t.sender().await {
                    if s.id == sender.id {
                        transceiver = Some(Arc::clone(t));
                        break;
                    }
                }
            }
        }

        let t = transceiver.ok_or(Error::ErrSenderNotCreatedByConnection)?;
        if sender.stop().await.is_ok() && t.set_sending_track(None).await.is_ok() {
            self.inner.trigger_negotiation_needed().await;
        }
        Ok(())
    }

    /// Creates a transceiver for a kind without a track; recvonly by
    /// default.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RtpCodecKind,
        init: &[RtpTransceiverInit],
    ) -> Result<Arc<RtpTransceiver>> {
        self.inner.add_transceiver_from_kind(kind, init).await
    }

    /// Creates a transceiver sending the given track.
    pub async fn add_transceiver_from_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
        init: &[RtpTransceiverInit],
    ) -> Result<Arc<RtpTransceiver>> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let direction = match init.len() {
            0 => RtpTransceiverDirection::Sendrecv,
            1 => init[0].direction,
            _ => return Err(Error::ErrAddTransceiverFromTrackOnlyAcceptsOne),
        };

        let t = self
            .inner
            .new_transceiver_from_track(direction, track)
            .await?;
        self.inner.add_rtp_transceiver(Arc::clone(&t)).await;

        Ok(t)
    }

    /// Creates a data channel. In-band channels wait for SCTP and the
    /// DCEP handshake; negotiated ones need a matching create on the
    /// other side.
    pub async fn create_data_channel(
        &self,
        label: &str,
        options: Option<DataChannelInit>,
    ) -> Result<Arc<DataChannel>> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        if label.len() > 65535 {
            return Err(Error::ErrStringSizeLimit);
        }

        let mut params = DataChannelParameters {
            label: label.to_owned(),
            ordered: true,
            ..Default::default()
        };

        if let Some(options) = options {
            if let Some(ordered) = options.ordered {
                params.ordered = ordered;
            }
            params.max_packet_life_time = options.max_packet_life_time;
            params.max_retransmits = options.max_retransmits;
            if let Some(protocol) = options.protocol {
                params.protocol = protocol;
            }
            if params.protocol.len() > 65535 {
                return Err(Error::ErrProtocolTooLarge);
            }
            if let Some(negotiated) = options.negotiated {
                params.negotiated = negotiated;
            }
            params.id = options.id;
        }

        if params.max_packet_life_time.is_some() && params.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }
        if params.negotiated && params.id.is_none() {
            return Err(Error::ErrNegotiatedWithoutID);
        }
        if !params.negotiated {
            // In-band channels get their id with the SCTP transport's
            // role, not before.
            params.id = None;
        }

        let d = Arc::new(DataChannel::new(
            params,
            Arc::clone(&self.inner.setting_engine),
        ));

        if let Some(id) = d.id() {
            self.inner.sctp_transport.reserve_data_channel_id(id).await;
        }
        {
            let mut data_channels = self.inner.sctp_transport.data_channels.lock().await;
            data_channels.push(Arc::clone(&d));
        }
        self.inner
            .sctp_transport
            .data_channels_requested
            .fetch_add(1, Ordering::SeqCst);

        // A transport that is already up opens the channel right away.
        if self.inner.sctp_transport.state() == SctpTransportState::Connected {
            d.open(Arc::clone(&self.inner.sctp_transport)).await?;
        }

        self.inner.trigger_negotiation_needed().await;

        Ok(d)
    }

    /// Sends RTCP to the peer through the interceptor chain; silently
    /// discarded before the transport exists.
    pub async fn write_rtcp(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
    ) -> Result<usize> {
        let a = Attributes::new();
        Ok(self.interceptor_rtcp_writer.write(pkts, &a).await?)
    }

    /// Ends the connection: every channel, transceiver and transport
    /// is shut down and the state derives to closed. Idempotent
    /// (<https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close>).
    pub async fn close(&self) -> Result<()> {
        if self.inner.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner
            .signaling_state
            .store(SignalingState::Closed as u8, Ordering::SeqCst);

        let mut close_errs = vec![];

        if let Err(err) = self.interceptor.close().await {
            close_errs.push(Error::new(format!("interceptor: {err}")));
        }

        {
            let mut transceivers = self.inner.rtp_transceivers.lock().await;
            for t in &*transceivers {
                if let Err(err) = t.stop().await {
                    close_errs.push(Error::new(format!("transceiver: {err}")));
                }
            }
            transceivers.clear();
        }

        {
            let mut data_channels = self.inner.sctp_transport.data_channels.lock().await;
            for d in &*data_channels {
                if let Err(err) = d.close().await {
                    close_errs.push(Error::new(format!("data_channel: {err}")));
                }
            }
            data_channels.clear();
        }

        if let Err(err) = self.inner.sctp_transport.stop().await {
            close_errs.push(Error::new(format!("sctp_transport: {err}")));
        }

        if let Err(err) = self.inner.dtls_transport.stop().await {
            close_errs.push(Error::new(format!("dtls_transport: {err}")));
        }

        if let Err(err) = self.inner.ice_transport.stop().await {
            close_errs.push(Error::new(format!("ice_transport: {err}")));
        }

        update_connection_state(
            &self.inner.on_peer_connection_state_change_handler,
            &self.inner.is_closed,
            &self.inner.peer_connection_state,
            self.ice_connection_state(),
            self.inner.dtls_transport.state(),
        )
        .await;

        if let Err(err) = self.inner.ops.close().await {
            close_errs.push(Error::new(format!("ops: {err}")));
        }

        flatten_errs(close_errs)
    }

    /// The settled local description plus any candidates gathered
    /// since.
    pub async fn current_local_description(&self) -> Option<SessionDescription> {
        let description = {
            let current = self.inner.current_local_description.lock().await;
            current.clone()
        };
        populate_local_candidates(
            description.as_ref(),
            Some(&self.inner.ice_gatherer),
            self.ice_gathering_state(),
        )
        .await
    }

    /// The local description under negotiation, if any.
    pub async fn pending_local_description(&self) -> Option<SessionDescription> {
        let description = {
            let pending = self.inner.pending_local_description.lock().await;
            pending.clone()
        };
        populate_local_candidates(
            description.as_ref(),
            Some(&self.inner.ice_gatherer),
            self.ice_gathering_state(),
        )
        .await
    }

    pub async fn current_remote_description(&self) -> Option<SessionDescription> {
        let current = self.inner.current_remote_description.lock().await;
        current.clone()
    }

    pub async fn pending_remote_description(&self) -> Option<SessionDescription> {
        let pending = self.inner.pending_remote_description.lock().await;
        pending.clone()
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.inner.signaling_state.load(Ordering::SeqCst).into()
    }

    pub fn ice_gathering_state(&self) -> IceGatheringState {
        self.inner.ice_gathering_state()
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        self.inner
            .peer_connection_state
            .load(Ordering::SeqCst)
            .into()
    }

    /// The SCTP transport carrying the data channels.
    pub fn sctp(&self) -> Arc<SctpTransport> {
        Arc::clone(&self.inner.sctp_transport)
    }

    /// A channel that closes once candidate gathering finished. Useful
    /// for signaling paths that cannot trickle; trickling is faster.
    pub async fn gathering_complete_promise(&self) -> mpsc::Receiver<()> {
        let (gathering_complete_tx, gathering_complete_rx) = mpsc::channel::<()>(1);

        // Gathering may already be done; do not wait for an event that
        // fired in the past.
        let done = Arc::new(Mutex::new(Some(gathering_complete_tx)));
        let done2 = Arc::clone(&done);
        self.inner
            .ice_gatherer
            .on_gathering_complete(Box::new(move || {
                let done3 = Arc::clone(&done2);
                Box::pin(async move {
                    let mut d = done3.lock().await;
                    d.take();
                })
            }));

        if self.ice_gathering_state() == IceGatheringState::Complete {
            let mut d = done.lock().await;
            d.take();
        }

        gathering_complete_rx
    }
}

