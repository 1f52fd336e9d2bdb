pub mod dtls_fingerprint;
pub mod dtls_parameters;
pub mod dtls_role;
pub mod dtls_transport_state;

#[cfg(test)]
mod dtls_transport_test;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use dtls::config::ClientAuthType;
use dtls::conn::DTLSConn;
use dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use interceptor::stream_info::StreamInfo;
use interceptor::{Interceptor, RTCPReader, RTPReader};
use sha2::{Digest, Sha256};
use srtp::protection_profile::ProtectionProfile;
use srtp::session::Session;
use tokio::sync::{mpsc, Mutex};
use util::Conn;

use crate::api::setting_engine::SettingEngine;
use crate::certificate::Certificate;
use crate::default_srtp_protection_profiles;
use crate::dtls_transport::dtls_parameters::DtlsParameters;
use crate::dtls_transport::dtls_role::{DtlsRole, DEFAULT_DTLS_ROLE_ANSWER};
use crate::dtls_transport::dtls_transport_state::DtlsTransportState;
use crate::error::{flatten_errs, Error, Result};
use crate::ice_transport::ice_role::IceRole;
use crate::ice_transport::ice_transport_state::IceTransportState;
use crate::ice_transport::IceTransport;
use crate::mux::endpoint::Endpoint;
use crate::mux::mux_func::{match_dtls, match_srtcp, match_srtp};
use crate::rtp_transceiver::SSRC;

pub type OnDtlsTransportStateChangeHdlrFn = Box<
    dyn (FnMut(DtlsTransportState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// DtlsTransport drives the DTLS handshake over its mux endpoint and
/// fans the result out into three logical sinks: the reliable inner
/// transport SCTP runs on, and the SRTP/SRTCP cipher sessions media
/// runs on.
pub struct DtlsTransport {
    pub(crate) ice_transport: Arc<IceTransport>,
    pub(crate) certificates: Vec<Certificate>,
    pub(crate) setting_engine: Arc<SettingEngine>,

    pub(crate) remote_parameters: Mutex<DtlsParameters>,
    pub(crate) remote_certificate: Mutex<Bytes>,
    pub(crate) state: AtomicU8,
    pub(crate) srtp_protection_profile: Mutex<ProtectionProfile>,
    pub(crate) on_state_change_handler: ArcSwapOption<Mutex<OnDtlsTransportStateChangeHdlrFn>>,
    pub(crate) conn: Mutex<Option<Arc<DTLSConn>>>,

    pub(crate) srtp_session: Mutex<Option<Arc<Session>>>,
    pub(crate) srtcp_session: Mutex<Option<Arc<Session>>>,
    pub(crate) srtp_endpoint: Mutex<Option<Arc<Endpoint>>>,
    pub(crate) srtcp_endpoint: Mutex<Option<Arc<Endpoint>>>,

    /// Closed (sender dropped) once both SRTP sessions exist; RTP
    /// senders and receivers park on it before touching media.
    pub(crate) srtp_ready_signal: Arc<std::sync::atomic::AtomicBool>,
    pub(crate) srtp_ready_tx: Mutex<Option<mpsc::Sender<()>>>,
    pub(crate) srtp_ready_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl DtlsTransport {
    pub(crate) fn new(
        ice_transport: Arc<IceTransport>,
        certificates: Vec<Certificate>,
        setting_engine: Arc<SettingEngine>,
    ) -> Self {
        let (srtp_ready_tx, srtp_ready_rx) = mpsc::channel(1);
        DtlsTransport {
            ice_transport,
            certificates,
            setting_engine,
            remote_parameters: Mutex::new(DtlsParameters::default()),
            remote_certificate: Mutex::new(Bytes::new()),
            state: AtomicU8::new(DtlsTransportState::New as u8),
            srtp_protection_profile: Mutex::new(ProtectionProfile::default()),
            on_state_change_handler: ArcSwapOption::empty(),
            conn: Mutex::new(None),
            srtp_session: Mutex::new(None),
            srtcp_session: Mutex::new(None),
            srtp_endpoint: Mutex::new(None),
            srtcp_endpoint: Mutex::new(None),
            srtp_ready_signal: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            srtp_ready_tx: Mutex::new(Some(srtp_ready_tx)),
            srtp_ready_rx: Mutex::new(Some(srtp_ready_rx)),
        }
    }

    /// The ICE transport this runs over.
    pub fn ice_transport(&self) -> &Arc<IceTransport> {
        &self.ice_transport
    }

    pub(crate) async fn state_change(&self, state: DtlsTransportState) {
        self.state.store(state as u8, Ordering::SeqCst);
        if let Some(handler) = &*self.on_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(state).await;
        }
    }

    /// Sets the handler fired on every DTLS state transition.
    pub fn on_state_change(&self, f: OnDtlsTransportStateChangeHdlrFn) {
        self.on_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn state(&self) -> DtlsTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Sends RTCP to the peer; silently discarded before SRTCP exists.
    pub async fn write_rtcp(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
    ) -> Result<usize> {
        let raw = rtcp::packet::marshal(pkts)?;

        let srtcp_session = self.get_srtcp_session().await;
        if let Some(srtcp_session) = srtcp_session {
            Ok(srtcp_session.write(&raw, false).await?)
        } else {
            Ok(0)
        }
    }

    /// Local DTLS parameters: role stays auto until negotiation, plus
    /// one fingerprint per configured certificate.
    pub fn get_local_parameters(&self) -> DtlsParameters {
        let mut fingerprints = vec![];
        for c in &self.certificates {
            fingerprints.extend(c.get_fingerprints());
        }

        DtlsParameters {
            role: DtlsRole::Auto,
            fingerprints,
        }
    }

    /// The DER certificate chain presented by the remote; empty before
    /// the handshake completes.
    pub async fn get_remote_certificate(&self) -> Bytes {
        let remote_certificate = self.remote_certificate.lock().await;
        remote_certificate.clone()
    }

    pub(crate) async fn role(&self) -> DtlsRole {
        // An explicit remote role wins, inverted.
        {
            let remote_parameters = self.remote_parameters.lock().await;
            match remote_parameters.role {
                DtlsRole::Client => return DtlsRole::Server,
                DtlsRole::Server => return DtlsRole::Client,
                _ => {}
            }
        }

        // Next the SettingEngine pin.
        match self.setting_engine.answering_dtls_role {
            DtlsRole::Client => return DtlsRole::Client,
            DtlsRole::Server => return DtlsRole::Server,
            _ => {}
        }

        // Finally derive from ICE: the controlling agent takes the
        // server side.
        if self.ice_transport.role().await == IceRole::Controlling {
            return DtlsRole::Server;
        }

        DEFAULT_DTLS_ROLE_ANSWER
    }

    async fn prepare_transport(
        &self,
        remote_parameters: DtlsParameters,
    ) -> Result<(DtlsRole, dtls::config::Config)> {
        self.ensure_ice_conn()?;

        if self.state() != DtlsTransportState::New {
            return Err(Error::ErrInvalidDTLSStart);
        }

        // The SRTP/SRTCP endpoints must exist before any media can
        // arrive, which may be the instant the handshake finishes.
        {
            let mut srtp_endpoint = self.srtp_endpoint.lock().await;
            *srtp_endpoint = self.ice_transport.new_endpoint(Box::new(match_srtp)).await;
        }
        {
            let mut srtcp_endpoint = self.srtcp_endpoint.lock().await;
            *srtcp_endpoint = self
                .ice_transport
                .new_endpoint(Box::new(match_srtcp))
                .await;
        }
        {
            let mut rp = self.remote_parameters.lock().await;
            *rp = remote_parameters;
        }

        let certificate = self.certificates[0].dtls_certificate.clone();
        self.state_change(DtlsTransportState::Connecting).await;

        let mut config = dtls::config::Config {
            certificates: vec![certificate],
            srtp_protection_profiles: if !self.setting_engine.srtp_protection_profiles.is_empty() {
                self.setting_engine.srtp_protection_profiles.clone()
            } else {
                default_srtp_protection_profiles()
            },
            client_auth: ClientAuthType::RequireAnyClientCert,
            insecure_skip_verify: true,
            ..Default::default()
        };

        if self.setting_engine.replay_protection.dtls != 0 {
            config.replay_protection_window = self.setting_engine.replay_protection.dtls;
        }
        if !self.setting_engine.dtls.cipher_suites.is_empty() {
            config.cipher_suites = self.setting_engine.dtls.cipher_suites.clone();
        }
        if let Some(interval) = self.setting_engine.dtls.retransmission_interval {
            config.flight_interval = interval;
        }
        if let Some(policy) = self.setting_engine.dtls.extended_master_secret {
            config.extended_master_secret = policy;
        }

        Ok((self.role().await, config))
    }

    /// Runs the handshake against the remote parameters, validates the
    /// peer's fingerprint and brings up the SRTP sessions. One-shot.
    pub async fn start(&self, remote_parameters: DtlsParameters) -> Result<()> {
        let dtls_endpoint = self
            .ice_transport
            .new_endpoint(Box::new(match_dtls))
            .await
            .ok_or(Error::ErrICEConnectionNotStarted)?;

        let (role, dtls_config) = self.prepare_transport(remote_parameters).await?;

        // The handshake blocks; nothing on `self` is held across it.
        let dtls_conn_result = DTLSConn::new(
            dtls_endpoint as Arc<dyn Conn + Send + Sync>,
            dtls_config,
            role == DtlsRole::Client,
            None,
        )
        .await;

        let dtls_conn = match dtls_conn_result {
            Ok(dtls_conn) => dtls_conn,
            Err(err) => {
                self.state_change(DtlsTransportState::Failed).await;
                return Err(err.into());
            }
        };

        let srtp_profile = match dtls_conn.selected_srtpprotection_profile() {
            SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm => ProtectionProfile::AeadAes128Gcm,
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80 => {
                ProtectionProfile::Aes128CmHmacSha1_80
            }
            _ => {
                self.state_change(DtlsTransportState::Failed).await;
                return Err(Error::ErrNoSRTPProtectionProfile);
            }
        };
        {
            let mut profile = self.srtp_protection_profile.lock().await;
            *profile = srtp_profile;
        }

        // Check the fingerprint if a certificate was exchanged.
        let remote_cert = {
            let state = dtls_conn.connection_state().await;
            if state.peer_certificates.is_empty() {
                self.state_change(DtlsTransportState::Failed).await;
                return Err(Error::ErrNoRemoteCertificate);
            }
            state.peer_certificates[0].clone()
        };
        {
            let mut remote_certificate = self.remote_certificate.lock().await;
            *remote_certificate = Bytes::from(remote_cert.clone());
        }

        if !self
            .setting_engine
            .disable_certificate_fingerprint_verification
        {
            if let Err(err) = self.validate_fingerprint(&remote_cert).await {
                if let Err(close_err) = dtls_conn.close().await {
                    log::error!("dtls_transport: close after failed validation: {close_err}");
                }
                self.state_change(DtlsTransportState::Failed).await;
                return Err(err);
            }
        }

        {
            let mut conn = self.conn.lock().await;
            *conn = Some(Arc::new(dtls_conn));
        }
        self.state_change(DtlsTransportState::Connected).await;

        self.start_srtp().await
    }

    async fn start_srtp(&self) -> Result<()> {
        let profile = {
            let profile = self.srtp_protection_profile.lock().await;
            *profile
        };

        let mut srtp_config = srtp::config::Config {
            profile,
            ..Default::default()
        };
        let mut srtcp_config = srtp::config::Config {
            profile,
            ..Default::default()
        };

        if self.setting_engine.replay_protection.srtp != 0 {
            srtp_config.remote_rtp_options = Some(srtp::option::srtp_replay_protection(
                self.setting_engine.replay_protection.srtp,
            ));
        } else if self.setting_engine.disable_srtp_replay_protection {
            srtp_config.remote_rtp_options = Some(srtp::option::srtp_no_replay_protection());
        }

        if self.setting_engine.replay_protection.srtcp != 0 {
            srtcp_config.remote_rtcp_options = Some(srtp::option::srtcp_replay_protection(
                self.setting_engine.replay_protection.srtcp,
            ));
        } else if self.setting_engine.disable_srtcp_replay_protection {
            srtcp_config.remote_rtcp_options = Some(srtp::option::srtcp_no_replay_protection());
        }

        {
            let is_client = self.role().await == DtlsRole::Client;
            let conn = self.conn.lock().await;
            let conn = conn.as_ref().ok_or(Error::ErrDtlsTransportNotStarted)?;
            let conn_state = conn.connection_state().await;
            srtp_config
                .extract_session_keys_from_dtls(conn_state, is_client)
                .await?;
        }

        {
            let srtp_endpoint = {
                let srtp_endpoint = self.srtp_endpoint.lock().await;
                srtp_endpoint.clone()
            };
            let endpoint = srtp_endpoint.ok_or(Error::ErrDtlsTransportNotStarted)?;
            let session = Session::new(
                endpoint as Arc<dyn Conn + Send + Sync>,
                srtp_config,
                true,
            )
            .await?;
            let mut srtp_session = self.srtp_session.lock().await;
            *srtp_session = Some(Arc::new(session));
        }

        {
            let srtcp_endpoint = {
                let srtcp_endpoint = self.srtcp_endpoint.lock().await;
                srtcp_endpoint.clone()
            };
            let endpoint = srtcp_endpoint.ok_or(Error::ErrDtlsTransportNotStarted)?;
            let session = Session::new(
                endpoint as Arc<dyn Conn + Send + Sync>,
                srtcp_config,
                false,
            )
            .await?;
            let mut srtcp_session = self.srtcp_session.lock().await;
            *srtcp_session = Some(Arc::new(session));
        }

        // Dropping the sender wakes everyone parked on srtp_ready.
        self.srtp_ready_signal.store(true, Ordering::SeqCst);
        {
            let mut tx = self.srtp_ready_tx.lock().await;
            tx.take();
        }

        Ok(())
    }

    pub(crate) async fn get_srtp_session(&self) -> Option<Arc<Session>> {
        let session = self.srtp_session.lock().await;
        session.clone()
    }

    pub(crate) async fn get_srtcp_session(&self) -> Option<Arc<Session>> {
        let session = self.srtcp_session.lock().await;
        session.clone()
    }

    /// The reliable inner connection SCTP mounts on; None before the
    /// handshake finishes.
    pub(crate) async fn conn(&self) -> Option<Arc<DTLSConn>> {
        let conn = self.conn.lock().await;
        conn.clone()
    }

    /// Stops and closes the transport. Idempotent; `ErrConnClosed`
    /// from the inner connection is expected when the peer won the
    /// race and is not reported.
    pub async fn stop(&self) -> Result<()> {
        let mut close_errs = vec![];

        {
            let srtp_session = {
                let mut srtp_session = self.srtp_session.lock().await;
                srtp_session.take()
            };
            if let Some(session) = srtp_session {
                if let Err(err) = session.close().await {
                    close_errs.push(err.into());
                }
            }
        }

        {
            let srtcp_session = {
                let mut srtcp_session = self.srtcp_session.lock().await;
                srtcp_session.take()
            };
            if let Some(session) = srtcp_session {
                if let Err(err) = session.close().await {
                    close_errs.push(err.into());
                }
            }
        }

        {
            let conn = {
                let mut conn = self.conn.lock().await;
                conn.take()
            };
            if let Some(conn) = conn {
                if let Err(err) = conn.close().await {
                    if err.to_string() != dtls::Error::ErrConnClosed.to_string() {
                        close_errs.push(err.into());
                    }
                }
            }
        }

        self.state_change(DtlsTransportState::Closed).await;
        flatten_errs(close_errs)
    }

    /// Compares the remote leaf certificate against every advertised
    /// fingerprint, case-insensitively.
    pub(crate) async fn validate_fingerprint(&self, remote_cert: &[u8]) -> Result<()> {
        let remote_parameters = self.remote_parameters.lock().await;

        for fp in &remote_parameters.fingerprints {
            if !fp.algorithm.eq_ignore_ascii_case("sha-256") {
                return Err(Error::ErrFingerprintAlgorithmUnsupported);
            }

            let mut h = Sha256::new();
            h.update(remote_cert);
            let value = h
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<String>>()
                .join(":");

            if value.eq_ignore_ascii_case(&fp.value) {
                return Ok(());
            }
        }

        Err(Error::ErrNoMatchingCertificateFingerprint)
    }

    pub(crate) fn ensure_ice_conn(&self) -> Result<()> {
        if self.ice_transport.state() == IceTransportState::New {
            Err(Error::ErrICEConnectionNotStarted)
        } else {
            Ok(())
        }
    }

    /// Opens the inbound SRTP/SRTCP streams for one SSRC and binds the
    /// interceptor chain onto them.
    pub(crate) async fn streams_for_ssrc(
        &self,
        ssrc: SSRC,
        stream_info: &StreamInfo,
        interceptor: &Arc<dyn Interceptor + Send + Sync>,
    ) -> Result<(
        Arc<srtp::stream::Stream>,
        Arc<dyn RTPReader + Send + Sync>,
        Arc<srtp::stream::Stream>,
        Arc<dyn RTCPReader + Send + Sync>,
    )> {
        let srtp_session = self
            .get_srtp_session()
            .await
            .ok_or(Error::ErrDtlsTransportNotStarted)?;
        let rtp_read_stream = srtp_session.open(ssrc).await;
        let rtp_interceptor = interceptor
            .bind_remote_stream(
                stream_info,
                Arc::clone(&rtp_read_stream) as Arc<dyn RTPReader + Send + Sync>,
            )
            .await;

        let srtcp_session = self
            .get_srtcp_session()
            .await
            .ok_or(Error::ErrDtlsTransportNotStarted)?;
        let rtcp_read_stream = srtcp_session.open(ssrc).await;
        let rtcp_interceptor = interceptor
            .bind_rtcp_reader(Arc::clone(&rtcp_read_stream) as Arc<dyn RTCPReader + Send + Sync>)
            .await;

        Ok((
            rtp_read_stream,
            rtp_interceptor,
            rtcp_read_stream,
            rtcp_interceptor,
        ))
    }
}
