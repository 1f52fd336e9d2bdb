use std::sync::Arc;

use dtls::cipher_suite::CipherSuiteId;
use dtls::config::ExtendedMasterSecretType;
use dtls::curve::named_curve::NamedCurve;
use dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use ice::agent::agent_config::InterfaceFilterFn;
use ice::mdns::MulticastDnsMode;
use ice::network_type::NetworkType;
use ice::udp_network::{EphemeralUDP, UDPNetwork};
use tokio::time::Duration;
use util::vnet::net::Net;

use crate::dtls_transport::dtls_role::DtlsRole;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::IceCandidateType;
use crate::RECEIVE_MTU;

#[derive(Default, Clone)]
pub struct Detach {
    pub data_channels: bool,
}

#[derive(Default, Clone)]
pub struct Timeout {
    pub ice_disconnected_timeout: Option<Duration>,
    pub ice_failed_timeout: Option<Duration>,
    pub ice_keepalive_interval: Option<Duration>,
    pub ice_host_acceptance_min_wait: Option<Duration>,
    pub ice_srflx_acceptance_min_wait: Option<Duration>,
    pub ice_prflx_acceptance_min_wait: Option<Duration>,
    pub ice_relay_acceptance_min_wait: Option<Duration>,
}

#[derive(Default, Clone)]
pub struct Candidates {
    pub ice_lite: bool,
    pub ice_network_types: Vec<NetworkType>,
    pub interface_filter: Arc<Option<InterfaceFilterFn>>,
    pub nat_1to1_ips: Vec<String>,
    pub nat_1to1_ip_candidate_type: IceCandidateType,
    pub multicast_dns_mode: MulticastDnsMode,
    pub multicast_dns_host_name: String,
    pub username_fragment: String,
    pub password: String,
}

#[derive(Default, Clone)]
pub struct ReplayProtection {
    pub dtls: usize,
    pub srtp: usize,
    pub srtcp: usize,
}

/// DTLS handshake knobs forwarded verbatim into the dtls config.
#[derive(Default, Clone)]
pub struct DtlsSettings {
    pub retransmission_interval: Option<Duration>,
    pub elliptic_curves: Vec<NamedCurve>,
    pub cipher_suites: Vec<CipherSuiteId>,
    pub extended_master_secret: Option<ExtendedMasterSecretType>,
}

#[derive(Default, Clone)]
pub struct SctpSettings {
    /// Receive-side buffer handed to the association; 0 keeps the
    /// association default.
    pub max_receive_buffer_size: u32,

    /// The message size advertised through `a=max-message-size`;
    /// 0 advertises the implementation-wide cap.
    pub max_message_size: u32,
}

/// SettingEngine collects the low-level behavior overrides that the
/// W3C Configuration deliberately does not expose. Settings must not be
/// changed once the engine has been handed to an Api.
#[derive(Default, Clone)]
pub struct SettingEngine {
    pub(crate) detach: Detach,
    pub(crate) timeout: Timeout,
    pub(crate) candidates: Candidates,
    pub(crate) replay_protection: ReplayProtection,
    pub(crate) dtls: DtlsSettings,
    pub(crate) sctp: SctpSettings,
    pub(crate) udp_network: UDPNetwork,
    pub(crate) sdp_media_level_fingerprints: bool,
    pub(crate) answering_dtls_role: DtlsRole,
    pub(crate) disable_certificate_fingerprint_verification: bool,
    pub(crate) disable_srtp_replay_protection: bool,
    pub(crate) disable_srtcp_replay_protection: bool,
    pub(crate) enable_data_channel_block_write: bool,
    pub(crate) vnet: Option<Arc<Net>>,
    pub(crate) disable_media_engine_copy: bool,
    pub(crate) srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    pub(crate) receive_mtu: usize,
}

impl SettingEngine {
    pub(crate) fn get_receive_mtu(&self) -> usize {
        if self.receive_mtu != 0 {
            self.receive_mtu
        } else {
            RECEIVE_MTU
        }
    }

    /// Enables detaching data channels. Detached channels must be taken
    /// over inside the on_open callback via `DataChannel::detach`.
    pub fn detach_data_channels(&mut self) {
        self.detach.data_channels = true;
    }

    /// Makes `DataChannel::send` park while the outstanding buffered
    /// amount is above the high-water mark instead of queueing without
    /// bound.
    pub fn enable_data_channel_block_write(&mut self, is_enabled: bool) {
        self.enable_data_channel_block_write = is_enabled;
    }

    /// Overrides the SRTP protection profiles offered in the handshake.
    pub fn set_srtp_protection_profiles(&mut self, profiles: Vec<SrtpProtectionProfile>) {
        self.srtp_protection_profiles = profiles;
    }

    /// Tunes the ICE disconnect/fail/keepalive durations; `None` keeps
    /// the agent default for that knob.
    pub fn set_ice_timeouts(
        &mut self,
        disconnected_timeout: Option<Duration>,
        failed_timeout: Option<Duration>,
        keep_alive_interval: Option<Duration>,
    ) {
        self.timeout.ice_disconnected_timeout = disconnected_timeout;
        self.timeout.ice_failed_timeout = failed_timeout;
        self.timeout.ice_keepalive_interval = keep_alive_interval;
    }

    pub fn set_host_acceptance_min_wait(&mut self, t: Option<Duration>) {
        self.timeout.ice_host_acceptance_min_wait = t;
    }

    pub fn set_srflx_acceptance_min_wait(&mut self, t: Option<Duration>) {
        self.timeout.ice_srflx_acceptance_min_wait = t;
    }

    pub fn set_prflx_acceptance_min_wait(&mut self, t: Option<Duration>) {
        self.timeout.ice_prflx_acceptance_min_wait = t;
    }

    pub fn set_relay_acceptance_min_wait(&mut self, t: Option<Duration>) {
        self.timeout.ice_relay_acceptance_min_wait = t;
    }

    /// Limits the ephemeral port pool ICE binds its UDP sockets from.
    pub fn set_ephemeral_udp_port_range(&mut self, port_min: u16, port_max: u16) -> Result<()> {
        self.udp_network = UDPNetwork::Ephemeral(EphemeralUDP::new(port_min, port_max)?);
        Ok(())
    }

    /// Configures this side as an ice-lite agent.
    pub fn set_lite(&mut self, lite: bool) {
        self.candidates.ice_lite = lite;
    }

    /// Restricts which network types are gathered.
    pub fn set_network_types(&mut self, candidate_types: Vec<NetworkType>) {
        self.candidates.ice_network_types = candidate_types;
    }

    /// Excludes network interfaces from gathering by name.
    pub fn set_interface_filter(&mut self, filter: InterfaceFilterFn) {
        self.candidates.interface_filter = Arc::new(Some(filter));
    }

    /// Advertises 1:1 NAT addresses in place of (host) or alongside
    /// (srflx) the locally bound ones.
    pub fn set_nat_1to1_ips(&mut self, ips: Vec<String>, candidate_type: IceCandidateType) {
        self.candidates.nat_1to1_ips = ips;
        self.candidates.nat_1to1_ip_candidate_type = candidate_type;
    }

    /// Pins the DTLS role taken when answering, instead of deriving it
    /// from the ICE role.
    pub fn set_answering_dtls_role(&mut self, role: DtlsRole) -> Result<()> {
        if role != DtlsRole::Client && role != DtlsRole::Server {
            return Err(Error::ErrSettingEngineSetAnsweringDTLSRole);
        }

        self.answering_dtls_role = role;
        Ok(())
    }

    /// Runs ICE over a virtual network; used by tests simulating
    /// topologies, loss and latency.
    pub fn set_vnet(&mut self, vnet: Option<Arc<Net>>) {
        self.vnet = vnet;
    }

    pub fn set_ice_multicast_dns_mode(&mut self, multicast_dns_mode: MulticastDnsMode) {
        self.candidates.multicast_dns_mode = multicast_dns_mode;
    }

    pub fn set_multicast_dns_host_name(&mut self, host_name: String) {
        self.candidates.multicast_dns_host_name = host_name;
    }

    /// Pins the local ufrag/pwd; useful for reproducible signaling.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.candidates.username_fragment = username_fragment;
        self.candidates.password = password;
    }

    /// Skips fingerprint validation after the DTLS handshake. Testing
    /// only.
    pub fn disable_certificate_fingerprint_verification(&mut self, is_disabled: bool) {
        self.disable_certificate_fingerprint_verification = is_disabled;
    }

    pub fn set_dtls_replay_protection_window(&mut self, n: usize) {
        self.replay_protection.dtls = n;
    }

    pub fn set_srtp_replay_protection_window(&mut self, n: usize) {
        self.disable_srtp_replay_protection = false;
        self.replay_protection.srtp = n;
    }

    pub fn set_srtcp_replay_protection_window(&mut self, n: usize) {
        self.disable_srtcp_replay_protection = false;
        self.replay_protection.srtcp = n;
    }

    pub fn disable_srtp_replay_protection(&mut self, is_disabled: bool) {
        self.disable_srtp_replay_protection = is_disabled;
    }

    pub fn disable_srtcp_replay_protection(&mut self, is_disabled: bool) {
        self.disable_srtcp_replay_protection = is_disabled;
    }

    pub fn set_dtls_retransmission_interval(&mut self, interval: Duration) {
        self.dtls.retransmission_interval = Some(interval);
    }

    pub fn set_dtls_elliptic_curves(&mut self, curves: Vec<NamedCurve>) {
        self.dtls.elliptic_curves = curves;
    }

    pub fn set_dtls_cipher_suites(&mut self, suites: Vec<CipherSuiteId>) {
        self.dtls.cipher_suites = suites;
    }

    pub fn set_dtls_extended_master_secret(&mut self, policy: ExtendedMasterSecretType) {
        self.dtls.extended_master_secret = Some(policy);
    }

    /// Caps the SCTP receive buffer; 0 keeps the association default.
    pub fn set_sctp_max_receive_buffer_size(&mut self, size: u32) {
        self.sctp.max_receive_buffer_size = size;
    }

    /// Sets the message size advertised through `a=max-message-size`.
    pub fn set_sctp_max_message_size(&mut self, size: u32) {
        self.sctp.max_message_size = size;
    }

    /// Emits fingerprints at the media level instead of the session
    /// level, for peers that only read them there.
    pub fn set_sdp_media_level_fingerprints(&mut self, media_level: bool) {
        self.sdp_media_level_fingerprints = media_level;
    }

    /// Lets a PeerConnection share the Api's MediaEngine instead of
    /// cloning it. Only safe with one PeerConnection per engine.
    pub fn disable_media_engine_copy(&mut self, is_disabled: bool) {
        self.disable_media_engine_copy = is_disabled;
    }

    /// Sets the read buffer size used for incoming packets; 0 keeps the
    /// default.
    pub fn set_receive_mtu(&mut self, receive_mtu: usize) {
        self.receive_mtu = receive_mtu;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_answering_dtls_role() {
        let mut s = SettingEngine::default();
        assert!(s.set_answering_dtls_role(DtlsRole::Auto).is_err());
        assert!(s.set_answering_dtls_role(DtlsRole::Unspecified).is_err());
        assert!(s.set_answering_dtls_role(DtlsRole::Client).is_ok());
        assert_eq!(s.answering_dtls_role, DtlsRole::Client);
        assert!(s.set_answering_dtls_role(DtlsRole::Server).is_ok());
        assert_eq!(s.answering_dtls_role, DtlsRole::Server);
    }

    #[test]
    fn test_set_ephemeral_udp_port_range() {
        let mut s = SettingEngine::default();
        assert!(s.set_ephemeral_udp_port_range(3000, 2999).is_err());
        assert!(s.set_ephemeral_udp_port_range(3000, 4000).is_ok());
    }

    #[test]
    fn test_detach_data_channels() {
        let mut s = SettingEngine::default();
        assert!(!s.detach.data_channels);
        s.detach_data_channels();
        assert!(s.detach.data_channels);
    }

    #[test]
    fn test_receive_mtu_default() {
        let mut s = SettingEngine::default();
        assert_eq!(s.get_receive_mtu(), RECEIVE_MTU);
        s.set_receive_mtu(8192);
        assert_eq!(s.get_receive_mtu(), 8192);
    }
}
