use crate::certificate::Certificate;
use crate::ice_transport::ice_server::IceServer;
use crate::peer_connection::policy::bundle_policy::BundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::IceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::SdpSemantics;

/// The options a PeerConnection is constructed with; immutable once
/// applied (<https://www.w3.org/TR/webrtc/#rtcconfiguration-dictionary>).
#[derive(Default)]
pub struct Configuration {
    /// STUN and TURN servers used during gathering.
    pub ice_servers: Vec<IceServer>,

    /// Restricts which candidates are used.
    pub ice_transport_policy: IceTransportPolicy,

    /// How media bundles onto transports.
    pub bundle_policy: BundlePolicy,

    /// RTP/RTCP multiplexing; only `require` is honored.
    pub rtcp_mux_policy: RtcpMuxPolicy,

    /// Target peer identity; unverified identity assertions are not
    /// supported, a non-empty value fails the handshake.
    pub peer_identity: String,

    /// Certificates to authenticate with; one is generated when empty.
    pub certificates: Vec<Certificate>,

    /// Size of the prefetched ICE candidate pool.
    pub ice_candidate_pool_size: u8,

    /// The SDP dialect to speak.
    pub sdp_semantics: SdpSemantics,
}

impl Configuration {
    pub(crate) fn get_ice_servers(&self) -> Vec<IceServer> {
        self.ice_servers.clone()
    }
}
