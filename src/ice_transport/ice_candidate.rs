use std::fmt;
use std::sync::Arc;

use ice::candidate::candidate_base::CandidateBaseConfig;
use ice::candidate::candidate_host::CandidateHostConfig;
use ice::candidate::candidate_peer_reflexive::CandidatePeerReflexiveConfig;
use ice::candidate::candidate_relay::CandidateRelayConfig;
use ice::candidate::candidate_server_reflexive::CandidateServerReflexiveConfig;
use ice::candidate::Candidate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::IceCandidateType;
use crate::ice_transport::ice_protocol::IceProtocol;

/// A single ICE candidate, in the shape the W3C API exposes it.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub stats_id: String,
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub protocol: IceProtocol,
    pub port: u16,
    pub typ: IceCandidateType,
    pub component: u16,
    pub related_address: String,
    pub related_port: u16,
    pub tcp_type: String,
}

/// The JSON form exchanged over signaling
/// (<https://w3c.github.io/webrtc-pc/#dom-rtcicecandidateinit>).
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

pub(crate) fn ice_candidates_from_agent(
    agent_candidates: &[Arc<dyn Candidate + Send + Sync>],
) -> Vec<IceCandidate> {
    agent_candidates.iter().map(|c| c.into()).collect()
}

impl From<&Arc<dyn Candidate + Send + Sync>> for IceCandidate {
    fn from(c: &Arc<dyn Candidate + Send + Sync>) -> Self {
        let (related_address, related_port) = match c.related_address() {
            Some(ra) => (ra.address, ra.port),
            None => (String::new(), 0),
        };

        IceCandidate {
            stats_id: c.id(),
            foundation: c.foundation(),
            priority: c.priority(),
            address: c.address(),
            protocol: IceProtocol::from(c.network_type().network_short().as_str()),
            port: c.port(),
            component: c.component(),
            typ: c.candidate_type().into(),
            tcp_type: c.tcp_type().to_string(),
            related_address,
            related_port,
        }
    }
}

impl IceCandidate {
    /// Rebuilds the agent-level candidate this wrapper describes.
    pub(crate) fn to_ice(&self) -> Result<impl Candidate> {
        let base_config = CandidateBaseConfig {
            candidate_id: self.stats_id.clone(),
            network: self.protocol.to_string(),
            address: self.address.clone(),
            port: self.port,
            component: self.component,
            foundation: self.foundation.clone(),
            priority: self.priority,
            ..Default::default()
        };

        let c = match self.typ {
            IceCandidateType::Host => {
                let config = CandidateHostConfig {
                    base_config,
                    ..Default::default()
                };
                config.new_candidate_host()?
            }
            IceCandidateType::Srflx => {
                let config = CandidateServerReflexiveConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                };
                config.new_candidate_server_reflexive()?
            }
            IceCandidateType::Prflx => {
                let config = CandidatePeerReflexiveConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                };
                config.new_candidate_peer_reflexive()?
            }
            IceCandidateType::Relay => {
                let config = CandidateRelayConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                    ..Default::default()
                };
                config.new_candidate_relay()?
            }
            _ => return Err(Error::ErrICECandidateTypeUnknown),
        };

        Ok(c)
    }

    /// The candidate as an init dictionary, ready for a signaling
    /// channel (<https://w3c.github.io/webrtc-pc/#dom-rtcicecandidate-tojson>).
    pub fn to_json(&self) -> Result<IceCandidateInit> {
        let candidate = self.to_ice()?;

        Ok(IceCandidateInit {
            candidate: format!("candidate:{}", candidate.marshal()),
            sdp_mid: Some("".to_owned()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        })
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.protocol, self.typ, self.address, self.port, self.related_address,
        )
    }
}
