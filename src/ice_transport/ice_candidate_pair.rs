use std::fmt;

use crate::ice_transport::ice_candidate::IceCandidate;

/// The local/remote pair the agent selected for the data path.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidatePair {
    stats_id: String,
    pub local: IceCandidate,
    pub remote: IceCandidate,
}

impl IceCandidatePair {
    pub fn new(local: IceCandidate, remote: IceCandidate) -> Self {
        let stats_id = format!("{}-{}", local.stats_id, remote.stats_id);
        IceCandidatePair {
            stats_id,
            local,
            remote,
        }
    }
}

impl fmt::Display for IceCandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(local) {} <-> (remote) {}", self.local, self.remote)
    }
}
