use serde::{Deserialize, Serialize};

use crate::dtls_transport::dtls_fingerprint::DtlsFingerprint;
use crate::dtls_transport::dtls_role::DtlsRole;

/// Everything the remote description tells us about the peer's DTLS
/// endpoint: its role and the fingerprints its certificate must match.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct DtlsParameters {
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}
