use serde::{Deserialize, Serialize};

/// A certificate digest as carried in an `a=fingerprint` SDP line.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    /// Hash function name, `sha-256` unless a peer insists otherwise.
    pub algorithm: String,

    /// Lowercase colon-separated hex of the digest.
    pub value: String,
}
