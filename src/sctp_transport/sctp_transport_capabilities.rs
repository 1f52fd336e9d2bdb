use serde::{Deserialize, Serialize};

/// Limits one SCTP endpoint advertises to the other.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SctpTransportCapabilities {
    /// Largest user message the endpoint accepts. `0` is the sentinel
    /// for "unknown, assume the implementation default".
    pub max_message_size: u32,
}
