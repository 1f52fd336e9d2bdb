use std::fmt;

use serde::{Deserialize, Serialize};

/// How the credential in an IceServer entry is to be interpreted.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceCredentialType {
    /// Long-term username/password (RFC 5389 §10.2).
    #[default]
    #[serde(rename = "password")]
    Password,

    /// OAuth token credential (RFC 7635).
    #[serde(rename = "oauth")]
    Oauth,
}

impl From<&str> for IceCredentialType {
    fn from(raw: &str) -> Self {
        match raw {
            "oauth" => IceCredentialType::Oauth,
            _ => IceCredentialType::Password,
        }
    }
}

impl fmt::Display for IceCredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceCredentialType::Password => write!(f, "password"),
            IceCredentialType::Oauth => write!(f, "oauth"),
        }
    }
}
