use std::fmt;

use serde::{Deserialize, Serialize};

/// How aggressively media is bundled onto one transport
/// (<https://www.w3.org/TR/webrtc/#rtcbundlepolicy-enum>).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundlePolicy {
    #[default]
    Unspecified = 0,

    /// Bundle once the remote is known to support it.
    #[serde(rename = "balanced")]
    Balanced = 1,

    /// Negotiate one transport per media type for legacy peers.
    #[serde(rename = "max-compat")]
    MaxCompat = 2,

    /// Always bundle everything on a single transport.
    #[serde(rename = "max-bundle")]
    MaxBundle = 3,
}

impl From<&str> for BundlePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            "balanced" => BundlePolicy::Balanced,
            "max-compat" => BundlePolicy::MaxCompat,
            "max-bundle" => BundlePolicy::MaxBundle,
            _ => BundlePolicy::Unspecified,
        }
    }
}

impl fmt::Display for BundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundlePolicy::Balanced => "balanced",
            BundlePolicy::MaxCompat => "max-compat",
            BundlePolicy::MaxBundle => "max-bundle",
            BundlePolicy::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
