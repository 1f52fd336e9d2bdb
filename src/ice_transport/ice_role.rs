use std::fmt;

use serde::{Deserialize, Serialize};

/// Which agent drives nomination (RFC 8445 §6.1.1).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceRole {
    #[default]
    Unspecified,

    /// Nominates candidate pairs; the offerer in the common case.
    Controlling,

    /// Waits for nomination.
    Controlled,
}

impl fmt::Display for IceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceRole::Controlling => "controlling",
            IceRole::Controlled => "controlled",
            IceRole::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
