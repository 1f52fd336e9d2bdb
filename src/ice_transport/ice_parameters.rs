use serde::{Deserialize, Serialize};

/// The ufrag/pwd pair one side contributes to the ICE session.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}
