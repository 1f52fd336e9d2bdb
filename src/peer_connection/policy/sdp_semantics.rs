use std::fmt;

use serde::{Deserialize, Serialize};

/// The SDP dialect used to describe media sections.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdpSemantics {
    /// One m-section per transceiver (JSEP).
    #[default]
    #[serde(rename = "unified-plan")]
    UnifiedPlan = 0,

    /// Legacy Chrome dialect, one m-section per media kind.
    #[serde(rename = "plan-b")]
    PlanB = 1,

    /// Offer unified-plan but answer plan-b offers in kind.
    #[serde(rename = "unified-plan-with-fallback")]
    UnifiedPlanWithFallback = 2,
}

impl From<&str> for SdpSemantics {
    fn from(raw: &str) -> Self {
        match raw {
            "plan-b" => SdpSemantics::PlanB,
            "unified-plan-with-fallback" => SdpSemantics::UnifiedPlanWithFallback,
            _ => SdpSemantics::UnifiedPlan,
        }
    }
}

impl fmt::Display for SdpSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdpSemantics::UnifiedPlan => "unified-plan",
            SdpSemantics::PlanB => "plan-b",
            SdpSemantics::UnifiedPlanWithFallback => "unified-plan-with-fallback",
        };
        write!(f, "{s}")
    }
}
