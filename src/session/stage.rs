//! Session stage — where a visitor's idea is in its lifecycle.

use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase of a session.
///
/// Progresses linearly and never moves backwards:
/// Conversation → Preview → Generating → ReportComplete.
/// The derived ordering follows that progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Conversation,
    Preview,
    Generating,
    ReportComplete,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Conversation, Preview) | (Preview, Generating) | (Generating, ReportComplete)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Preview => "preview",
            Self::Generating => "generating",
            Self::ReportComplete => "report_complete",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Conversation
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The engine stores finer-grained names for the same phases.
        match s.trim() {
            "conversation" => Ok(Self::Conversation),
            "preview" | "preview_ready" | "preview_generated" => Ok(Self::Preview),
            "generating" | "generating_full_report" => Ok(Self::Generating),
            "report_complete" | "full_report" => Ok(Self::ReportComplete),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}
