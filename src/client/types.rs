//! Wire types for the consultation engine's HTTP API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationMessage, Role};
use crate::session::{ReportContext, ReportSection};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConversationRequest {
    /// Anonymous visitor id.
    pub user_id: String,
    pub idea: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueConversationRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// Reply to a start or continue call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub session_id: String,
    pub agent_response: String,
    #[serde(default)]
    pub requirements_complete: bool,
    #[serde(default)]
    pub conversation_count: Option<u32>,
    #[serde(default)]
    pub next_step: String,
    #[serde(default)]
    pub social_proof: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub session_id: String,
    pub preview: String,
    #[serde(default)]
    pub full_preview_available: bool,
    #[serde(default)]
    pub next_step: String,
    #[serde(default)]
    pub social_proof: Option<HashMap<String, String>>,
}

/// Contact details submitted to unlock the full report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCaptureRequest {
    pub session_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadCaptureAck {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub lead_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub email_sent: bool,
    #[serde(default)]
    pub refinements_left: u32,
    #[serde(default)]
    pub message: String,
}

/// One observation of report generation progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub progress_percentage: u32,
    #[serde(default)]
    pub testimonial: String,
    #[serde(default)]
    pub metric: String,
}

/// The backend's stored view of a session, as returned by `/report/get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub idea: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub context: ReportContext,
    #[serde(default)]
    pub lead_captured: bool,
    #[serde(default = "default_refinements")]
    pub refinements_left: u32,
    #[serde(default)]
    pub lead_score: f64,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryEntry>>,
}

fn default_refinements() -> u32 {
    crate::session::REFINEMENT_BUDGET
}

/// A transcript entry as the backend stores it. Backend timestamps carry no
/// zone and are not relied upon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryEntry {
    pub fn to_message(&self) -> ConversationMessage {
        match self.role.as_str() {
            "user" => ConversationMessage::user(&self.content),
            _ => ConversationMessage::agent(&self.content),
        }
    }
}

impl From<&ConversationMessage> for HistoryEntry {
    fn from(msg: &ConversationMessage) -> Self {
        let role = match msg.role {
            Role::User => "user",
            Role::Agent => "agent",
        };
        Self {
            role: role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineRequest {
    pub session_id: String,
    pub additional_info: String,
}

/// Outcome of a refinement request.
///
/// `success == false` is a well-formed rejection (for example an exhausted
/// budget), not a transport failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementResponse {
    pub success: bool,
    #[serde(default)]
    pub updated_sections: Option<Vec<String>>,
    #[serde(default)]
    pub changes_summary: Option<String>,
    #[serde(default)]
    pub new_version: Option<u32>,
    #[serde(default)]
    pub refinements_left: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub cta_url: Option<String>,
}

impl RefinementResponse {
    /// Sections the backend says it rewrote. Unknown names are dropped; `None`
    /// when the backend did not say.
    pub fn sections(&self) -> Option<Vec<ReportSection>> {
        let names = self.updated_sections.as_ref()?;
        let sections: Vec<ReportSection> = names
            .iter()
            .filter_map(|n| ReportSection::from_key(n))
            .collect();
        if sections.is_empty() { None } else { Some(sections) }
    }

    /// Display text for a rejection.
    pub fn rejection_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Refinement was not applied".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProof {
    #[serde(default)]
    pub testimonial: String,
    #[serde(default)]
    pub metric: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
