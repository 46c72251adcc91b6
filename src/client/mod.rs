//! Remote session client — the boundary to the consultation engine.
//!
//! Every call returns either a typed response or a [`ClientError`] whose
//! message is ready to show. Callers never see raw transport errors.

pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::ClientError;

pub use http::HttpSessionClient;
pub use types::{
    ContinueConversationRequest, ConversationResponse, HealthStatus, HistoryEntry,
    LeadCaptureAck, LeadCaptureRequest, PreviewResponse, ProgressSnapshot, RefineRequest,
    RefinementResponse, SessionQuery, SessionRecord, SocialProof, StartConversationRequest,
};

/// Operations offered by the consultation engine.
#[async_trait]
pub trait RemoteSessionClient: Send + Sync {
    /// Open a new session for `idea`; the engine assigns the session id.
    async fn start_conversation(
        &self,
        request: StartConversationRequest,
    ) -> Result<ConversationResponse, ClientError>;

    async fn continue_conversation(
        &self,
        request: ContinueConversationRequest,
    ) -> Result<ConversationResponse, ClientError>;

    async fn generate_preview(&self, session_id: &str) -> Result<PreviewResponse, ClientError>;

    async fn capture_lead(&self, request: LeadCaptureRequest)
    -> Result<LeadCaptureAck, ClientError>;

    async fn fetch_progress(&self, session_id: &str) -> Result<ProgressSnapshot, ClientError>;

    async fn fetch_report(&self, session_id: &str) -> Result<SessionRecord, ClientError>;

    async fn refine_report(
        &self,
        request: RefineRequest,
    ) -> Result<RefinementResponse, ClientError>;

    /// Rendered report document (PDF bytes).
    async fn fetch_report_artifact(&self, session_id: &str) -> Result<Vec<u8>, ClientError>;

    async fn social_proof(&self) -> Result<SocialProof, ClientError>;

    async fn health(&self) -> Result<HealthStatus, ClientError>;
}
