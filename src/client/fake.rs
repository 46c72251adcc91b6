//! Scripted in-process client for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::RemoteSessionClient;
use super::types::*;
use crate::error::ClientError;
use crate::session::ReportContext;

/// Queue of canned results for one operation. An empty queue answers with a
/// transport error so unscripted calls are visible in assertions.
pub(crate) struct Script<T> {
    queue: Mutex<VecDeque<Result<T, ClientError>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Script<T> {
    pub fn ok(&self, value: T) -> &Self {
        self.queue.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn err(&self, error: ClientError) -> &Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    fn next(&self, op: &str) -> Result<T, ClientError> {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::transport(format!("unscripted call: {op}"))))
    }
}

#[derive(Default)]
pub(crate) struct FakeClient {
    pub start: Script<ConversationResponse>,
    pub reply: Script<ConversationResponse>,
    pub preview: Script<PreviewResponse>,
    pub lead: Script<LeadCaptureAck>,
    pub progress: Script<ProgressSnapshot>,
    pub report: Script<SessionRecord>,
    pub refine: Script<RefinementResponse>,
    pub artifact: Script<Vec<u8>>,
    pub proof: Script<SocialProof>,
    pub health: Script<HealthStatus>,
    pub lead_requests: Mutex<Vec<LeadCaptureRequest>>,
    pub refine_requests: Mutex<Vec<RefineRequest>>,
    calls: Mutex<Vec<&'static str>>,
    latency: Mutex<Option<Duration>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    async fn enter(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

pub(crate) fn conversation(session_id: &str, text: &str, complete: bool) -> ConversationResponse {
    ConversationResponse {
        session_id: session_id.to_string(),
        agent_response: text.to_string(),
        requirements_complete: complete,
        next_step: if complete { "preview" } else { "continue" }.to_string(),
        ..Default::default()
    }
}

pub(crate) fn preview(session_id: &str, text: &str) -> PreviewResponse {
    PreviewResponse {
        session_id: session_id.to_string(),
        preview: text.to_string(),
        full_preview_available: true,
        next_step: "capture_lead".to_string(),
        social_proof: None,
    }
}

pub(crate) fn progress(session_id: &str, percentage: u32) -> ProgressSnapshot {
    ProgressSnapshot {
        session_id: session_id.to_string(),
        stage: "generating_full_report".to_string(),
        current_stage: None,
        progress_percentage: percentage,
        testimonial: "Saved us months".to_string(),
        metric: "500+ agents designed".to_string(),
    }
}

pub(crate) fn full_context(tag: &str) -> ReportContext {
    ReportContext {
        requirement_gathering: Some(format!("{tag} requirements")),
        technical_architecture: Some(format!("{tag} architecture")),
        ux_design: Some(format!("{tag} ux")),
        business_strategy: Some(format!("{tag} strategy")),
    }
}

pub(crate) fn record(session_id: &str, stage: &str, context: ReportContext) -> SessionRecord {
    SessionRecord {
        session_id: session_id.to_string(),
        user_id: "user_1".to_string(),
        idea: "A planner for dog walkers".to_string(),
        stage: stage.to_string(),
        context,
        lead_captured: stage != "conversation" && !stage.starts_with("preview"),
        refinements_left: 2,
        lead_score: 64.0,
        conversation_history: None,
    }
}

#[async_trait]
impl RemoteSessionClient for FakeClient {
    async fn start_conversation(
        &self,
        _request: StartConversationRequest,
    ) -> Result<ConversationResponse, ClientError> {
        self.enter("start").await;
        self.start.next("start")
    }

    async fn continue_conversation(
        &self,
        _request: ContinueConversationRequest,
    ) -> Result<ConversationResponse, ClientError> {
        self.enter("reply").await;
        self.reply.next("reply")
    }

    async fn generate_preview(&self, _session_id: &str) -> Result<PreviewResponse, ClientError> {
        self.enter("preview").await;
        self.preview.next("preview")
    }

    async fn capture_lead(
        &self,
        request: LeadCaptureRequest,
    ) -> Result<LeadCaptureAck, ClientError> {
        self.enter("lead").await;
        self.lead_requests.lock().unwrap().push(request);
        self.lead.next("lead")
    }

    async fn fetch_progress(&self, _session_id: &str) -> Result<ProgressSnapshot, ClientError> {
        self.enter("progress").await;
        self.progress.next("progress")
    }

    async fn fetch_report(&self, _session_id: &str) -> Result<SessionRecord, ClientError> {
        self.enter("report").await;
        self.report.next("report")
    }

    async fn refine_report(
        &self,
        request: RefineRequest,
    ) -> Result<RefinementResponse, ClientError> {
        self.enter("refine").await;
        self.refine_requests.lock().unwrap().push(request);
        self.refine.next("refine")
    }

    async fn fetch_report_artifact(&self, _session_id: &str) -> Result<Vec<u8>, ClientError> {
        self.enter("artifact").await;
        self.artifact.next("artifact")
    }

    async fn social_proof(&self) -> Result<SocialProof, ClientError> {
        self.enter("proof").await;
        self.proof.next("proof")
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.enter("health").await;
        self.health.next("health")
    }
}
