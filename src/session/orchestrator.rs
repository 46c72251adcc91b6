//! SessionOrchestrator — sequences remote calls around the pure reducer.
//!
//! Every state change goes through [`reduce`]; this type only decides which
//! remote call to make, turns its answer into an event, and keeps the
//! identity, transcript and preview cache in step with the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use super::model::{ReportContext, ReportSection, Session};
use super::reducer::{SessionEvent, reduce};
use super::report::{ExportFormat, export_file_name, render};
use super::stage::Stage;
use crate::client::{
    ContinueConversationRequest, ConversationResponse, LeadCaptureAck, RefineRequest,
    RemoteSessionClient, SocialProof, StartConversationRequest,
};
use crate::config::ClientConfig;
use crate::conversation::{ConversationLog, ConversationMessage};
use crate::error::{ClientError, Error, Result, SessionError, ValidationError};
use crate::identity::IdentityStore;
use crate::progress::{PollOutcome, PollerState, ProgressPoller, ProgressView};
use crate::store::{KeyValueStore, keys};
use crate::validation::validate_lead;

/// Shown in place of an engine reply that never arrived.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

const MIN_IDEA_CHARS: usize = 10;
const MIN_REFINEMENT_CHARS: usize = 10;

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub client: Arc<dyn RemoteSessionClient>,
    pub store: Arc<dyn KeyValueStore>,
    pub identity: Arc<IdentityStore>,
    pub conversation: Arc<ConversationLog>,
    pub poll_interval: Duration,
}

impl OrchestratorDeps {
    /// Wire up identity and transcript on top of `store`.
    pub async fn open(
        config: &ClientConfig,
        client: Arc<dyn RemoteSessionClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let identity = Arc::new(IdentityStore::open(store.clone(), config.namespace.clone()).await);
        let conversation = Arc::new(ConversationLog::new(store.clone(), identity.clone()));
        Self {
            client,
            store,
            identity,
            conversation,
            poll_interval: config.poll_interval,
        }
    }
}

/// Emitted whenever a session moves to a new stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChange {
    pub session_id: String,
    /// `None` when a session was just created or resumed.
    pub from: Option<Stage>,
    pub to: Stage,
}

/// The engine's answer to a visitor message, or the apology standing in for it.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: ConversationMessage,
    pub requirements_complete: bool,
    /// Set when the engine could not be reached; `message` is then the apology.
    pub error: Option<ClientError>,
}

/// Result of an accepted refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub changes_summary: Option<String>,
    pub new_version: Option<u32>,
    pub refinements_left: u32,
    /// Sections whose text actually changed locally.
    pub updated_sections: Vec<ReportSection>,
    /// Set when the refined report could not be fetched. The budget is spent
    /// either way; [`SessionOrchestrator::reload_report`] picks up the text.
    pub refetch_error: Option<ClientError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedPreview {
    session_id: String,
    preview: String,
}

pub struct SessionOrchestrator {
    client: Arc<dyn RemoteSessionClient>,
    store: Arc<dyn KeyValueStore>,
    identity: Arc<IdentityStore>,
    conversation: Arc<ConversationLog>,
    poller: ProgressPoller,
    session: RwLock<Option<Session>>,
    send_guard: Mutex<()>,
    preview_guard: Mutex<()>,
    lead_guard: Mutex<()>,
    report_guard: Mutex<()>,
    refine_guard: Mutex<()>,
    stage_tx: broadcast::Sender<StageChange>,
}

impl SessionOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        let (stage_tx, _) = broadcast::channel(32);
        Self {
            poller: ProgressPoller::new(deps.client.clone(), deps.poll_interval),
            client: deps.client,
            store: deps.store,
            identity: deps.identity,
            conversation: deps.conversation,
            session: RwLock::new(None),
            send_guard: Mutex::new(()),
            preview_guard: Mutex::new(()),
            lead_guard: Mutex::new(()),
            report_guard: Mutex::new(()),
            refine_guard: Mutex::new(()),
            stage_tx,
        }
    }

    // ── Observers ─────────────────────────────────────────────────────

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn transcript(&self) -> Vec<ConversationMessage> {
        self.conversation.all().await
    }

    pub fn subscribe_stages(&self) -> broadcast::Receiver<StageChange> {
        self.stage_tx.subscribe()
    }

    pub fn progress(&self) -> watch::Receiver<ProgressView> {
        self.poller.subscribe()
    }

    pub fn client(&self) -> Arc<dyn RemoteSessionClient> {
        self.client.clone()
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    /// Probe the engine so a cold backend starts waking up. Never fails.
    pub async fn warm_up(&self) {
        match self.client.health().await {
            Ok(h) if h.is_healthy() => debug!("Engine healthy"),
            Ok(h) => debug!(status = %h.status, "Engine answered health probe"),
            Err(e) => debug!("Health probe failed: {e}"),
        }
    }

    pub async fn social_proof(&self) -> std::result::Result<SocialProof, ClientError> {
        self.client.social_proof().await
    }

    // ── Conversation ──────────────────────────────────────────────────

    /// Submit a new idea, replacing whatever session came before.
    pub async fn start(&self, idea: &str) -> Result<ConversationResponse> {
        let idea = idea.trim();
        if idea.chars().count() < MIN_IDEA_CHARS {
            return Err(ValidationError::single(
                "idea",
                "Please provide more details about your idea (at least 10 characters)",
            )
            .into());
        }

        let _send = self
            .send_guard
            .try_lock()
            .map_err(|_| SessionError::SendInFlight)?;

        let visitor_id = self.identity.get_or_create_visitor_id().await;
        let response = self
            .client
            .start_conversation(StartConversationRequest {
                user_id: visitor_id,
                idea: idea.to_string(),
            })
            .await?;

        // The previous session is only abandoned once the engine has accepted
        // the new idea.
        self.poller.stop();
        self.clear_preview_cache().await;
        let session_id = self
            .identity
            .start_new_session(Some(response.session_id.clone()))
            .await;
        self.conversation.reset().await;
        self.conversation
            .append(ConversationMessage::agent(&response.agent_response))
            .await;

        let mut session = Session::new(&session_id);
        if response.requirements_complete {
            session = reduce(&session, SessionEvent::RequirementsCompleted)?;
        }
        info!(session_id = %session_id, stage = %session.stage, "Session started");
        self.replace_session(Some(session)).await;

        Ok(response)
    }

    /// Send a visitor message in the conversation stage.
    ///
    /// Only one send per session may be outstanding; a second one is refused
    /// with [`SessionError::SendInFlight`] rather than queued. Engine failures
    /// become an apology in the transcript instead of an error.
    pub async fn send_message(&self, text: &str) -> Result<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::single("message", "Message cannot be empty").into());
        }

        let _send = self
            .send_guard
            .try_lock()
            .map_err(|_| SessionError::SendInFlight)?;

        let session_id = self.require_stage(Stage::Conversation).await?.session_id;

        self.conversation
            .append(ConversationMessage::user(text))
            .await;

        let result = self
            .client
            .continue_conversation(ContinueConversationRequest {
                session_id: session_id.clone(),
                message: text.to_string(),
            })
            .await;

        match result {
            Ok(response) => {
                let message = ConversationMessage::agent(&response.agent_response);
                self.conversation.append(message.clone()).await;
                if response.requirements_complete {
                    self.apply(&session_id, SessionEvent::RequirementsCompleted)
                        .await?;
                }
                Ok(Reply {
                    message,
                    requirements_complete: response.requirements_complete,
                    error: None,
                })
            }
            Err(e) => {
                warn!(session_id = %session_id, "Conversation call failed: {e}");
                let message = ConversationMessage::agent(APOLOGY);
                self.conversation.append(message.clone()).await;
                Ok(Reply {
                    message,
                    requirements_complete: false,
                    error: Some(e),
                })
            }
        }
    }

    // ── Preview ───────────────────────────────────────────────────────

    /// The session's preview, generated at most once per session.
    pub async fn load_preview(&self) -> Result<String> {
        let _preview = self.preview_guard.lock().await;

        let session = self.current().await?;
        if let Some(preview) = session.preview.clone() {
            return Ok(preview);
        }
        if session.stage != Stage::Preview {
            return Err(SessionError::InvalidStage {
                expected: Stage::Preview,
                actual: session.stage,
            }
            .into());
        }

        let preview = match self.cached_preview(&session.session_id).await {
            Some(cached) => {
                debug!(session_id = %session.session_id, "Preview served from cache");
                cached
            }
            None => {
                let response = self.client.generate_preview(&session.session_id).await?;
                self.persist_preview(&session.session_id, &response.preview)
                    .await;
                response.preview
            }
        };

        self.apply(
            &session.session_id,
            SessionEvent::PreviewLoaded {
                preview: preview.clone(),
            },
        )
        .await?;
        Ok(preview)
    }

    // ── Lead capture and generation ───────────────────────────────────

    /// Validate and submit contact details, then start report generation.
    ///
    /// Validation failures never reach the engine. A rejection by the engine
    /// leaves the session in the preview stage.
    pub async fn capture_lead(
        &self,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<LeadCaptureAck> {
        let _lead = self.lead_guard.lock().await;

        let session = self.require_stage(Stage::Preview).await?;
        if session.lead_captured {
            return Err(SessionError::LeadAlreadyCaptured.into());
        }

        let request = validate_lead(&session.session_id, name, email, phone)?;
        let ack = self.client.capture_lead(request).await?;
        info!(
            session_id = %session.session_id,
            lead_id = %ack.lead_id,
            email_sent = ack.email_sent,
            "Lead captured"
        );

        self.apply(&session.session_id, SessionEvent::LeadAccepted)
            .await?;
        self.apply(&session.session_id, SessionEvent::GenerationStarted)
            .await?;
        self.poller.start(&session.session_id);

        Ok(ack)
    }

    /// Wait for generation to finish, then fetch the report once.
    ///
    /// If the fetch fails the session stays in `Generating`; call
    /// [`retry_report_fetch`](Self::retry_report_fetch) to try again.
    pub async fn await_report(&self) -> Result<Session> {
        let session = self.current().await?;
        match session.stage {
            Stage::ReportComplete => return Ok(session),
            Stage::Generating => {}
            actual => {
                return Err(SessionError::InvalidStage {
                    expected: Stage::Generating,
                    actual,
                }
                .into());
            }
        }

        if !self.generation_finished(&session.session_id) {
            match self.poller.wait_for_completion().await {
                PollOutcome::Completed(view) => {
                    debug!(
                        session_id = %session.session_id,
                        percentage = view.percentage,
                        "Generation finished"
                    );
                }
                PollOutcome::Stopped => return Err(SessionError::PollingStopped.into()),
            }
        }

        self.fetch_report_into(&session.session_id).await
    }

    /// Manual retry after a failed report fetch. Does not restart polling.
    ///
    /// Only allowed once the poller has seen this session reach 100%.
    pub async fn retry_report_fetch(&self) -> Result<Session> {
        let session = self.require_stage(Stage::Generating).await?;
        if !self.generation_finished(&session.session_id) {
            return Err(SessionError::GenerationInProgress.into());
        }
        self.fetch_report_into(&session.session_id).await
    }

    /// Fetch the report again while in `ReportComplete`.
    ///
    /// Recovers text from an accepted refinement whose follow-up fetch
    /// failed. The engine's sections replace local ones; budget only shrinks.
    pub async fn reload_report(&self) -> Result<Session> {
        let _report = self.report_guard.lock().await;

        let session = self.require_stage(Stage::ReportComplete).await?;
        let record = self.client.fetch_report(&session.session_id).await?;
        self.apply(
            &session.session_id,
            SessionEvent::ReportLoaded {
                context: record.context,
                lead_score: record.lead_score,
                refinements_left: record.refinements_left,
            },
        )
        .await
    }

    /// Start polling again for a session left in `Generating`.
    pub async fn resume_progress(&self) -> Result<()> {
        let session = self.require_stage(Stage::Generating).await?;
        if self.poller.state() == PollerState::Idle {
            self.poller.start(&session.session_id);
        }
        Ok(())
    }

    /// Stop progress polling, e.g. when the visitor leaves the progress view.
    pub fn stop_progress(&self) {
        self.poller.stop();
    }

    async fn fetch_report_into(&self, session_id: &str) -> Result<Session> {
        let _report = self.report_guard.lock().await;

        if let Some(current) = self.session().await {
            if current.session_id == session_id && current.stage == Stage::ReportComplete {
                return Ok(current);
            }
        }

        let record = self.client.fetch_report(session_id).await.map_err(|e| {
            warn!(session_id, "Report fetch failed, staying in generating: {e}");
            e
        })?;

        self.apply(
            session_id,
            SessionEvent::ReportLoaded {
                context: record.context,
                lead_score: record.lead_score,
                refinements_left: record.refinements_left,
            },
        )
        .await
    }

    // ── Report ────────────────────────────────────────────────────────

    /// Ask the engine to revise the report with `additional_info`.
    ///
    /// Nothing is sent once the budget is spent. An accepted refinement costs
    /// exactly one unit of budget; a rejected one costs nothing and changes
    /// nothing.
    pub async fn refine(&self, additional_info: &str) -> Result<RefinementOutcome> {
        let additional_info = additional_info.trim();
        if additional_info.chars().count() < MIN_REFINEMENT_CHARS {
            return Err(ValidationError::single(
                "additional_info",
                "Please provide more details (at least 10 characters)",
            )
            .into());
        }

        let _refine = self.refine_guard.lock().await;

        let session = self.require_stage(Stage::ReportComplete).await?;
        if session.refinements_left == 0 {
            return Err(SessionError::BudgetExhausted.into());
        }

        let response = self
            .client
            .refine_report(RefineRequest {
                session_id: session.session_id.clone(),
                additional_info: additional_info.to_string(),
            })
            .await?;

        if !response.success {
            info!(
                session_id = %session.session_id,
                error = ?response.error,
                "Refinement rejected"
            );
            return Err(SessionError::RefinementRejected {
                message: response.rejection_message(),
                cta_url: response.cta_url.clone(),
            }
            .into());
        }

        let (updates, refetch_error) = match self.client.fetch_report(&session.session_id).await {
            Ok(record) => (record.context, None),
            Err(e) => {
                warn!(session_id = %session.session_id, "Refined report fetch failed: {e}");
                (ReportContext::default(), Some(e))
            }
        };

        let before = session.context.clone();
        let updated = self
            .apply(
                &session.session_id,
                SessionEvent::RefinementAccepted {
                    updates,
                    sections: response.sections(),
                },
            )
            .await?;

        let updated_sections = ReportSection::ALL
            .into_iter()
            .filter(|s| before.get(*s) != updated.context.get(*s))
            .collect();
        info!(
            session_id = %updated.session_id,
            refinements_left = updated.refinements_left,
            "Refinement applied"
        );

        Ok(RefinementOutcome {
            changes_summary: response.changes_summary,
            new_version: response.new_version,
            refinements_left: updated.refinements_left,
            updated_sections,
            refetch_error,
        })
    }

    /// Save the rendered report document into `dir`.
    pub async fn download_report(&self, dir: &Path) -> Result<PathBuf> {
        let session = self.require_stage(Stage::ReportComplete).await?;
        let bytes = self
            .client
            .fetch_report_artifact(&session.session_id)
            .await?;

        let path = dir.join(export_file_name(&session.session_id, "pdf"));
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Report saved");
        Ok(path)
    }

    /// Write the report text or JSON into `dir`.
    pub async fn export_report(&self, dir: &Path, format: ExportFormat) -> Result<PathBuf> {
        let session = self.require_stage(Stage::ReportComplete).await?;
        let content = render(&session.context, format)
            .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;

        let path = dir.join(export_file_name(&session.session_id, format.extension()));
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Rebuild the session from the persisted pointer and the engine's record.
    ///
    /// Returns `None` when there is nothing to resume. A session the engine
    /// no longer knows is forgotten locally.
    pub async fn resume(&self) -> Result<Option<Session>> {
        let Some(session_id) = self.identity.current_session_id().await else {
            return Ok(None);
        };

        let record = match self.client.fetch_report(&session_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                info!(session_id = %session_id, "Session unknown to engine, clearing");
                self.restart().await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut session = Session::from_record(&record);
        session.session_id = session_id.clone();
        if session.stage >= Stage::Preview {
            session.preview = self.cached_preview(&session_id).await;
        }

        if let Some(history) = &record.conversation_history {
            if self.conversation.is_empty().await {
                for entry in history {
                    self.conversation.append(entry.to_message()).await;
                }
            }
        }

        info!(session_id = %session_id, stage = %session.stage, "Session resumed");
        let generating = session.stage == Stage::Generating;
        self.replace_session(Some(session.clone())).await;
        if generating {
            self.poller.start(&session_id);
        }
        Ok(Some(session))
    }

    /// Forget the current session. The visitor id is kept.
    pub async fn restart(&self) {
        self.poller.stop();
        self.clear_preview_cache().await;
        self.identity.clear_session().await;
        self.conversation.reset().await;
        self.replace_session(None).await;
    }

    // ── Internals ─────────────────────────────────────────────────────

    async fn current(&self) -> Result<Session> {
        self.session()
            .await
            .ok_or_else(|| SessionError::NoActiveSession.into())
    }

    fn generation_finished(&self, session_id: &str) -> bool {
        let view = self.poller.view();
        view.completed && view.session_id.as_deref() == Some(session_id)
    }

    async fn require_stage(&self, expected: Stage) -> Result<Session> {
        let session = self.current().await?;
        if session.stage != expected {
            return Err(SessionError::InvalidStage {
                expected,
                actual: session.stage,
            }
            .into());
        }
        Ok(session)
    }

    /// Reduce `event` into the current session, provided it is still
    /// `session_id`.
    async fn apply(&self, session_id: &str, event: SessionEvent) -> Result<Session> {
        let mut guard = self.session.write().await;
        let current = match guard.as_ref() {
            Some(s) if s.session_id == session_id => s,
            _ => {
                debug!(session_id, event = event.name(), "Session replaced, dropping event");
                return Err(SessionError::NoActiveSession.into());
            }
        };

        let event_name = event.name();
        let next = reduce(current, event)?;
        if next.stage != current.stage {
            info!(
                session_id,
                from = %current.stage,
                to = %next.stage,
                event = event_name,
                "Stage transition"
            );
            let _ = self.stage_tx.send(StageChange {
                session_id: session_id.to_string(),
                from: Some(current.stage),
                to: next.stage,
            });
        }
        *guard = Some(next.clone());
        Ok(next)
    }

    async fn replace_session(&self, session: Option<Session>) {
        let change = session.as_ref().map(|s| StageChange {
            session_id: s.session_id.clone(),
            from: None,
            to: s.stage,
        });
        *self.session.write().await = session;
        if let Some(change) = change {
            let _ = self.stage_tx.send(change);
        }
    }

    async fn cached_preview(&self, session_id: &str) -> Option<String> {
        let raw = match self.store.get(self.identity.namespace(), keys::PREVIEW).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read preview cache: {e}");
                return None;
            }
        };
        let cached: CachedPreview = serde_json::from_value(raw).ok()?;
        (cached.session_id == session_id).then_some(cached.preview)
    }

    async fn persist_preview(&self, session_id: &str, preview: &str) {
        let cached = CachedPreview {
            session_id: session_id.to_string(),
            preview: preview.to_string(),
        };
        let result = match serde_json::to_value(&cached) {
            Ok(value) => {
                self.store
                    .set(self.identity.namespace(), keys::PREVIEW, &value)
                    .await
            }
            Err(e) => {
                warn!("Failed to serialize preview: {e}");
                return;
            }
        };
        if let Err(e) = result {
            warn!("Failed to persist preview, continuing in memory: {e}");
        }
    }

    async fn clear_preview_cache(&self) {
        if let Err(e) = self
            .store
            .delete(self.identity.namespace(), keys::PREVIEW)
            .await
        {
            warn!("Failed to clear preview cache: {e}");
        }
    }
}
