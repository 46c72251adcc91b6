//! Progress poller — watches report generation until it finishes.
//!
//! The poller has two states. `start` moves it from idle to polling and
//! fetches immediately; each later fetch is scheduled only after the previous
//! one has answered, so at most one request is ever outstanding. Polling ends
//! when the engine reports 100%, when `stop` is called, or when the poller is
//! dropped. A fetch that is still in flight when polling is stopped runs to
//! completion but its result is thrown away.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ProgressSnapshot, RemoteSessionClient, SocialProof};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    #[default]
    Idle,
    Polling,
}

/// What observers see of the current (or last) generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressView {
    pub state: PollerState,
    pub session_id: Option<String>,
    /// Latest successful snapshot; `None` until the engine has answered.
    pub snapshot: Option<ProgressSnapshot>,
    /// Highest percentage seen this run, 0..=100.
    pub percentage: u8,
    pub last_error: Option<ClientError>,
    pub completed: bool,
}

impl ProgressView {
    pub fn label(&self) -> &'static str {
        progress_label(self.percentage)
    }
}

/// How a wait on the poller ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(ProgressView),
    Stopped,
}

pub struct ProgressPoller {
    client: Arc<dyn RemoteSessionClient>,
    interval: Duration,
    view: Arc<watch::Sender<ProgressView>>,
    running: Mutex<Option<CancellationToken>>,
}

impl ProgressPoller {
    pub fn new(client: Arc<dyn RemoteSessionClient>, interval: Duration) -> Self {
        let (view, _) = watch::channel(ProgressView::default());
        Self {
            client,
            interval,
            view: Arc::new(view),
            running: Mutex::new(None),
        }
    }

    /// Begin polling `session_id`. A run already in progress is stopped first.
    pub fn start(&self, session_id: &str) -> JoinHandle<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self.swap_running(Some(token.clone())) {
            previous.cancel();
        }

        self.view.send_replace(ProgressView {
            state: PollerState::Polling,
            session_id: Some(session_id.to_string()),
            ..Default::default()
        });
        info!(session_id, interval = ?self.interval, "Progress polling started");

        let client = Arc::clone(&self.client);
        let view = Arc::clone(&self.view);
        let interval = self.interval;
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            loop {
                let result = client.fetch_progress(&session_id).await;

                let mut done = false;
                let applied = view.send_if_modified(|v| {
                    // Checked under the view lock so nothing lands after stop().
                    if token.is_cancelled() {
                        return false;
                    }
                    apply(v, result);
                    done = v.completed;
                    true
                });
                if !applied {
                    debug!(session_id, "Discarding progress fetched after stop");
                    return;
                }
                if done {
                    info!(session_id, "Report generation complete");
                    return;
                }

                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }

    /// Halt polling. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.swap_running(None) {
            token.cancel();
            self.view.send_if_modified(|v| {
                if v.state == PollerState::Idle {
                    return false;
                }
                v.state = PollerState::Idle;
                true
            });
            debug!("Progress polling stopped");
        }
    }

    pub fn state(&self) -> PollerState {
        self.view.borrow().state
    }

    pub fn view(&self) -> ProgressView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.view.subscribe()
    }

    /// Wait until the current run completes or is stopped.
    pub async fn wait_for_completion(&self) -> PollOutcome {
        let mut rx = self.view.subscribe();
        let result = rx
            .wait_for(|v| v.completed || v.state == PollerState::Idle)
            .await
            .map(|v| v.clone());
        match result {
            Ok(view) if view.completed => PollOutcome::Completed(view),
            _ => PollOutcome::Stopped,
        }
    }

    fn swap_running(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *running, next)
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        if let Some(token) = self.swap_running(None) {
            token.cancel();
        }
    }
}

fn apply(view: &mut ProgressView, result: Result<ProgressSnapshot, ClientError>) {
    match result {
        Ok(snapshot) => {
            let reported = snapshot.progress_percentage.min(100) as u8;
            view.percentage = view.percentage.max(reported);
            view.snapshot = Some(snapshot);
            view.last_error = None;
            if view.percentage >= 100 {
                view.completed = true;
                view.state = PollerState::Idle;
            }
        }
        Err(e) => {
            warn!("Progress fetch failed, will retry: {e}");
            view.last_error = Some(e);
        }
    }
}

/// Short description of a generation percentage.
pub fn progress_label(percentage: u8) -> &'static str {
    match percentage {
        0 => "Starting...",
        1..=24 => "Analyzing requirements...",
        25..=49 => "Designing architecture...",
        50..=74 => "Creating UX flows...",
        75..=99 => "Finalizing strategy...",
        _ => "Complete!",
    }
}

/// Refresh social proof every `interval` until `token` is cancelled.
///
/// Failed refreshes keep the previous value.
pub fn spawn_social_proof_ticker(
    client: Arc<dyn RemoteSessionClient>,
    interval: Duration,
    token: CancellationToken,
) -> (JoinHandle<()>, watch::Receiver<Option<SocialProof>>) {
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tick.tick() => {}
            }
            match client.social_proof().await {
                Ok(proof) => {
                    tx.send_replace(Some(proof));
                }
                Err(e) => debug!("Social proof refresh failed: {e}"),
            }
        }
    });

    (handle, rx)
}
