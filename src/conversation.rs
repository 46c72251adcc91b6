//! Conversation log — the append-only transcript for the current session.
//!
//! The transcript is cached in memory and written through to the key/value
//! store after every append, tagged with the session it belongs to. A
//! transcript persisted for a different session than the identity's current
//! pointer is ignored on load.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::identity::IdentityStore;
use crate::store::{KeyValueStore, keys};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// One exchanged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Stored shape of the transcript.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTranscript {
    session_id: Option<String>,
    messages: Vec<ConversationMessage>,
}

#[derive(Default)]
struct LogState {
    loaded: bool,
    messages: Vec<ConversationMessage>,
}

/// Ordered, append-only record of the current session's conversation.
pub struct ConversationLog {
    store: Arc<dyn KeyValueStore>,
    identity: Arc<IdentityStore>,
    state: RwLock<LogState>,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn KeyValueStore>, identity: Arc<IdentityStore>) -> Self {
        Self {
            store,
            identity,
            state: RwLock::new(LogState::default()),
        }
    }

    /// Add a message to the tail and persist the whole transcript.
    pub async fn append(&self, message: ConversationMessage) {
        let mut state = self.state.write().await;
        self.load_into(&mut state).await;
        state.messages.push(message);
        // Persist last: the in-memory transcript already holds the message.
        self.persist(&state.messages).await;
    }

    /// All messages in insertion order.
    pub async fn all(&self) -> Vec<ConversationMessage> {
        {
            let state = self.state.read().await;
            if state.loaded {
                return state.messages.clone();
            }
        }
        let mut state = self.state.write().await;
        self.load_into(&mut state).await;
        state.messages.clone()
    }

    pub async fn len(&self) -> usize {
        self.all().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Discard the transcript, in memory and in the store.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.messages.clear();
        state.loaded = true;
        if let Err(e) = self
            .store
            .delete(self.identity.namespace(), keys::CONVERSATION)
            .await
        {
            warn!("Failed to clear persisted transcript: {e}");
        }
    }

    async fn load_into(&self, state: &mut LogState) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        let raw = match self
            .store
            .get(self.identity.namespace(), keys::CONVERSATION)
            .await
        {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read transcript, starting from memory: {e}");
                return;
            }
        };

        let persisted: PersistedTranscript = match serde_json::from_value(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!("Discarding unreadable transcript: {e}");
                return;
            }
        };

        let current = self.identity.current_session_id().await;
        if persisted.session_id != current {
            debug!(
                persisted = ?persisted.session_id,
                current = ?current,
                "Ignoring transcript from another session"
            );
            return;
        }

        // Messages appended before the first load stay after the persisted ones.
        let pending = std::mem::take(&mut state.messages);
        state.messages = persisted.messages;
        state.messages.extend(pending);
    }

    async fn persist(&self, messages: &[ConversationMessage]) {
        let transcript = PersistedTranscript {
            session_id: self.identity.current_session_id().await,
            messages: messages.to_vec(),
        };
        let value = match serde_json::to_value(&transcript) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize transcript: {e}");
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(self.identity.namespace(), keys::CONVERSATION, &value)
            .await
        {
            warn!("Failed to persist transcript, continuing in memory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn open(store: Arc<MemoryStore>) -> (Arc<IdentityStore>, ConversationLog) {
        let identity = Arc::new(IdentityStore::open(store.clone(), "default").await);
        let log = ConversationLog::new(store, identity.clone());
        (identity, log)
    }

    #[tokio::test]
    async fn append_then_reload_preserves_order() {
        let store = Arc::new(MemoryStore::new());
        let (identity, log) = open(store.clone()).await;
        identity.start_new_session(Some("s-1".into())).await;

        let contents: Vec<String> = (0..6).map(|i| format!("message {i}")).collect();
        for (i, c) in contents.iter().enumerate() {
            let msg = if i % 2 == 0 {
                ConversationMessage::agent(c)
            } else {
                ConversationMessage::user(c)
            };
            log.append(msg).await;
        }

        let (_, reloaded) = open(store).await;
        let messages = reloaded.all().await;
        assert_eq!(messages.len(), contents.len());
        for (msg, expected) in messages.iter().zip(&contents) {
            assert_eq!(&msg.content, expected);
        }
        assert_eq!(messages[0].role, Role::Agent);
        assert_eq!(messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn transcript_from_other_session_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let (identity, log) = open(store.clone()).await;
        identity.start_new_session(Some("s-1".into())).await;
        log.append(ConversationMessage::agent("hello")).await;

        identity.start_new_session(Some("s-2".into())).await;
        let (_, reloaded) = open(store).await;
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn reset_clears_store() {
        let store = Arc::new(MemoryStore::new());
        let (identity, log) = open(store.clone()).await;
        identity.start_new_session(Some("s-1".into())).await;
        log.append(ConversationMessage::user("idea")).await;

        log.reset().await;
        assert!(log.is_empty().await);
        assert!(
            store
                .get("default", keys::CONVERSATION)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unavailable_store_keeps_messages_in_memory() {
        let store = Arc::new(MemoryStore::new());
        let (identity, log) = open(store.clone()).await;
        identity.start_new_session(Some("s-1".into())).await;

        store.set_unavailable(true);
        log.append(ConversationMessage::user("one")).await;
        log.append(ConversationMessage::agent("two")).await;

        let messages = log.all().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "two");
    }

    #[test]
    fn role_serde() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
