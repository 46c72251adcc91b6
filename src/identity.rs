//! Identity store — anonymous visitor id and the current session pointer.
//!
//! Both values are cached in memory and written through to the key/value
//! store. A store that cannot be read or written is logged and otherwise
//! ignored: the identity keeps working for the lifetime of the process.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::{KeyValueStore, keys};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Default)]
struct Identity {
    visitor_id: Option<String>,
    session_id: Option<String>,
}

/// Owns the visitor id and session pointer for one namespace.
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    cache: RwLock<Identity>,
}

impl IdentityStore {
    /// Load any persisted identity for `namespace`.
    pub async fn open(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let visitor_id = read_string(store.as_ref(), &namespace, keys::VISITOR_ID).await;
        let session_id = read_string(store.as_ref(), &namespace, keys::SESSION_ID).await;
        debug!(
            namespace = %namespace,
            has_visitor = visitor_id.is_some(),
            has_session = session_id.is_some(),
            "Identity loaded"
        );
        Self {
            store,
            namespace,
            cache: RwLock::new(Identity {
                visitor_id,
                session_id,
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return the visitor id, creating and persisting one on first use.
    pub async fn get_or_create_visitor_id(&self) -> String {
        if let Some(id) = self.cache.read().await.visitor_id.clone() {
            return id;
        }

        let mut cache = self.cache.write().await;
        // Another caller may have created it between the two locks.
        if let Some(id) = cache.visitor_id.clone() {
            return id;
        }
        let id = generate_visitor_id();
        cache.visitor_id = Some(id.clone());
        drop(cache);

        self.persist(keys::VISITOR_ID, Some(&id)).await;
        id
    }

    /// Point at a new session, replacing any previous pointer.
    ///
    /// `issued` is the id the backend assigned to the new idea; when absent a
    /// fresh id is minted locally.
    pub async fn start_new_session(&self, issued: Option<String>) -> String {
        let id = issued
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.cache.write().await.session_id = Some(id.clone());
        self.persist(keys::SESSION_ID, Some(&id)).await;
        id
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.cache.read().await.session_id.clone()
    }

    /// Drop the session pointer. The visitor id is kept.
    pub async fn clear_session(&self) {
        self.cache.write().await.session_id = None;
        self.persist(keys::SESSION_ID, None).await;
    }

    async fn persist(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(v) => self
                .store
                .set(&self.namespace, key, &serde_json::Value::String(v.to_string()))
                .await,
            None => self.store.delete(&self.namespace, key).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(key, "Failed to persist identity, continuing in memory: {e}");
        }
    }
}

async fn read_string(store: &dyn KeyValueStore, namespace: &str, key: &str) -> Option<String> {
    match store.get(namespace, key).await {
        Ok(Some(serde_json::Value::String(s))) if !s.is_empty() => Some(s),
        Ok(_) => None,
        Err(e) => {
            warn!(key, "Failed to read identity: {e}");
            None
        }
    }
}

/// `user_<unix millis>_<9 base36 chars>`.
fn generate_visitor_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("user_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}
