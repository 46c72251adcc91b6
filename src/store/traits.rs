//! `KeyValueStore` trait — the only persistence surface the client needs.
//!
//! Every value is a JSON document addressed by `(namespace, key)`. A
//! namespace plays the role of a browser profile: identity, session pointer,
//! transcript and preview cache for one local visitor live under one
//! namespace.

use async_trait::async_trait;

use crate::error::StoreError;

/// Well-known keys written by the client.
pub mod keys {
    /// Stable anonymous visitor id.
    pub const VISITOR_ID: &str = "visitor_id";
    /// Current session pointer.
    pub const SESSION_ID: &str = "session_id";
    /// Serialized conversation transcript for the current session.
    pub const CONVERSATION: &str = "conversation_messages";
    /// Preview text cached for the current session.
    pub const PREVIEW: &str = "preview_cache";
}

/// Backend-agnostic namespaced key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent.
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert or replace a value.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Remove a value. Returns whether anything was removed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;
}
