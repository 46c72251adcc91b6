//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default backend URL when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Client configuration, usually built from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the analysis backend.
    pub api_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay between progress fetches while a report is generating.
    pub poll_interval: Duration,
    /// Delay between social proof refreshes.
    pub social_proof_interval: Duration,
    /// libSQL database path, or `:memory:`.
    pub db_path: String,
    /// Where downloaded report artifacts are written.
    pub download_dir: PathBuf,
    /// Storage namespace (one per local profile).
    pub namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            social_proof_interval: Duration::from_secs(10),
            db_path: "./data/idea-consult.db".to_string(),
            download_dir: PathBuf::from("."),
            namespace: "default".to_string(),
        }
    }
}

impl ClientConfig {
    /// Build config from `IDEA_CONSULT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("IDEA_CONSULT_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.api_url);

        let request_timeout = secs_var(&lookup, "IDEA_CONSULT_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout);
        let poll_interval = secs_var(&lookup, "IDEA_CONSULT_POLL_INTERVAL_SECS")?
            .unwrap_or(defaults.poll_interval);
        let social_proof_interval = secs_var(&lookup, "IDEA_CONSULT_SOCIAL_PROOF_INTERVAL_SECS")?
            .unwrap_or(defaults.social_proof_interval);

        let db_path = lookup("IDEA_CONSULT_DB_PATH").unwrap_or(defaults.db_path);
        let download_dir = lookup("IDEA_CONSULT_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);
        let namespace = lookup("IDEA_CONSULT_NAMESPACE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.namespace);

        Ok(Self {
            api_url,
            request_timeout,
            poll_interval,
            social_proof_interval,
            db_path,
            download_dir,
            namespace,
        })
    }
}

/// Parse a seconds value. Unparseable values fall back to the default;
/// zero is rejected since every interval here drives a timer.
fn secs_var<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable duration, using default");
            Ok(None)
        }
    }
}
