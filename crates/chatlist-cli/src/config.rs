use anyhow::{Context, Result};
use chatlist_core::{FanOutConfig, OpenRouterHeaders, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatListConfig {
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_improve_timeout_secs")]
    pub improve_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_retry_non_transient")]
    pub retry_non_transient: bool,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_improve_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_secs() -> u64 {
    2
}
fn default_max_concurrency() -> usize {
    5
}
fn default_retry_non_transient() -> bool {
    true
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            improve_timeout_secs: default_improve_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            max_concurrency: default_max_concurrency(),
            retry_non_transient: default_retry_non_transient(),
        }
    }
}

/// Where secrets come from. Only variable *names* live here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// `.env` file loaded before credentials are resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    /// One variable used for every model, e.g. `OPENROUTER_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_key_var: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.chatlist/chatlist.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// TOML alias table replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_referer() -> String {
    OpenRouterHeaders::default().referer
}

fn default_title() -> String {
    OpenRouterHeaders::default().title
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            referer: default_referer(),
            title: default_title(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatlist")
}

impl ChatListConfig {
    /// Load from `custom_path`, or from `~/.chatlist/config.toml` if it exists.
    /// A missing default file yields the built-in defaults.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `chatlist init` first.",
                path.display()
            )
        })?;
        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn db_path(&self) -> PathBuf {
        shellexpand(&self.storage.db_path)
    }

    pub fn env_file(&self) -> Option<PathBuf> {
        self.credentials.env_file.as_deref().map(shellexpand)
    }

    pub fn alias_file(&self) -> Option<PathBuf> {
        self.resolver.alias_file.as_deref().map(shellexpand)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.requests.max_retries)
            .with_backoff_step(Duration::from_secs(self.requests.retry_backoff_secs))
            .with_retry_non_transient(self.requests.retry_non_transient)
    }

    pub fn fanout_config(&self) -> FanOutConfig {
        FanOutConfig {
            max_concurrency: self.requests.max_concurrency.max(1),
            timeout: Duration::from_secs(self.requests.timeout_secs),
        }
    }

    pub fn improve_timeout(&self) -> Duration {
        Duration::from_secs(self.requests.improve_timeout_secs)
    }

    pub fn openrouter_headers(&self) -> OpenRouterHeaders {
        OpenRouterHeaders {
            referer: self.openrouter.referer.clone(),
            title: self.openrouter.title.clone(),
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn shellexpand(s: &str) -> PathBuf {
    if s == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(s));
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(s).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = ChatListConfig::parse("").unwrap();
        assert_eq!(cfg, ChatListConfig::default());
        assert_eq!(cfg.requests.timeout_secs, 30);
        assert_eq!(cfg.requests.improve_timeout_secs, 60);
        assert_eq!(cfg.requests.max_concurrency, 5);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.openrouter_headers(), OpenRouterHeaders::default());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = ChatListConfig::parse(
            r#"
            [requests]
            max_retries = 0
            retry_non_transient = false

            [credentials]
            shared_key_var = "OPENROUTER_API_KEY"

            [openrouter]
            title = "My Compare Tool"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.requests.timeout_secs, 30);
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 0);
        assert!(!policy.retry_non_transient);
        assert_eq!(cfg.credentials.shared_key_var.as_deref(), Some("OPENROUTER_API_KEY"));
        assert_eq!(cfg.openrouter.title, "My Compare Tool");
        assert_eq!(cfg.openrouter.referer, default_referer());
    }

    #[test]
    fn test_bundled_default_config_parses() {
        let cfg = ChatListConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.requests, RequestsConfig::default());
        assert_eq!(cfg.storage.db_path, "~/.chatlist/chatlist.db");
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\ndb_path = \"/tmp/x.db\"\n").unwrap();

        let cfg = ChatListConfig::load(&Some(path)).unwrap();
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/x.db"));

        let missing = ChatListConfig::load(&Some(dir.path().join("nope.toml")));
        assert!(missing.is_err());
    }

    #[test]
    fn test_shellexpand() {
        assert_eq!(shellexpand("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(shellexpand("~/x.db"), home.join("x.db"));
        }
    }
}
