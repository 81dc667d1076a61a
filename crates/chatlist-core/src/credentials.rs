//! Credential lookup for model configs
//!
//! Model configs only carry the *name* of an environment variable. The
//! resolver turns them into [`ResolvedModel`] snapshots right before a
//! fan-out, so workers never read the environment themselves.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{Credential, ModelConfig, ResolvedModel};

/// Key-value source of secrets
pub trait CredentialSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl CredentialSource for EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed in-memory map, mostly useful for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MapSource(HashMap<String, String>);

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl CredentialSource for MapSource {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

pub struct CredentialResolver {
    source: Box<dyn CredentialSource>,
    shared_key_var: Option<String>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("shared_key_var", &self.shared_key_var)
            .finish_non_exhaustive()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CredentialResolver {
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            shared_key_var: None,
        }
    }

    pub fn from_env() -> Self {
        Self::new(EnvSource)
    }

    /// Use one variable for every model regardless of its own reference
    pub fn with_shared_key_var(mut self, var: Option<String>) -> Self {
        self.shared_key_var = var.filter(|v| !v.trim().is_empty());
        self
    }

    /// Name of the variable that will be consulted for `config`
    pub fn source_name<'a>(&'a self, config: &'a ModelConfig) -> &'a str {
        self.shared_key_var
            .as_deref()
            .unwrap_or(config.credential_reference.as_str())
    }

    /// Attach the credential for `config`; a blank value counts as missing
    pub fn resolve(&self, config: &ModelConfig) -> ResolvedModel {
        let name = self.source_name(config);
        let credential = if name.trim().is_empty() {
            None
        } else {
            self.source
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(Credential::new)
        };
        if credential.is_none() {
            debug!(
                "No credential in '{}' for model {}",
                name, config.display_name
            );
        }
        ResolvedModel::new(config.clone(), credential).with_credential_source(name)
    }

    pub fn resolve_all(&self, configs: &[ModelConfig]) -> Vec<ResolvedModel> {
        configs.iter().map(|c| self.resolve(c)).collect()
    }
}
