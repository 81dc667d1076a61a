//! Model display-name resolution
//!
//! Turns a free-form display name ("GPT-4", "Groq Llama 3", "openai/gpt-4")
//! into the identifier a provider expects in the `model` field. All catalog
//! knowledge lives in a TOML table (see `data/model_aliases.toml`) so it can be
//! replaced without touching dispatch code. Resolution is a pure function of
//! the table and the input.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::ResolverError;
use crate::types::ProviderKind;

/// Built-in alias table, compiled into the binary
pub const BUILTIN_ALIAS_TABLE: &str = include_str!("../data/model_aliases.toml");

/// Separator between provider qualifier and model name in aggregator ids
const QUALIFIER_SEPARATOR: char = '/';

/// A keyword rule: matches when any of `any` is present, or all of `all` are
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KeywordRule {
    #[serde(default)]
    pub any: Vec<String>,
    #[serde(default)]
    pub all: Vec<String>,
    pub target: String,
}

impl KeywordRule {
    fn matches(&self, name: &str) -> bool {
        let any_hit = !self.any.is_empty() && self.any.iter().any(|k| name.contains(k.as_str()));
        let all_hit = !self.all.is_empty() && self.all.iter().all(|k| name.contains(k.as_str()));
        any_hit || all_hit
    }
}

/// Literal model strings for one direct provider API
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DirectTable {
    pub default: String,
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
}

/// Versioned resolution data
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AliasTable {
    pub default: String,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub remapped_prefixes: HashMap<String, String>,
    #[serde(default)]
    pub heuristics: Vec<KeywordRule>,
    #[serde(default)]
    pub direct: HashMap<String, DirectTable>,
}

impl AliasTable {
    pub fn from_toml_str(s: &str) -> Result<Self, ResolverError> {
        let mut table: Self = toml::from_str(s)?;
        // Lookups run on normalized names, so normalize the keys once here.
        table.aliases = table
            .aliases
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        table.remapped_prefixes = table
            .remapped_prefixes
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        Ok(table)
    }
}

/// Maps display names to provider model identifiers
#[derive(Debug, Clone)]
pub struct ModelNameResolver {
    table: AliasTable,
}

impl Default for ModelNameResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelNameResolver {
    pub fn new(table: AliasTable) -> Self {
        Self { table }
    }

    /// Resolver backed by the embedded table
    pub fn builtin() -> Self {
        match AliasTable::from_toml_str(BUILTIN_ALIAS_TABLE) {
            Ok(table) => Self::new(table),
            // The embedded table is covered by tests; an empty table still resolves to a safe id.
            Err(e) => {
                tracing::error!("Built-in alias table is invalid: {}", e);
                Self::new(AliasTable {
                    default: "openai/gpt-4o-mini".to_string(),
                    aliases: HashMap::new(),
                    remapped_prefixes: HashMap::new(),
                    heuristics: Vec::new(),
                    direct: HashMap::new(),
                })
            }
        }
    }

    /// Load a replacement table from a TOML file
    pub fn from_path(path: &Path) -> Result<Self, ResolverError> {
        let content = std::fs::read_to_string(path).map_err(|source| ResolverError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(AliasTable::from_toml_str(&content)?))
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }

    /// Resolve `name` for the given provider.
    ///
    /// Direct providers with a table entry get a literal model string; the
    /// aggregator and unspecified providers get a `provider/model` id. Unknown
    /// kinds are dispatched through the OpenAI adapter, so they use its table.
    pub fn resolve(&self, name: &str, provider: Option<ProviderKind>) -> String {
        match provider {
            Some(ProviderKind::Unknown) => self.resolve(name, Some(ProviderKind::OpenAi)),
            Some(kind) if kind != ProviderKind::OpenRouter => {
                match self.table.direct.get(kind.as_str()) {
                    Some(direct) => resolve_direct(direct, name),
                    None => self.resolve_qualified(name),
                }
            }
            _ => self.resolve_qualified(name),
        }
    }

    /// Resolve to an aggregator-style `provider/model` identifier
    pub fn resolve_qualified(&self, name: &str) -> String {
        let normalized = normalize(name);

        if let Some(target) = self.table.aliases.get(&normalized) {
            debug!("Resolved '{}' via alias table to '{}'", name, target);
            return target.clone();
        }

        if let Some((qualifier, _)) = normalized.split_once(QUALIFIER_SEPARATOR) {
            if let Some(target) = self.table.remapped_prefixes.get(qualifier.trim()) {
                debug!(
                    "Remapped unsupported qualifier '{}' in '{}' to '{}'",
                    qualifier, name, target
                );
                return target.clone();
            }
            return normalized;
        }

        for rule in &self.table.heuristics {
            if rule.matches(&normalized) {
                debug!("Resolved '{}' via keyword heuristic to '{}'", name, rule.target);
                return rule.target.clone();
            }
        }

        debug!(
            "No resolution rule matched '{}', using default '{}'",
            name, self.table.default
        );
        self.table.default.clone()
    }
}

fn resolve_direct(direct: &DirectTable, name: &str) -> String {
    let normalized = normalize(name);
    if let Some((_, model)) = normalized.split_once(QUALIFIER_SEPARATOR) {
        let model = model.trim();
        if !model.is_empty() {
            return model.to_string();
        }
    }
    direct
        .rules
        .iter()
        .find(|rule| rule.matches(&normalized))
        .map(|rule| rule.target.clone())
        .unwrap_or_else(|| direct.default.clone())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
