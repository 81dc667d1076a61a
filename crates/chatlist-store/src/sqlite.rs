//! SQLite storage for prompts, model configs, saved results and settings

use anyhow::{Context, Result};
use chatlist_core::{DispatchResult, ModelConfig, ProviderKind, validate_model_fields};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Saved prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

/// Fields for a new model config
#[derive(Debug, Clone, PartialEq)]
pub struct NewModel {
    pub display_name: String,
    pub api_base_url: String,
    pub credential_reference: String,
    /// Detected from the URL when absent
    pub provider_kind: Option<ProviderKind>,
    pub is_active: bool,
}

/// Partial update of a model config; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelUpdate {
    pub display_name: Option<String>,
    pub api_base_url: Option<String>,
    pub credential_reference: Option<String>,
    pub provider_kind: Option<ProviderKind>,
    pub is_active: Option<bool>,
}

impl ModelUpdate {
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.api_base_url.is_none()
            && self.credential_reference.is_none()
            && self.provider_kind.is_none()
            && self.is_active.is_none()
    }
}

/// A saved response joined with its model name and prompt text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResult {
    pub id: i64,
    pub prompt_id: i64,
    pub model_id: i64,
    pub response: String,
    pub saved_at: DateTime<Utc>,
    pub tokens_used: Option<u64>,
    pub response_time: Option<f64>,
    pub model_name: String,
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

const SEED_MODELS: [(&str, &str, &str, ProviderKind); 3] = [
    (
        "GPT-4",
        "https://api.openai.com/v1/chat/completions",
        "OPENAI_API_KEY",
        ProviderKind::OpenAi,
    ),
    (
        "DeepSeek Chat",
        "https://api.deepseek.com/v1/chat/completions",
        "DEEPSEEK_API_KEY",
        ProviderKind::DeepSeek,
    ),
    (
        "Groq Llama 3",
        "https://api.groq.com/openai/v1/chat/completions",
        "GROQ_API_KEY",
        ProviderKind::Groq,
    ),
];

const SEED_SETTINGS: [(&str, &str, &str); 3] = [
    ("theme", "light", "Interface theme (light/dark)"),
    ("api_timeout", "30", "API request timeout in seconds"),
    (
        "default_export_format",
        "markdown",
        "Default export format (markdown/json)",
    ),
];

const MODEL_COLUMNS: &str = "id, name, api_url, api_id, is_active, model_type";

const RESULT_SELECT: &str = "SELECT r.id, r.prompt_id, r.model_id, r.response, r.saved_at,
            r.tokens_used, r.response_time, m.name, p.prompt
     FROM results r
     JOIN models m ON r.model_id = m.id
     JOIN prompts p ON r.prompt_id = p.id";

/// SQLite database wrapper (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct ChatDb {
    conn: Arc<Mutex<Connection>>,
}

impl ChatDb {
    /// Open the database, create the schema and seed sample data on first use
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn =
            Connection::open(path.as_ref()).context("Failed to open SQLite database")?;

        info!("Initializing chatlist database at {:?}", path.as_ref());

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                prompt TEXT NOT NULL,
                tags TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_prompts_date ON prompts(date);
            CREATE INDEX IF NOT EXISTS idx_prompts_tags ON prompts(tags);

            CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                api_url TEXT NOT NULL,
                api_id TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                model_type TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_models_is_active ON models(is_active);

            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt_id INTEGER NOT NULL,
                model_id INTEGER NOT NULL,
                response TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                tokens_used INTEGER,
                response_time REAL,
                FOREIGN KEY (prompt_id) REFERENCES prompts(id) ON DELETE CASCADE,
                FOREIGN KEY (model_id) REFERENCES models(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_results_prompt_id ON results(prompt_id);
            CREATE INDEX IF NOT EXISTS idx_results_model_id ON results(model_id);
            CREATE INDEX IF NOT EXISTS idx_results_saved_at ON results(saved_at);

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT,
                description TEXT,
                updated_at TEXT NOT NULL
            );",
        )
        .context("Failed to create database schema")?;

        Self::seed(&conn)?;
        debug!("Database schema initialized successfully");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn seed(conn: &Connection) -> Result<()> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction()?;
        for (name, url, key_var, kind) in SEED_MODELS {
            tx.execute(
                "INSERT INTO models (name, api_url, api_id, is_active, model_type, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![name, url, key_var, kind.as_str(), &now],
            )?;
        }
        for (key, value, description) in SEED_SETTINGS {
            tx.execute(
                "INSERT OR IGNORE INTO settings (key, value, description, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, value, description, &now],
            )?;
        }
        tx.commit()?;

        info!("Seeded database with {} sample models", SEED_MODELS.len());
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            f(&conn)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    // ---- prompts ----

    pub async fn create_prompt(&self, text: &str, tags: Option<&str>) -> Result<i64> {
        let text = text.to_owned();
        let tags = tags.map(str::to_owned).filter(|t| !t.trim().is_empty());

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO prompts (date, prompt, tags) VALUES (?1, ?2, ?3)",
                params![Utc::now().to_rfc3339(), &text, &tags],
            )?;
            let id = conn.last_insert_rowid();
            debug!("Inserted prompt {}", id);
            Ok(id)
        })
        .await
    }

    pub async fn get_prompt(&self, id: i64) -> Result<Option<Prompt>> {
        self.with_conn(move |conn| {
            let prompt = conn
                .query_row(
                    "SELECT id, date, prompt, tags FROM prompts WHERE id = ?1",
                    params![id],
                    Self::row_to_prompt,
                )
                .optional()?;
            Ok(prompt)
        })
        .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.search_prompts(None, None).await
    }

    /// Substring search on prompt text and/or tags; both filters must match
    pub async fn search_prompts(
        &self,
        query: Option<&str>,
        tags: Option<&str>,
    ) -> Result<Vec<Prompt>> {
        let query = query.filter(|q| !q.is_empty()).map(|q| format!("%{}%", q));
        let tags = tags.filter(|t| !t.is_empty()).map(|t| format!("%{}%", t));

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, date, prompt, tags FROM prompts
                 WHERE (?1 IS NULL OR prompt LIKE ?1)
                   AND (?2 IS NULL OR tags LIKE ?2)
                 ORDER BY date DESC, id DESC",
            )?;
            let prompts = stmt
                .query_map(params![&query, &tags], Self::row_to_prompt)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(prompts)
        })
        .await
    }

    /// Returns false when nothing was changed
    pub async fn update_prompt(
        &self,
        id: i64,
        text: Option<&str>,
        tags: Option<&str>,
    ) -> Result<bool> {
        if text.is_none() && tags.is_none() {
            return Ok(false);
        }
        let text = text.map(str::to_owned);
        let tags = tags.map(str::to_owned);

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE prompts SET prompt = COALESCE(?1, prompt), tags = COALESCE(?2, tags)
                 WHERE id = ?3",
                params![&text, &tags, id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Deletes the prompt and, by cascade, its saved results
    pub async fn delete_prompt(&self, id: i64) -> Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    fn row_to_prompt(row: &rusqlite::Row) -> rusqlite::Result<Prompt> {
        Ok(Prompt {
            id: row.get(0)?,
            date: parse_timestamp(row.get(1)?),
            text: row.get(2)?,
            tags: row.get(3)?,
        })
    }

    // ---- models ----

    pub async fn create_model(&self, model: NewModel) -> Result<i64> {
        validate_model_fields(&model.display_name, &model.api_base_url)
            .map_err(StoreError::from)?;
        let kind = model
            .provider_kind
            .unwrap_or_else(|| ProviderKind::from_url(&model.api_base_url));

        self.with_conn(move |conn| {
            let name = model.display_name.trim().to_string();
            let inserted = conn.execute(
                "INSERT INTO models (name, api_url, api_id, is_active, model_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &name,
                    model.api_base_url.trim(),
                    model.credential_reference.trim(),
                    model.is_active,
                    kind.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            );
            map_unique_violation(inserted, &name)?;
            let id = conn.last_insert_rowid();
            info!("Added model {} ({}) as {}", name, kind, id);
            Ok(id)
        })
        .await
    }

    pub async fn get_model(&self, id: i64) -> Result<Option<ModelConfig>> {
        self.with_conn(move |conn| {
            let model = conn
                .query_row(
                    &format!("SELECT {} FROM models WHERE id = ?1", MODEL_COLUMNS),
                    params![id],
                    Self::row_to_model,
                )
                .optional()?;
            Ok(model)
        })
        .await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelConfig>> {
        self.query_models(false).await
    }

    pub async fn list_active_models(&self) -> Result<Vec<ModelConfig>> {
        self.query_models(true).await
    }

    async fn query_models(&self, active_only: bool) -> Result<Vec<ModelConfig>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM models WHERE (?1 = 0 OR is_active = 1) ORDER BY id",
                MODEL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let models = stmt
                .query_map(params![active_only], Self::row_to_model)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(models)
        })
        .await
    }

    /// Apply a partial update; the merged config is validated before writing
    pub async fn update_model(&self, id: i64, update: ModelUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        let Some(current) = self.get_model(id).await? else {
            return Err(StoreError::NotFound { entity: "model", id }.into());
        };
        validate_model_fields(
            update.display_name.as_deref().unwrap_or(&current.display_name),
            update.api_base_url.as_deref().unwrap_or(&current.api_base_url),
        )
        .map_err(StoreError::from)?;

        self.with_conn(move |conn| {
            let name = update.display_name.map(|n| n.trim().to_string());
            let changed = conn.execute(
                "UPDATE models SET
                    name = COALESCE(?1, name),
                    api_url = COALESCE(?2, api_url),
                    api_id = COALESCE(?3, api_id),
                    model_type = COALESCE(?4, model_type),
                    is_active = COALESCE(?5, is_active)
                 WHERE id = ?6",
                params![
                    &name,
                    &update.api_base_url,
                    &update.credential_reference,
                    update.provider_kind.map(|k| k.as_str()),
                    update.is_active,
                    id,
                ],
            );
            let changed = map_unique_violation(changed, name.as_deref().unwrap_or_default())?;
            Ok(changed > 0)
        })
        .await
    }

    /// Deletes the model and, by cascade, its saved results
    pub async fn delete_model(&self, id: i64) -> Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM models WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    fn row_to_model(row: &rusqlite::Row) -> rusqlite::Result<ModelConfig> {
        let api_url: String = row.get(2)?;
        let model_type: Option<String> = row.get(5)?;
        Ok(ModelConfig {
            id: row.get(0)?,
            display_name: row.get(1)?,
            provider_kind: ProviderKind::normalize(model_type.as_deref(), Some(&api_url)),
            api_base_url: api_url,
            credential_reference: row.get(3)?,
            is_active: row.get(4)?,
        })
    }

    // ---- results ----

    /// Persist a successful dispatch result for `prompt_id`
    pub async fn save_result(&self, prompt_id: i64, result: &DispatchResult) -> Result<i64> {
        let Some(response) = result.response_text().map(str::to_owned) else {
            return Err(StoreError::UnsuccessfulResult {
                model: result.model_display_name().to_string(),
            }
            .into());
        };
        let model_id = result.model_id();
        let tokens = result.tokens_used().and_then(|t| i64::try_from(t).ok());
        let response_time = result.response_time_seconds();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO results (prompt_id, model_id, response, saved_at, tokens_used, response_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    prompt_id,
                    model_id,
                    &response,
                    Utc::now().to_rfc3339(),
                    tokens,
                    response_time,
                ],
            )
            .context("Failed to save result")?;
            let id = conn.last_insert_rowid();
            debug!("Saved result {} for prompt {} / model {}", id, prompt_id, model_id);
            Ok(id)
        })
        .await
    }

    pub async fn get_result(&self, id: i64) -> Result<Option<SavedResult>> {
        self.with_conn(move |conn| {
            let result = conn
                .query_row(
                    &format!("{} WHERE r.id = ?1", RESULT_SELECT),
                    params![id],
                    Self::row_to_result,
                )
                .optional()?;
            Ok(result)
        })
        .await
    }

    pub async fn list_results_by_prompt(&self, prompt_id: i64) -> Result<Vec<SavedResult>> {
        self.query_results(Some(prompt_id)).await
    }

    pub async fn list_results(&self) -> Result<Vec<SavedResult>> {
        self.query_results(None).await
    }

    async fn query_results(&self, prompt_id: Option<i64>) -> Result<Vec<SavedResult>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR r.prompt_id = ?1) ORDER BY r.saved_at DESC, r.id DESC",
                RESULT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let results = stmt
                .query_map(params![prompt_id], Self::row_to_result)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(results)
        })
        .await
    }

    pub async fn delete_result(&self, id: i64) -> Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM results WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<SavedResult> {
        let tokens: Option<i64> = row.get(5)?;
        Ok(SavedResult {
            id: row.get(0)?,
            prompt_id: row.get(1)?,
            model_id: row.get(2)?,
            response: row.get(3)?,
            saved_at: parse_timestamp(row.get(4)?),
            tokens_used: tokens.and_then(|t| u64::try_from(t).ok()),
            response_time: row.get(6)?,
            model_name: row.get(7)?,
            prompt_text: row.get(8)?,
        })
    }

    // ---- settings ----

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let value: Option<Option<String>> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![&key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.flatten())
        })
        .await
    }

    /// Insert or replace a setting; an omitted description keeps the old one
    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        let description = description.map(str::to_owned);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value, description, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    description = COALESCE(excluded.description, settings.description),
                    updated_at = excluded.updated_at",
                params![&key, &value, &description, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value, description, updated_at FROM settings ORDER BY key")?;
            let settings = stmt
                .query_map([], |row| {
                    Ok(Setting {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        description: row.get(2)?,
                        updated_at: parse_timestamp(row.get(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(settings)
        })
        .await
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM settings WHERE key = ?1", params![&key])?;
            Ok(deleted > 0)
        })
        .await
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| {
        warn!("Unparseable timestamp '{}' in database", raw);
        Utc::now()
    })
}

/// Turn a UNIQUE violation on `models.name` into [`StoreError::DuplicateName`]
fn map_unique_violation(outcome: rusqlite::Result<usize>, name: &str) -> Result<usize> {
    match outcome {
        Ok(n) => Ok(n),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::DuplicateName(name.to_string()).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlist_core::{Completion, DispatchError};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open() -> (TempDir, ChatDb) {
        let dir = TempDir::new().unwrap();
        let db = ChatDb::new(dir.path().join("chatlist.db")).unwrap();
        (dir, db)
    }

    fn new_model(name: &str, url: &str) -> NewModel {
        NewModel {
            display_name: name.to_string(),
            api_base_url: url.to_string(),
            credential_reference: "OPENROUTER_API_KEY".to_string(),
            provider_kind: None,
            is_active: true,
        }
    }

    fn success_for(model: &ModelConfig, text: &str) -> DispatchResult {
        DispatchResult::success(
            model,
            Completion {
                response_text: text.to_string(),
                tokens_used: Some(17),
                response_time: Duration::from_millis(1250),
            },
        )
    }

    #[tokio::test]
    async fn test_seed_data() -> Result<()> {
        let (_dir, db) = open();
        let models = db.list_models().await?;
        let names: Vec<&str> = models.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["GPT-4", "DeepSeek Chat", "Groq Llama 3"]);
        assert_eq!(models[2].provider_kind, ProviderKind::Groq);
        assert_eq!(models[1].credential_reference, "DEEPSEEK_API_KEY");

        assert_eq!(db.get_setting("api_timeout").await?.as_deref(), Some("30"));
        assert_eq!(db.list_settings().await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_does_not_reseed() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("chatlist.db");
        {
            let db = ChatDb::new(&path)?;
            db.delete_model(1).await?;
        }
        let db = ChatDb::new(&path)?;
        assert_eq!(db.list_models().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_prompt_crud_and_search() -> Result<()> {
        let (_dir, db) = open();
        let first = db.create_prompt("Explain Rust lifetimes", Some("rust,learning")).await?;
        let second = db.create_prompt("Write a haiku about autumn", None).await?;

        let prompt = db.get_prompt(first).await?.unwrap();
        assert_eq!(prompt.text, "Explain Rust lifetimes");
        assert_eq!(prompt.tags.as_deref(), Some("rust,learning"));

        assert_eq!(db.list_prompts().await?.len(), 2);
        let hits = db.search_prompts(Some("haiku"), None).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, second);
        assert_eq!(db.search_prompts(None, Some("rust")).await?.len(), 1);
        assert!(db.search_prompts(Some("haiku"), Some("rust")).await?.is_empty());

        assert!(db.update_prompt(second, None, Some("poetry")).await?);
        let updated = db.get_prompt(second).await?.unwrap();
        assert_eq!(updated.text, "Write a haiku about autumn");
        assert_eq!(updated.tags.as_deref(), Some("poetry"));
        assert!(!db.update_prompt(second, None, None).await?);

        assert!(db.delete_prompt(first).await?);
        assert!(db.get_prompt(first).await?.is_none());
        assert!(!db.delete_prompt(first).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_model_crud() -> Result<()> {
        let (_dir, db) = open();
        let id = db
            .create_model(new_model(
                "Qwen Coder",
                "https://openrouter.ai/api/v1/chat/completions",
            ))
            .await?;

        let model = db.get_model(id).await?.unwrap();
        assert_eq!(model.provider_kind, ProviderKind::OpenRouter);
        assert_eq!(model.credential_reference, "OPENROUTER_API_KEY");

        assert!(db.update_model(id, ModelUpdate::active(false)).await?);
        let active = db.list_active_models().await?;
        assert!(active.iter().all(|m| m.id != id));
        assert_eq!(db.list_models().await?.len(), 4);

        assert!(db.delete_model(id).await?);
        assert!(db.get_model(id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_model_validation_and_duplicates() {
        let (_dir, db) = open();

        let err = db.create_model(new_model("  ", "https://x.test")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Invalid(_))));

        let err = db.create_model(new_model("Bad", "not-a-url")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Invalid(_))));

        let err = db
            .create_model(new_model("GPT-4", "https://api.openai.com/v1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DuplicateName(name)) if name == "GPT-4"
        ));

        let err = db.update_model(999, ModelUpdate::active(true)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { id: 999, .. })
        ));
    }

    #[tokio::test]
    async fn test_results_are_joined_and_cascade() -> Result<()> {
        let (_dir, db) = open();
        let model = db.get_model(1).await?.unwrap();
        let prompt_id = db.create_prompt("What is a monad?", None).await?;

        let id = db
            .save_result(prompt_id, &success_for(&model, "A monoid in the category of endofunctors."))
            .await?;
        let saved = db.get_result(id).await?.unwrap();
        assert_eq!(saved.model_name, "GPT-4");
        assert_eq!(saved.prompt_text, "What is a monad?");
        assert_eq!(saved.tokens_used, Some(17));
        assert_eq!(saved.response_time, Some(1.25));

        let other_prompt = db.create_prompt("Second", None).await?;
        db.save_result(other_prompt, &success_for(&model, "two")).await?;
        assert_eq!(db.list_results().await?.len(), 2);
        assert_eq!(db.list_results_by_prompt(prompt_id).await?.len(), 1);

        db.delete_prompt(prompt_id).await?;
        assert!(db.get_result(id).await?.is_none());
        assert_eq!(db.list_results().await?.len(), 1);

        db.delete_model(1).await?;
        assert!(db.list_results().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_result_cannot_be_saved() -> Result<()> {
        let (_dir, db) = open();
        let model = db.get_model(1).await?.unwrap();
        let prompt_id = db.create_prompt("hi", None).await?;
        let failed = DispatchResult::failure(
            &model,
            &DispatchError::Timeout {
                model: "GPT-4".to_string(),
            },
        );

        let err = db.save_result(prompt_id, &failed).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnsuccessfulResult { .. })
        ));
        assert!(db.list_results().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_settings() -> Result<()> {
        let (_dir, db) = open();
        db.set_setting("theme", "dark", None).await?;
        assert_eq!(db.get_setting("theme").await?.as_deref(), Some("dark"));
        let theme = db
            .list_settings()
            .await?
            .into_iter()
            .find(|s| s.key == "theme")
            .unwrap();
        assert_eq!(theme.description.as_deref(), Some("Interface theme (light/dark)"));

        db.set_setting("editor", "vim", Some("Preferred editor")).await?;
        assert_eq!(db.list_settings().await?.len(), 4);
        assert!(db.delete_setting("editor").await?);
        assert!(db.get_setting("editor").await?.is_none());
        Ok(())
    }
}
