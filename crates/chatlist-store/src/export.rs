//! Markdown and JSON export of saved results

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chatlist_core::DispatchBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sqlite::SavedResult;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown export format '{}' (expected markdown or json)", other)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// JSON export document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsExport {
    pub export_date: String,
    pub total_results: usize,
    pub results: Vec<ExportedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedResult {
    pub id: i64,
    pub saved_at: String,
    pub model_name: String,
    pub prompt_text: String,
    pub response: String,
    pub tokens_used: Option<u64>,
    pub response_time: Option<f64>,
}

pub fn render_markdown(results: &[SavedResult], exported_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str("# ChatList results export\n\n");
    let _ = writeln!(out, "Export date: {}\n", exported_at.format(DATE_FORMAT));
    out.push_str("---\n\n");

    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(out, "## Result {}\n", i + 1);
        let _ = writeln!(out, "**Date:** {}\n", result.saved_at.format(DATE_FORMAT));
        let _ = writeln!(out, "**Model:** {}\n", result.model_name);
        let _ = writeln!(out, "**Prompt:**\n\n{}\n", result.prompt_text);
        let _ = writeln!(out, "**Response:**\n\n{}\n", result.response);
        if let Some(tokens) = result.tokens_used {
            let _ = writeln!(out, "**Tokens used:** {}\n", tokens);
        }
        if let Some(secs) = result.response_time {
            let _ = writeln!(out, "**Response time:** {:.2}s\n", secs);
        }
        out.push_str("---\n\n");
    }
    out
}

pub fn to_export_document(results: &[SavedResult], exported_at: DateTime<Utc>) -> ResultsExport {
    ResultsExport {
        export_date: exported_at.format(DATE_FORMAT).to_string(),
        total_results: results.len(),
        results: results
            .iter()
            .map(|r| ExportedResult {
                id: r.id,
                saved_at: r.saved_at.format(DATE_FORMAT).to_string(),
                model_name: r.model_name.clone(),
                prompt_text: r.prompt_text.clone(),
                response: r.response.clone(),
                tokens_used: r.tokens_used,
                response_time: r.response_time,
            })
            .collect(),
    }
}

/// Write `results` to `path` in `format`
pub fn export_results(results: &[SavedResult], format: ExportFormat, path: &Path) -> Result<()> {
    let now = Utc::now();
    let body = match format {
        ExportFormat::Markdown => render_markdown(results, now),
        ExportFormat::Json => serde_json::to_string_pretty(&to_export_document(results, now))
            .context("Failed to serialize results")?,
    };
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write export file {}", path.display()))?;
    info!("Exported {} result(s) as {} to {}", results.len(), format, path.display());
    Ok(())
}

pub fn write_batch(batch: &DispatchBatch, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(batch).context("Failed to serialize batch")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write batch file {}", path.display()))
}

pub fn read_batch(path: &Path) -> Result<DispatchBatch> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid batch file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlist_core::{DispatchError, DispatchResult, ModelConfig, PromptRequest, ProviderKind};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn saved(id: i64, tokens: Option<u64>, time: Option<f64>) -> SavedResult {
        SavedResult {
            id,
            prompt_id: 1,
            model_id: 2,
            response: "Use **borrowing**.".to_string(),
            saved_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            tokens_used: tokens,
            response_time: time,
            model_name: "DeepSeek Chat".to_string(),
            prompt_text: "How do I avoid clones?".to_string(),
        }
    }

    fn export_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("Markdown".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("json".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert!("csv".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Json.extension(), "json");
    }

    #[test]
    fn test_markdown_layout() {
        let md = render_markdown(&[saved(1, Some(40), Some(2.345)), saved(2, None, None)], export_time());
        assert!(md.starts_with("# ChatList results export\n\nExport date: 2024-03-02 08:00:00\n"));
        assert!(md.contains("## Result 1\n\n**Date:** 2024-03-01 12:30:00"));
        assert!(md.contains("**Model:** DeepSeek Chat"));
        assert!(md.contains("**Prompt:**\n\nHow do I avoid clones?"));
        assert!(md.contains("**Tokens used:** 40"));
        assert!(md.contains("**Response time:** 2.35s") || md.contains("**Response time:** 2.34s"));
        assert_eq!(md.matches("**Tokens used:**").count(), 1);
        assert!(md.contains("## Result 2"));
    }

    #[test]
    fn test_json_document() {
        let doc = to_export_document(&[saved(7, Some(3), None)], export_time());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["total_results"], 1);
        assert_eq!(value["export_date"], "2024-03-02 08:00:00");
        assert_eq!(value["results"][0]["id"], 7);
        assert_eq!(value["results"][0]["model_name"], "DeepSeek Chat");
        assert!(value["results"][0]["response_time"].is_null());
    }

    #[test]
    fn test_export_results_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        export_results(&[saved(1, None, None)], ExportFormat::Json, &path).unwrap();
        let doc: ResultsExport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.total_results, 1);
        assert_eq!(doc.results[0].response, "Use **borrowing**.");
    }

    #[test]
    fn test_batch_file_round_trip() {
        let model = ModelConfig {
            id: 4,
            display_name: "Groq Llama 3".to_string(),
            provider_kind: ProviderKind::Groq,
            api_base_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            credential_reference: "GROQ_API_KEY".to_string(),
            is_active: true,
        };
        let batch = DispatchBatch::new(
            PromptRequest::new("hello"),
            vec![DispatchResult::failure(
                &model,
                &DispatchError::Network {
                    model: "Groq Llama 3".to_string(),
                    message: "connection reset".to_string(),
                },
            )],
        );

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        write_batch(&batch, &path).unwrap();
        assert_eq!(read_batch(&path).unwrap(), batch);
    }
}
