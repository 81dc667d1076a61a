//! Persistence layer for chatlist
//!
//! This crate provides:
//! - SQLite storage for prompts, model configs, saved results and settings
//! - Markdown and JSON export of saved results and dispatch batches

pub mod error;
pub mod export;
pub mod sqlite;

// Re-export main types
pub use error::StoreError;
pub use export::{ExportFormat, ResultsExport, export_results, read_batch, write_batch};
pub use sqlite::{ChatDb, ModelUpdate, NewModel, Prompt, SavedResult, Setting};
