use chatlist_core::ValidationError;
use thiserror::Error;

/// Domain failures of the store. Returned inside `anyhow::Error`, so callers
/// can `downcast_ref::<StoreError>()` to tell them apart from SQLite errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("A model named '{0}' already exists")]
    DuplicateName(String),

    #[error("Only successful results can be saved (model '{model}' failed)")]
    UnsuccessfulResult { model: String },
}
