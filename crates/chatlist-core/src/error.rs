//! Error taxonomy for dispatch and prompt improvement

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification carried by a failed [`DispatchResult`](crate::DispatchResult)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CredentialMissing,
    Timeout,
    MalformedResponse,
    ProviderRejected,
    NetworkError,
    UnexpectedError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CredentialMissing => "credential_missing",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformed_response",
            Self::ProviderRejected => "provider_rejected",
            Self::NetworkError => "network_error",
            Self::UnexpectedError => "unexpected_error",
        };
        f.write_str(s)
    }
}

/// Failure of a single adapter call, surfaced unchanged by the dispatcher
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("API key for {model} not found: set the '{source_name}' environment variable")]
    CredentialMissing { model: String, source_name: String },

    #[error("Request to {model} timed out")]
    Timeout { model: String },

    #[error("Unexpected response format from {model}: {detail}")]
    MalformedResponse { model: String, detail: String },

    #[error(
        "{display_name} rejected the request (HTTP {status}, model '{resolved_model}'): {message}"
    )]
    ProviderRejected {
        status: u16,
        message: String,
        resolved_model: String,
        display_name: String,
    },

    #[error("Request to {model} failed: {message}")]
    Network { model: String, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CredentialMissing { .. } => ErrorKind::CredentialMissing,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::Unexpected(_) => ErrorKind::UnexpectedError,
        }
    }

    /// Whether a retry has a realistic chance of succeeding.
    /// Only consulted when the retry policy opts out of retrying everything.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::Unexpected(_) => true,
            Self::ProviderRejected { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            Self::CredentialMissing { .. } | Self::MalformedResponse { .. } => false,
        }
    }
}

/// Failure of a prompt improvement call
#[derive(Error, Debug)]
pub enum ImproveError {
    #[error("The original prompt must not be empty")]
    EmptyPrompt,

    #[error("The model returned an empty response")]
    EmptyResponse,

    #[error("API error while improving the prompt: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Could not extract an improved prompt from the model response: {0}")]
    ParseFailure(String),
}

/// Rejected model config fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Model name must not be empty")]
    EmptyName,

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure to load a model alias table
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Failed to read alias table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid alias table: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let cases = vec![
            (
                DispatchError::CredentialMissing {
                    model: "m".into(),
                    source_name: "KEY".into(),
                },
                ErrorKind::CredentialMissing,
            ),
            (DispatchError::Timeout { model: "m".into() }, ErrorKind::Timeout),
            (
                DispatchError::MalformedResponse {
                    model: "m".into(),
                    detail: "no choices".into(),
                },
                ErrorKind::MalformedResponse,
            ),
            (
                DispatchError::ProviderRejected {
                    status: 400,
                    message: "bad model".into(),
                    resolved_model: "x/y".into(),
                    display_name: "Y".into(),
                },
                ErrorKind::ProviderRejected,
            ),
            (
                DispatchError::Network {
                    model: "m".into(),
                    message: "refused".into(),
                },
                ErrorKind::NetworkError,
            ),
            (DispatchError::Unexpected("x".into()), ErrorKind::UnexpectedError),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn test_credential_missing_names_the_variable() {
        let err = DispatchError::CredentialMissing {
            model: "GPT-4".into(),
            source_name: "OPENROUTER_API_KEY".into(),
        };
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_provider_rejected_message_carries_both_names() {
        let err = DispatchError::ProviderRejected {
            status: 400,
            message: "not a valid model ID".into(),
            resolved_model: "openai/gpt-9".into(),
            display_name: "GPT-9".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("openai/gpt-9"));
        assert!(msg.contains("GPT-9"));
        assert!(msg.contains("400"));
    }

    #[test]
    fn test_is_transient() {
        assert!(DispatchError::Timeout { model: "m".into() }.is_transient());
        let rejected = |status| DispatchError::ProviderRejected {
            status,
            message: String::new(),
            resolved_model: String::new(),
            display_name: String::new(),
        };
        assert!(!rejected(400).is_transient());
        assert!(!rejected(401).is_transient());
        assert!(rejected(429).is_transient());
        assert!(rejected(503).is_transient());
    }

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::CredentialMissing).unwrap();
        assert_eq!(json, "\"credential_missing\"");
        assert_eq!(ErrorKind::NetworkError.to_string(), "network_error");
    }
}
