use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] flowspace_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error(
        "API is not configured. Set FLOWSPACE_API_URL, pass --api-url, or add api.base_url to the config file."
    )]
    ApiNotConfigured,
}

impl From<flowspace_core::api::ApiError> for CliError {
    fn from(error: flowspace_core::api::ApiError) -> Self {
        Self::Core(error.into())
    }
}
