use loader::config_loader::ConfigError;
use thiserror::Error;

use crate::model::ModelInfo;

pub type LoadResult = Result<ModelInfo, LoadError>;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("container {0:?} does not exist")]
    ContainerMissing(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("could not create the rendering surface: {0}")]
    Surface(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    Fetch,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("a model is already loading")]
    AlreadyLoading,

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(String),

    #[error("file is {actual} bytes, the maximum is {max} bytes")]
    FileTooLarge { actual: u64, max: u64 },

    #[error("{kind:?} failed: {message}")]
    LoadFailed {
        kind: LoadFailureKind,
        message: String,
    },

    #[error("the viewer has been disposed")]
    Disposed,
}

impl LoadError {
    pub(crate) fn failed(kind: LoadFailureKind, error: impl std::fmt::Display) -> Self {
        LoadError::LoadFailed {
            kind,
            message: error.to_string(),
        }
    }

    /// Text meant for a notification shown to the user.
    pub fn user_message(&self, accepted: &[&str]) -> String {
        match self {
            LoadError::AlreadyLoading => {
                "A model is still loading, try again once it is done.".to_string()
            }
            LoadError::UnsupportedFormat(extension) => format!(
                "Unsupported file format {}. Supported formats: {}",
                if extension.is_empty() { "(none)" } else { extension },
                accepted.join(", ")
            ),
            LoadError::FileTooLarge { actual, max } => format!(
                "The file is too large ({:.1} MB). Maximum size: {:.0} MB",
                *actual as f64 / 1_000_000.0,
                *max as f64 / 1_000_000.0
            ),
            LoadError::LoadFailed { message, .. } => {
                let lower = message.to_lowercase();
                let cause = if lower.contains("not found") || lower.contains("404") {
                    "the model file could not be found"
                } else if lower.contains("security") || lower.contains("permission") {
                    "access to the model file was denied"
                } else if lower.contains("format") {
                    "the file is damaged or not a valid model"
                } else {
                    "an unexpected error occurred"
                };
                format!("Could not load the model: {cause}.")
            }
            LoadError::Disposed => "The viewer is no longer available.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("surface of {width}x{height} is not supported")]
    UnsupportedSurface { width: u32, height: u32 },

    #[error("no surface to render to")]
    NoSurface,

    #[error("{0}")]
    Device(String),
}
