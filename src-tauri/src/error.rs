//! Typed failures returned to the UI by file, dialog and association commands.
//!
//! Commands return `Result<T, AppError>`; Tauri serializes the error through
//! the manual `Serialize` impl below so the UI receives `{ kind, message }`
//! instead of an opaque string.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file extension: {extension:?}")]
    UnsupportedExtension { extension: String },

    #[error("dialog failed: {message}")]
    Dialog { message: String },

    #[error("file associations are not supported on platform {platform:?}")]
    PlatformUnsupported { platform: String },

    #[error("association step {step:?} failed: {detail}")]
    RegistrationStep { step: String, detail: String },
}

impl AppError {
    /// Stable machine-readable tag, used by the UI to branch on failures.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "notFound",
            AppError::Read { .. } => "read",
            AppError::Write { .. } => "write",
            AppError::UnsupportedExtension { .. } => "unsupportedExtension",
            AppError::Dialog { .. } => "dialog",
            AppError::PlatformUnsupported { .. } => "platformUnsupported",
            AppError::RegistrationStep { .. } => "registrationStep",
        }
    }

    /// Map an io error from reading `path`, keeping "not found" distinct.
    pub(crate) fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound { path }
        } else {
            AppError::Read { path, source }
        }
    }
}

impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type AppResult<T> = Result<T, AppError>;
