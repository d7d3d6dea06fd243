use crate::config::ConfigError;
use crate::forms::UnknownForm;
use crate::pipeline::{SessionError, TransportError};
use crate::telemetry::TelemetryError;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Transport(TransportError),
    UnknownForm(UnknownForm),
    Session(SessionError),
    Draft {
        path: PathBuf,
        source: serde_json::Error,
    },
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Transport(err) => write!(f, "http client error: {}", err),
            AppError::UnknownForm(err) => write!(f, "{}", err),
            AppError::Session(err) => write!(f, "session error: {}", err),
            AppError::Draft { path, source } => {
                write!(f, "failed to read draft '{}': {}", path.display(), source)
            }
            AppError::Attachment { path, source } => {
                write!(f, "failed to read attachment '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Transport(err) => Some(err),
            AppError::UnknownForm(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::Draft { source, .. } => Some(source),
            AppError::Attachment { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<UnknownForm> for AppError {
    fn from(value: UnknownForm) -> Self {
        Self::UnknownForm(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}
