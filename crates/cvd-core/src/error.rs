use thiserror::Error;

/// The error taxonomy user-visible tooling distinguishes on (spec §7).
///
/// Propagation policy: errors surface to the caller verbatim. Nothing in
/// this crate or its siblings retries on these.
#[derive(Debug, Error)]
pub enum CvdError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("corrupt state: {0}")]
    CorruptState(String),
}

impl CvdError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn resource_busy(msg: impl Into<String>) -> Self {
        Self::ResourceBusy(msg.into())
    }

    pub fn missing_env(var: impl Into<String>) -> Self {
        Self::MissingEnv(var.into())
    }

    pub fn corrupt_state(msg: impl Into<String>) -> Self {
        Self::CorruptState(msg.into())
    }

    /// The taxonomy string stable tooling matches on (spec §6: "Exit codes").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Conflict(_) => "Conflict",
            Self::ResourceBusy(_) => "ResourceBusy",
            Self::MissingEnv(_) => "MissingEnv",
            Self::Io(_) => "IoError",
            Self::CorruptState(_) => "CorruptState",
        }
    }
}

impl From<std::io::Error> for CvdError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type CvdResult<T> = Result<T, CvdError>;
