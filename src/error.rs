use serde::Serialize;

/// Client-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly so a front-end gets structured error messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("Connection error: {0}")]
    Http(String),

    /// The service answered with a non-2xx status.
    #[error("Service error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// True when the failure happened below HTTP (nothing came back from the service).
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Http(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Http(_) => "http",
            AppError::Status { .. } => "status",
            AppError::Auth(_) => "auth",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Serialized as `{ error: "...", kind: "..." }` for front-end consumption.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}
