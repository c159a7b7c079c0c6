//! Domain error types.

/// Top-level error type for propdesk.
#[derive(Debug, thiserror::Error)]
pub enum PropdeskError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("storage constraint rejected write: {reason}")]
    Consistency { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("trade import failed at line {line}: {reason}")]
    Import { line: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PropdeskError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PropdeskError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PropdeskError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, PropdeskError::Consistency { .. })
    }
}

impl From<&PropdeskError> for std::process::ExitCode {
    fn from(err: &PropdeskError) -> Self {
        let code: u8 = match err {
            PropdeskError::Io(_) => 1,
            PropdeskError::ConfigParse { .. }
            | PropdeskError::ConfigMissing { .. }
            | PropdeskError::ConfigInvalid { .. } => 2,
            PropdeskError::Database { .. } | PropdeskError::DatabaseQuery { .. } => 3,
            PropdeskError::Validation { .. } | PropdeskError::Consistency { .. } => 4,
            PropdeskError::NotFound { .. } => 5,
            PropdeskError::Import { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
