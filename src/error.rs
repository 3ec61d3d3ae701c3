//! Error types for Assistant Desk.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Conversation {conversation_id} not found")]
    NotFound { conversation_id: Uuid },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The conversation row exists but the first reply was never stored.
    #[error("Conversation {conversation_id} was created but its first reply was not stored: {source}")]
    StartInterrupted {
        conversation_id: Uuid,
        #[source]
        source: Box<Error>,
    },
}

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Store,
    Provider,
    NotFound,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Store => "store",
            Self::Provider => "provider",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl Error {
    /// Category of the underlying failure. Interrupted starts report the
    /// kind of the error that interrupted them.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Store(_) => ErrorKind::Store,
            Self::Provider(_) => ErrorKind::Provider,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StartInterrupted { source, .. } => source.kind(),
        }
    }

    /// Conversation left behind by a failed `start`, if any.
    pub fn interrupted_conversation(&self) -> Option<Uuid> {
        match self {
            Self::StartInterrupted {
                conversation_id, ..
            } => Some(*conversation_id),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Completion provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_start_reports_inner_kind() {
        let id = Uuid::new_v4();
        let err = Error::StartInterrupted {
            conversation_id: id,
            source: Box::new(Error::Provider(ProviderError::Status {
                status: 500,
                message: "boom".into(),
            })),
        };
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.interrupted_conversation(), Some(id));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn store_and_provider_are_distinct_kinds() {
        let store: Error = DatabaseError::Query("disk full".into()).into();
        let provider: Error = ProviderError::InvalidResponse("no choices".into()).into();
        assert_eq!(store.kind(), ErrorKind::Store);
        assert_eq!(provider.kind(), ErrorKind::Provider);
        assert_eq!(store.interrupted_conversation(), None);
    }
}
