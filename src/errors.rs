use thiserror::Error;

/// Error type for metagraph operations.
#[derive(Debug, Error)]
pub enum MetaGraphError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("transaction error: {0}")]
    TransactionError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("entity already exists: {0}")]
    AlreadyExists(String),
    #[error("required attribute {attribute} violated: {reason}")]
    RequiredAttributeViolation { attribute: String, reason: String },
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl MetaGraphError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::QueryError(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::TransactionError(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::InvalidInput(msg.into())
    }

    pub fn constraint<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::ConstraintViolation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::NotFound(msg.into())
    }

    pub fn already_exists<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::AlreadyExists(msg.into())
    }

    pub fn required_attribute<A: Into<String>, R: Into<String>>(attribute: A, reason: R) -> Self {
        MetaGraphError::RequiredAttributeViolation {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub fn illegal_state<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::IllegalState(msg.into())
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        MetaGraphError::Unsupported(msg.into())
    }

    /// Maps a rusqlite failure, keeping uniqueness violations distinguishable.
    pub(crate) fn from_sqlite(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                MetaGraphError::constraint(err.to_string())
            }
            _ => MetaGraphError::query(err.to_string()),
        }
    }
}
