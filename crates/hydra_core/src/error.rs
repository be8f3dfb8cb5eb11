use sea_orm::SqlErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HydraError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("schema error: {message}")]
    Schema { message: String },
    #[error("primary key missing for table '{table}'")]
    PrimaryKeyMissing { table: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("payload shape error in candidate {index}: {message}")]
    PayloadShape { index: usize, message: String },
    #[error("duplicate timestamp '{timestamp}' in candidate {index}")]
    DuplicateTimestamp { index: usize, timestamp: String },
    #[error("bulk insert into '{table}' mixes column sets: {message}")]
    BatchColumnMismatch { table: String, message: String },
}

impl HydraError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn primary_key_missing(table: impl Into<String>) -> Self {
        Self::PrimaryKeyMissing {
            table: table.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn payload_shape(index: usize, message: impl Into<String>) -> Self {
        Self::PayloadShape {
            index,
            message: message.into(),
        }
    }

    pub fn duplicate_timestamp(index: usize, timestamp: impl Into<String>) -> Self {
        Self::DuplicateTimestamp {
            index,
            timestamp: timestamp.into(),
        }
    }

    pub fn batch_column_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BatchColumnMismatch {
            table: table.into(),
            message: message.into(),
        }
    }
}

pub type HydraResult<T> = Result<T, HydraError>;

impl From<sea_orm::DbErr> for HydraError {
    fn from(value: sea_orm::DbErr) -> Self {
        match value.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message))
            | Some(SqlErr::ForeignKeyConstraintViolation(message)) => HydraError::integrity(message),
            _ => HydraError::storage(value.to_string()),
        }
    }
}
