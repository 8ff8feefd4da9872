//! Error types for the stakeindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing, finalization and querying.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid stake total: total staked balance is zero")]
    InvalidStakeTotal,

    #[error("Negative amount: {0}")]
    NegativeAmount(String),

    #[error("Import of {entity} failed at batch {batch}: {reason}")]
    ImportFailed {
        entity: &'static str,
        batch: usize,
        reason: String,
    },

    #[error("Record not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for the non-fatal "nothing matched" lookup result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` if the next sync tick may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::Storage(_) | Self::ImportFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_failed_carries_batch_index() {
        let err = IndexerError::ImportFailed {
            entity: "transactions",
            batch: 3,
            reason: "duplicate key".into(),
        };
        assert_eq!(
            err.to_string(),
            "Import of transactions failed at batch 3: duplicate key"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        assert!(IndexerError::NotFound.is_not_found());
        assert!(!IndexerError::NotFound.is_retryable());
        assert!(!IndexerError::InvalidStakeTotal.is_retryable());
    }
}
