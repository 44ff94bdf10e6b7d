use thiserror::Error;

use crate::processor::{emitter::PublishError, persister::StoreError};

/// Everything that can stop one measurement on its way through the processor.
///
/// Each variant maps to exactly one disposition: retryable kinds make the host
/// redeliver the event, every other kind is acknowledged and dropped.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("transient storage error: {0}")]
    TransientStorage(#[source] StoreError),

    #[error("permanent storage error: {0}")]
    PermanentStorage(#[source] StoreError),

    #[error("transient emit error: {0}")]
    TransientEmit(#[source] PublishError),

    #[error("permanent emit error: {0}")]
    PermanentEmit(#[source] PublishError),
}

impl ProcessingError {
    /// Stable name used in the `kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::MalformedEnvelope(_) => "MalformedEnvelope",
            ProcessingError::MalformedPayload(_) => "MalformedPayload",
            ProcessingError::InvalidMeasurement(_) => "InvalidMeasurement",
            ProcessingError::TransientStorage(_) => "TransientStorageError",
            ProcessingError::PermanentStorage(_) => "PermanentStorageError",
            ProcessingError::TransientEmit(_) => "TransientEmitError",
            ProcessingError::PermanentEmit(_) => "PermanentEmitError",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessingError::TransientStorage(_) | ProcessingError::TransientEmit(_)
        )
    }

    /// Only a failed store write asks the host for redelivery. Emit failures
    /// happen after the record is durable, so they are acknowledged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessingError::TransientStorage(_))
    }
}

impl From<StoreError> for ProcessingError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            ProcessingError::TransientStorage(err)
        } else {
            ProcessingError::PermanentStorage(err)
        }
    }
}

impl From<PublishError> for ProcessingError {
    fn from(err: PublishError) -> Self {
        if err.is_transient() {
            ProcessingError::TransientEmit(err)
        } else {
            ProcessingError::PermanentEmit(err)
        }
    }
}
