use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use thiserror::Error;

use super::deadline::{Deadline, Expired};
use crate::models::ProcessedRecord;

pub const DEFAULT_COLLECTION: &str = "processed_measurements";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("quota exhausted: {0}")]
    ResourceExhausted(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("write cancelled: {0}")]
    Cancelled(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_)
                | StoreError::ResourceExhausted(_)
                | StoreError::DeadlineExceeded(_)
                | StoreError::Cancelled(_)
        )
    }
}

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    pub collection: String,
    pub id: String,
}

/// Document store seam. Implementations replace the whole document stored
/// under `id`, creating it when absent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError>;
}

/// `"{entity_id}:{timestamp}"`, the same for every delivery of one measurement.
pub fn document_id(record: &ProcessedRecord) -> String {
    format!(
        "{}:{}",
        record.entity_id,
        rfc3339_nano(record.measurement_timestamp)
    )
}

/// RFC 3339 in UTC with a `Z` suffix and the fractional second trimmed of
/// trailing zeros, omitted entirely when zero.
pub fn rfc3339_nano(ts: DateTime<Utc>) -> String {
    let seconds = ts.format("%Y-%m-%dT%H:%M:%S");
    let nanos = ts.timestamp_subsec_nanos();
    if nanos == 0 {
        return format!("{}Z", seconds);
    }
    let fraction = format!("{:09}", nanos);
    format!("{}.{}Z", seconds, fraction.trim_end_matches('0'))
}

pub struct Persister {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl Persister {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Unconditional set of the record under its deterministic id. A write cut
    /// short by the deadline is reported as transient.
    pub async fn write(
        &self,
        record: &ProcessedRecord,
        deadline: &Deadline,
    ) -> Result<DocumentReference, StoreError> {
        let id = document_id(record);

        debug!(collection = self.collection.as_str(), document_id = id.as_str(); "Writing processed record");

        match deadline
            .run(self.store.replace(&self.collection, &id, record))
            .await
        {
            Ok(result) => result?,
            Err(Expired::Deadline) => return Err(StoreError::DeadlineExceeded(id)),
            Err(Expired::Cancelled) => return Err(StoreError::Cancelled(id)),
        }

        Ok(DocumentReference {
            collection: self.collection.clone(),
            id,
        })
    }
}
