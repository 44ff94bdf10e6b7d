use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure, RETRYABLE_WRITE_ERROR},
    options::{ClientOptions, ReplaceOptions, ResolverConfig},
    Client, Collection, Database,
};
use serde::{Deserialize, Serialize};

use crate::{
    models::{PhaseCurrents, PhaseLimits, ProcessedRecord},
    processor::persister::{rfc3339_nano, DocumentStore, StoreError},
    shared::parse_utc,
};

pub async fn get_db(client_uri: &str, database: &str) -> mongodb::error::Result<Database> {
    // An extra line of code to work around a DNS issue on Windows:
    let options =
        ClientOptions::parse_with_resolver_config(client_uri, ResolverConfig::cloudflare()).await?;
    let client = Client::with_options(options)?;

    Ok(client.database(database))
}

/// A processed record as stored in MongoDB, `_id` being the document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub entity_id: String,
    pub state: String,
    pub friendly_name: Option<String>,
    /// Millisecond BSON date, for range queries.
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub measurement_timestamp: DateTime<Utc>,
    /// The exact instant, in the same form as the `_id` suffix.
    pub measurement_ts: String,
    pub phase_totals: PhaseCurrents,
    pub charger_phases: PhaseCurrents,
    pub available_current: PhaseCurrents,
    pub max_total: f64,
    pub charger_sum: f64,
    pub charging: bool,
    pub target_limits: PhaseLimits,
    pub warnings: Vec<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub processed_at: DateTime<Utc>,
    pub source_event_id: String,
}

impl MeasurementDocument {
    pub fn new(id: &str, record: &ProcessedRecord) -> Self {
        Self {
            id: id.to_string(),
            entity_id: record.entity_id.clone(),
            state: record.state.clone(),
            friendly_name: record.friendly_name.clone(),
            measurement_timestamp: record.measurement_timestamp,
            measurement_ts: rfc3339_nano(record.measurement_timestamp),
            phase_totals: record.phase_totals,
            charger_phases: record.charger_phases,
            available_current: record.available_current,
            max_total: record.max_total,
            charger_sum: record.charger_sum,
            charging: record.charging,
            target_limits: record.target_limits,
            warnings: record.warnings.clone(),
            processed_at: record.processed_at,
            source_event_id: record.source_event_id.clone(),
        }
    }

    /// `measurement_timestamp` at full precision.
    pub fn exact_measurement_timestamp(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        parse_utc(&self.measurement_ts)
    }
}

/// [`DocumentStore`] over a MongoDB database. `Database` is a cheap handle
/// over a shared connection pool.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        let coll: Collection<MeasurementDocument> = self.db.collection(collection);
        let document = MeasurementDocument::new(id, record);
        let options = ReplaceOptions::builder().upsert(true).build();

        coll.replace_one(doc! { "_id": id }, document, options)
            .await
            .map_err(classify)?;

        Ok(())
    }
}

fn classify(err: mongodb::error::Error) -> StoreError {
    let message = err.to_string();

    if err.contains_label(RETRYABLE_WRITE_ERROR) {
        return StoreError::Unavailable(message);
    }

    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => StoreError::PermissionDenied(message),
        ErrorKind::InvalidArgument { .. } | ErrorKind::BsonSerialization(_) => {
            StoreError::InvalidArgument(message)
        }
        ErrorKind::Command(command) => classify_code(command.code, message),
        ErrorKind::Write(WriteFailure::WriteError(write)) => classify_code(write.code, message),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
            classify_code(concern.code, message)
        }
        // Network, server selection, pool resets and anything unrecognised:
        // the write is idempotent, so redelivery is safe.
        _ => StoreError::Unavailable(message),
    }
}

/// Server error codes, see `src/mongo/base/error_codes.yml`.
fn classify_code(code: i32, message: String) -> StoreError {
    match code {
        // Unauthorized, AuthenticationFailed
        13 | 18 => StoreError::PermissionDenied(message),
        // BadValue, FailedToParse, TypeMismatch, InvalidLength, DocumentValidationFailure
        2 | 9 | 14 | 16 | 121 => StoreError::InvalidArgument(message),
        // MaxTimeMSExpired, ExceededTimeLimit
        50 | 262 => StoreError::DeadlineExceeded(message),
        // ExceededMemoryLimit, OutOfDiskSpace
        146 | 14031 => StoreError::ResourceExhausted(message),
        _ => StoreError::Unavailable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn codes_map_to_store_errors() {
        assert!(matches!(classify_code(13, "x".into()), StoreError::PermissionDenied(_)));
        assert!(matches!(classify_code(121, "x".into()), StoreError::InvalidArgument(_)));
        assert!(matches!(classify_code(50, "x".into()), StoreError::DeadlineExceeded(_)));
        assert!(matches!(classify_code(14031, "x".into()), StoreError::ResourceExhausted(_)));
        // NotWritablePrimary
        assert!(classify_code(10107, "x".into()).is_transient());
    }

    fn record_at(ts: DateTime<Utc>) -> ProcessedRecord {
        ProcessedRecord {
            entity_id: "wallbox-1".into(),
            state: "charging".into(),
            friendly_name: Some("Garage".into()),
            measurement_timestamp: ts,
            phase_totals: PhaseCurrents { l1: 12.0, l2: 11.8, l3: 12.1 },
            charger_phases: PhaseCurrents { l1: 6.0, l2: 6.1, l3: 5.9 },
            available_current: PhaseCurrents::default(),
            max_total: 12.1,
            charger_sum: 18.0,
            charging: true,
            target_limits: PhaseLimits { l1: 9, l2: 10, l3: 9 },
            warnings: vec![],
            processed_at: ts,
            source_event_id: "evt-1".into(),
        }
    }

    #[test]
    fn document_uses_bson_dates_and_string_id() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let record = record_at(ts);

        let document =
            bson::to_document(&MeasurementDocument::new("wallbox-1:2024-06-01T10:00:00Z", &record))
                .unwrap();

        assert_eq!(document.get_str("_id").unwrap(), "wallbox-1:2024-06-01T10:00:00Z");
        assert_eq!(document.get_str("sourceEventId").unwrap(), "evt-1");
        assert_eq!(document.get_f64("maxTotal").unwrap(), 12.1);
        assert_eq!(
            document.get_datetime("measurementTimestamp").unwrap().timestamp_millis(),
            ts.timestamp_millis()
        );
        assert_eq!(
            document.get_document("targetLimits").unwrap().get_i32("l2").unwrap(),
            10
        );
    }

    #[test]
    fn sub_millisecond_timestamp_survives_storage() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_000);
        let record = record_at(ts);
        let id = crate::processor::persister::document_id(&record);

        let stored = bson::to_document(&MeasurementDocument::new(&id, &record)).unwrap();
        let back: MeasurementDocument = bson::from_document(stored).unwrap();

        assert_eq!(back.id, "wallbox-1:2024-06-01T10:00:00.123456Z");
        assert_eq!(back.measurement_ts, "2024-06-01T10:00:00.123456Z");
        assert_eq!(back.exact_measurement_timestamp().unwrap(), ts);
        assert!(back.id.ends_with(&back.measurement_ts));
        // the BSON date keeps milliseconds only
        assert_eq!(back.measurement_timestamp.timestamp_millis(), ts.timestamp_millis());
    }
}
