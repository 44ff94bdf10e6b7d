#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use measurement_processor::{
    config::ProcessorConfig,
    models::{Command, ProcessedRecord},
    processor::{
        emitter::{CommandPublisher, PublishError},
        persister::{DocumentStore, StoreError},
        Clients, Deadline, MeasurementHandler, Outcome,
    },
};

/// Document store keyed by collection and id, failing with the queued errors
/// before it starts accepting writes.
#[derive(Default)]
pub struct ScriptedStore {
    failures: Mutex<VecDeque<StoreError>>,
    docs: Mutex<HashMap<(String, String), ProcessedRecord>>,
}

impl ScriptedStore {
    pub fn failing_with(errors: impl IntoIterator<Item = StoreError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<ProcessedRecord> {
        self.docs
            .lock()
            .unwrap()
            .get(&("processed_measurements".to_string(), id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        record: &ProcessedRecord,
    ) -> Result<(), StoreError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.docs
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    failure: Option<PublishError>,
    published: Mutex<Vec<(String, Command)>>,
}

impl RecordingPublisher {
    pub fn failing_with(err: PublishError) -> Self {
        Self {
            failure: Some(err),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<(String, Command)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let command: Command = serde_json::from_slice(&payload).unwrap();
        self.published.lock().unwrap().push((topic.to_string(), command));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<ScriptedStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub handler: MeasurementHandler,
}

impl Harness {
    pub fn new(store: ScriptedStore, publisher: RecordingPublisher) -> Self {
        let store = Arc::new(store);
        let publisher = Arc::new(publisher);
        let clients = Clients {
            store: store.clone(),
            publisher: publisher.clone(),
        };
        let config = ProcessorConfig::new("savemyfuse", "commands/charger");

        Self {
            handler: MeasurementHandler::new(&clients, &config),
            store,
            publisher,
        }
    }

    pub async fn deliver(&self, event: &[u8]) -> Outcome {
        self.handler.handle(event, &Deadline::none()).await
    }
}

pub const CHARGING_WALLBOX: &str = r#"{
    "entity_id": "wallbox-1",
    "state": "charging",
    "attributes": {
        "total_l1": 12.0, "total_l2": 11.8, "total_l3": 12.1,
        "charger_l1": 6.0, "charger_l2": 6.1, "charger_l3": 5.9
    },
    "last_reported": "2024-06-01T10:00:00Z"
}"#;

pub const CHARGING_WALLBOX_ID: &str = "wallbox-1:2024-06-01T10:00:00Z";

pub fn push_event(payload: &str) -> Vec<u8> {
    serde_json::json!({
        "message": {
            "data": STANDARD.encode(payload),
            "messageId": "evt-1",
            "message_id": "evt-1",
            "publishTime": "2024-06-01T10:00:05Z",
            "publish_time": "2024-06-01T10:00:05Z"
        },
        "subscription": "projects/savemyfuse/subscriptions/measurements"
    })
    .to_string()
    .into_bytes()
}

