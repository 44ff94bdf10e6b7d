use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};

use super::{
    calculator::{Calculated, Calculator},
    deadline::Deadline,
    emitter::{CommandPublisher, Emitter},
    envelope::{self, Envelope},
    parser,
    persister::{DocumentReference, DocumentStore, Persister},
    validator::Validator,
};
use crate::{
    config::ProcessorConfig,
    errors::ProcessingError,
    models::{Command, CommandStatus, Measurement, ProcessedRecord},
};

/// Process-wide clients, built once at startup and shared by every invocation.
#[derive(Clone)]
pub struct Clients {
    pub store: Arc<dyn DocumentStore>,
    pub publisher: Arc<dyn CommandPublisher>,
}

/// What the host should do with the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

#[derive(Debug)]
pub enum Outcome {
    /// The record is durable. `emitted` is false when the command could not
    /// be published.
    Processed {
        reference: DocumentReference,
        status: CommandStatus,
        emitted: bool,
    },
    /// Permanent failure, acknowledged so it does not block the queue.
    Dropped(ProcessingError),
    /// Transient failure, the host must redeliver.
    Retry(ProcessingError),
}

impl Outcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Retry(_) => Disposition::Nack,
            Outcome::Processed { .. } | Outcome::Dropped(_) => Disposition::Ack,
        }
    }
}

/// Runs one measurement event from envelope to emitted command.
pub struct MeasurementHandler {
    validator: Validator,
    calculator: Calculator,
    persister: Persister,
    emitter: Emitter,
    force_update: bool,
}

impl MeasurementHandler {
    pub fn new(clients: &Clients, config: &ProcessorConfig) -> Self {
        Self {
            validator: Validator::new(config.current_tolerance_amps),
            calculator: Calculator::new(config.rated_current_amps),
            persister: Persister::new(clients.store.clone(), config.persist_collection.clone()),
            emitter: Emitter::new(
                clients.publisher.clone(),
                config.egress_topic_id.clone(),
                config.publish_timeout(),
            ),
            force_update: config.force_update,
        }
    }

    /// Entry point for hosts that deliver the raw transport event.
    pub async fn handle(&self, event: &[u8], deadline: &Deadline) -> Outcome {
        match envelope::decode(event) {
            Ok(envelope) => self.handle_envelope(&envelope, deadline).await,
            Err(err) => self.fail("unknown", None, err),
        }
    }

    pub async fn handle_envelope(&self, envelope: &Envelope, deadline: &Deadline) -> Outcome {
        match parser::parse(&envelope.data) {
            Ok(measurement) => self.process(envelope, measurement, deadline).await,
            Err(err) => self.fail(&envelope.id, None, err),
        }
    }

    /// Validate, calculate, persist, then emit. The store write always comes
    /// before the publish.
    pub async fn process(
        &self,
        envelope: &Envelope,
        measurement: Measurement,
        deadline: &Deadline,
    ) -> Outcome {
        let entity_id = measurement.entity_id.as_str();

        let warnings = match self.validator.validate(&measurement) {
            Ok(warnings) => warnings,
            Err(err) => return self.fail(&envelope.id, Some(entity_id), err),
        };
        for warning in &warnings {
            warn!(envelope_id = envelope.id.as_str(), entity_id = entity_id; "Soft validation: {}", warning);
        }

        let calculated = self.calculator.calculate(&measurement);
        let record = build_record(envelope, &measurement, &calculated, warnings);

        let reference = match self.persister.write(&record, deadline).await {
            Ok(reference) => reference,
            Err(err) => return self.fail(&envelope.id, Some(entity_id), err.into()),
        };

        let status = if calculated.charging || self.force_update {
            CommandStatus::Processed
        } else {
            CommandStatus::Skipped
        };

        let command = Command {
            entity_id: record.entity_id.clone(),
            source_event_id: record.source_event_id.clone(),
            status,
            processed_at: record.processed_at,
        };

        let emitted = self.emit(&envelope.id, &command, deadline).await;

        info!(
            envelope_id = envelope.id.as_str(),
            entity_id = entity_id,
            document_id = reference.id.as_str(),
            status = status.as_str(),
            emitted = emitted;
            "Measurement processed"
        );

        Outcome::Processed {
            reference,
            status,
            emitted,
        }
    }

    /// Publishes after the record is durable. Failures are logged and never
    /// fail the invocation; a transient failure gets one more attempt.
    async fn emit(&self, envelope_id: &str, command: &Command, deadline: &Deadline) -> bool {
        let mut retried = false;

        loop {
            let err = match self.emitter.publish(command, deadline).await {
                Ok(()) => return true,
                Err(err) => ProcessingError::from(err),
            };

            let retry = err.is_transient() && !retried && !deadline.is_expired();

            if err.is_transient() {
                warn!(
                    envelope_id = envelope_id,
                    entity_id = command.entity_id.as_str(),
                    kind = err.kind(),
                    retry = retry;
                    "Command not published: {}", err
                );
            } else {
                error!(
                    envelope_id = envelope_id,
                    entity_id = command.entity_id.as_str(),
                    kind = err.kind();
                    "Command not published: {}", err
                );
            }

            if !retry {
                return false;
            }
            retried = true;
        }
    }

    fn fail(&self, envelope_id: &str, entity_id: Option<&str>, err: ProcessingError) -> Outcome {
        let entity_id = entity_id.unwrap_or("-");

        if err.is_retryable() {
            warn!(envelope_id = envelope_id, entity_id = entity_id, kind = err.kind(); "Event will be redelivered: {}", err);
            Outcome::Retry(err)
        } else {
            error!(envelope_id = envelope_id, entity_id = entity_id, kind = err.kind(); "Event dropped: {}", err);
            Outcome::Dropped(err)
        }
    }
}

fn build_record(
    envelope: &Envelope,
    measurement: &Measurement,
    calculated: &Calculated,
    warnings: Vec<String>,
) -> ProcessedRecord {
    ProcessedRecord {
        entity_id: measurement.entity_id.clone(),
        state: measurement.state.clone(),
        friendly_name: measurement.attributes.friendly_name.clone(),
        measurement_timestamp: measurement.measurement_timestamp(envelope.publish_time),
        phase_totals: measurement.attributes.totals(),
        charger_phases: measurement.attributes.charger(),
        available_current: calculated.available,
        max_total: calculated.max_total,
        charger_sum: calculated.charger_sum,
        charging: calculated.charging,
        target_limits: calculated.target_limits,
        warnings,
        processed_at: Utc::now(),
        source_event_id: envelope.id.clone(),
    }
}
