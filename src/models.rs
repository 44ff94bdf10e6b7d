use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::deserialize_optional_utc;

/// One snapshot of three-phase currents as published by the device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: ChargingAttributes,
    #[serde(default, deserialize_with = "deserialize_optional_utc")]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_utc")]
    pub last_reported: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_utc")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: MeasurementContext,
}

impl Measurement {
    /// The instant the measurement describes: `last_reported`, then
    /// `last_updated`, then `last_changed`, then the transport publish time.
    pub fn measurement_timestamp(&self, publish_time: DateTime<Utc>) -> DateTime<Utc> {
        self.last_reported
            .or(self.last_updated)
            .or(self.last_changed)
            .unwrap_or(publish_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChargingAttributes {
    pub total_l1: f64,
    pub total_l2: f64,
    pub total_l3: f64,
    pub charger_l1: f64,
    pub charger_l2: f64,
    pub charger_l3: f64,
    pub friendly_name: Option<String>,
}

impl ChargingAttributes {
    pub fn totals(&self) -> PhaseCurrents {
        PhaseCurrents {
            l1: self.total_l1,
            l2: self.total_l2,
            l3: self.total_l3,
        }
    }

    pub fn charger(&self) -> PhaseCurrents {
        PhaseCurrents {
            l1: self.charger_l1,
            l2: self.charger_l2,
            l3: self.charger_l3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeasurementContext {
    pub id: String,
    pub parent_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseCurrents {
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
}

impl PhaseCurrents {
    /// Phases in L1, L2, L3 order.
    pub fn phases(&self) -> [(&'static str, f64); 3] {
        [("l1", self.l1), ("l2", self.l2), ("l3", self.l3)]
    }
}

/// Suggested charger current limit per phase, whole amperes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLimits {
    pub l1: i32,
    pub l2: i32,
    pub l3: i32,
}

/// The stored form of a processed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub entity_id: String,
    pub state: String,
    pub friendly_name: Option<String>,
    pub measurement_timestamp: DateTime<Utc>,
    pub phase_totals: PhaseCurrents,
    pub charger_phases: PhaseCurrents,
    pub available_current: PhaseCurrents,
    pub max_total: f64,
    pub charger_sum: f64,
    pub charging: bool,
    pub target_limits: PhaseLimits,
    pub warnings: Vec<String>,
    pub processed_at: DateTime<Utc>,
    pub source_event_id: String,
}

impl ProcessedRecord {
    /// Same record with `processed_at` blanked, for comparing redeliveries.
    pub fn without_processed_at(&self) -> ProcessedRecord {
        ProcessedRecord {
            processed_at: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Processed,
    Skipped,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Processed => "processed",
            CommandStatus::Skipped => "skipped",
        }
    }
}

/// Downstream event announcing a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub entity_id: String,
    pub source_event_id: String,
    pub status: CommandStatus,
    pub processed_at: DateTime<Utc>,
}
