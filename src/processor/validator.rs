use crate::{
    errors::ProcessingError,
    models::{ChargingAttributes, Measurement},
};

pub const DEFAULT_TOLERANCE_AMPS: f64 = 0.5;

/// Hard checks reject the measurement; the charger-vs-total check only
/// annotates it.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    tolerance: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_AMPS)
    }
}

impl Validator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Returns the soft warnings for an accepted measurement.
    pub fn validate(&self, measurement: &Measurement) -> Result<Vec<String>, ProcessingError> {
        if measurement.entity_id.trim().is_empty() {
            return Err(ProcessingError::InvalidMeasurement(
                "entity_id is empty".to_string(),
            ));
        }

        let currents = currents(&measurement.attributes);

        if let Some((name, value)) = currents.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ProcessingError::InvalidMeasurement(format!(
                "{} is not finite ({})",
                name, value
            )));
        }

        if let Some((name, value)) = currents.iter().find(|(_, v)| *v < 0.0) {
            return Err(ProcessingError::InvalidMeasurement(format!(
                "{} is negative ({})",
                name, value
            )));
        }

        let totals = measurement.attributes.totals();
        let charger = measurement.attributes.charger();
        let mut warnings = Vec::new();

        for ((phase, total), (_, drawn)) in totals.phases().into_iter().zip(charger.phases()) {
            if drawn > total + self.tolerance {
                warnings.push(format!(
                    "charger current on {} ({} A) exceeds phase total ({} A) by more than {} A",
                    phase, drawn, total, self.tolerance
                ));
            }
        }

        Ok(warnings)
    }
}

fn currents(attributes: &ChargingAttributes) -> [(&'static str, f64); 6] {
    [
        ("total_l1", attributes.total_l1),
        ("total_l2", attributes.total_l2),
        ("total_l3", attributes.total_l3),
        ("charger_l1", attributes.charger_l1),
        ("charger_l2", attributes.charger_l2),
        ("charger_l3", attributes.charger_l3),
    ]
}
