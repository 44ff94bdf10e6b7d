use crate::models::{Measurement, PhaseCurrents, PhaseLimits};

pub const DEFAULT_RATED_CURRENT_AMPS: f64 = 16.0;

/// Headroom kept below the mains fuse when suggesting a charger limit.
const SAFETY_MARGIN_AMPS: f64 = 1.0;

/// Quantities derived from one measurement. Pure, no I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calculated {
    pub max_total: f64,
    pub charger_sum: f64,
    /// Phase total minus what the charger draws on it.
    pub available: PhaseCurrents,
    pub charging: bool,
    pub target_limits: PhaseLimits,
}

#[derive(Debug, Clone, Copy)]
pub struct Calculator {
    rated_current: f64,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(DEFAULT_RATED_CURRENT_AMPS)
    }
}

impl Calculator {
    pub fn new(rated_current: f64) -> Self {
        Self { rated_current }
    }

    pub fn calculate(&self, measurement: &Measurement) -> Calculated {
        let totals = measurement.attributes.totals();
        let charger = measurement.attributes.charger();

        let available = PhaseCurrents {
            l1: totals.l1 - charger.l1,
            l2: totals.l2 - charger.l2,
            l3: totals.l3 - charger.l3,
        };

        Calculated {
            max_total: max_total(&totals),
            charger_sum: charger_sum(&charger),
            available,
            charging: charger.phases().iter().any(|(_, amps)| *amps > 0.0),
            target_limits: PhaseLimits {
                l1: self.target_limit(available.l1),
                l2: self.target_limit(available.l2),
                l3: self.target_limit(available.l3),
            },
        }
    }

    /// Whole amperes the charger may draw on a phase given the other load on
    /// it, never above the rated current.
    fn target_limit(&self, load: f64) -> i32 {
        let limit = self.rated_current - load.trunc() - SAFETY_MARGIN_AMPS;
        limit.clamp(0.0, self.rated_current) as i32
    }
}

pub fn max_total(totals: &PhaseCurrents) -> f64 {
    totals.l1.max(totals.l2).max(totals.l3)
}

pub fn charger_sum(charger: &PhaseCurrents) -> f64 {
    charger.l1 + charger.l2 + charger.l3
}
