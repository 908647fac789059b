use serde::{Deserialize, Serialize};

/// Percentage multipliers applied to each raw component.
///
/// `time_preference` is reserved: it occupies its place in the scale but no rule produces
/// points for it yet, so it always contributes zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub skill: f64,
    pub cohort: f64,
    pub arity_fit: f64,
    pub specialization: f64,
    pub lesson_balance: f64,
    pub capacity_fit: f64,
    pub time_preference: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill: 100.0,
            cohort: 80.0,
            arity_fit: 50.0,
            specialization: 50.0,
            lesson_balance: 40.0,
            capacity_fit: 30.0,
            time_preference: 20.0,
        }
    }
}

impl ScoringWeights {
    /// Sum of the weight table (370 with defaults).
    pub fn scale(&self) -> f64 {
        self.skill
            + self.cohort
            + self.arity_fit
            + self.specialization
            + self.lesson_balance
            + self.capacity_fit
            + self.time_preference
    }
}
