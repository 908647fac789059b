mod config;
mod occupancy;
mod rules;

pub use config::ScoringWeights;
pub use occupancy::{
    admits, composition_violation, effective_class, CompositionViolation, EffectiveClass,
};
pub(crate) use rules::ScoreInput;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::TtlCache;
use super::domain::{PersonId, TermId};
use super::repository::{RepositoryError, ScheduleReader};
use rules::{score_components, COMPONENT_MAXIMA};

/// Raw points per component before weighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill: f64,
    pub cohort: f64,
    pub arity_fit: f64,
    pub specialization: f64,
    pub lesson_balance: f64,
    pub capacity_fit: f64,
    pub time_preference: f64,
}

impl ScoreBreakdown {
    fn components(&self) -> [f64; 7] {
        [
            self.skill,
            self.cohort,
            self.arity_fit,
            self.specialization,
            self.lesson_balance,
            self.capacity_fit,
            self.time_preference,
        ]
    }
}

/// Weighted compatibility of one person with one slot group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub total: f64,
    pub breakdown: ScoreBreakdown,
    /// `total` as a share of the best achievable total under the same weights.
    pub percentage: f64,
}

/// Stateless rubric plus a TTL cache of prefetched lesson balances.
pub struct CompatibilityScorer {
    weights: ScoringWeights,
    balances: TtlCache<(PersonId, TermId), i32>,
}

impl CompatibilityScorer {
    pub fn new(weights: ScoringWeights, ttl: Duration) -> Self {
        Self {
            weights,
            balances: TtlCache::new(ttl),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub(crate) fn score(&self, input: &ScoreInput<'_>) -> CompatibilityScore {
        let breakdown = score_components(input);
        let weights = self.weight_vector();

        let total: f64 = breakdown
            .components()
            .iter()
            .zip(weights.iter())
            .map(|(raw, weight)| raw * weight / 100.0)
            .sum();
        let best: f64 = COMPONENT_MAXIMA
            .iter()
            .zip(weights.iter())
            .map(|(raw, weight)| raw * weight / 100.0)
            .sum();
        let percentage = if best > 0.0 {
            round_tenth(total / best * 100.0)
        } else {
            0.0
        };

        CompatibilityScore {
            total: round_tenth(total),
            breakdown,
            percentage,
        }
    }

    /// Load balances for a batch of people with one aggregate query, serving cached entries
    /// where they are still fresh. People without an enrollment are absent from the result.
    pub fn prefetch_balances<R>(
        &self,
        reader: &R,
        term: &TermId,
        people: &[PersonId],
    ) -> Result<HashMap<PersonId, i32>, RepositoryError>
    where
        R: ScheduleReader + ?Sized,
    {
        let mut balances = HashMap::with_capacity(people.len());
        let mut missing = Vec::new();
        for person in people {
            match self.balances.get(&(person.clone(), term.clone())) {
                Some(balance) => {
                    balances.insert(person.clone(), balance);
                }
                None => missing.push(person.clone()),
            }
        }

        if !missing.is_empty() {
            let fetched = reader.lesson_balances(term, &missing)?;
            debug!(
                requested = missing.len(),
                fetched = fetched.len(),
                "lesson balances prefetched"
            );
            for (person, balance) in fetched {
                self.balances.insert((person.clone(), term.clone()), balance);
                balances.insert(person, balance);
            }
        }

        Ok(balances)
    }

    pub fn cached_balance(&self, person: &PersonId, term: &TermId) -> Option<i32> {
        self.balances.get(&(person.clone(), term.clone()))
    }

    pub fn clear(&self) {
        self.balances.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.balances.purge_expired()
    }

    fn weight_vector(&self) -> [f64; 7] {
        let w = &self.weights;
        [
            w.skill,
            w.cohort,
            w.arity_fit,
            w.specialization,
            w.lesson_balance,
            w.capacity_fit,
            w.time_preference,
        ]
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
