mod budget;
pub(crate) mod chain;
pub(crate) mod displacement;
pub(crate) mod placement;

pub use budget::Deadline;
pub use chain::ChainStatus;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::availability::AvailabilityIndex;
use super::domain::{GroupId, PersonId, SlotGroup, TermId, TimeSlotId, Weekday};
use super::engine::EngineConfig;
use super::scoring::{
    composition_violation, CompatibilityScore, CompatibilityScorer, CompositionViolation,
    EffectiveClass, ScoreBreakdown,
};
use super::snapshot::{Projection, TermSnapshot};

/// How a recommendation reaches its target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Direct,
    Displacement,
    Chain,
    /// Best-effort sweep result; compatible and open, but not an optimised choice.
    Fallback,
}

impl RecommendationKind {
    pub const fn label(self) -> &'static str {
        match self {
            RecommendationKind::Direct => "direct",
            RecommendationKind::Displacement => "displacement",
            RecommendationKind::Chain => "chain",
            RecommendationKind::Fallback => "fallback",
        }
    }

    const fn tie_rank(self) -> u8 {
        match self {
            RecommendationKind::Direct => 0,
            RecommendationKind::Displacement => 1,
            RecommendationKind::Chain => 2,
            RecommendationKind::Fallback => 3,
        }
    }
}

/// One step of a plan: `person_id` enters `group_id`, evicting `leaving` if set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub person_id: PersonId,
    #[serde(default)]
    pub leaving: Option<PersonId>,
    pub group_id: GroupId,
    /// Group the mover sat in when the move was proposed.
    #[serde(default)]
    pub from_group: Option<GroupId>,
    /// Mover's score in the new group minus their score where they were (0 if unplaced).
    #[serde(default)]
    pub score_delta: f64,
}

/// Transient, never persisted search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub person_id: PersonId,
    pub term_id: TermId,
    pub group_id: GroupId,
    pub group_name: String,
    pub day: Weekday,
    pub slot: TimeSlotId,
    pub kind: RecommendationKind,
    /// Live class of the target group before any move is applied.
    pub effective_class: EffectiveClass,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub percentage: f64,
    /// Sum of every move's score delta.
    pub benefit: f64,
    pub moves: Vec<Move>,
}

impl Recommendation {
    pub(crate) fn new(
        kind: RecommendationKind,
        person_id: &PersonId,
        term_id: &TermId,
        group: &SlotGroup,
        class: EffectiveClass,
        score: CompatibilityScore,
        moves: Vec<Move>,
    ) -> Self {
        let benefit = moves.iter().map(|mv| mv.score_delta).sum::<f64>();
        Self {
            person_id: person_id.clone(),
            term_id: term_id.clone(),
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            day: group.day,
            slot: group.slot,
            kind,
            effective_class: class,
            score: score.total,
            breakdown: score.breakdown,
            percentage: score.percentage,
            benefit: round_tenth(benefit),
            moves,
        }
    }

    pub fn leaving_people(&self) -> impl Iterator<Item = &PersonId> {
        self.moves.iter().filter_map(|mv| mv.leaving.as_ref())
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == RecommendationKind::Fallback
    }
}

/// Caller-controlled knobs for a single search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: Option<usize>,
    pub include_swaps: bool,
    pub include_chains: bool,
    pub time_budget_ms: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: None,
            include_swaps: true,
            include_chains: true,
            time_budget_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Direct,
    Displacement,
    Chain,
    Fallback,
}

impl SearchPhase {
    pub const fn label(self) -> &'static str {
        match self {
            SearchPhase::Direct => "direct",
            SearchPhase::Displacement => "displacement",
            SearchPhase::Chain => "chain",
            SearchPhase::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: SearchPhase,
    pub found: usize,
    pub completed: bool,
}

/// Ranked search result. An empty list is a successful outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub person_id: PersonId,
    pub term_id: TermId,
    pub recommendations: Vec<Recommendation>,
    /// Set when the time budget cut a phase short; the list is partial.
    pub budget_exhausted: bool,
    pub phases: Vec<PhaseReport>,
}

/// Borrowed state shared by every phase of one search.
pub(crate) struct SearchContext<'a, R> {
    pub snapshot: &'a TermSnapshot,
    pub availability: &'a AvailabilityIndex<R>,
    pub scorer: &'a CompatibilityScorer,
    pub config: &'a EngineConfig,
}

/// Score descending; equal scores favour direct placements, then higher benefit.
pub(crate) fn rank(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(compare_recommendations);
}

fn compare_recommendations(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.kind.tie_rank().cmp(&b.kind.tie_rank()))
        .then_with(|| b.benefit.total_cmp(&a.benefit))
        .then_with(|| a.moves.len().cmp(&b.moves.len()))
        .then_with(|| a.group_id.cmp(&b.group_id))
        .then_with(|| leaving_key(a).cmp(&leaving_key(b)))
}

fn leaving_key(recommendation: &Recommendation) -> Vec<&PersonId> {
    recommendation.leaving_people().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveViolation {
    #[error("{0} is displaced more than once")]
    RepeatedLeaving(PersonId),
    #[error("move {index} references unknown group {group}")]
    UnknownGroup { index: usize, group: GroupId },
    #[error("move {index} leaves group {group} invalid: {violation}")]
    Composition {
        index: usize,
        group: GroupId,
        violation: CompositionViolation,
    },
    #[error("move {index} has no enrollment data for a member of {group}")]
    MissingData { index: usize, group: GroupId },
}

/// Replay `moves` over `base` and check every touched group after each step.
pub(crate) fn validate_moves(base: &Projection<'_>, moves: &[Move]) -> Result<(), MoveViolation> {
    let mut leaving = BTreeSet::new();
    for mv in moves {
        if let Some(person) = &mv.leaving {
            if !leaving.insert(person) {
                return Err(MoveViolation::RepeatedLeaving(person.clone()));
            }
        }
    }

    let snapshot = base.snapshot();
    let mut projection = base.clone();
    for (index, mv) in moves.iter().enumerate() {
        let target = snapshot
            .group(&mv.group_id)
            .ok_or_else(|| MoveViolation::UnknownGroup {
                index,
                group: mv.group_id.clone(),
            })?;
        let source = projection.group_of(&mv.person_id);

        projection.apply(&mv.person_id, mv.leaving.as_ref(), &mv.group_id);

        for group in std::iter::once(target).chain(source) {
            let arities =
                projection
                    .member_arities(&group.id)
                    .map_err(|_| MoveViolation::MissingData {
                        index,
                        group: group.id.clone(),
                    })?;
            if let Some(violation) = composition_violation(group.arity, group.capacity(), &arities)
            {
                return Err(MoveViolation::Composition {
                    index,
                    group: group.id.clone(),
                    violation,
                });
            }
        }
    }

    Ok(())
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
