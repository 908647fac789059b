//! Phase 3: multi-hop displacement chains.
//!
//! Each stranded displacement from phase 2 seeds a chain. The chain is grown on an explicit
//! stack: the person currently in hand either lands somewhere directly (the chain completes)
//! or displaces someone else, who becomes the next person in hand. Growth stops at the depth
//! bound, the branching bound, or the deadline, whichever comes first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::super::domain::{GroupId, PersonId, SlotGroup};
use super::super::repository::{RepositoryError, ScheduleReader};
use super::super::scoring::{CompatibilityScore, EffectiveClass};
use super::super::snapshot::Projection;
use super::displacement::{opportunities, DisplacementOpportunity};
use super::placement::direct_candidates;
use super::{round_tenth, validate_moves, Deadline, Move, Recommendation, RecommendationKind,
    SearchContext};

/// Lifecycle of a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Building,
    /// The last move displaces nobody.
    Complete,
    /// Depth bound hit, dead end, or rejected on validation.
    Abandoned,
}

impl ChainStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ChainStatus::Building => "building",
            ChainStatus::Complete => "complete",
            ChainStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Clone)]
struct ChainState<'a> {
    status: ChainStatus,
    root: &'a SlotGroup,
    root_class: EffectiveClass,
    root_score: CompatibilityScore,
    moves: Vec<Move>,
    projection: Projection<'a>,
    /// Person displaced by the last move, still without a seat.
    pending: PersonId,
    pending_from: GroupId,
    pending_previous: f64,
    movers: BTreeSet<PersonId>,
    touched: BTreeSet<GroupId>,
}

impl<'a> ChainState<'a> {
    fn depth(&self) -> usize {
        self.moves.len()
    }

    /// Sum of deltas for everyone the chain moves except the requester.
    fn displaced_benefit(&self) -> f64 {
        self.moves.iter().skip(1).map(|mv| mv.score_delta).sum()
    }

    fn extend(&self, opportunity: &DisplacementOpportunity<'a>) -> Option<ChainState<'a>> {
        if self.movers.contains(&opportunity.displaced) {
            return None;
        }

        let mut next = self.clone();
        next.projection.apply(
            &self.pending,
            Some(&opportunity.displaced),
            &opportunity.group.id,
        );
        next.moves.push(Move {
            person_id: self.pending.clone(),
            leaving: Some(opportunity.displaced.clone()),
            group_id: opportunity.group.id.clone(),
            from_group: Some(self.pending_from.clone()),
            score_delta: round_tenth(opportunity.candidate_score.total - self.pending_previous),
        });
        next.movers.insert(opportunity.displaced.clone());
        next.touched.insert(opportunity.group.id.clone());
        next.pending = opportunity.displaced.clone();
        next.pending_from = opportunity.group.id.clone();
        next.pending_previous = opportunity.displaced_score.total;
        Some(next)
    }
}

/// Phase 3 output.
pub(crate) struct ChainPhase {
    /// Complete chains, best cumulative benefit first.
    pub recommendations: Vec<Recommendation>,
    pub abandoned: usize,
    pub completed: bool,
}

pub(crate) fn build_chains<'a, R>(
    ctx: &SearchContext<'a, R>,
    base: &Projection<'a>,
    requester: &PersonId,
    baseline: Option<f64>,
    seeds: &[DisplacementOpportunity<'a>],
    deadline: &Deadline,
) -> Result<ChainPhase, RepositoryError>
where
    R: ScheduleReader,
{
    let config = ctx.config;
    let from_group = base.group_of(requester).map(|group| group.id.clone());

    let mut stack: Vec<ChainState<'a>> = Vec::new();
    for seed in seeds.iter().take(config.chain_branching).rev() {
        let mut projection = base.clone();
        projection.apply(requester, Some(&seed.displaced), &seed.group.id);
        stack.push(ChainState {
            status: ChainStatus::Building,
            root: seed.group,
            root_class: seed.class,
            root_score: seed.candidate_score.clone(),
            moves: vec![Move {
                person_id: requester.clone(),
                leaving: Some(seed.displaced.clone()),
                group_id: seed.group.id.clone(),
                from_group: from_group.clone(),
                score_delta: round_tenth(seed.candidate_score.total - baseline.unwrap_or(0.0)),
            }],
            projection,
            pending: seed.displaced.clone(),
            pending_from: seed.group.id.clone(),
            pending_previous: seed.displaced_score.total,
            movers: BTreeSet::from([requester.clone(), seed.displaced.clone()]),
            touched: BTreeSet::from([seed.group.id.clone()]),
        });
    }

    let mut phase = ChainPhase {
        recommendations: Vec::new(),
        abandoned: 0,
        completed: true,
    };

    while let Some(mut state) = stack.pop() {
        if deadline.is_expired() {
            info!(
                pending = stack.len() + 1,
                found = phase.recommendations.len(),
                "chain search ran out of time"
            );
            phase.completed = false;
            break;
        }
        if phase.recommendations.len() >= config.max_chains {
            break;
        }

        let landing = direct_candidates(
            ctx,
            &state.projection,
            &state.pending,
            &state.touched,
            false,
            deadline,
        )?
        .into_iter()
        .next();

        if let Some(landing) = landing {
            state.moves.push(Move {
                person_id: state.pending.clone(),
                leaving: None,
                group_id: landing.group.id.clone(),
                from_group: Some(state.pending_from.clone()),
                score_delta: round_tenth(landing.score.total - state.pending_previous),
            });

            state.status = match validate_moves(base, &state.moves) {
                Ok(()) if state.displaced_benefit() >= config.chain_min_benefit => {
                    ChainStatus::Complete
                }
                Ok(()) => {
                    debug!(
                        group = %state.root.id,
                        benefit = state.displaced_benefit(),
                        "chain benefit below threshold"
                    );
                    ChainStatus::Abandoned
                }
                Err(violation) => {
                    debug!(group = %state.root.id, %violation, "chain failed validation");
                    ChainStatus::Abandoned
                }
            };
            debug!(
                group = %state.root.id,
                depth = state.depth(),
                status = state.status.label(),
                "chain closed"
            );

            if state.status == ChainStatus::Complete {
                phase.recommendations.push(Recommendation::new(
                    RecommendationKind::Chain,
                    requester,
                    ctx.snapshot.term_id(),
                    state.root,
                    state.root_class,
                    state.root_score,
                    state.moves,
                ));
            } else {
                phase.abandoned += 1;
            }
            continue;
        }

        // Every further hop adds a move, and the closing move needs room too.
        if state.depth() + 1 >= config.chain_max_depth {
            state.status = ChainStatus::Abandoned;
            debug!(group = %state.root.id, depth = state.depth(), "chain hit depth bound");
            phase.abandoned += 1;
            continue;
        }

        let next: Vec<ChainState<'a>> = opportunities(
            ctx,
            &state.projection,
            &state.pending,
            &state.touched,
            &state.movers,
            deadline,
        )?
        .iter()
        .filter_map(|opportunity| state.extend(opportunity))
        .take(config.chain_branching)
        .collect();

        if next.is_empty() {
            phase.abandoned += 1;
            continue;
        }
        stack.extend(next.into_iter().rev());
    }

    phase.recommendations.sort_by(|a, b| {
        b.benefit
            .total_cmp(&a.benefit)
            .then_with(|| a.moves.len().cmp(&b.moves.len()))
            .then_with(|| a.group_id.cmp(&b.group_id))
    });
    Ok(phase)
}
