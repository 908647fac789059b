//! Phase 2: free a seat by displacing one occupant who has somewhere else to go.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::super::domain::{ArityClass, GroupId, PersonId, SlotGroup, SlotKey};
use super::super::repository::{RepositoryError, ScheduleReader};
use super::super::scoring::{admits, composition_violation, CompatibilityScore, EffectiveClass};
use super::super::snapshot::Projection;
use super::placement::direct_candidates;
use super::{round_tenth, validate_moves, Deadline, Move, Recommendation, RecommendationKind,
    SearchContext};

/// A group where the person could take the seat of its weakest same-arity occupant.
#[derive(Debug, Clone)]
pub(crate) struct DisplacementOpportunity<'a> {
    pub group: &'a SlotGroup,
    pub class: EffectiveClass,
    pub displaced: PersonId,
    pub candidate_score: CompatibilityScore,
    pub displaced_score: CompatibilityScore,
}

/// Admission policy for displacement.
///
/// The incoming person does not have to beat the occupant; they only must not be worse by
/// more than `margin` points. Whether the occupant has somewhere to go is checked separately.
pub(crate) fn within_displacement_margin(candidate: f64, occupant: f64, margin: f64) -> bool {
    candidate >= occupant - margin
}

/// Every group in the person's availability that is closed to them directly but holds a
/// same-arity occupant they may displace. `protected` people are never chosen as occupant.
pub(crate) fn opportunities<'a, R>(
    ctx: &SearchContext<'a, R>,
    projection: &Projection<'a>,
    person: &PersonId,
    exclude: &BTreeSet<GroupId>,
    protected: &BTreeSet<PersonId>,
    deadline: &Deadline,
) -> Result<Vec<DisplacementOpportunity<'a>>, RepositoryError>
where
    R: ScheduleReader,
{
    let Some(arity) = ctx.snapshot.arity_of(person) else {
        return Ok(Vec::new());
    };

    let keys: Vec<SlotKey> = ctx
        .availability
        .available_slots(person)?
        .iter()
        .copied()
        .collect();

    let per_slot: Vec<Vec<DisplacementOpportunity<'a>>> = keys
        .par_iter()
        .map(|key| {
            if deadline.is_expired() {
                return Vec::new();
            }
            ctx.snapshot
                .groups_at(*key)
                .filter_map(|group| {
                    evaluate(ctx, projection, person, arity, group, exclude, protected)
                })
                .collect()
        })
        .collect();

    let mut found: Vec<DisplacementOpportunity<'a>> = per_slot.into_iter().flatten().collect();
    found.sort_by(|a, b| {
        b.candidate_score
            .total
            .total_cmp(&a.candidate_score.total)
            .then_with(|| a.displaced_score.total.total_cmp(&b.displaced_score.total))
            .then_with(|| a.group.id.cmp(&b.group.id))
    });
    Ok(found)
}

fn evaluate<'a, R>(
    ctx: &SearchContext<'a, R>,
    projection: &Projection<'a>,
    person: &PersonId,
    arity: ArityClass,
    group: &'a SlotGroup,
    exclude: &BTreeSet<GroupId>,
    protected: &BTreeSet<PersonId>,
) -> Option<DisplacementOpportunity<'a>> {
    if exclude.contains(&group.id) {
        return None;
    }
    let members = projection.members(&group.id);
    if members.is_empty() || members.contains(person) {
        return None;
    }

    let class = match projection.effective_class(&group.id) {
        Ok(class) => class,
        Err(reason) => {
            warn!(group = %group.id, %reason, "skipping malformed group");
            return None;
        }
    };
    let arities = projection.member_arities(&group.id).ok()?;

    let mut joined = arities.clone();
    joined.push(arity);
    let directly_open = members.len() < group.capacity()
        && admits(class, arity, false)
        && composition_violation(group.arity, group.capacity(), &joined).is_none();
    if directly_open {
        return None;
    }

    // Swapping like for like keeps the arity multiset, so the label rules still hold.
    if composition_violation(group.arity, group.capacity(), &arities).is_some() {
        return None;
    }

    let mut weakest: Option<(PersonId, CompatibilityScore)> = None;
    for member in members {
        if protected.contains(member) || ctx.snapshot.arity_of(member) != Some(arity) {
            continue;
        }
        let score = match projection.score(ctx.scorer, member, group) {
            Ok(score) => score,
            Err(reason) => {
                warn!(group = %group.id, member = %member, %reason, "skipping unscorable occupant");
                return None;
            }
        };
        let weaker = match &weakest {
            None => true,
            Some((current, current_score)) => score
                .total
                .total_cmp(&current_score.total)
                .then_with(|| member.cmp(current))
                .is_lt(),
        };
        if weaker {
            weakest = Some((member.clone(), score));
        }
    }
    let (displaced, displaced_score) = weakest?;

    let candidate_score = match projection.score(ctx.scorer, person, group) {
        Ok(score) => score,
        Err(reason) => {
            warn!(group = %group.id, person = %person, %reason, "skipping unscorable candidate");
            return None;
        }
    };

    if !within_displacement_margin(
        candidate_score.total,
        displaced_score.total,
        ctx.config.displacement_margin,
    ) {
        return None;
    }

    Some(DisplacementOpportunity {
        group,
        class,
        displaced,
        candidate_score,
        displaced_score,
    })
}

/// Phase 2 output: finished recommendations plus opportunities whose occupant had no
/// direct alternative, handed to the chain builder.
pub(crate) struct DisplacementPhase<'a> {
    pub recommendations: Vec<Recommendation>,
    pub stranded: Vec<DisplacementOpportunity<'a>>,
    pub completed: bool,
}

pub(crate) fn displacement_search<'a, R>(
    ctx: &SearchContext<'a, R>,
    projection: &Projection<'a>,
    person: &PersonId,
    baseline: Option<f64>,
    deadline: &Deadline,
) -> Result<DisplacementPhase<'a>, RepositoryError>
where
    R: ScheduleReader,
{
    let term = ctx.snapshot.term_id();
    let from_group = projection.group_of(person).map(|group| group.id.clone());
    let protected = BTreeSet::from([person.clone()]);
    let found = opportunities(ctx, projection, person, &BTreeSet::new(), &protected, deadline)?;

    let mut phase = DisplacementPhase {
        recommendations: Vec::new(),
        stranded: Vec::new(),
        completed: !deadline.is_expired(),
    };

    for opportunity in found {
        if deadline.is_expired() {
            phase.completed = false;
            break;
        }

        // The occupant's alternative is checked against current data, so it is verifiable
        // at proposal time independently of the incoming move.
        let exclude = BTreeSet::from([opportunity.group.id.clone()]);
        let alternative =
            direct_candidates(ctx, projection, &opportunity.displaced, &exclude, false, deadline)?
                .into_iter()
                .next();

        let Some(alternative) = alternative else {
            // An empty answer after expiry may just be a cut-short lookup.
            if deadline.is_expired() {
                phase.completed = false;
                break;
            }
            phase.stranded.push(opportunity);
            continue;
        };

        let moves = vec![
            Move {
                person_id: person.clone(),
                leaving: Some(opportunity.displaced.clone()),
                group_id: opportunity.group.id.clone(),
                from_group: from_group.clone(),
                score_delta: round_tenth(
                    opportunity.candidate_score.total - baseline.unwrap_or(0.0),
                ),
            },
            Move {
                person_id: opportunity.displaced.clone(),
                leaving: None,
                group_id: alternative.group.id.clone(),
                from_group: Some(opportunity.group.id.clone()),
                score_delta: round_tenth(
                    alternative.score.total - opportunity.displaced_score.total,
                ),
            },
        ];

        if let Err(violation) = validate_moves(projection, &moves) {
            debug!(group = %opportunity.group.id, %violation, "displacement rejected");
            continue;
        }

        phase.recommendations.push(Recommendation::new(
            RecommendationKind::Displacement,
            person,
            term,
            opportunity.group,
            opportunity.class,
            opportunity.candidate_score,
            moves,
        ));
    }

    Ok(phase)
}

#[cfg(test)]
mod tests {
    use super::within_displacement_margin;

    #[test]
    fn margin_tolerates_slightly_weaker_candidates() {
        assert!(within_displacement_margin(150.0, 160.0, 25.0));
        assert!(within_displacement_margin(190.0, 160.0, 25.0));
        assert!(!within_displacement_margin(120.0, 160.0, 25.0));
        assert!(within_displacement_margin(160.0, 160.0, 0.0));
    }
}
