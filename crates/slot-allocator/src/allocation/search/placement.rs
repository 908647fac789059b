//! Phase 1: groups a person can join as they stand, with nobody moved.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::super::domain::{ArityClass, GroupId, PersonId, SlotGroup, SlotKey};
use super::super::repository::{RepositoryError, ScheduleReader};
use super::super::scoring::{admits, composition_violation, CompatibilityScore, EffectiveClass};
use super::super::snapshot::Projection;
use super::{Deadline, SearchContext};

/// A group with room whose live class admits the person.
#[derive(Debug, Clone)]
pub(crate) struct PlacementCandidate<'a> {
    pub group: &'a SlotGroup,
    pub class: EffectiveClass,
    pub score: CompatibilityScore,
}

/// Every directly joinable group in the person's availability, best first.
///
/// Pure: reads the projection, mutates nothing. An empty result is not an error.
pub(crate) fn direct_candidates<'a, R>(
    ctx: &SearchContext<'a, R>,
    projection: &Projection<'a>,
    person: &PersonId,
    exclude: &BTreeSet<GroupId>,
    relaxed: bool,
    deadline: &Deadline,
) -> Result<Vec<PlacementCandidate<'a>>, RepositoryError>
where
    R: ScheduleReader,
{
    let Some(arity) = ctx.snapshot.arity_of(person) else {
        debug!(person = %person, "no enrollment in snapshot; no direct placements");
        return Ok(Vec::new());
    };

    let keys: Vec<SlotKey> = ctx
        .availability
        .available_slots(person)?
        .iter()
        .copied()
        .collect();

    let per_slot: Vec<Vec<PlacementCandidate<'a>>> = keys
        .par_iter()
        .map(|key| {
            if deadline.is_expired() {
                return Vec::new();
            }
            ctx.snapshot
                .groups_at(*key)
                .filter_map(|group| {
                    evaluate(ctx, projection, person, arity, group, exclude, relaxed)
                })
                .collect()
        })
        .collect();

    let mut candidates: Vec<PlacementCandidate<'a>> = per_slot.into_iter().flatten().collect();
    candidates.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| a.group.id.cmp(&b.group.id))
    });
    Ok(candidates)
}

fn evaluate<'a, R>(
    ctx: &SearchContext<'a, R>,
    projection: &Projection<'a>,
    person: &PersonId,
    arity: ArityClass,
    group: &'a SlotGroup,
    exclude: &BTreeSet<GroupId>,
    relaxed: bool,
) -> Option<PlacementCandidate<'a>> {
    if exclude.contains(&group.id) {
        return None;
    }
    let members = projection.members(&group.id);
    if members.contains(person) || members.len() >= group.capacity() {
        return None;
    }

    let class = match projection.effective_class(&group.id) {
        Ok(class) => class,
        Err(reason) => {
            warn!(group = %group.id, %reason, "skipping malformed group");
            return None;
        }
    };
    if !admits(class, arity, relaxed) {
        return None;
    }

    let mut arities = projection.member_arities(&group.id).ok()?;
    arities.push(arity);
    if composition_violation(group.arity, group.capacity(), &arities).is_some() {
        return None;
    }

    match projection.score(ctx.scorer, person, group) {
        Ok(score) => Some(PlacementCandidate {
            group,
            class,
            score,
        }),
        Err(reason) => {
            warn!(group = %group.id, person = %person, %reason, "skipping unscorable candidate");
            None
        }
    }
}
