use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use super::availability::is_available;
use super::domain::{ArityClass, GroupId, PersonId, PlanId, SlotGroup, TermId};
use super::repository::{
    CommitError, GroupChange, RepositoryError, ScheduleReader, ScheduleWriter,
};
use super::scoring::{admits, composition_violation, effective_class};
use super::search::{Move, Recommendation, RecommendationKind};

static PLAN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_plan_id() -> PlanId {
    let id = PLAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PlanId(format!("plan-{id:06}"))
}

/// Ordered moves derived from an accepted recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub term_id: TermId,
    pub person_id: PersonId,
    pub moves: Vec<Move>,
    /// Fallback plans let GROUP arrivals into MIXED groups.
    #[serde(default)]
    pub relaxed: bool,
}

impl Plan {
    pub fn from_recommendation(recommendation: &Recommendation) -> Result<Self, PlanError> {
        let plan = Self {
            id: next_plan_id(),
            term_id: recommendation.term_id.clone(),
            person_id: recommendation.person_id.clone(),
            moves: recommendation.moves.clone(),
            relaxed: recommendation.kind == RecommendationKind::Fallback,
        };
        plan.check_structure()?;
        Ok(plan)
    }

    /// Shape checks that need no store access.
    pub fn check_structure(&self) -> Result<(), PlanError> {
        if self.moves.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut leaving = BTreeSet::new();
        for (index, mv) in self.moves.iter().enumerate() {
            let Some(displaced) = &mv.leaving else {
                continue;
            };
            if displaced == &mv.person_id {
                return Err(PlanError::Rejected {
                    move_index: index,
                    reason: format!("{displaced} cannot displace themselves"),
                });
            }
            if !leaving.insert(displaced) {
                return Err(PlanError::RepeatedLeaving(displaced.clone()));
            }
            let replaced = self.moves[index + 1..]
                .iter()
                .any(|later| &later.person_id == displaced);
            if !replaced {
                return Err(PlanError::Rejected {
                    move_index: index,
                    reason: format!("{displaced} would be left without a placement"),
                });
            }
        }
        Ok(())
    }
}

/// Why a plan did not commit. Nothing is written in any of these cases.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no moves")]
    Empty,
    #[error("{0} is displaced more than once")]
    RepeatedLeaving(PersonId),
    #[error("move {move_index} is stale: {reason}")]
    StaleData { move_index: usize, reason: String },
    #[error("move {move_index} rejected: {reason}")]
    Rejected { move_index: usize, reason: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PlanError {
    pub fn is_stale(&self) -> bool {
        matches!(self, PlanError::StaleData { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub plan_id: PlanId,
    pub term_id: TermId,
    /// Every touched group with its version after the commit.
    pub versions: Vec<(GroupId, u64)>,
    pub committed_at: DateTime<Utc>,
}

/// Caller-facing outcome of an accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub message: String,
    /// Set when the data moved on since the search; re-search rather than retry.
    pub stale: bool,
    pub receipt: Option<ExecutionReceipt>,
}

impl ExecutionResult {
    pub fn committed(receipt: ExecutionReceipt) -> Self {
        Self {
            ok: true,
            message: format!(
                "plan {} committed across {} group(s)",
                receipt.plan_id,
                receipt.versions.len()
            ),
            stale: false,
            receipt: Some(receipt),
        }
    }

    pub fn failed(error: &PlanError) -> Self {
        Self {
            ok: false,
            message: error.to_string(),
            stale: error.is_stale(),
            receipt: None,
        }
    }
}

/// Re-validates a plan against fresh data and commits it in one unit.
pub struct PlanExecutor<R, W> {
    reader: Arc<R>,
    writer: Arc<W>,
}

impl<R, W> PlanExecutor<R, W>
where
    R: ScheduleReader,
    W: ScheduleWriter,
{
    pub fn new(reader: Arc<R>, writer: Arc<W>) -> Self {
        Self { reader, writer }
    }

    pub fn execute(&self, plan: &Plan) -> Result<ExecutionReceipt, PlanError> {
        let span = info_span!(
            "execute_plan",
            plan = %plan.id,
            person = %plan.person_id,
            term = %plan.term_id
        );
        let _entered = span.enter();

        plan.check_structure()?;

        let result = self.prepare(plan).and_then(|changes| self.commit(plan, changes));
        match &result {
            Ok(receipt) => info!(groups = receipt.versions.len(), "plan committed"),
            Err(error) if error.is_stale() => warn!(%error, "plan is stale; nothing written"),
            Err(error) => warn!(%error, "plan rejected; nothing written"),
        }
        result
    }

    /// Replay the moves on a working copy of current membership and collect the changes.
    fn prepare(&self, plan: &Plan) -> Result<Vec<GroupChange>, PlanError> {
        let term = &plan.term_id;
        let groups: BTreeMap<GroupId, SlotGroup> = self
            .reader
            .groups(term)?
            .into_iter()
            .map(|group| (group.id.clone(), group))
            .collect();

        let mut working: BTreeMap<GroupId, Vec<PersonId>> = groups
            .iter()
            .map(|(id, group)| (id.clone(), group.members.clone()))
            .collect();

        let mut involved: BTreeSet<PersonId> = BTreeSet::new();
        for mv in &plan.moves {
            involved.insert(mv.person_id.clone());
            involved.extend(mv.leaving.iter().cloned());
            if let Some(group) = groups.get(&mv.group_id) {
                involved.extend(group.members.iter().cloned());
            }
            if let Some(group) = mv.from_group.as_ref().and_then(|id| groups.get(id)) {
                involved.extend(group.members.iter().cloned());
            }
        }
        let involved: Vec<PersonId> = involved.into_iter().collect();
        let arities: HashMap<PersonId, ArityClass> = self
            .reader
            .enrollments(term, &involved)?
            .into_iter()
            .map(|enrollment| (enrollment.person_id, enrollment.arity))
            .collect();

        let mut displaced: BTreeSet<&PersonId> = BTreeSet::new();
        let mut touched: BTreeSet<GroupId> = BTreeSet::new();

        for (index, mv) in plan.moves.iter().enumerate() {
            let stale = |reason: String| PlanError::StaleData {
                move_index: index,
                reason,
            };

            let target = groups
                .get(&mv.group_id)
                .ok_or_else(|| stale(format!("group {} no longer exists", mv.group_id)))?;
            if !arities.contains_key(&mv.person_id) {
                return Err(stale(format!("{} is no longer enrolled", mv.person_id)));
            }

            let members = working.get(&target.id).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(leaving) = &mv.leaving {
                if !members.contains(leaving) {
                    return Err(stale(format!("{leaving} is no longer in {}", target.id)));
                }
            }
            if members.contains(&mv.person_id) {
                return Err(stale(format!("{} is already in {}", mv.person_id, target.id)));
            }
            if !is_available(self.reader.as_ref(), &mv.person_id, target.key())? {
                return Err(stale(format!(
                    "{} is no longer available on {}",
                    mv.person_id,
                    target.key()
                )));
            }

            let source = working
                .iter()
                .find(|(_, members)| members.contains(&mv.person_id))
                .map(|(id, _)| id.clone());
            if !displaced.contains(&mv.person_id) && source != mv.from_group {
                return Err(stale(format!(
                    "{} has moved since the plan was proposed",
                    mv.person_id
                )));
            }

            if let Some(source) = &source {
                if let Some(members) = working.get_mut(source) {
                    members.retain(|member| member != &mv.person_id);
                }
                touched.insert(source.clone());
            }
            let members = working.entry(target.id.clone()).or_default();
            if let Some(leaving) = &mv.leaving {
                members.retain(|member| member != leaving);
                displaced.insert(leaving);
            } else {
                check_admission(members, &arities, &mv.person_id, plan.relaxed)
                    .map_err(|reason| stale(format!("{reason} in {}", target.id)))?;
            }
            members.push(mv.person_id.clone());
            touched.insert(target.id.clone());

            for group_id in std::iter::once(&target.id).chain(source.as_ref()) {
                check_composition(&groups, &working, &arities, group_id).map_err(stale)?;
            }
        }

        // Final pass: every touched group as it will be written.
        for group_id in &touched {
            check_composition(&groups, &working, &arities, group_id).map_err(|reason| {
                PlanError::StaleData {
                    move_index: plan.moves.len() - 1,
                    reason,
                }
            })?;
        }

        Ok(touched
            .into_iter()
            .filter_map(|id| {
                let group = groups.get(&id)?;
                let members = working.remove(&id)?;
                Some(GroupChange {
                    group_id: id,
                    expected_version: group.version,
                    members,
                })
            })
            .collect())
    }

    fn commit(&self, plan: &Plan, changes: Vec<GroupChange>) -> Result<ExecutionReceipt, PlanError> {
        match self.writer.commit(&plan.term_id, &changes) {
            Ok(receipt) => Ok(ExecutionReceipt {
                plan_id: plan.id.clone(),
                term_id: plan.term_id.clone(),
                versions: receipt.versions,
                committed_at: receipt.committed_at,
            }),
            Err(CommitError::VersionConflict { group, .. }) => Err(PlanError::StaleData {
                move_index: first_move_touching(plan, &group),
                reason: format!("group {group} changed since it was read"),
            }),
            Err(CommitError::UnknownGroup(group)) => Err(PlanError::StaleData {
                move_index: first_move_touching(plan, &group),
                reason: format!("group {group} no longer exists"),
            }),
            Err(CommitError::Repository(error)) => Err(PlanError::Repository(error)),
        }
    }
}

fn check_composition(
    groups: &BTreeMap<GroupId, SlotGroup>,
    working: &BTreeMap<GroupId, Vec<PersonId>>,
    arities: &HashMap<PersonId, ArityClass>,
    group_id: &GroupId,
) -> Result<(), String> {
    let Some(group) = groups.get(group_id) else {
        return Ok(());
    };
    let members = working.get(group_id).map(Vec::as_slice).unwrap_or(&[]);
    let mut classes = Vec::with_capacity(members.len());
    for member in members {
        let arity = arities
            .get(member)
            .ok_or_else(|| format!("member {member} of {group_id} has no enrollment"))?;
        classes.push(*arity);
    }
    match composition_violation(group.arity, group.capacity(), &classes) {
        Some(violation) => Err(format!("group {group_id} would be invalid: {violation}")),
        None => Ok(()),
    }
}

/// Arrivals that replace nobody must still be admitted by the group's live class.
fn check_admission(
    members: &[PersonId],
    arities: &HashMap<PersonId, ArityClass>,
    arrival: &PersonId,
    relaxed: bool,
) -> Result<(), String> {
    let mut classes = Vec::with_capacity(members.len());
    for member in members {
        let arity = arities
            .get(member)
            .ok_or_else(|| format!("member {member} has no enrollment"))?;
        classes.push(*arity);
    }
    let Some(arity) = arities.get(arrival) else {
        return Err(format!("{arrival} has no enrollment"));
    };
    let class = effective_class(&classes);
    if admits(class, *arity, relaxed) {
        Ok(())
    } else {
        Err(format!(
            "{arrival} ({arity:?}) can no longer join a {} group",
            class.label()
        ))
    }
}

fn first_move_touching(plan: &Plan, group: &GroupId) -> usize {
    plan.moves
        .iter()
        .position(|mv| &mv.group_id == group || mv.from_group.as_ref() == Some(group))
        .unwrap_or(0)
}
