use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::domain::{
    ArityClass, Coach, CoachId, Enrollment, GroupId, Person, PersonId, SlotGroup, SlotKey, TermId,
};
use super::repository::{RepositoryError, ScheduleReader};
use super::scoring::{
    effective_class, CompatibilityScore, CompatibilityScorer, EffectiveClass, ScoreInput,
};

/// Immutable, bulk-loaded view of one term, shared by every phase of a search.
#[derive(Debug)]
pub struct TermSnapshot {
    term_id: TermId,
    groups: BTreeMap<GroupId, SlotGroup>,
    by_slot: BTreeMap<SlotKey, Vec<GroupId>>,
    people: HashMap<PersonId, Person>,
    enrollments: HashMap<PersonId, Enrollment>,
    balances: HashMap<PersonId, i32>,
    coaches: HashMap<CoachId, Coach>,
}

impl TermSnapshot {
    pub fn load<R>(
        reader: &R,
        scorer: &CompatibilityScorer,
        term: &TermId,
        extra_people: &[PersonId],
    ) -> Result<Self, RepositoryError>
    where
        R: ScheduleReader + ?Sized,
    {
        let groups = reader.groups(term)?;

        let mut person_ids: BTreeSet<PersonId> = extra_people.iter().cloned().collect();
        let mut coach_ids: BTreeSet<CoachId> = BTreeSet::new();
        for group in &groups {
            person_ids.extend(group.members.iter().cloned());
            coach_ids.extend(group.coach_id.iter().cloned());
        }
        let person_ids: Vec<PersonId> = person_ids.into_iter().collect();
        let coach_ids: Vec<CoachId> = coach_ids.into_iter().collect();

        let people = reader
            .people(&person_ids)?
            .into_iter()
            .map(|person| (person.id.clone(), person))
            .collect();
        let enrollments = reader
            .enrollments(term, &person_ids)?
            .into_iter()
            .map(|enrollment| (enrollment.person_id.clone(), enrollment))
            .collect();
        let balances = scorer.prefetch_balances(reader, term, &person_ids)?;
        let coaches = reader
            .coaches(&coach_ids)?
            .into_iter()
            .map(|coach| (coach.id.clone(), coach))
            .collect();

        Ok(Self::from_parts(
            term.clone(),
            groups,
            people,
            enrollments,
            balances,
            coaches,
        ))
    }

    pub(crate) fn from_parts(
        term_id: TermId,
        groups: Vec<SlotGroup>,
        people: HashMap<PersonId, Person>,
        enrollments: HashMap<PersonId, Enrollment>,
        balances: HashMap<PersonId, i32>,
        coaches: HashMap<CoachId, Coach>,
    ) -> Self {
        let mut by_slot: BTreeMap<SlotKey, Vec<GroupId>> = BTreeMap::new();
        let mut indexed = BTreeMap::new();
        for group in groups {
            by_slot.entry(group.key()).or_default().push(group.id.clone());
            indexed.insert(group.id.clone(), group);
        }
        for ids in by_slot.values_mut() {
            ids.sort();
        }

        Self {
            term_id,
            groups: indexed,
            by_slot,
            people,
            enrollments,
            balances,
            coaches,
        }
    }

    pub fn term_id(&self) -> &TermId {
        &self.term_id
    }

    pub fn group(&self, id: &GroupId) -> Option<&SlotGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &SlotGroup> {
        self.groups.values()
    }

    pub fn groups_at(&self, key: SlotKey) -> impl Iterator<Item = &SlotGroup> {
        self.by_slot
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id))
    }

    pub fn person(&self, id: &PersonId) -> Option<&Person> {
        self.people.get(id)
    }

    pub fn enrollment(&self, id: &PersonId) -> Option<&Enrollment> {
        self.enrollments.get(id)
    }

    pub fn arity_of(&self, id: &PersonId) -> Option<ArityClass> {
        self.enrollments.get(id).map(|enrollment| enrollment.arity)
    }

    /// Prefetched balance, falling back to the enrollment bookkeeping.
    pub fn balance(&self, id: &PersonId) -> i32 {
        self.balances
            .get(id)
            .copied()
            .or_else(|| self.enrollments.get(id).map(Enrollment::balance))
            .unwrap_or(0)
    }

    pub fn coach(&self, id: &CoachId) -> Option<&Coach> {
        self.coaches.get(id)
    }
}

/// Why a group could not be evaluated. Such groups are skipped, not fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedGroup {
    #[error("member {0} has no enrollment in this term")]
    MissingEnrollment(PersonId),
    #[error("member {0} is unknown to the store")]
    MissingPerson(PersonId),
    #[error("membership classifies as invalid")]
    InvalidComposition,
}

/// Copy-on-write membership overlay over a [`TermSnapshot`].
///
/// Chains apply their moves here so later hops see seats freed by earlier ones.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    snapshot: &'a TermSnapshot,
    overrides: BTreeMap<GroupId, Vec<PersonId>>,
}

impl<'a> Projection<'a> {
    pub fn new(snapshot: &'a TermSnapshot) -> Self {
        Self {
            snapshot,
            overrides: BTreeMap::new(),
        }
    }

    pub fn snapshot(&self) -> &'a TermSnapshot {
        self.snapshot
    }

    pub fn members(&self, group: &GroupId) -> &[PersonId] {
        if let Some(members) = self.overrides.get(group) {
            return members;
        }
        self.snapshot
            .group(group)
            .map(|group| group.members.as_slice())
            .unwrap_or(&[])
    }

    pub fn group_of(&self, person: &PersonId) -> Option<&'a SlotGroup> {
        self.snapshot
            .groups()
            .find(|group| self.members(&group.id).contains(person))
    }

    /// Move `person` out of wherever they sit into `group`, evicting `leaving` if given.
    pub fn apply(&mut self, person: &PersonId, leaving: Option<&PersonId>, group: &GroupId) {
        let holding: Vec<GroupId> = self
            .snapshot
            .groups()
            .filter(|candidate| self.members(&candidate.id).contains(person))
            .map(|candidate| candidate.id.clone())
            .collect();
        for id in holding {
            let mut members = self.members(&id).to_vec();
            members.retain(|member| member != person);
            self.overrides.insert(id, members);
        }

        let mut members = self.members(group).to_vec();
        if let Some(leaving) = leaving {
            members.retain(|member| member != leaving);
        }
        members.push(person.clone());
        self.overrides.insert(group.clone(), members);
    }

    pub fn member_arities(&self, group: &GroupId) -> Result<Vec<ArityClass>, MalformedGroup> {
        self.members(group)
            .iter()
            .map(|member| {
                self.snapshot
                    .arity_of(member)
                    .ok_or_else(|| MalformedGroup::MissingEnrollment(member.clone()))
            })
            .collect()
    }

    pub fn effective_class(&self, group: &GroupId) -> Result<EffectiveClass, MalformedGroup> {
        let arities = self.member_arities(group)?;
        match effective_class(&arities) {
            EffectiveClass::Invalid => Err(MalformedGroup::InvalidComposition),
            class => Ok(class),
        }
    }

    /// Score `person` against `group` as it currently stands in this projection.
    pub fn score(
        &self,
        scorer: &CompatibilityScorer,
        person_id: &PersonId,
        group: &SlotGroup,
    ) -> Result<CompatibilityScore, MalformedGroup> {
        let person = self
            .snapshot
            .person(person_id)
            .ok_or_else(|| MalformedGroup::MissingPerson(person_id.clone()))?;
        let arity = self
            .snapshot
            .arity_of(person_id)
            .ok_or_else(|| MalformedGroup::MissingEnrollment(person_id.clone()))?;

        let members = self.members(&group.id);
        let mut peer_cohorts = Vec::with_capacity(members.len());
        for member in members.iter().filter(|member| *member != person_id) {
            let peer = self
                .snapshot
                .person(member)
                .ok_or_else(|| MalformedGroup::MissingPerson(member.clone()))?;
            peer_cohorts.push(peer.cohort_level);
        }

        let input = ScoreInput {
            tier: person.skill_tier,
            cohort_level: person.cohort_level,
            arity,
            balance: self.snapshot.balance(person_id),
            target_tier: group.target_tier,
            declared_arity: group.arity,
            peer_cohorts: &peer_cohorts,
            group_size: members.len(),
            preferred_size: group.preferred_size(),
            capacity: group.capacity(),
            coach: group
                .coach_id
                .as_ref()
                .and_then(|coach| self.snapshot.coach(coach)),
        };
        Ok(scorer.score(&input))
    }
}
