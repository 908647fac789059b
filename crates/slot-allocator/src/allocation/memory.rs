use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{
    Blackout, BlackoutGroupId, BlackoutTarget, Coach, CoachId, Enrollment, GroupId, Person,
    PersonId, SlotGroup, Term, TermId, TimeSlot,
};
use super::repository::{
    CommitError, CommitReceipt, GroupChange, RepositoryError, ScheduleReader, ScheduleWriter,
};

/// Serializable seed data for [`InMemoryScheduleStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleFixture {
    #[serde(default)]
    pub active_term: Option<TermId>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub groups: Vec<SlotGroup>,
    #[serde(default)]
    pub blackouts: Vec<Blackout>,
    #[serde(default)]
    pub coaches: Vec<Coach>,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read schedule fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid schedule fixture: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct StoreState {
    active_term: Option<TermId>,
    terms: BTreeMap<TermId, Term>,
    time_slots: Vec<TimeSlot>,
    people: HashMap<PersonId, Person>,
    enrollments: HashMap<(PersonId, TermId), Enrollment>,
    groups: BTreeMap<(TermId, GroupId), SlotGroup>,
    blackouts: Vec<Blackout>,
    coaches: HashMap<CoachId, Coach>,
}

/// Mutex-guarded store implementing both sides of the external interface.
///
/// Commits check every group version before applying any change, so two plans racing for
/// the same seat cannot both land.
#[derive(Debug, Default, Clone)]
pub struct InMemoryScheduleStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryScheduleStore {
    pub fn from_fixture(fixture: ScheduleFixture) -> Self {
        let mut state = StoreState {
            active_term: fixture.active_term,
            time_slots: fixture.time_slots,
            blackouts: fixture.blackouts,
            ..StoreState::default()
        };
        state.time_slots.sort_by_key(|slot| slot.id);
        for term in fixture.terms {
            state.terms.insert(term.id.clone(), term);
        }
        for person in fixture.people {
            state.people.insert(person.id.clone(), person);
        }
        for enrollment in fixture.enrollments {
            state.enrollments.insert(
                (enrollment.person_id.clone(), enrollment.term_id.clone()),
                enrollment,
            );
        }
        for group in fixture.groups {
            state
                .groups
                .insert((group.term_id.clone(), group.id.clone()), group);
        }
        for coach in fixture.coaches {
            state.coaches.insert(coach.id.clone(), coach);
        }

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, FixtureError> {
        let fixture: ScheduleFixture = serde_json::from_str(raw)?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Manual edit outside the engine (admin tooling, tests). Bumps the group version.
    pub fn set_members(
        &self,
        term: &TermId,
        group: &GroupId,
        members: Vec<PersonId>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.lock();
        let stored = state
            .groups
            .get_mut(&(term.clone(), group.clone()))
            .ok_or(RepositoryError::NotFound)?;
        stored.members = members;
        stored.version += 1;
        Ok(stored.version)
    }

    pub fn add_blackout(&self, blackout: Blackout) {
        self.lock().blackouts.push(blackout);
    }

    pub fn upsert_enrollment(&self, enrollment: Enrollment) {
        self.lock().enrollments.insert(
            (enrollment.person_id.clone(), enrollment.term_id.clone()),
            enrollment,
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScheduleReader for InMemoryScheduleStore {
    fn active_term(&self) -> Result<Option<TermId>, RepositoryError> {
        Ok(self.lock().active_term.clone())
    }

    fn term(&self, term: &TermId) -> Result<Option<Term>, RepositoryError> {
        Ok(self.lock().terms.get(term).cloned())
    }

    fn time_slots(&self) -> Result<Vec<TimeSlot>, RepositoryError> {
        Ok(self.lock().time_slots.clone())
    }

    fn person(&self, id: &PersonId) -> Result<Option<Person>, RepositoryError> {
        Ok(self.lock().people.get(id).cloned())
    }

    fn people(&self, ids: &[PersonId]) -> Result<Vec<Person>, RepositoryError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.people.get(id).cloned())
            .collect())
    }

    fn enrollment(
        &self,
        person: &PersonId,
        term: &TermId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .lock()
            .enrollments
            .get(&(person.clone(), term.clone()))
            .cloned())
    }

    fn enrollments(
        &self,
        term: &TermId,
        people: &[PersonId],
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let state = self.lock();
        Ok(people
            .iter()
            .filter_map(|person| {
                state
                    .enrollments
                    .get(&(person.clone(), term.clone()))
                    .cloned()
            })
            .collect())
    }

    fn lesson_balances(
        &self,
        term: &TermId,
        people: &[PersonId],
    ) -> Result<HashMap<PersonId, i32>, RepositoryError> {
        let state = self.lock();
        Ok(people
            .iter()
            .filter_map(|person| {
                state
                    .enrollments
                    .get(&(person.clone(), term.clone()))
                    .map(|enrollment| (person.clone(), enrollment.balance()))
            })
            .collect())
    }

    fn groups(&self, term: &TermId) -> Result<Vec<SlotGroup>, RepositoryError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .filter(|((group_term, _), _)| group_term == term)
            .map(|(_, group)| group.clone())
            .collect())
    }

    fn group(&self, term: &TermId, id: &GroupId) -> Result<Option<SlotGroup>, RepositoryError> {
        Ok(self
            .lock()
            .groups
            .get(&(term.clone(), id.clone()))
            .cloned())
    }

    fn blackouts_for(
        &self,
        person: &PersonId,
        blackout_group: Option<&BlackoutGroupId>,
    ) -> Result<Vec<Blackout>, RepositoryError> {
        Ok(self
            .lock()
            .blackouts
            .iter()
            .filter(|blackout| match &blackout.target {
                BlackoutTarget::Person(id) => id == person,
                BlackoutTarget::Group(group) => Some(group) == blackout_group,
            })
            .cloned()
            .collect())
    }

    fn coaches(&self, ids: &[CoachId]) -> Result<Vec<Coach>, RepositoryError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.coaches.get(id).cloned())
            .collect())
    }
}

impl ScheduleWriter for InMemoryScheduleStore {
    fn commit(&self, term: &TermId, changes: &[GroupChange]) -> Result<CommitReceipt, CommitError> {
        let mut state = self.lock();

        for change in changes {
            let stored = state
                .groups
                .get(&(term.clone(), change.group_id.clone()))
                .ok_or_else(|| CommitError::UnknownGroup(change.group_id.clone()))?;
            if stored.version != change.expected_version {
                return Err(CommitError::VersionConflict {
                    group: change.group_id.clone(),
                    expected: change.expected_version,
                    found: stored.version,
                });
            }
        }

        let mut versions = Vec::with_capacity(changes.len());
        for change in changes {
            if let Some(stored) = state
                .groups
                .get_mut(&(term.clone(), change.group_id.clone()))
            {
                stored.members = change.members.clone();
                stored.version += 1;
                versions.push((stored.id.clone(), stored.version));
            }
        }

        Ok(CommitReceipt {
            versions,
            committed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::domain::{ArityClass, SkillTier, TimeSlotId, Weekday};

    fn fixture() -> ScheduleFixture {
        ScheduleFixture {
            active_term: Some(TermId::new("t-1")),
            groups: vec![SlotGroup {
                id: GroupId::new("g-1"),
                term_id: TermId::new("t-1"),
                name: "Monday pair".to_string(),
                day: Weekday::Monday,
                slot: TimeSlotId(1),
                coach_id: None,
                target_tier: SkillTier::B,
                arity: ArityClass::Pair,
                max_size: 2,
                preferred_size: None,
                members: vec![PersonId::new("p-1")],
                version: 3,
            }],
            ..ScheduleFixture::default()
        }
    }

    #[test]
    fn commit_rejects_stale_versions_without_writing() {
        let store = InMemoryScheduleStore::from_fixture(fixture());
        let term = TermId::new("t-1");
        let result = store.commit(
            &term,
            &[GroupChange {
                group_id: GroupId::new("g-1"),
                expected_version: 2,
                members: Vec::new(),
            }],
        );

        match result {
            Err(CommitError::VersionConflict { found, .. }) => assert_eq!(found, 3),
            other => panic!("expected version conflict, got {other:?}"),
        }
        let group = store
            .group(&term, &GroupId::new("g-1"))
            .expect("read succeeds")
            .expect("group present");
        assert_eq!(group.members, vec![PersonId::new("p-1")]);
        assert_eq!(group.version, 3);
    }

    #[test]
    fn commit_bumps_versions() {
        let store = InMemoryScheduleStore::from_fixture(fixture());
        let term = TermId::new("t-1");
        let receipt = store
            .commit(
                &term,
                &[GroupChange {
                    group_id: GroupId::new("g-1"),
                    expected_version: 3,
                    members: vec![PersonId::new("p-1"), PersonId::new("p-2")],
                }],
            )
            .expect("commit succeeds");

        assert_eq!(receipt.versions, vec![(GroupId::new("g-1"), 4)]);
    }

    #[test]
    fn fixture_parses_from_json() {
        let raw = serde_json::to_string(&fixture()).expect("fixture serializes");
        let store = InMemoryScheduleStore::from_json_str(&raw).expect("fixture parses");
        assert_eq!(
            store.active_term().expect("read succeeds"),
            Some(TermId::new("t-1"))
        );
    }
}
