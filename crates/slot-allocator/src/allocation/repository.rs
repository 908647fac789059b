use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Blackout, BlackoutGroupId, Coach, CoachId, Enrollment, GroupId, Person, PersonId, SlotGroup,
    Term, TermId, TimeSlot,
};

/// Read side of the external store. The engine never mutates through this trait.
pub trait ScheduleReader: Send + Sync {
    fn active_term(&self) -> Result<Option<TermId>, RepositoryError>;
    fn term(&self, term: &TermId) -> Result<Option<Term>, RepositoryError>;
    fn time_slots(&self) -> Result<Vec<TimeSlot>, RepositoryError>;
    fn person(&self, id: &PersonId) -> Result<Option<Person>, RepositoryError>;
    fn people(&self, ids: &[PersonId]) -> Result<Vec<Person>, RepositoryError>;
    fn enrollment(
        &self,
        person: &PersonId,
        term: &TermId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollments(
        &self,
        term: &TermId,
        people: &[PersonId],
    ) -> Result<Vec<Enrollment>, RepositoryError>;
    /// Single aggregate query returning the lesson balance for each requested person.
    fn lesson_balances(
        &self,
        term: &TermId,
        people: &[PersonId],
    ) -> Result<HashMap<PersonId, i32>, RepositoryError>;
    fn groups(&self, term: &TermId) -> Result<Vec<SlotGroup>, RepositoryError>;
    fn group(&self, term: &TermId, id: &GroupId) -> Result<Option<SlotGroup>, RepositoryError>;
    fn blackouts_for(
        &self,
        person: &PersonId,
        blackout_group: Option<&BlackoutGroupId>,
    ) -> Result<Vec<Blackout>, RepositoryError>;
    fn coaches(&self, ids: &[CoachId]) -> Result<Vec<Coach>, RepositoryError>;
}

/// Write side of the external store, used only by the plan executor.
pub trait ScheduleWriter: Send + Sync {
    /// Replace the membership of every listed group in one atomic unit.
    ///
    /// Each change carries the version observed before mutation; if any group has moved on,
    /// nothing is written and [`CommitError::VersionConflict`] is returned.
    fn commit(&self, term: &TermId, changes: &[GroupChange]) -> Result<CommitReceipt, CommitError>;
}

/// Membership replacement for a single group, guarded by an optimistic version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    pub group_id: GroupId,
    pub expected_version: u64,
    pub members: Vec<PersonId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub versions: Vec<(GroupId, u64)>,
    pub committed_at: DateTime<Utc>,
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommitError {
    #[error("group {group} changed since it was read (expected version {expected}, found {found})")]
    VersionConflict {
        group: GroupId,
        expected: u64,
        found: u64,
    },
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
