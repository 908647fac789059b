//! Slot search, rebalancing, and plan execution.
//!
//! The engine reads people, slot groups, blackouts, and coaches through [`ScheduleReader`]
//! and only ever writes through [`ScheduleWriter`], from the plan executor.

pub mod availability;
pub(crate) mod cache;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod memory;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod search;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use availability::AvailabilityIndex;
pub use domain::{
    ArityClass, Blackout, BlackoutGroupId, BlackoutTarget, Coach, CoachId, Enrollment, GroupId,
    Person, PersonId, PlanId, SkillTier, SlotGroup, SlotKey, Term, TermId, TimeSlot, TimeSlotId,
    Weekday,
};
pub use engine::{EngineConfig, GroupView, SearchError, SlotEngine};
pub use executor::{ExecutionReceipt, ExecutionResult, Plan, PlanError, PlanExecutor};
pub use memory::{FixtureError, InMemoryScheduleStore, ScheduleFixture};
pub use repository::{
    CommitError, CommitReceipt, GroupChange, RepositoryError, ScheduleReader, ScheduleWriter,
};
pub use router::allocation_router;
pub use scoring::{
    CompatibilityScore, CompatibilityScorer, CompositionViolation, EffectiveClass,
    ScoreBreakdown, ScoringWeights,
};
pub use search::{
    ChainStatus, Deadline, Move, PhaseReport, Recommendation, RecommendationKind, SearchOptions,
    SearchOutcome, SearchPhase,
};
pub use service::{AllocationServiceError, SearchRequest, SlotAllocationService};
pub use snapshot::{Projection, TermSnapshot};
