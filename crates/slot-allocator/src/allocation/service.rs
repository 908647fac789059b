use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{GroupId, PersonId, SlotKey, TermId};
use super::engine::{EngineConfig, GroupView, SearchError, SlotEngine};
use super::executor::{ExecutionReceipt, Plan, PlanError, PlanExecutor};
use super::repository::{ScheduleReader, ScheduleWriter};
use super::search::{Recommendation, SearchOptions, SearchOutcome};

/// Body of a search request. A missing term means the store's active term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub person_id: PersonId,
    #[serde(default)]
    pub term_id: Option<TermId>,
    #[serde(flatten)]
    pub options: SearchOptions,
}

impl SearchRequest {
    pub fn new(person_id: PersonId) -> Self {
        Self {
            person_id,
            term_id: None,
            options: SearchOptions::default(),
        }
    }
}

/// Facade composing the search engine and the plan executor over one store.
pub struct SlotAllocationService<R, W> {
    reader: Arc<R>,
    engine: Arc<SlotEngine<R>>,
    executor: Arc<PlanExecutor<R, W>>,
}

impl<R, W> SlotAllocationService<R, W>
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    pub fn new(reader: Arc<R>, writer: Arc<W>, config: EngineConfig) -> Self {
        let engine = Arc::new(SlotEngine::new(reader.clone(), config));
        let executor = Arc::new(PlanExecutor::new(reader.clone(), writer));
        Self {
            reader,
            engine,
            executor,
        }
    }

    pub fn engine(&self) -> &SlotEngine<R> {
        &self.engine
    }

    /// Pure, time-bounded search. Never writes.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, AllocationServiceError> {
        let term = self.resolve_term(request.term_id.as_ref())?;
        let outcome = self
            .engine
            .find_optimal_slots(&request.person_id, &term, &request.options)?;
        Ok(outcome)
    }

    /// Turn a recommendation into a plan and commit it, or report why not.
    pub fn accept(
        &self,
        recommendation: &Recommendation,
    ) -> Result<ExecutionReceipt, AllocationServiceError> {
        let plan = Plan::from_recommendation(recommendation)?;
        debug!(plan = %plan.id, moves = plan.moves.len(), "plan built from recommendation");
        let receipt = self.executor.execute(&plan)?;
        Ok(receipt)
    }

    pub fn availability(&self, person: &PersonId) -> Result<Vec<SlotKey>, AllocationServiceError> {
        Ok(self.engine.available_slots(person)?)
    }

    pub fn group(
        &self,
        term: Option<&TermId>,
        group: &GroupId,
    ) -> Result<GroupView, AllocationServiceError> {
        let term = self.resolve_term(term)?;
        Ok(self.engine.group_view(&term, group)?)
    }

    pub fn clear_caches(&self) {
        self.engine.clear_caches();
    }

    pub fn purge_expired_caches(&self) -> usize {
        self.engine.purge_expired_caches()
    }

    /// Explicit term, or the store's active term looked up once for this call.
    pub fn resolve_term(&self, term: Option<&TermId>) -> Result<TermId, AllocationServiceError> {
        if let Some(term) = term {
            return Ok(term.clone());
        }
        let active = self
            .reader
            .active_term()
            .map_err(SearchError::from)?
            .ok_or(SearchError::NoActiveTerm)?;
        Ok(active)
    }
}

/// Error raised by the allocation service.
#[derive(Debug, thiserror::Error)]
pub enum AllocationServiceError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}
