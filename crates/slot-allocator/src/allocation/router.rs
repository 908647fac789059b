use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{GroupId, PersonId, TermId};
use super::engine::SearchError;
use super::executor::{ExecutionResult, PlanError};
use super::repository::{ScheduleReader, ScheduleWriter};
use super::search::Recommendation;
use super::service::{AllocationServiceError, SearchRequest, SlotAllocationService};

/// Router builder exposing search, accept, and read-only lookups.
pub fn allocation_router<R, W>(service: Arc<SlotAllocationService<R, W>>) -> Router
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    Router::new()
        .route("/api/v1/allocation/search", post(search_handler::<R, W>))
        .route("/api/v1/allocation/accept", post(accept_handler::<R, W>))
        .route(
            "/api/v1/allocation/people/:person_id/availability",
            get(availability_handler::<R, W>),
        )
        .route(
            "/api/v1/allocation/groups/:group_id",
            get(group_handler::<R, W>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TermQuery {
    term: Option<TermId>,
}

pub(crate) async fn search_handler<R, W>(
    State(service): State<Arc<SlotAllocationService<R, W>>>,
    axum::Json(request): axum::Json<SearchRequest>,
) -> Response
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    // Searches are CPU bound and fan out over rayon; keep them off the async workers.
    let joined = tokio::task::spawn_blocking(move || service.search(&request)).await;
    match joined {
        Ok(Ok(outcome)) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Ok(Err(error)) => service_error_response(error),
        Err(join) => internal_error(&join.to_string()),
    }
}

pub(crate) async fn accept_handler<R, W>(
    State(service): State<Arc<SlotAllocationService<R, W>>>,
    axum::Json(recommendation): axum::Json<Recommendation>,
) -> Response
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    let joined = tokio::task::spawn_blocking(move || service.accept(&recommendation)).await;
    match joined {
        Ok(Ok(receipt)) => {
            let result = ExecutionResult::committed(receipt);
            (StatusCode::OK, axum::Json(result)).into_response()
        }
        Ok(Err(AllocationServiceError::Plan(PlanError::Repository(error)))) => {
            internal_error(&error.to_string())
        }
        Ok(Err(AllocationServiceError::Plan(plan_error))) => {
            let status = if plan_error.is_stale() {
                StatusCode::CONFLICT
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (status, axum::Json(ExecutionResult::failed(&plan_error))).into_response()
        }
        Ok(Err(other)) => service_error_response(other),
        Err(join) => internal_error(&join.to_string()),
    }
}

pub(crate) async fn availability_handler<R, W>(
    State(service): State<Arc<SlotAllocationService<R, W>>>,
    Path(person_id): Path<String>,
) -> Response
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    // Blackouts are weekly, so availability needs no term. A cold index reads the store.
    let person = PersonId(person_id);
    let lookup = person.clone();
    let joined = tokio::task::spawn_blocking(move || service.availability(&lookup)).await;
    match joined {
        Ok(Ok(slots)) => {
            let payload = json!({
                "person_id": person,
                "slots": slots,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(Err(error)) => service_error_response(error),
        Err(join) => internal_error(&join.to_string()),
    }
}

pub(crate) async fn group_handler<R, W>(
    State(service): State<Arc<SlotAllocationService<R, W>>>,
    Path(group_id): Path<String>,
    Query(query): Query<TermQuery>,
) -> Response
where
    R: ScheduleReader + 'static,
    W: ScheduleWriter + 'static,
{
    let group = GroupId(group_id);
    match service.group(query.term.as_ref(), &group) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) fn service_error_response(error: AllocationServiceError) -> Response {
    let status = match &error {
        AllocationServiceError::Search(search) => match search {
            SearchError::NotEnrolled { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SearchError::UnknownPerson(_)
            | SearchError::UnknownTerm(_)
            | SearchError::UnknownGroup(_) => StatusCode::NOT_FOUND,
            SearchError::NoActiveTerm => StatusCode::CONFLICT,
            SearchError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AllocationServiceError::Plan(PlanError::StaleData { .. }) => StatusCode::CONFLICT,
        AllocationServiceError::Plan(PlanError::Repository(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AllocationServiceError::Plan(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return internal_error(&error.to_string());
    }
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn internal_error(message: &str) -> Response {
    error!(error = message, "allocation request failed");
    let payload = json!({ "error": message });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
