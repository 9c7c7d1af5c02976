//! Ticket API Handlers

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use conductor_core::domain::ticket::Ticket;
use conductor_core::dto::ticket::CreateTicket;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::auth::Caller;
use crate::api::error::ApiResult;
use crate::api::extract::{JsonBody, PathParam};

/// POST /api/jobs/{id}/ticket
pub async fn create_ticket(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(job_id): PathParam<i64>,
    JsonBody(req): JsonBody<CreateTicket>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let ticket = state
        .escalation
        .create_from_job(job_id, caller.id(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/tickets/{token}
pub async fn get_ticket(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(token): PathParam<Uuid>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.escalation.get(token).await?;
    Ok(Json(ticket))
}
