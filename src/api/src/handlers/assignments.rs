//! Assignment handlers

use axum::{extract::State, http::StatusCode, Json};
use opsplatform_rbac::BulkAssignment;

use crate::{
    error::ApiResult,
    extract::{parse_scope, Caller},
    models::{
        AssignmentRequest, AssignmentResponse, BulkAssignmentRequest, BulkAssignmentResponse,
    },
    state::AppState,
};

/// Bind a user to a role, optionally in a scope
#[utoipa::path(
    post,
    path = "/api/v1/assignments",
    request_body = AssignmentRequest,
    responses(
        (status = 201, description = "Assignment created", body = AssignmentResponse),
        (status = 404, description = "Unknown user or role"),
        (status = 409, description = "Already assigned"),
        (status = 422, description = "Scope does not match the role's scope class"),
    ),
    tag = "assignments"
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<AssignmentRequest>,
) -> ApiResult<(StatusCode, Json<AssignmentResponse>)> {
    let scope = parse_scope(req.scope.as_deref())?;
    let assignment = state
        .admin
        .assign(caller.id(), &req.user_id, &req.role_id, scope)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment.into())))
}

/// Remove a binding
#[utoipa::path(
    delete,
    path = "/api/v1/assignments",
    request_body = AssignmentRequest,
    responses(
        (status = 200, description = "Assignment removed", body = AssignmentResponse),
        (status = 404, description = "No such binding"),
        (status = 409, description = "Would remove the last administrator"),
    ),
    tag = "assignments"
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<AssignmentRequest>,
) -> ApiResult<Json<AssignmentResponse>> {
    let scope = parse_scope(req.scope.as_deref())?;
    let assignment = state
        .admin
        .unassign(caller.id(), &req.user_id, &req.role_id, scope.as_ref())
        .await?;
    Ok(Json(assignment.into()))
}

/// Assign one role to many users; each user succeeds or fails on its own
#[utoipa::path(
    post,
    path = "/api/v1/assignments/bulk",
    request_body = BulkAssignmentRequest,
    responses(
        (status = 200, description = "Per-user outcome", body = BulkAssignmentResponse),
        (status = 400, description = "Empty user list"),
    ),
    tag = "assignments"
)]
pub async fn bulk_assign(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<BulkAssignmentRequest>,
) -> ApiResult<Json<BulkAssignmentResponse>> {
    let scope = parse_scope(req.scope.as_deref())?;
    let report = state
        .admin
        .bulk_assign(
            caller.id(),
            BulkAssignment {
                user_ids: req.user_ids,
                role_id: req.role_id,
                scope,
            },
        )
        .await?;
    Ok(Json(report.into()))
}
