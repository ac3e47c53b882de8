//! Per-user query handlers: effective permissions, has-permission, assignments
//!
//! A user may always inspect themselves; inspecting anyone else needs `users.read`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use opsplatform_rbac::{DecisionReason, RbacError};

use crate::{
    error::ApiResult,
    extract::{parse_scope, Caller},
    models::{AssignmentResponse, EffectivePermissionsResponse, HasPermissionResponse, ScopeQuery},
    state::AppState,
};

/// Effective permissions of a user in a scope
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/permissions",
    params(("user_id" = String, Path, description = "User identifier"), ScopeQuery),
    responses(
        (status = 200, description = "Effective permission set", body = EffectivePermissionsResponse),
        (status = 401, description = "Missing caller identity"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "users"
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<EffectivePermissionsResponse>> {
    let scope = parse_scope(query.scope.as_deref())?;
    state.admin.authorize_user_view(caller.id(), &user_id).await?;

    let set = state
        .engine
        .effective_permissions(&user_id, scope.as_ref())
        .await?;
    Ok(Json(set.as_ref().into()))
}

/// Whether a user holds one permission in a scope
///
/// Unknown permission identifiers answer 404 rather than `false`.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/permissions/{permission_id}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("permission_id" = String, Path, description = "Permission identifier"),
        ScopeQuery
    ),
    responses(
        (status = 200, description = "Decision", body = HasPermissionResponse),
        (status = 404, description = "Unknown permission"),
    ),
    tag = "users"
)]
pub async fn has_permission(
    State(state): State<AppState>,
    caller: Caller,
    Path((user_id, permission_id)): Path<(String, String)>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<HasPermissionResponse>> {
    let scope = parse_scope(query.scope.as_deref())?;
    state.admin.authorize_user_view(caller.id(), &user_id).await?;

    let decision = state
        .engine
        .evaluate_for(caller.id(), &user_id, &permission_id, scope.as_ref())
        .await;

    if decision.reason == DecisionReason::UnknownPermission {
        return Err(RbacError::not_found("permission", &permission_id).into());
    }

    Ok(Json(HasPermissionResponse {
        user_id,
        permission: permission_id,
        scope: scope.map(|s| s.to_string()),
        // Failed decisions answer false; the failure kind stays in logs and metrics.
        has_permission: decision.allowed(),
    }))
}

/// All assignments of a user, global and scoped
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/assignments",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Assignments", body = [AssignmentResponse]),
    ),
    tag = "users"
)]
pub async fn user_assignments(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<AssignmentResponse>>> {
    state.admin.authorize_user_view(caller.id(), &user_id).await?;

    let assignments = state.engine.assignments_for_user(&user_id).await?;
    Ok(Json(assignments.into_iter().map(Into::into).collect()))
}
