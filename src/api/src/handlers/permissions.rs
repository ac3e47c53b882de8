//! Permission catalog handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use opsplatform_rbac::NewPermission;

use crate::{
    error::ApiResult,
    extract::Caller,
    models::{CreatePermissionRequest, PermissionResponse},
    state::AppState,
};

/// List the permission catalog, sorted by domain then id
#[utoipa::path(
    get,
    path = "/api/v1/permissions",
    responses(
        (status = 200, description = "Permission catalog", body = [PermissionResponse]),
        (status = 401, description = "Missing caller identity"),
    ),
    tag = "permissions"
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    _caller: Caller,
) -> ApiResult<Json<Vec<PermissionResponse>>> {
    let permissions = state.engine.list_permissions().await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

/// Append a permission to the catalog
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/permissions \
///   -H "x-user-id: admin" -H "Content-Type: application/json" \
///   -d '{"id": "travel.book", "name": "Book travel"}'
/// ```
#[utoipa::path(
    post,
    path = "/api/v1/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission added", body = PermissionResponse),
        (status = 400, description = "Malformed identifier"),
        (status = 403, description = "Caller lacks permissions.manage"),
        (status = 409, description = "Identifier already in use"),
    ),
    tag = "permissions"
)]
pub async fn create_permission(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<PermissionResponse>)> {
    let permission = state
        .admin
        .add_permission(
            caller.id(),
            NewPermission {
                id: req.id,
                name: req.name,
                description: req.description.unwrap_or_default(),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(permission.into())))
}

/// Remove a permission no role grants any more
#[utoipa::path(
    delete,
    path = "/api/v1/permissions/{id}",
    params(("id" = String, Path, description = "Permission identifier")),
    responses(
        (status = 200, description = "Permission removed", body = PermissionResponse),
        (status = 404, description = "Unknown permission"),
        (status = 409, description = "Still granted by a role"),
    ),
    tag = "permissions"
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<PermissionResponse>> {
    let permission = state.admin.remove_permission(caller.id(), &id).await?;
    Ok(Json(permission.into()))
}
