//! Role management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use opsplatform_rbac::{NewRole, RoleUpdate, ScopeClass};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    extract::Caller,
    models::{
        AssignmentResponse, CreateRoleRequest, RoleListQuery, RoleResponse,
        SetPermissionsRequest, UpdateRoleRequest, VersionQuery,
    },
    state::AppState,
};

/// List roles, optionally restricted to the given ids or names
#[utoipa::path(
    get,
    path = "/api/v1/roles",
    params(RoleListQuery),
    responses(
        (status = 200, description = "Roles", body = [RoleResponse]),
        (status = 403, description = "Caller lacks roles.read"),
    ),
    tag = "roles"
)]
pub async fn list_roles(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<RoleListQuery>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    state.admin.authorize_role_view(caller.id()).await?;

    let roles = match query.keys.as_deref() {
        Some(keys) if !keys.trim().is_empty() => {
            let keys: Vec<String> = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
            state.engine.roles_by_keys(&keys).await?
        }
        _ => state.engine.list_roles().await?,
    };
    Ok(Json(roles.into_iter().map(Into::into).collect()))
}

/// Create a custom role
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/roles \
///   -H "x-user-id: admin" -H "Content-Type: application/json" \
///   -d '{"name": "consultant", "scopeClass": "hospital", "permissions": ["profile.read"]}'
/// ```
#[utoipa::path(
    post,
    path = "/api/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Unknown permission"),
        (status = 409, description = "Name already in use"),
    ),
    tag = "roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let scope_class = match req.scope_class.as_deref() {
        Some(class) => class.parse::<ScopeClass>()?,
        None => ScopeClass::Global,
    };

    let mut new = NewRole::new(req.name)
        .with_scope_class(scope_class)
        .with_permissions(req.permissions);
    if let Some(display_name) = req.display_name {
        new = new.with_display_name(display_name);
    }
    if let Some(description) = req.description {
        new = new.with_description(description);
    }

    let role = state.admin.create_role(caller.id(), new).await?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleResponse),
        (status = 404, description = "Unknown role"),
    ),
    tag = "roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RoleResponse>> {
    state.admin.authorize_role_view(caller.id()).await?;
    let role = state.engine.get_role(&id).await?;
    Ok(Json(role.into()))
}

/// Update role metadata and, optionally, its permission set
#[utoipa::path(
    patch,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 403, description = "Base role rename"),
        (status = 409, description = "Stale version or name in use"),
    ),
    tag = "roles"
)]
pub async fn update_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let update = RoleUpdate {
        name: req.name,
        display_name: req.display_name,
        description: req.description,
        permissions: req.permissions,
    };

    let role = state
        .admin
        .update_role(caller.id(), &id, req.version, update)
        .await?;
    Ok(Json(role.into()))
}

/// Replace the full permission set of a role
#[utoipa::path(
    put,
    path = "/api/v1/roles/{id}/permissions",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = SetPermissionsRequest,
    responses(
        (status = 200, description = "Permissions replaced", body = RoleResponse),
        (status = 404, description = "Unknown role or permission"),
        (status = 409, description = "Stale version"),
    ),
    tag = "roles"
)]
pub async fn set_role_permissions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SetPermissionsRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let role = state
        .admin
        .set_role_permissions(caller.id(), &id, req.version, req.permissions)
        .await?;
    Ok(Json(role.into()))
}

/// Delete an unreferenced custom role
#[utoipa::path(
    delete,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id"), VersionQuery),
    responses(
        (status = 200, description = "Role deleted", body = RoleResponse),
        (status = 403, description = "Base role"),
        (status = 409, description = "Role still assigned or stale version"),
    ),
    tag = "roles"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<VersionQuery>,
) -> ApiResult<Json<RoleResponse>> {
    let role = state
        .admin
        .delete_role(caller.id(), &id, query.version)
        .await?;
    Ok(Json(role.into()))
}

/// Everyone holding a role
#[utoipa::path(
    get,
    path = "/api/v1/roles/{id}/assignments",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Assignments", body = [AssignmentResponse]),
    ),
    tag = "roles"
)]
pub async fn role_assignments(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AssignmentResponse>>> {
    state.admin.authorize_role_view(caller.id()).await?;
    let assignments = state.engine.assignments_for_role(&id).await?;
    Ok(Json(assignments.into_iter().map(Into::into).collect()))
}
