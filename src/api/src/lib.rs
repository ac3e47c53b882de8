//! Operations Platform RBAC REST API
//!
//! HTTP surface over the [`opsplatform_rbac`] engine.
//!
//! ## Features
//!
//! - **Queries**: effective permissions and has-permission per user and scope
//! - **Management**: roles, permission sets, assignments, bulk assignment, catalog
//! - **Audit**: paginated queries and hash chain verification
//! - **OpenAPI Documentation**: served at `/api-docs/openapi.json`
//! - **Metrics**: Prometheus text at `/metrics`
//!
//! The caller id is read from the `x-user-id` header, which the upstream
//! authentication gateway sets. Requests without it are answered 401.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use extract::{Caller, USER_ID_HEADER};
pub use state::AppState;

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::metrics::metrics,
        handlers::permissions::list_permissions,
        handlers::permissions::create_permission,
        handlers::permissions::delete_permission,
        handlers::users::effective_permissions,
        handlers::users::has_permission,
        handlers::users::user_assignments,
        handlers::roles::list_roles,
        handlers::roles::create_role,
        handlers::roles::get_role,
        handlers::roles::update_role,
        handlers::roles::set_role_permissions,
        handlers::roles::delete_role,
        handlers::roles::role_assignments,
        handlers::assignments::create_assignment,
        handlers::assignments::delete_assignment,
        handlers::assignments::bulk_assign,
        handlers::audit::query_audit,
        handlers::audit::verify_audit,
        handlers::audit::delete_audit_entry,
    ),
    components(
        schemas(
            error::ErrorResponse,
            models::HealthResponse,
            models::EffectivePermissionsResponse,
            models::HasPermissionResponse,
            models::PermissionResponse,
            models::CreatePermissionRequest,
            models::RoleResponse,
            models::CreateRoleRequest,
            models::UpdateRoleRequest,
            models::SetPermissionsRequest,
            models::AssignmentResponse,
            models::AssignmentRequest,
            models::BulkAssignmentRequest,
            models::BulkAssignmentResponse,
            models::BulkFailureResponse,
            models::AuditTargetResponse,
            models::AuditEntryResponse,
            models::AuditPageResponse,
            models::ChainVerificationResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness and metrics"),
        (name = "permissions", description = "Permission catalog"),
        (name = "users", description = "Effective permission queries"),
        (name = "roles", description = "Role management"),
        (name = "assignments", description = "Role assignments"),
        (name = "audit", description = "Authorization audit log"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/api-docs/openapi.json", get(openapi_json))

        // Catalog
        .route(
            "/api/v1/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/api/v1/permissions/:id",
            delete(handlers::permissions::delete_permission),
        )

        // Queries
        .route(
            "/api/v1/users/:user_id/permissions",
            get(handlers::users::effective_permissions),
        )
        .route(
            "/api/v1/users/:user_id/permissions/:permission_id",
            get(handlers::users::has_permission),
        )
        .route(
            "/api/v1/users/:user_id/assignments",
            get(handlers::users::user_assignments),
        )

        // Roles
        .route(
            "/api/v1/roles",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        .route(
            "/api/v1/roles/:id",
            get(handlers::roles::get_role)
                .patch(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        .route(
            "/api/v1/roles/:id/permissions",
            put(handlers::roles::set_role_permissions),
        )
        .route(
            "/api/v1/roles/:id/assignments",
            get(handlers::roles::role_assignments),
        )

        // Assignments
        .route(
            "/api/v1/assignments",
            post(handlers::assignments::create_assignment)
                .delete(handlers::assignments::delete_assignment),
        )
        .route(
            "/api/v1/assignments/bulk",
            post(handlers::assignments::bulk_assign),
        )

        // Audit
        .route("/api/v1/audit", get(handlers::audit::query_audit))
        .route("/api/v1/audit/verify", get(handlers::audit::verify_audit))
        .route(
            "/api/v1/audit/:seq",
            delete(handlers::audit::delete_audit_entry),
        )

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
