//! Audit log handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use opsplatform_rbac::{AuditAction, AuditFilter, PageRequest};

use crate::{
    error::ApiResult,
    extract::Caller,
    models::{AuditPageResponse, AuditQuery, ChainVerificationResponse},
    state::AppState,
};

/// Query the audit log, oldest first, with cursor pagination
#[utoipa::path(
    get,
    path = "/api/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "One page of entries", body = AuditPageResponse),
        (status = 400, description = "Unknown action"),
        (status = 403, description = "Caller lacks audit.read"),
    ),
    tag = "audit"
)]
pub async fn query_audit(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditPageResponse>> {
    let action = query
        .action
        .as_deref()
        .map(str::parse::<AuditAction>)
        .transpose()?;
    let filter = AuditFilter {
        user_id: query.user_id,
        action,
        from: query.from,
        to: query.to,
    };
    let page = PageRequest {
        cursor: query.cursor,
        limit: query.limit.unwrap_or(PageRequest::default().limit),
    };

    let page = state.admin.query_audit(caller.id(), &filter, page).await?;
    Ok(Json(page.into()))
}

/// Walk the hash chain and report the first broken entry
#[utoipa::path(
    get,
    path = "/api/v1/audit/verify",
    responses(
        (status = 200, description = "Verification result", body = ChainVerificationResponse),
    ),
    tag = "audit"
)]
pub async fn verify_audit(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<ChainVerificationResponse>> {
    let verification = state.admin.verify_audit_chain(caller.id()).await?;
    Ok(Json(verification.into()))
}

/// Audit entries are immutable; always 403
#[utoipa::path(
    delete,
    path = "/api/v1/audit/{seq}",
    params(("seq" = u64, Path, description = "Entry sequence number")),
    responses((status = 403, description = "Audit entries cannot be deleted")),
    tag = "audit"
)]
pub async fn delete_audit_entry(
    State(state): State<AppState>,
    caller: Caller,
    Path(seq): Path<u64>,
) -> ApiResult<Json<()>> {
    state.admin.delete_audit_entry(caller.id(), seq).await?;
    Ok(Json(()))
}
