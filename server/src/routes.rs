//! HTTP API routes.
//!
//! Machine-to-server calls (`activate`, `validate`) authenticate with a
//! per-deployment API key and are rate limited; everything else needs
//! an admin session token.

use crate::auth::{AdminAuth, MachineAuth};
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use giro_license::protocol::{
    ActivateRequest, ActivateResponse, CreateLicenseRequest, HealthResponse, LicenseInfo,
    LoginRequest, LoginResponse, RevokeResponse, TransferRequest, TransferResponse,
    ValidateRequest, ValidateResponse,
};
use std::net::SocketAddr;
use tracing::debug;

/// Builds the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/licenses", post(create_license))
        .route(
            "/api/v1/licenses/{key}",
            get(get_license).delete(revoke_license),
        )
        .route("/api/v1/licenses/{key}/activate", post(activate_license))
        .route("/api/v1/licenses/{key}/validate", post(validate_license))
        .route("/api/v1/licenses/{key}/transfer", post(transfer_license))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let response = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(response))
}

async fn create_license(
    State(state): State<AppState>,
    admin: AdminAuth,
    Json(request): Json<CreateLicenseRequest>,
) -> ApiResult<Json<LicenseInfo>> {
    debug!(admin = %admin.admin_id, owner = %request.owner, "create license");
    let info = state.service.create(request).await?;
    Ok(Json(info))
}

async fn get_license(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(key): Path<String>,
) -> ApiResult<Json<LicenseInfo>> {
    let info = state.service.get(&key).await?;
    Ok(Json(info))
}

async fn activate_license(
    State(state): State<AppState>,
    machine: MachineAuth,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(key): Path<String>,
    Json(request): Json<ActivateRequest>,
) -> ApiResult<Json<ActivateResponse>> {
    debug!(deployment = %machine.deployment, key = %key, "activate");
    let response = state
        .service
        .activate(&key, request, Some(addr.ip().to_string()))
        .await?;
    Ok(Json(response))
}

async fn validate_license(
    State(state): State<AppState>,
    machine: MachineAuth,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(key): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<Json<ValidateResponse>> {
    debug!(deployment = %machine.deployment, key = %key, "validate");
    let response = state
        .service
        .validate(&key, request, Some(addr.ip().to_string()))
        .await?;
    Ok(Json(response))
}

async fn transfer_license(
    State(state): State<AppState>,
    admin: AdminAuth,
    Path(key): Path<String>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<Json<TransferResponse>> {
    debug!(admin = %admin.admin_id, key = %key, "transfer");
    let response = state.service.transfer(&key, request).await?;
    Ok(Json(response))
}

async fn revoke_license(
    State(state): State<AppState>,
    admin: AdminAuth,
    Path(key): Path<String>,
) -> ApiResult<Json<RevokeResponse>> {
    debug!(admin = %admin.admin_id, key = %key, "revoke");
    let response = state.service.revoke(&key).await?;
    Ok(Json(response))
}
