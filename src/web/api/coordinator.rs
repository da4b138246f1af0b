use axum::{
    extract::{Path, State},
    Json,
};

use crate::config::Permission;
use crate::mux::{
    StationCallRequest, StationCallResponse, StationCountResponse, StationListResponse,
    StationStatus,
};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};

#[utoipa::path(
    get,
    path = "/api/coordinator/stations/count",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Number of connected stations", body = StationCountResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "coordinator"
)]
pub async fn station_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<StationCountResponse>> {
    require_permission(&user, Permission::ReadStations)?;
    Ok(Json(StationCountResponse {
        count: state.coordinator.station_count(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/coordinator/stations",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Connected station ids", body = StationListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "coordinator"
)]
pub async fn station_list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<StationListResponse>> {
    require_permission(&user, Permission::ReadStations)?;
    Ok(Json(StationListResponse {
        station_ids: state.coordinator.station_list(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/coordinator/stations/{id}/status",
    params(
        ("id" = String, Path, description = "Station id")
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Connection status", body = StationStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "coordinator"
)]
pub async fn station_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<StationStatus>> {
    require_permission(&user, Permission::ReadStations)?;
    Ok(Json(state.coordinator.station_status(&id)))
}

#[utoipa::path(
    post,
    path = "/api/coordinator/stations/{id}/call",
    params(
        ("id" = String, Path, description = "Station id")
    ),
    request_body = StationCallRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Station answered", body = StationCallResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 502, description = "Station RPC error", body = ErrorResponse)
    ),
    tag = "coordinator"
)]
pub async fn station_call(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<StationCallRequest>,
) -> ApiResult<Json<StationCallResponse>> {
    require_permission(&user, Permission::CallStations)?;
    validate_call_url(&request.url)?;

    log::debug!("{}: {} calls {}", id, user.name, request.url);
    let response = state.coordinator.station_call(&id, &request.url).await?;
    Ok(Json(response.into()))
}

/// The url ends up verbatim in a request line on the station link.
fn validate_call_url(url: &str) -> Result<(), ApiError> {
    if !url.starts_with('/') {
        return Err(ApiError::Validation("url must start with '/'".to_string()));
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ApiError::Validation(
            "url must not contain whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}
