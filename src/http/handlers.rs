//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer for the actual work.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::str::FromStr;

use super::dto::{
    ConeQueryParams, DiscoQueryParams, HealthResponse, HegemonyQueryParams, ListResponse,
    LocationQueryParams, LoginResponse, MessageResponse, MonitorRequest, NetworkDelayQueryParams,
    NetworkQueryParams, RegisterResponse, SeriesQueryParams, UserChangePasswordRequest,
    UserEmailRequest, UserExistsResponse, UserLoginRequest, UserRegisterRequest,
    UserResetPasswordRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{
    AsnId, CountryRecord, DelayAlarmRecord, DelayRecord, DiscoEventRecord, ForwardingAlarmRecord,
    ForwardingRecord, HegemonyAlarmRecord, HegemonyConeRecord, HegemonyRecord, LocationId,
    LocationRecord, MonitoredAsnRecord, NetworkDelayAlarmRecord, NetworkDelayRecord,
    NetworkRecord, TimeRange,
};
use crate::db::repository::{
    AtlasDelayQuery, ConeQuery, DiscoQuery, HegemonyQuery, LocationFilter, SeriesQuery,
};
use crate::db::services as db_services;
use crate::models::StreamType;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

impl From<&SeriesQueryParams> for SeriesQuery {
    fn from(params: &SeriesQueryParams) -> Self {
        SeriesQuery {
            asn: params.asn.map(AsnId::new),
            range: TimeRange::new(params.timebin_gte, params.timebin_lte),
        }
    }
}

impl From<&HegemonyQueryParams> for HegemonyQuery {
    fn from(params: &HegemonyQueryParams) -> Self {
        HegemonyQuery {
            originasn: params.originasn.map(AsnId::new),
            asn: params.asn.map(AsnId::new),
            af: params.af,
            range: TimeRange::new(params.timebin_gte, params.timebin_lte),
        }
    }
}

impl From<&ConeQueryParams> for ConeQuery {
    fn from(params: &ConeQueryParams) -> Self {
        ConeQuery {
            asn: params.asn.map(AsnId::new),
            af: params.af,
            range: TimeRange::new(params.timebin_gte, params.timebin_lte),
        }
    }
}

impl From<&NetworkDelayQueryParams> for AtlasDelayQuery {
    fn from(params: &NetworkDelayQueryParams) -> Self {
        AtlasDelayQuery {
            startpoint: params.startpoint.map(LocationId::new),
            endpoint: params.endpoint.map(LocationId::new),
            range: TimeRange::new(params.timebin_gte, params.timebin_lte),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and the store
/// is accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Reference entities
// =============================================================================

/// GET /v1/network
pub async fn list_networks(
    State(state): State<AppState>,
    Query(params): Query<NetworkQueryParams>,
) -> HandlerResult<ListResponse<NetworkRecord>> {
    let records =
        db_services::list_networks(state.repository.as_ref(), params.search.as_deref()).await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/country
pub async fn list_countries(
    State(state): State<AppState>,
) -> HandlerResult<ListResponse<CountryRecord>> {
    let records = db_services::list_countries(state.repository.as_ref()).await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/network_delay/locations
pub async fn list_network_delay_locations(
    State(state): State<AppState>,
    Query(params): Query<LocationQueryParams>,
) -> HandlerResult<ListResponse<LocationRecord>> {
    let filter = LocationFilter {
        kind: params.kind,
        name: params.name,
        af: params.af,
    };
    let records = db_services::list_locations(state.repository.as_ref(), &filter).await?;
    Ok(Json(ListResponse::new(records)))
}

// =============================================================================
// Time series
// =============================================================================

/// GET /v1/delay
pub async fn list_delay(
    State(state): State<AppState>,
    Query(params): Query<SeriesQueryParams>,
) -> HandlerResult<ListResponse<DelayRecord>> {
    let records =
        db_services::list_delay(state.repository.as_ref(), &SeriesQuery::from(&params)).await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/forwarding
pub async fn list_forwarding(
    State(state): State<AppState>,
    Query(params): Query<SeriesQueryParams>,
) -> HandlerResult<ListResponse<ForwardingRecord>> {
    let records =
        db_services::list_forwarding(state.repository.as_ref(), &SeriesQuery::from(&params))
            .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/hegemony
pub async fn list_hegemony(
    State(state): State<AppState>,
    Query(params): Query<HegemonyQueryParams>,
) -> HandlerResult<ListResponse<HegemonyRecord>> {
    let records =
        db_services::list_hegemony(state.repository.as_ref(), &HegemonyQuery::from(&params))
            .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/hegemony/cones
pub async fn list_hegemony_cone(
    State(state): State<AppState>,
    Query(params): Query<ConeQueryParams>,
) -> HandlerResult<ListResponse<HegemonyConeRecord>> {
    let records =
        db_services::list_hegemony_cone(state.repository.as_ref(), &ConeQuery::from(&params))
            .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/network_delay
pub async fn list_network_delay(
    State(state): State<AppState>,
    Query(params): Query<NetworkDelayQueryParams>,
) -> HandlerResult<ListResponse<NetworkDelayRecord>> {
    let records = db_services::list_network_delay(
        state.repository.as_ref(),
        &AtlasDelayQuery::from(&params),
    )
    .await?;
    Ok(Json(ListResponse::new(records)))
}

// =============================================================================
// Alarms
// =============================================================================

/// GET /v1/delay/alarms
pub async fn list_delay_alarms(
    State(state): State<AppState>,
    Query(params): Query<SeriesQueryParams>,
) -> HandlerResult<ListResponse<DelayAlarmRecord>> {
    let records =
        db_services::list_delay_alarms(state.repository.as_ref(), &SeriesQuery::from(&params))
            .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/forwarding/alarms
pub async fn list_forwarding_alarms(
    State(state): State<AppState>,
    Query(params): Query<SeriesQueryParams>,
) -> HandlerResult<ListResponse<ForwardingAlarmRecord>> {
    let records = db_services::list_forwarding_alarms(
        state.repository.as_ref(),
        &SeriesQuery::from(&params),
    )
    .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/hegemony/alarms
pub async fn list_hegemony_alarms(
    State(state): State<AppState>,
    Query(params): Query<HegemonyQueryParams>,
) -> HandlerResult<ListResponse<HegemonyAlarmRecord>> {
    let records = db_services::list_hegemony_alarms(
        state.repository.as_ref(),
        &HegemonyQuery::from(&params),
    )
    .await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /v1/network_delay/alarms
pub async fn list_network_delay_alarms(
    State(state): State<AppState>,
    Query(params): Query<NetworkDelayQueryParams>,
) -> HandlerResult<ListResponse<NetworkDelayAlarmRecord>> {
    let records = db_services::list_network_delay_alarms(
        state.repository.as_ref(),
        &AtlasDelayQuery::from(&params),
    )
    .await?;
    Ok(Json(ListResponse::new(records)))
}

// =============================================================================
// Disconnection events
// =============================================================================

/// GET /v1/disco/events
///
/// Events whose interval overlaps the requested window, children nested.
pub async fn list_disco_events(
    State(state): State<AppState>,
    Query(params): Query<DiscoQueryParams>,
) -> HandlerResult<ListResponse<DiscoEventRecord>> {
    let streamtype = params
        .streamtype
        .as_deref()
        .map(StreamType::from_str)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let query = DiscoQuery {
        streamtype,
        streamname: params.streamname,
        window: TimeRange::new(params.starttime_gte, params.endtime_lte),
    };
    let records = db_services::list_disco_events(state.repository.as_ref(), &query).await?;
    Ok(Json(ListResponse::new(records)))
}

// =============================================================================
// Accounts
// =============================================================================

/// POST /v1/user/register
///
/// Validate the registration shape and create an inactive account. The
/// `code` is issued and checked by the external auth collaborator.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<UserRegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let registration = request.validate().map_err(AppError::BadRequest)?;

    let id = db_services::register_user(
        state.repository.as_ref(),
        state.hasher.as_ref(),
        &registration.email,
        &registration.password,
    )
    .await?;
    let user = db_services::get_user(state.repository.as_ref(), id).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            email: user.email,
            is_active: user.is_active,
        }),
    ))
}

/// POST /v1/user/login
///
/// Check the credential pair. Session issuance stays with the external
/// auth collaborator.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<UserLoginRequest>,
) -> HandlerResult<LoginResponse> {
    let credentials = request.validate().map_err(AppError::BadRequest)?;

    let user = db_services::verify_login(
        state.repository.as_ref(),
        state.hasher.as_ref(),
        &credentials.email,
        &credentials.password,
    )
    .await?;

    Ok(Json(LoginResponse {
        email: user.email,
        is_active: user.is_active,
    }))
}

/// POST /v1/user/change_password
pub async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<UserChangePasswordRequest>,
) -> HandlerResult<MessageResponse> {
    let change = request.validate().map_err(AppError::BadRequest)?;

    db_services::change_password(
        state.repository.as_ref(),
        state.hasher.as_ref(),
        &change.email,
        &change.password,
        &change.new_password,
    )
    .await?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// POST /v1/user/reset_password
///
/// The reset `code` was verified by the external auth collaborator.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<UserResetPasswordRequest>,
) -> HandlerResult<MessageResponse> {
    let reset = request.validate().map_err(AppError::BadRequest)?;

    db_services::reset_password(
        state.repository.as_ref(),
        state.hasher.as_ref(),
        &reset.email,
        &reset.new_password,
    )
    .await?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// POST /v1/user/exists
pub async fn user_exists(
    State(state): State<AppState>,
    Json(request): Json<UserEmailRequest>,
) -> HandlerResult<UserExistsResponse> {
    let email = request.validate().map_err(AppError::BadRequest)?;
    let registered = db_services::user_exists(state.repository.as_ref(), &email).await?;
    Ok(Json(UserExistsResponse { registered }))
}

/// POST /v1/user/monitor
///
/// Create or update the caller's subscription to a network, then return
/// the full subscription list.
pub async fn monitor(
    State(state): State<AppState>,
    Json(request): Json<MonitorRequest>,
) -> HandlerResult<ListResponse<MonitoredAsnRecord>> {
    let subscription = request.validate().map_err(AppError::BadRequest)?;

    let user = db_services::verify_account(state.repository.as_ref(), &subscription.email).await?;
    db_services::monitor_asn(
        state.repository.as_ref(),
        user.id,
        AsnId::new(subscription.asn),
        subscription.notifylevel,
    )
    .await?;

    let monitored = db_services::list_monitored(state.repository.as_ref(), user.id).await?;
    Ok(Json(ListResponse::new(monitored)))
}
