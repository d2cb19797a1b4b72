//! Functional tests for the HTTP handlers against the in-memory
//! repository. Handlers are invoked directly with constructed extractors;
//! routing itself is covered by the router-creation test.

#![cfg(feature = "http-server")]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

use ihr_rust::api::AsnId;
use ihr_rust::db::repositories::LocalRepository;
use ihr_rust::db::repository::{FullRepository, NetworkRepository, TimeSeriesRepository};
use ihr_rust::http::dto::{
    DiscoQueryParams, MonitorRequest, SeriesQueryParams, UserLoginRequest, UserRegisterRequest,
};
use ihr_rust::http::error::AppError;
use ihr_rust::http::{handlers, AppState};
use ihr_rust::models::{Delay, Network, NewDiscoEvent, NotifyLevel, StreamType};

fn state_with(repo: Arc<LocalRepository>) -> AppState {
    AppState::new(repo as Arc<dyn FullRepository>)
}

fn register_request(email: &str, password: &str) -> UserRegisterRequest {
    UserRegisterRequest {
        email: Some(email.to_string()),
        password: Some(password.to_string()),
        code: Some("123456".to_string()),
    }
}

#[tokio::test]
async fn health_reports_connected_store() {
    let state = state_with(Arc::new(LocalRepository::new()));
    let response = handlers::health_check(State(state)).await.unwrap();
    assert_eq!(response.0.status, "ok");
    assert_eq!(response.0.database, "connected");
}

#[tokio::test]
async fn register_creates_inactive_account_with_normalized_email() {
    let state = state_with(Arc::new(LocalRepository::new()));

    let (status, body) = handlers::register(
        State(state.clone()),
        Json(register_request(" User@ExAmple.ORG ", "secret")),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.0.email, "User@example.org");
    assert!(!body.0.is_active);

    // A second registration with the same normalized address conflicts.
    let err = handlers::register(
        State(state),
        Json(register_request("User@example.org", "other")),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Repository(ihr_rust::db::repository::RepositoryError::ConstraintViolation { .. })
    ));
}

#[tokio::test]
async fn register_rejects_missing_fields_listing_all_of_them() {
    let state = state_with(Arc::new(LocalRepository::new()));

    let err = handlers::register(State(state), Json(UserRegisterRequest::default()))
        .await
        .unwrap_err();
    match err {
        AppError::BadRequest(message) => {
            assert!(message.contains("email"));
            assert!(message.contains("password"));
            assert!(message.contains("code"));
        }
        other => panic!("expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn login_checks_credentials() {
    let state = state_with(Arc::new(LocalRepository::new()));
    handlers::register(
        State(state.clone()),
        Json(register_request("user@example.org", "secret")),
    )
    .await
    .unwrap();

    let response = handlers::login(
        State(state.clone()),
        Json(UserLoginRequest {
            email: Some("user@example.org".to_string()),
            password: Some("secret".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.email, "user@example.org");

    let err = handlers::login(
        State(state),
        Json(UserLoginRequest {
            email: Some("user@example.org".to_string()),
            password: Some("wrong".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Repository(ihr_rust::db::repository::RepositoryError::Validation { .. })
    ));
}

#[tokio::test]
async fn monitor_subscribes_and_returns_the_listing() {
    let repo = Arc::new(LocalRepository::new());
    repo.upsert_network(&Network::new(AsnId::new(2497), "IIJ"))
        .await
        .unwrap();
    let state = state_with(repo);

    handlers::register(
        State(state.clone()),
        Json(register_request("user@example.org", "secret")),
    )
    .await
    .unwrap();

    let response = handlers::monitor(
        State(state),
        Json(MonitorRequest {
            email: Some("user@example.org".to_string()),
            asn: Some(2497),
            notifylevel: Some(NotifyLevel::Moderate),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.count, 1);
    assert_eq!(response.0.results[0].asn, AsnId::new(2497));
    assert_eq!(response.0.results[0].asn_name, "IIJ");
    assert_eq!(response.0.results[0].notifylevel, 5);
}

#[tokio::test]
async fn delay_listing_filters_by_asn_and_window() {
    let repo = Arc::new(LocalRepository::new());
    repo.upsert_network(&Network::new(AsnId::new(2497), "IIJ"))
        .await
        .unwrap();
    repo.upsert_network(&Network::new(AsnId::new(3356), "Lumen"))
        .await
        .unwrap();
    let t = |h| Utc.with_ymd_and_hms(2021, 1, 1, h, 0, 0).unwrap();
    repo.insert_delays(&[
        Delay { timebin: t(0), asn: AsnId::new(2497), magnitude: 1.0 },
        Delay { timebin: t(1), asn: AsnId::new(2497), magnitude: 2.0 },
        Delay { timebin: t(0), asn: AsnId::new(3356), magnitude: 3.0 },
    ])
    .await
    .unwrap();
    let state = state_with(repo);

    let response = handlers::list_delay(
        State(state),
        Query(SeriesQueryParams {
            asn: Some(2497),
            timebin_gte: Some(t(1)),
            timebin_lte: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.count, 1);
    assert_eq!(response.0.results[0].magnitude, 2.0);
    assert_eq!(response.0.results[0].asn_name, "IIJ");
}

#[tokio::test]
async fn disco_listing_parses_stream_type_and_rejects_garbage() {
    let repo = Arc::new(LocalRepository::new());
    let event = NewDiscoEvent::new(
        StreamType::Asn,
        "AS3356",
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 1, 1, 2, 0, 0).unwrap(),
    );
    use ihr_rust::db::repository::DiscoRepository;
    repo.insert_event(&event).await.unwrap();
    let state = state_with(repo);

    let response = handlers::list_disco_events(
        State(state.clone()),
        Query(DiscoQueryParams {
            streamtype: Some("asn".to_string()),
            streamname: Some("AS3356".to_string()),
            starttime_gte: None,
            endtime_lte: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.count, 1);

    let err = handlers::list_disco_events(
        State(state),
        Query(DiscoQueryParams {
            streamtype: Some("continent".to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}
