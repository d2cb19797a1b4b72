//! Tests for the service layer over the in-memory repository.

use chrono::{Duration, TimeZone, Utc};

use crate::api::AsnId;
use crate::db::repositories::LocalRepository;
use crate::db::repository::{AccountRepository, NetworkRepository, RepositoryError};
use crate::db::services;
use crate::models::{Network, NotifyLevel, Sha256Hasher};

#[tokio::test]
async fn register_then_login() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    let id = services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    let user = services::verify_login(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    assert_eq!(user.id, id);
    assert!(!user.is_active);

    let err = services::verify_login(&repo, &hasher, "user@example.org", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { .. }));
}

#[tokio::test]
async fn duplicate_email_is_rejected_after_normalization() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    let err = services::register_user(&repo, &hasher, " user@ExAmple.ORG ", "other")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
}

#[tokio::test]
async fn change_password_requires_current_one() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();

    let err = services::change_password(&repo, &hasher, "user@example.org", "wrong", "next")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { .. }));

    services::change_password(&repo, &hasher, "user@example.org", "secret", "next")
        .await
        .unwrap();
    services::verify_login(&repo, &hasher, "user@example.org", "next")
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_password_skips_credential_check() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "user@example.org", "forgotten")
        .await
        .unwrap();
    services::reset_password(&repo, &hasher, "user@example.org", "fresh")
        .await
        .unwrap();
    services::verify_login(&repo, &hasher, "user@example.org", "fresh")
        .await
        .unwrap();
}

#[tokio::test]
async fn email_change_expires_after_validity_window() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

    let id = services::register_user(&repo, &hasher, "old@example.org", "secret")
        .await
        .unwrap();
    let request = services::request_email_change(&repo, id, "new@example.org", t0)
        .await
        .unwrap();

    let err = services::confirm_email_change(&repo, request.id, t0 + Duration::minutes(1441))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { .. }));

    // The stale request stays pending and the login email is unchanged.
    repo.get_email_change_request(request.id).await.unwrap();
    repo.get_user_by_email("old@example.org").await.unwrap();
}

#[tokio::test]
async fn email_change_applies_inside_validity_window() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

    let id = services::register_user(&repo, &hasher, "old@example.org", "secret")
        .await
        .unwrap();
    let request = services::request_email_change(&repo, id, "new@example.org", t0)
        .await
        .unwrap();
    services::confirm_email_change(&repo, request.id, t0 + Duration::minutes(1439))
        .await
        .unwrap();

    repo.get_user_by_email("new@example.org").await.unwrap();
    let err = repo.get_user_by_email("old@example.org").await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
    let err = repo.get_email_change_request(request.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn user_exists_matches_normalized_lookup() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    assert!(services::user_exists(&repo, "user@EXAMPLE.org").await.unwrap());
    assert!(!services::user_exists(&repo, "other@example.org").await.unwrap());
}

#[tokio::test]
async fn monitoring_flow_resolves_network_names() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let asn = AsnId::new(2497);

    repo.upsert_network(&Network::new(asn, "IIJ")).await.unwrap();
    let user = services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    services::monitor_asn(&repo, user, asn, NotifyLevel::Moderate)
        .await
        .unwrap();

    let monitored = services::list_monitored(&repo, user).await.unwrap();
    assert_eq!(monitored.len(), 1);
    assert_eq!(monitored[0].asn_name, "IIJ");
    assert_eq!(monitored[0].notifylevel, 5);
}
