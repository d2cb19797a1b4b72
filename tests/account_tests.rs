//! Integration tests for the account subsystem.

use chrono::{Duration, TimeZone, Utc};

use ihr_rust::api::AsnId;
use ihr_rust::db::repositories::LocalRepository;
use ihr_rust::db::repository::{AccountRepository, NetworkRepository, RepositoryError};
use ihr_rust::db::services;
use ihr_rust::models::{
    Capability, Network, NewUser, NotifyLevel, Sha256Hasher, UserFlags,
};

// =========================================================
// Escalation invariant
// =========================================================

#[tokio::test]
async fn superuser_creation_never_persists_a_partial_flag_pair() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    for (is_staff, is_superuser) in [(true, false), (false, true)] {
        let flags = UserFlags { is_staff, is_superuser };
        // The constructor rejects the pair before any write happens.
        assert!(NewUser::create("root@example.org", "secret", flags, &hasher).is_err());
        // Nothing reached the store.
        assert!(!services::user_exists(&repo, "root@example.org").await.unwrap());
    }

    let id = services::create_superuser(&repo, &hasher, "root@example.org", "secret")
        .await
        .unwrap();
    let user = repo.get_user(id).await.unwrap();
    assert!(user.is_staff && user.is_superuser);
}

// =========================================================
// Email uniqueness
// =========================================================

#[tokio::test]
async fn second_registration_with_same_email_fails() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "user@example.org", "first")
        .await
        .unwrap();
    let err = services::register_user(&repo, &hasher, "user@example.org", "second")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
}

#[tokio::test]
async fn uniqueness_uses_normalized_comparison() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    services::register_user(&repo, &hasher, "User@example.org", "secret")
        .await
        .unwrap();
    // Same address modulo whitespace and domain case.
    let err = services::register_user(&repo, &hasher, "  User@EXAMPLE.org ", "secret")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));

    // The local part stays case-sensitive.
    services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
}

// =========================================================
// Email change requests
// =========================================================

#[tokio::test]
async fn email_change_boundary_minutes() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

    let id = services::register_user(&repo, &hasher, "old@example.org", "secret")
        .await
        .unwrap();

    // Valid at T+1439 minutes.
    let request = services::request_email_change(&repo, id, "first@example.org", t0)
        .await
        .unwrap();
    services::confirm_email_change(&repo, request.id, t0 + Duration::minutes(1439))
        .await
        .unwrap();
    assert_eq!(repo.get_user(id).await.unwrap().email, "first@example.org");

    // Invalid at T+1441 minutes.
    let request = services::request_email_change(&repo, id, "second@example.org", t0)
        .await
        .unwrap();
    let err = services::confirm_email_change(&repo, request.id, t0 + Duration::minutes(1441))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { .. }));
    assert_eq!(repo.get_user(id).await.unwrap().email, "first@example.org");
}

#[tokio::test]
async fn pending_new_emails_are_unique() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

    let a = services::register_user(&repo, &hasher, "a@example.org", "secret")
        .await
        .unwrap();
    let b = services::register_user(&repo, &hasher, "b@example.org", "secret")
        .await
        .unwrap();

    services::request_email_change(&repo, a, "wanted@example.org", t0)
        .await
        .unwrap();
    let err = services::request_email_change(&repo, b, "wanted@example.org", t0)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
}

#[tokio::test]
async fn confirming_a_change_to_a_taken_email_fails() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

    let a = services::register_user(&repo, &hasher, "a@example.org", "secret")
        .await
        .unwrap();
    let request = services::request_email_change(&repo, a, "taken@example.org", t0)
        .await
        .unwrap();
    // Another account registers the address before confirmation.
    services::register_user(&repo, &hasher, "taken@example.org", "secret")
        .await
        .unwrap();

    let err = services::confirm_email_change(&repo, request.id, t0 + Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
    assert_eq!(repo.get_user(a).await.unwrap().email, "a@example.org");
}

// =========================================================
// Capabilities
// =========================================================

#[tokio::test]
async fn capability_tags_are_a_set() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    let id = services::register_user(&repo, &hasher, "ops@example.org", "secret")
        .await
        .unwrap();
    repo.grant_capability(id, Capability::ManageNetworks).await.unwrap();
    repo.grant_capability(id, Capability::ManageNetworks).await.unwrap();
    repo.grant_capability(id, Capability::ViewRawAlarms).await.unwrap();

    let capabilities = repo.list_capabilities(id).await.unwrap();
    assert_eq!(
        capabilities,
        vec![Capability::ManageNetworks, Capability::ViewRawAlarms]
    );

    repo.revoke_capability(id, Capability::ManageNetworks).await.unwrap();
    assert_eq!(
        repo.list_capabilities(id).await.unwrap(),
        vec![Capability::ViewRawAlarms]
    );
}

// =========================================================
// Account deletion
// =========================================================

#[tokio::test]
async fn deleting_a_user_removes_owned_rows_only() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;
    let t0 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
    let asn = AsnId::new(2497);
    repo.upsert_network(&Network::new(asn, "IIJ")).await.unwrap();

    let doomed = services::register_user(&repo, &hasher, "doomed@example.org", "secret")
        .await
        .unwrap();
    let survivor = services::register_user(&repo, &hasher, "survivor@example.org", "secret")
        .await
        .unwrap();

    repo.set_monitored_asn(doomed, asn, NotifyLevel::High).await.unwrap();
    repo.set_monitored_asn(survivor, asn, NotifyLevel::Low).await.unwrap();
    repo.grant_capability(doomed, Capability::ManageUsers).await.unwrap();
    services::request_email_change(&repo, doomed, "next@example.org", t0)
        .await
        .unwrap();

    // Account + capability + subscription + pending request.
    let removed = repo.delete_user(doomed).await.unwrap();
    assert_eq!(removed, 4);

    // The network and the other subscriber are untouched.
    repo.get_network(asn).await.unwrap();
    assert_eq!(repo.list_monitored_asns(survivor).await.unwrap().len(), 1);
}

// =========================================================
// Activation
// =========================================================

#[tokio::test]
async fn accounts_activate_after_external_verification() {
    let repo = LocalRepository::new();
    let hasher = Sha256Hasher;

    let id = services::register_user(&repo, &hasher, "user@example.org", "secret")
        .await
        .unwrap();
    assert!(!repo.get_user(id).await.unwrap().is_active);

    repo.activate_user(id).await.unwrap();
    assert!(repo.get_user(id).await.unwrap().is_active);
}
