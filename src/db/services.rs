//! High-level service functions over the repository traits.
//!
//! These are the entry points the HTTP layer and tests call. Read paths
//! pass filters straight through; account flows add the validation and
//! policy steps that must run before a write (normalization, credential
//! checks, the email-change validity window).

use chrono::{DateTime, Utc};

use crate::api::{
    AsnId, CountryRecord, DelayAlarmRecord, DelayRecord, DiscoEventRecord, ForwardingAlarmRecord,
    ForwardingRecord, HegemonyAlarmRecord, HegemonyConeRecord, HegemonyRecord, LocationRecord,
    MonitoredAsnRecord, NetworkDelayAlarmRecord, NetworkDelayRecord, NetworkRecord, UserId,
};
use crate::db::repository::{
    AccountRepository, AlarmRepository, AtlasDelayQuery, ConeQuery, DiscoQuery, DiscoRepository,
    FullRepository, HegemonyQuery, LocationFilter, NetworkRepository, RepositoryError,
    RepositoryResult, SeriesQuery, TimeSeriesRepository,
};
use crate::models::{
    normalize_email, AtlasDelay, CredentialHasher, Delay, EmailChangeRequest, Forwarding,
    Hegemony, HegemonyCone, IhrUser, NewUser, NotifyLevel,
};

// ==================== Health ====================

/// Verify the backing store is reachable.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Reference entities ====================

pub async fn get_network<R: NetworkRepository + ?Sized>(
    repo: &R,
    asn: AsnId,
) -> RepositoryResult<NetworkRecord> {
    repo.get_network(asn).await
}

pub async fn list_networks<R: NetworkRepository + ?Sized>(
    repo: &R,
    search: Option<&str>,
) -> RepositoryResult<Vec<NetworkRecord>> {
    repo.list_networks(search).await
}

pub async fn list_countries<R: NetworkRepository + ?Sized>(
    repo: &R,
) -> RepositoryResult<Vec<CountryRecord>> {
    repo.list_countries().await
}

pub async fn get_country<R: NetworkRepository + ?Sized>(
    repo: &R,
    code: &str,
) -> RepositoryResult<CountryRecord> {
    repo.get_country(code).await
}

pub async fn list_locations<R: NetworkRepository + ?Sized>(
    repo: &R,
    filter: &LocationFilter,
) -> RepositoryResult<Vec<LocationRecord>> {
    repo.list_locations(filter).await
}

// ==================== Time series ====================

pub async fn store_delays<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    rows: &[Delay],
) -> RepositoryResult<usize> {
    repo.insert_delays(rows).await
}

pub async fn store_forwardings<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    rows: &[Forwarding],
) -> RepositoryResult<usize> {
    repo.insert_forwardings(rows).await
}

pub async fn store_hegemonies<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    rows: &[Hegemony],
) -> RepositoryResult<usize> {
    repo.insert_hegemonies(rows).await
}

pub async fn store_hegemony_cones<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    rows: &[HegemonyCone],
) -> RepositoryResult<usize> {
    repo.insert_hegemony_cones(rows).await
}

pub async fn store_atlas_delays<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    rows: &[AtlasDelay],
) -> RepositoryResult<usize> {
    repo.insert_atlas_delays(rows).await
}

pub async fn list_delay<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    query: &SeriesQuery,
) -> RepositoryResult<Vec<DelayRecord>> {
    repo.fetch_delay(query).await
}

pub async fn list_forwarding<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    query: &SeriesQuery,
) -> RepositoryResult<Vec<ForwardingRecord>> {
    repo.fetch_forwarding(query).await
}

pub async fn list_hegemony<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    query: &HegemonyQuery,
) -> RepositoryResult<Vec<HegemonyRecord>> {
    repo.fetch_hegemony(query).await
}

pub async fn list_hegemony_cone<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    query: &ConeQuery,
) -> RepositoryResult<Vec<HegemonyConeRecord>> {
    repo.fetch_hegemony_cone(query).await
}

pub async fn list_network_delay<R: TimeSeriesRepository + ?Sized>(
    repo: &R,
    query: &AtlasDelayQuery,
) -> RepositoryResult<Vec<NetworkDelayRecord>> {
    repo.fetch_network_delay(query).await
}

// ==================== Alarms ====================

pub async fn list_delay_alarms<R: AlarmRepository + ?Sized>(
    repo: &R,
    query: &SeriesQuery,
) -> RepositoryResult<Vec<DelayAlarmRecord>> {
    repo.fetch_delay_alarms(query).await
}

pub async fn list_forwarding_alarms<R: AlarmRepository + ?Sized>(
    repo: &R,
    query: &SeriesQuery,
) -> RepositoryResult<Vec<ForwardingAlarmRecord>> {
    repo.fetch_forwarding_alarms(query).await
}

pub async fn list_hegemony_alarms<R: AlarmRepository + ?Sized>(
    repo: &R,
    query: &HegemonyQuery,
) -> RepositoryResult<Vec<HegemonyAlarmRecord>> {
    repo.fetch_hegemony_alarms(query).await
}

pub async fn list_network_delay_alarms<R: AlarmRepository + ?Sized>(
    repo: &R,
    query: &AtlasDelayQuery,
) -> RepositoryResult<Vec<NetworkDelayAlarmRecord>> {
    repo.fetch_network_delay_alarms(query).await
}

// ==================== Disconnection events ====================

pub async fn list_disco_events<R: DiscoRepository + ?Sized>(
    repo: &R,
    query: &DiscoQuery,
) -> RepositoryResult<Vec<DiscoEventRecord>> {
    repo.fetch_events(query).await
}

// ==================== Accounts ====================

/// Register a regular account. The email is normalized before the
/// store-level uniqueness check; the account starts inactive until the
/// out-of-band verification flow activates it.
pub async fn register_user<R: AccountRepository + ?Sized>(
    repo: &R,
    hasher: &dyn CredentialHasher,
    email: &str,
    password: &str,
) -> RepositoryResult<UserId> {
    let user = NewUser::user(email, password, hasher)?;
    repo.create_user(&user).await
}

/// Create a superuser account with both escalation flags set.
pub async fn create_superuser<R: AccountRepository + ?Sized>(
    repo: &R,
    hasher: &dyn CredentialHasher,
    email: &str,
    password: &str,
) -> RepositoryResult<UserId> {
    let user = NewUser::superuser(email, password, hasher)?;
    repo.create_user(&user).await
}

/// Check a credential pair against the stored digest and return the
/// account. Session issuance stays with the external auth collaborator.
pub async fn verify_login<R: AccountRepository + ?Sized>(
    repo: &R,
    hasher: &dyn CredentialHasher,
    email: &str,
    password: &str,
) -> RepositoryResult<IhrUser> {
    let email = normalize_email(email)?;
    let user = repo.get_user_by_email(&email).await?;
    if !hasher.verify(password, &user.password) {
        return Err(RepositoryError::validation("Invalid credentials"));
    }
    Ok(user)
}

/// Fetch an account by id.
pub async fn get_user<R: AccountRepository + ?Sized>(
    repo: &R,
    id: UserId,
) -> RepositoryResult<IhrUser> {
    repo.get_user(id).await
}

/// Fetch an account by (normalized) email.
pub async fn verify_account<R: AccountRepository + ?Sized>(
    repo: &R,
    email: &str,
) -> RepositoryResult<IhrUser> {
    let email = normalize_email(email)?;
    repo.get_user_by_email(&email).await
}

/// True when an account exists for this email.
pub async fn user_exists<R: AccountRepository + ?Sized>(
    repo: &R,
    email: &str,
) -> RepositoryResult<bool> {
    let email = normalize_email(email)?;
    match repo.get_user_by_email(&email).await {
        Ok(_) => Ok(true),
        Err(RepositoryError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Change the password after verifying the current one.
pub async fn change_password<R: AccountRepository + ?Sized>(
    repo: &R,
    hasher: &dyn CredentialHasher,
    email: &str,
    password: &str,
    new_password: &str,
) -> RepositoryResult<()> {
    if new_password.is_empty() {
        return Err(RepositoryError::validation("The new password must be set"));
    }
    let user = verify_login(repo, hasher, email, password).await?;
    repo.set_password(user.id, &hasher.derive(&user.email, new_password))
        .await
}

/// Replace the password without the current one; the reset `code` was
/// verified by the external auth collaborator before this is called.
pub async fn reset_password<R: AccountRepository + ?Sized>(
    repo: &R,
    hasher: &dyn CredentialHasher,
    email: &str,
    new_password: &str,
) -> RepositoryResult<()> {
    if new_password.is_empty() {
        return Err(RepositoryError::validation("The new password must be set"));
    }
    let email = normalize_email(email)?;
    let user = repo.get_user_by_email(&email).await?;
    repo.set_password(user.id, &hasher.derive(&user.email, new_password))
        .await
}

/// Record a pending email change for later confirmation. The login email
/// is untouched until [`confirm_email_change`] runs inside the validity
/// window.
pub async fn request_email_change<R: AccountRepository + ?Sized>(
    repo: &R,
    user: UserId,
    new_email: &str,
    now: DateTime<Utc>,
) -> RepositoryResult<EmailChangeRequest> {
    let new_email = normalize_email(new_email)?;
    repo.create_email_change_request(user, &new_email, now).await
}

/// Confirm a pending email change. Requests past their validity window
/// are rejected and left in place.
pub async fn confirm_email_change<R: AccountRepository + ?Sized>(
    repo: &R,
    request_id: i64,
    now: DateTime<Utc>,
) -> RepositoryResult<()> {
    let request = repo.get_email_change_request(request_id).await?;
    if !request.is_valid_at(now) {
        return Err(RepositoryError::validation(format!(
            "Email change request {} has expired",
            request_id
        )));
    }
    repo.apply_email_change(request_id).await
}

/// Subscribe an account to a network, or update the notification level
/// of an existing subscription.
pub async fn monitor_asn<R: AccountRepository + ?Sized>(
    repo: &R,
    user: UserId,
    asn: AsnId,
    level: NotifyLevel,
) -> RepositoryResult<()> {
    repo.set_monitored_asn(user, asn, level).await
}

pub async fn list_monitored<R: AccountRepository + ?Sized>(
    repo: &R,
    user: UserId,
) -> RepositoryResult<Vec<MonitoredAsnRecord>> {
    repo.list_monitored_asns(user).await
}
