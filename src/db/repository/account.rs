//! Repository trait for accounts, capability tags, monitoring
//! subscriptions and email-change requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::api::{AsnId, MonitoredAsnRecord, UserId};
use crate::models::{Capability, EmailChangeRequest, IhrUser, NewUser, NotifyLevel};

/// Repository trait for account operations.
///
/// Email uniqueness is enforced at the store level, atomically with the
/// insert; there is no read-then-write check anywhere above this trait.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a validated account. Fails with a constraint violation when
    /// the (normalized) email is already taken.
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<UserId>;

    async fn get_user(&self, id: UserId) -> RepositoryResult<IhrUser>;

    /// Lookup by login email. The caller passes a normalized address.
    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<IhrUser>;

    /// Flip `is_active` after out-of-band verification.
    async fn activate_user(&self, id: UserId) -> RepositoryResult<()>;

    /// Replace the stored credential digest.
    async fn set_password(&self, id: UserId, password: &str) -> RepositoryResult<()>;

    async fn grant_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()>;

    async fn revoke_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()>;

    async fn list_capabilities(&self, id: UserId) -> RepositoryResult<Vec<Capability>>;

    /// Create or update the subscription of `user` to `asn`. A second
    /// call for the same pair updates the level instead of duplicating
    /// the row.
    async fn set_monitored_asn(
        &self,
        user: UserId,
        asn: AsnId,
        level: NotifyLevel,
    ) -> RepositoryResult<()>;

    async fn remove_monitored_asn(&self, user: UserId, asn: AsnId) -> RepositoryResult<()>;

    /// Subscriptions of one account, network names resolved.
    async fn list_monitored_asns(&self, user: UserId)
        -> RepositoryResult<Vec<MonitoredAsnRecord>>;

    /// Record a pending email change. `new_email` is unique across
    /// pending requests; the row does not change the login email until
    /// applied.
    async fn create_email_change_request(
        &self,
        user: UserId,
        new_email: &str,
        requested_at: DateTime<Utc>,
    ) -> RepositoryResult<EmailChangeRequest>;

    async fn get_email_change_request(&self, id: i64) -> RepositoryResult<EmailChangeRequest>;

    /// Apply a pending change: the login email becomes `new_email` and
    /// the request row is removed. Validity is the caller's check; this
    /// method only fails on uniqueness conflicts or a missing request.
    async fn apply_email_change(&self, id: i64) -> RepositoryResult<()>;

    /// Drop a pending change without applying it.
    async fn delete_email_change_request(&self, id: i64) -> RepositoryResult<()>;

    /// Delete an account and its subscriptions, capabilities and pending
    /// requests. Returns the number of rows removed.
    async fn delete_user(&self, id: UserId) -> RepositoryResult<usize>;
}
