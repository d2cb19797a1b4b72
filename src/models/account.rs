//! Account entities: users, capability tags, monitoring subscriptions and
//! pending email changes.
//!
//! User construction is a stateless, validating step: the escalation rule
//! (staff and superuser are granted together or not at all) and email
//! normalization run before anything reaches the store. Credentials are
//! digested through the [`CredentialHasher`] seam; plaintext never leaves
//! the constructor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::api::{AsnId, UserId};

/// Errors raised while validating account input, before any write.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("The email and password must be set")]
    MissingCredentials,

    #[error("Malformed email address: {0}")]
    MalformedEmail(String),

    #[error("Staff and superuser flags must be granted together")]
    PartialEscalation,

    #[error("Unknown notification level: {0}")]
    UnknownNotifyLevel(i16),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),
}

/// Normalize an email for storage and comparison: surrounding whitespace
/// is trimmed and the domain part lowercased; the local part is preserved
/// as given.
///
/// Returns [`AccountError::MalformedEmail`] unless the address has a
/// non-empty local part and a dotted, space-free domain.
pub fn normalize_email(raw: &str) -> Result<String, AccountError> {
    let trimmed = raw.trim();
    let malformed = || AccountError::MalformedEmail(trimmed.to_string());

    let (local, domain) = trimmed.rsplit_once('@').ok_or_else(malformed)?;
    if local.is_empty() || domain.is_empty() {
        return Err(malformed());
    }
    if domain.contains(char::is_whitespace) || local.contains(char::is_whitespace) {
        return Err(malformed());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(malformed());
    }

    Ok(format!("{}@{}", local, domain.to_lowercase()))
}

/// True when `raw` would survive [`normalize_email`]. Used by the request
/// shapes, which only check well-formedness.
pub fn is_well_formed_email(raw: &str) -> bool {
    normalize_email(raw).is_ok()
}

/// Derives and verifies stored credential digests.
///
/// Actual password policy and session issuance belong to the external
/// authentication collaborator; this seam only fixes the stored format so
/// the store never sees plaintext.
pub trait CredentialHasher: Send + Sync {
    /// Derive the storable digest for `password` under `salt`.
    fn derive(&self, salt: &str, password: &str) -> String;

    /// Check `password` against a stored digest.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Default hasher: salted SHA-256, stored as `sha256$<salt>$<hex digest>`
/// so the salt travels with the digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"$");
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl CredentialHasher for Sha256Hasher {
    fn derive(&self, salt: &str, password: &str) -> String {
        format!("sha256${}${}", salt, Self::digest(salt, password))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let mut parts = stored.splitn(3, '$');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("sha256"), Some(salt), Some(digest)) => Self::digest(salt, password) == digest,
            _ => false,
        }
    }
}

/// Staff/superuser escalation flags. Valid only as a pair: both set or
/// both clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFlags {
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl UserFlags {
    pub const SUPERUSER: UserFlags = UserFlags {
        is_staff: true,
        is_superuser: true,
    };
}

/// Validated insert shape for an account. Always starts inactive; the
/// out-of-band verification flow flips `is_active` later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    /// Salted credential digest, never plaintext.
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUser {
    /// Validate and build an account insert.
    ///
    /// Rejects empty credentials, malformed emails and a partial
    /// escalation pair before anything is persisted.
    pub fn create(
        email: &str,
        password: &str,
        flags: UserFlags,
        hasher: &dyn CredentialHasher,
    ) -> Result<Self, AccountError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }
        if flags.is_staff != flags.is_superuser {
            return Err(AccountError::PartialEscalation);
        }

        let email = normalize_email(email)?;
        let password = hasher.derive(&email, password);

        Ok(Self {
            email,
            password,
            is_active: false,
            is_staff: flags.is_staff,
            is_superuser: flags.is_superuser,
        })
    }

    /// Build a regular account. Elevated flags are not accepted here;
    /// callers wanting escalation must go through [`NewUser::superuser`]
    /// or pass an explicit pair to [`NewUser::create`].
    pub fn user(
        email: &str,
        password: &str,
        hasher: &dyn CredentialHasher,
    ) -> Result<Self, AccountError> {
        Self::create(email, password, UserFlags::default(), hasher)
    }

    /// Build a superuser account with both escalation flags set.
    pub fn superuser(
        email: &str,
        password: &str,
        hasher: &dyn CredentialHasher,
    ) -> Result<Self, AccountError> {
        Self::create(email, password, UserFlags::SUPERUSER, hasher)
    }
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IhrUser {
    pub id: UserId,
    /// Login identifier, unique and stored normalized.
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Capability tags granted to an account. A flat set-of-enum stands in
/// for a group/permission graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May create networks/countries and toggle participation flags.
    ManageNetworks,
    /// May activate, deactivate and delete accounts.
    ManageUsers,
    /// May read alarm session contributions in bulk.
    ViewRawAlarms,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageNetworks => "manage_networks",
            Capability::ManageUsers => "manage_users",
            Capability::ViewRawAlarms => "view_raw_alarms",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage_networks" => Ok(Capability::ManageNetworks),
            "manage_users" => Ok(Capability::ManageUsers),
            "view_raw_alarms" => Ok(Capability::ViewRawAlarms),
            other => Err(AccountError::UnknownCapability(other.to_string())),
        }
    }
}

/// Notification threshold of a monitoring subscription. Stored as its
/// numeric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Low,
    Moderate,
    #[default]
    High,
}

impl NotifyLevel {
    pub fn as_i16(&self) -> i16 {
        match self {
            NotifyLevel::Low => 0,
            NotifyLevel::Moderate => 5,
            NotifyLevel::High => 10,
        }
    }

    /// Decode a stored level. An unknown value is a data error, not a
    /// default.
    pub fn from_i16(value: i16) -> Result<Self, AccountError> {
        match value {
            0 => Ok(NotifyLevel::Low),
            5 => Ok(NotifyLevel::Moderate),
            10 => Ok(NotifyLevel::High),
            other => Err(AccountError::UnknownNotifyLevel(other)),
        }
    }
}

/// A per-ASN monitoring subscription joining an account to a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAsn {
    pub user: UserId,
    pub asn: AsnId,
    pub notifylevel: NotifyLevel,
}

/// A pending email change. Rows never self-expire; the confirming caller
/// must reject requests older than [`EmailChangeRequest::VALIDITY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChangeRequest {
    pub id: i64,
    pub user: UserId,
    pub new_email: String,
    pub request_time: DateTime<Utc>,
}

impl EmailChangeRequest {
    /// Validity window, in minutes.
    pub const VALIDITY: i64 = 60 * 24;

    /// True when the request may still be confirmed at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now - self.request_time < Duration::minutes(Self::VALIDITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_domain_only() {
        assert_eq!(
            normalize_email(" User@ExAmple.ORG ").unwrap(),
            "User@example.org"
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "nodomain", "@example.org", "user@", "user@nodot", "a b@x.org"] {
            assert!(normalize_email(bad).is_err(), "{:?} accepted", bad);
        }
    }

    #[test]
    fn create_rejects_partial_escalation() {
        let hasher = Sha256Hasher;
        let staff_only = UserFlags {
            is_staff: true,
            is_superuser: false,
        };
        assert_eq!(
            NewUser::create("a@example.org", "secret", staff_only, &hasher),
            Err(AccountError::PartialEscalation)
        );
        let super_only = UserFlags {
            is_staff: false,
            is_superuser: true,
        };
        assert_eq!(
            NewUser::create("a@example.org", "secret", super_only, &hasher),
            Err(AccountError::PartialEscalation)
        );
    }

    #[test]
    fn superuser_sets_both_flags() {
        let user = NewUser::superuser("root@example.org", "secret", &Sha256Hasher).unwrap();
        assert!(user.is_staff && user.is_superuser);
        assert!(!user.is_active);
    }

    #[test]
    fn new_users_start_inactive_with_hashed_password() {
        let user = NewUser::user("a@example.org", "secret", &Sha256Hasher).unwrap();
        assert!(!user.is_active);
        assert!(user.password.starts_with("sha256$"));
        assert!(!user.password.contains("secret"));
        assert!(Sha256Hasher.verify("secret", &user.password));
        assert!(!Sha256Hasher.verify("wrong", &user.password));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert_eq!(
            NewUser::user("", "secret", &Sha256Hasher),
            Err(AccountError::MissingCredentials)
        );
        assert_eq!(
            NewUser::user("a@example.org", "", &Sha256Hasher),
            Err(AccountError::MissingCredentials)
        );
    }

    #[test]
    fn notify_level_codes_round_trip() {
        for level in [NotifyLevel::Low, NotifyLevel::Moderate, NotifyLevel::High] {
            assert_eq!(NotifyLevel::from_i16(level.as_i16()).unwrap(), level);
        }
        assert!(NotifyLevel::from_i16(3).is_err());
        assert_eq!(NotifyLevel::default(), NotifyLevel::High);
    }

    #[test]
    fn email_change_validity_window_boundaries() {
        let t0 = Utc::now();
        let request = EmailChangeRequest {
            id: 1,
            user: UserId::new(1),
            new_email: "new@example.org".to_string(),
            request_time: t0,
        };
        assert!(request.is_valid_at(t0 + Duration::minutes(1439)));
        assert!(!request.is_valid_at(t0 + Duration::minutes(1441)));
    }
}
