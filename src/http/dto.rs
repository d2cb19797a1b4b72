//! Data Transfer Objects for the HTTP API.
//!
//! The read endpoints serve the record types from [`crate::api`] inside a
//! [`ListResponse`] envelope. The account request shapes below are flat
//! field-presence contracts: every field is deserialized as optional and
//! `validate()` enumerates everything missing or malformed in one pass,
//! so a caller sees all offending fields at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{is_well_formed_email, NotifyLevel};

/// List envelope for every read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Total number of results
    pub count: usize,
    /// The result records
    pub results: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

fn join_fields(fields: &[&str]) -> String {
    format!("Missing or invalid field(s): {}", fields.join(", "))
}

/// Registration request: `{email, password, code}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Validated registration input.
#[derive(Debug, Clone)]
pub struct UserRegistration {
    pub email: String,
    pub password: String,
    pub code: String,
}

impl UserRegisterRequest {
    pub fn validate(&self) -> Result<UserRegistration, String> {
        let mut bad = Vec::new();
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => {}
            _ => bad.push("email"),
        }
        if self.password.as_deref().unwrap_or_default().is_empty() {
            bad.push("password");
        }
        if self.code.as_deref().unwrap_or_default().is_empty() {
            bad.push("code");
        }
        if !bad.is_empty() {
            return Err(join_fields(&bad));
        }
        Ok(UserRegistration {
            email: self.email.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            code: self.code.clone().unwrap_or_default(),
        })
    }
}

/// Login request: `{email, password}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Validated credential pair.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub email: String,
    pub password: String,
}

impl UserLoginRequest {
    pub fn validate(&self) -> Result<UserCredentials, String> {
        let mut bad = Vec::new();
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => {}
            _ => bad.push("email"),
        }
        if self.password.as_deref().unwrap_or_default().is_empty() {
            bad.push("password");
        }
        if !bad.is_empty() {
            return Err(join_fields(&bad));
        }
        Ok(UserCredentials {
            email: self.email.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

/// Email-only lookup request: `{email}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserEmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

impl UserEmailRequest {
    pub fn validate(&self) -> Result<String, String> {
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => Ok(email.to_string()),
            _ => Err(join_fields(&["email"])),
        }
    }
}

/// Password change request: `{email, password, new_password}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChangePasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

/// Validated password change input.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub email: String,
    pub password: String,
    pub new_password: String,
}

impl UserChangePasswordRequest {
    pub fn validate(&self) -> Result<PasswordChange, String> {
        let mut bad = Vec::new();
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => {}
            _ => bad.push("email"),
        }
        if self.password.as_deref().unwrap_or_default().is_empty() {
            bad.push("password");
        }
        if self.new_password.as_deref().unwrap_or_default().is_empty() {
            bad.push("new_password");
        }
        if !bad.is_empty() {
            return Err(join_fields(&bad));
        }
        Ok(PasswordChange {
            email: self.email.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            new_password: self.new_password.clone().unwrap_or_default(),
        })
    }
}

/// Password reset request: `{email, new_password, code}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserResetPasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Validated password reset input.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub email: String,
    pub new_password: String,
    pub code: String,
}

impl UserResetPasswordRequest {
    pub fn validate(&self) -> Result<PasswordReset, String> {
        let mut bad = Vec::new();
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => {}
            _ => bad.push("email"),
        }
        if self.new_password.as_deref().unwrap_or_default().is_empty() {
            bad.push("new_password");
        }
        if self.code.as_deref().unwrap_or_default().is_empty() {
            bad.push("code");
        }
        if !bad.is_empty() {
            return Err(join_fields(&bad));
        }
        Ok(PasswordReset {
            email: self.email.clone().unwrap_or_default(),
            new_password: self.new_password.clone().unwrap_or_default(),
            code: self.code.clone().unwrap_or_default(),
        })
    }
}

/// Subscription request: `{email, asn, notifylevel?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default)]
    pub notifylevel: Option<NotifyLevel>,
}

/// Validated subscription input.
#[derive(Debug, Clone)]
pub struct MonitorSubscription {
    pub email: String,
    pub asn: i64,
    pub notifylevel: NotifyLevel,
}

impl MonitorRequest {
    pub fn validate(&self) -> Result<MonitorSubscription, String> {
        let mut bad = Vec::new();
        match self.email.as_deref() {
            Some(email) if is_well_formed_email(email) => {}
            _ => bad.push("email"),
        }
        if self.asn.is_none() {
            bad.push("asn");
        }
        if !bad.is_empty() {
            return Err(join_fields(&bad));
        }
        Ok(MonitorSubscription {
            email: self.email.clone().unwrap_or_default(),
            asn: self.asn.unwrap_or_default(),
            notifylevel: self.notifylevel.unwrap_or_default(),
        })
    }
}

/// Response for registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Normalized login email of the new account
    pub email: String,
    /// Accounts start inactive until verified out of band
    pub is_active: bool,
}

/// Response for login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub email: String,
    pub is_active: bool,
}

/// Response for the email-only lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExistsResponse {
    pub registered: bool,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}

// =============================================================================
// Query parameters for the read endpoints
// =============================================================================

/// Filters for the network listing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkQueryParams {
    /// Case-insensitive name substring
    #[serde(default)]
    pub search: Option<String>,
}

/// Filters for single-network series and alarms.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeriesQueryParams {
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default, rename = "timebin__gte")]
    pub timebin_gte: Option<DateTime<Utc>>,
    #[serde(default, rename = "timebin__lte")]
    pub timebin_lte: Option<DateTime<Utc>>,
}

/// Filters for dependency scores and alarms.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HegemonyQueryParams {
    #[serde(default)]
    pub originasn: Option<i64>,
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default)]
    pub af: Option<i32>,
    #[serde(default, rename = "timebin__gte")]
    pub timebin_gte: Option<DateTime<Utc>>,
    #[serde(default, rename = "timebin__lte")]
    pub timebin_lte: Option<DateTime<Utc>>,
}

/// Filters for dependency-cone sizes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConeQueryParams {
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default)]
    pub af: Option<i32>,
    #[serde(default, rename = "timebin__gte")]
    pub timebin_gte: Option<DateTime<Utc>>,
    #[serde(default, rename = "timebin__lte")]
    pub timebin_lte: Option<DateTime<Utc>>,
}

/// Filters for vantage-point delay series and alarms.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkDelayQueryParams {
    #[serde(default)]
    pub startpoint: Option<i64>,
    #[serde(default)]
    pub endpoint: Option<i64>,
    #[serde(default, rename = "timebin__gte")]
    pub timebin_gte: Option<DateTime<Utc>>,
    #[serde(default, rename = "timebin__lte")]
    pub timebin_lte: Option<DateTime<Utc>>,
}

/// Filters for disconnection events. The window bounds select events
/// overlapping [starttime__gte, endtime__lte].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoQueryParams {
    #[serde(default)]
    pub streamtype: Option<String>,
    #[serde(default)]
    pub streamname: Option<String>,
    #[serde(default, rename = "starttime__gte")]
    pub starttime_gte: Option<DateTime<Utc>>,
    #[serde(default, rename = "endtime__lte")]
    pub endtime_lte: Option<DateTime<Utc>>,
}

/// Filters for the vantage-point listing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocationQueryParams {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub af: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_validation_lists_every_missing_field() {
        let request = UserRegisterRequest::default();
        let err = request.validate().unwrap_err();
        assert!(err.contains("email"));
        assert!(err.contains("password"));
        assert!(err.contains("code"));
    }

    #[test]
    fn register_validation_flags_malformed_email_only() {
        let request = UserRegisterRequest {
            email: Some("not-an-email".to_string()),
            password: Some("secret".to_string()),
            code: Some("123456".to_string()),
        };
        let err = request.validate().unwrap_err();
        assert!(err.contains("email"));
        assert!(!err.contains("password"));
    }

    #[test]
    fn monitor_defaults_to_high_level() {
        let request = MonitorRequest {
            email: Some("user@example.org".to_string()),
            asn: Some(2497),
            notifylevel: None,
        };
        let valid = request.validate().unwrap();
        assert_eq!(valid.notifylevel, NotifyLevel::High);
    }

    #[test]
    fn series_params_accept_double_underscore_bounds() {
        let params: SeriesQueryParams = serde_json::from_str(
            r#"{"asn": 2497, "timebin__gte": "2021-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(params.asn, Some(2497));
        assert!(params.timebin_gte.is_some());
        assert!(params.timebin_lte.is_none());
    }
}
