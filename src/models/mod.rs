//! Domain entities and invariants.
//!
//! The types in this module are storage-shaped: they mirror the persisted
//! tables and carry the invariant logic that must hold before anything is
//! written (account escalation rules, email normalization, enum codings).
//! The external wire shapes live in [`crate::api`].

pub mod account;
pub mod alarms;
pub mod disco;
pub mod network;
pub mod series;

pub use account::{
    is_well_formed_email, normalize_email, AccountError, Capability, CredentialHasher,
    EmailChangeRequest, IhrUser, MonitoredAsn, NewUser, NotifyLevel, Sha256Hasher, UserFlags,
};
pub use alarms::{
    AlarmSession, NewAtlasDelayAlarm, NewDelayAlarm, NewForwardingAlarm, NewHegemonyAlarm,
};
pub use disco::{NewDiscoEvent, NewDiscoProbe, StreamType};
pub use network::{AtlasLocation, Country, CountryFlags, Network, NetworkFlags, NewLocation};
pub use series::{AtlasDelay, Delay, Forwarding, Hegemony, HegemonyCone};
