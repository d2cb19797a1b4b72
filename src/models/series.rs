//! Append-only time-series measurement rows.
//!
//! These are the shapes the ingestion pipeline writes. Rows are never
//! updated after insertion; the timestamp is the primary filtering axis
//! for every table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AsnId, LocationId};

/// Cumulated link-delay deviation for one network at one time bin.
/// Values close to zero are usual delays; higher values stand for
/// significant link congestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    pub timebin: DateTime<Utc>,
    pub asn: AsnId,
    pub magnitude: f64,
}

/// Forwarding-anomaly magnitude for one network at one time bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forwarding {
    pub timebin: DateTime<Utc>,
    pub asn: AsnId,
    pub magnitude: f64,
}

/// AS dependency score: how much `originasn`'s reachability relies on
/// `asn`, per address family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hegemony {
    pub timebin: DateTime<Utc>,
    pub originasn: AsnId,
    pub asn: AsnId,
    pub hege: f64,
    pub af: i32,
}

/// Size of the dependency cone of one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HegemonyCone {
    pub timebin: DateTime<Utc>,
    pub asn: AsnId,
    pub conesize: i32,
    pub af: i32,
}

/// Delay measured between two Atlas vantage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasDelay {
    pub timebin: DateTime<Utc>,
    pub startpoint: LocationId,
    pub endpoint: LocationId,
    pub median: f64,
    pub nbtracks: i32,
    pub nbprobes: i32,
    pub entropy: f64,
    pub hop: i32,
    pub nbrealrtts: i32,
}
