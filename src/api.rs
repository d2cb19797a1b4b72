//! Public API surface for the Rust backend.
//!
//! This file consolidates the identifier newtypes and the external
//! representation records served by the query API. Every record field is
//! either a stored column or a single foreign-key traversal resolved at
//! query time; the mapping layer performs no computation beyond that.
//! Field names and nesting are the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AlarmSession, StreamType};

/// Network identifier: a positive Autonomous System Number, or a negative
/// IXP identifier kept in a disjoint range to avoid collision with real
/// ASNs.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AsnId(pub i64);

/// Vantage-point location identifier (database primary key).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub i64);

/// Disconnection event identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub i64);

/// Alarm row identifier, shared by all alarm tables.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlarmId(pub i64);

/// Account identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl AsnId {
    pub fn new(value: i64) -> Self {
        AsnId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// True when this identifier denotes an Internet Exchange Point rather
    /// than an Autonomous System. IXP ids are negative by construction.
    pub fn is_ixp(&self) -> bool {
        self.0 < 0
    }
}

impl LocationId {
    pub fn new(value: i64) -> Self {
        LocationId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl EventId {
    pub fn new(value: i64) -> Self {
        EventId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl AlarmId {
    pub fn new(value: i64) -> Self {
        AlarmId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl UserId {
    pub fn new(value: i64) -> Self {
        UserId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AsnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for AlarmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AsnId> for i64 {
    fn from(id: AsnId) -> Self {
        id.0
    }
}

/// Inclusive time window used by every range query. Both bounds optional;
/// an open bound scans to the edge of the series.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// True when `t` falls inside the window.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }
}

// =============================================================================
// Reference entities
// =============================================================================

/// A monitored network as served by the query API. The participation flags
/// are renamed from their storage columns to analysis-facing names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// ASN, or negative IXP id.
    pub number: AsnId,
    /// Name registered for the network.
    pub name: String,
    /// True if the network participates in AS dependency analysis.
    pub hegemony: bool,
    /// True if the network participates in link delay and forwarding
    /// anomaly analysis.
    pub delay_forwarding: bool,
    /// True if the network participates in disconnection analysis.
    pub disco: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub code: String,
    pub name: String,
}

/// A topological or geographic vantage point. Duplicates by
/// (type, name, af) are possible and tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub af: i32,
}

// =============================================================================
// Time-series records
// =============================================================================

/// One link-delay magnitude sample, with the network name denormalized
/// beside its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayRecord {
    pub asn: AsnId,
    pub timebin: DateTime<Utc>,
    /// Amplitude of the delay change.
    pub magnitude: f64,
    pub asn_name: String,
}

/// One forwarding-anomaly magnitude sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardingRecord {
    pub asn: AsnId,
    pub timebin: DateTime<Utc>,
    pub magnitude: f64,
    pub asn_name: String,
}

/// AS-to-AS dependency score. Names of both the dependent network and the
/// dependency are denormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HegemonyRecord {
    pub timebin: DateTime<Utc>,
    pub originasn: AsnId,
    pub asn: AsnId,
    pub hege: f64,
    pub af: i32,
    pub asn_name: String,
    pub originasn_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HegemonyConeRecord {
    pub timebin: DateTime<Utc>,
    pub asn: AsnId,
    pub conesize: i32,
    pub af: i32,
}

/// Delay between two vantage points. Both endpoints are flattened into six
/// top-level fields rather than nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDelayRecord {
    pub timebin: DateTime<Utc>,
    pub startpoint_type: String,
    pub startpoint_name: String,
    pub startpoint_af: i32,
    pub endpoint_type: String,
    pub endpoint_name: String,
    pub endpoint_af: i32,
    pub median: f64,
    pub nbtracks: i32,
    pub nbprobes: i32,
    pub entropy: f64,
    pub hop: i32,
    pub nbrealrtts: i32,
}

// =============================================================================
// Alarm records
// =============================================================================

/// Link-delay anomaly event. `msm_prb_ids` and `msmid` expose the same
/// measurement-session contributions in two renderings; both are derived
/// from the normalized child rows so their contents always agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayAlarmRecord {
    pub asn: AsnId,
    pub asn_name: String,
    pub timebin: DateTime<Utc>,
    /// Pair of IP addresses corresponding to the reported link.
    pub link: String,
    pub medianrtt: f64,
    pub diffmedian: f64,
    pub deviation: f64,
    pub nbprobes: i32,
    /// Raw (measurement id, probe id) pairs.
    pub msm_prb_ids: Vec<(i64, i32)>,
    /// The same pairs rendered as `"{msmid} {probeid}"` strings.
    pub msmid: Vec<String>,
}

/// Forwarding-pattern anomaly event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardingAlarmRecord {
    pub asn: AsnId,
    pub asn_name: String,
    pub timebin: DateTime<Utc>,
    /// Reported IP address, seen an unusually high or low number of times
    /// in traceroutes.
    pub ip: String,
    pub correlation: f64,
    pub pktdiff: f64,
    /// Last observed IP hop on the usual path.
    pub previoushop: String,
    pub responsibility: f64,
    pub msm_prb_ids: Vec<(i64, i32)>,
    pub msmid: Vec<String>,
}

/// Dependency-score anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HegemonyAlarmRecord {
    pub timebin: DateTime<Utc>,
    pub originasn: AsnId,
    pub asn: AsnId,
    pub deviation: f64,
    pub af: i32,
    pub asn_name: String,
    pub originasn_name: String,
}

/// Vantage-point delay anomaly, endpoints flattened like
/// [`NetworkDelayRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDelayAlarmRecord {
    pub timebin: DateTime<Utc>,
    pub startpoint_type: String,
    pub startpoint_name: String,
    pub startpoint_af: i32,
    pub endpoint_type: String,
    pub endpoint_name: String,
    pub endpoint_af: i32,
    pub deviation: f64,
}

// =============================================================================
// Disconnection records
// =============================================================================

/// Probe-level disconnection nested under its parent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoProbeRecord {
    pub probe_id: i32,
    pub ipv4: String,
    pub prefixv4: String,
    pub event: EventId,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub level: f64,
    pub lat: f64,
    pub lon: f64,
}

/// Network disconnection event with the full set of its probe
/// disconnections nested under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoEventRecord {
    pub id: EventId,
    pub streamtype: StreamType,
    pub streamname: String,
    pub starttime: DateTime<Utc>,
    /// Equal to `starttime` when the end of the event is unknown.
    pub endtime: DateTime<Utc>,
    /// Coordination score of the disconnected probes. Events below 10 are
    /// likely false positives.
    pub avglevel: f64,
    pub nbdiscoprobes: i32,
    pub totalprobes: i32,
    /// Deprecated, kept for compatibility with existing consumers.
    pub ongoing: bool,
    pub discoprobes: Vec<DiscoProbeRecord>,
}

// =============================================================================
// Account records
// =============================================================================

/// Per-ASN monitoring subscription as served back to the subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredAsnRecord {
    pub asn: AsnId,
    pub asn_name: String,
    pub notifylevel: i16,
}

/// Renders the msm/probe contributions of an alarm in both wire forms.
pub(crate) fn render_sessions(sessions: &[AlarmSession]) -> (Vec<(i64, i32)>, Vec<String>) {
    let pairs = sessions.iter().map(|s| (s.msmid, s.probeid)).collect();
    let rendered = sessions.iter().map(|s| s.to_string()).collect();
    (pairs, rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ixp_ids_are_negative() {
        assert!(AsnId::new(-400644).is_ixp());
        assert!(!AsnId::new(2497).is_ixp());
    }

    #[test]
    fn time_range_bounds_are_inclusive() {
        let start = "2021-01-01T00:00:00Z".parse().unwrap();
        let end = "2021-01-01T02:00:00Z".parse().unwrap();
        let range = TimeRange::new(Some(start), Some(end));
        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn open_time_range_contains_everything() {
        let range = TimeRange::default();
        assert!(range.contains(Utc::now()));
    }

    #[test]
    fn session_rendering_keeps_order() {
        let sessions = vec![
            AlarmSession::new(1748022, 6871),
            AlarmSession::new(1748023, 325),
        ];
        let (pairs, rendered) = render_sessions(&sessions);
        assert_eq!(pairs, vec![(1748022, 6871), (1748023, 325)]);
        assert_eq!(rendered, vec!["1748022 6871", "1748023 325"]);
    }
}
