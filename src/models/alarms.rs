//! Anomaly events derived from the measurement series.
//!
//! Delay and forwarding alarms carry the measurement sessions that
//! contributed to them. The session pairs are persisted only in the
//! normalized child table; the embedded-list rendering served by the API
//! is derived from those rows at read time, so the two representations
//! cannot drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::{AsnId, LocationId};

/// One (Atlas measurement id, probe id) contribution to an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmSession {
    pub msmid: i64,
    pub probeid: i32,
}

impl AlarmSession {
    pub fn new(msmid: i64, probeid: i32) -> Self {
        Self { msmid, probeid }
    }
}

impl fmt::Display for AlarmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.msmid, self.probeid)
    }
}

/// Insert shape for a link-delay alarm. The alarm row and its session
/// pairs are persisted in one atomic write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDelayAlarm {
    pub asn: AsnId,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    /// Pair of IP addresses corresponding to the reported link.
    pub link: String,
    /// Median differential RTT observed during the alarm.
    pub medianrtt: f64,
    /// Difference between the usual median RTT and the observed one.
    pub diffmedian: f64,
    /// Distance from past usual values, normalized by median absolute
    /// deviation.
    pub deviation: f64,
    pub nbprobes: i32,
    pub sessions: Vec<AlarmSession>,
}

/// Insert shape for a forwarding-pattern alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewForwardingAlarm {
    pub asn: AsnId,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    /// Correlation with the usual forwarding pattern, in [-1, 0]; lowest
    /// values are the most anomalous.
    pub correlation: f64,
    /// Responsibility score of the reported IP in the pattern change.
    pub responsibility: f64,
    pub pktdiff: f64,
    pub previoushop: String,
    pub sessions: Vec<AlarmSession>,
}

/// Insert shape for a dependency-score alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHegemonyAlarm {
    pub timebin: DateTime<Utc>,
    pub originasn: AsnId,
    pub asn: AsnId,
    pub deviation: f64,
    pub af: i32,
}

/// Insert shape for a vantage-point delay alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAtlasDelayAlarm {
    pub timebin: DateTime<Utc>,
    pub startpoint: LocationId,
    pub endpoint: LocationId,
    pub deviation: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_renders_as_space_separated_pair() {
        assert_eq!(AlarmSession::new(1748022, 6871).to_string(), "1748022 6871");
    }
}
