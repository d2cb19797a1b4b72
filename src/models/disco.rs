//! Network disconnection events and their probe-level children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of a disconnection stream. `Admin1` is a wider area than
/// `Admin2`; the exact definition may change from one country to another
/// (e.g. "California, US" is admin1, "San Francisco County, California,
/// US" is admin2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Asn,
    Country,
    Admin1,
    Admin2,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Asn => "asn",
            StreamType::Country => "country",
            StreamType::Admin1 => "admin1",
            StreamType::Admin2 => "admin2",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asn" => Ok(StreamType::Asn),
            "country" => Ok(StreamType::Country),
            "admin1" => Ok(StreamType::Admin1),
            "admin2" => Ok(StreamType::Admin2),
            other => Err(format!("Unknown stream type: {}", other)),
        }
    }
}

/// Placeholder identifier carried by events imported before the current
/// pipeline assigned real upstream ids.
pub const DEFAULT_MONGOID: &str = "000000000000000000000000";

/// Insert shape for a disconnection event together with the probe records
/// it owns. The parent-child write is atomic; deleting the parent removes
/// the children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDiscoEvent {
    pub mongoid: String,
    pub streamtype: StreamType,
    /// Name of the topological (ASN) or geographical area.
    pub streamname: String,
    pub starttime: DateTime<Utc>,
    /// Equal to `starttime` when the end of the event is unknown.
    pub endtime: DateTime<Utc>,
    /// Coordination score of disconnected probes.
    pub avglevel: f64,
    /// Probes that disconnected around the reported start time.
    pub nbdiscoprobes: i32,
    /// Probes active in the reported stream.
    pub totalprobes: i32,
    /// Deprecated, unused; kept for schema compatibility.
    pub ongoing: bool,
    pub probes: Vec<NewDiscoProbe>,
}

impl NewDiscoEvent {
    pub fn new(
        streamtype: StreamType,
        streamname: impl Into<String>,
        starttime: DateTime<Utc>,
        endtime: DateTime<Utc>,
    ) -> Self {
        Self {
            mongoid: DEFAULT_MONGOID.to_string(),
            streamtype,
            streamname: streamname.into(),
            starttime,
            endtime,
            avglevel: 0.0,
            nbdiscoprobes: 0,
            totalprobes: 0,
            ongoing: false,
            probes: Vec::new(),
        }
    }
}

/// Insert shape for one probe disconnection owned by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDiscoProbe {
    pub probe_id: i32,
    pub starttime: DateTime<Utc>,
    /// Reconnection time; may track the event end when the probe never
    /// reported back individually.
    pub endtime: DateTime<Utc>,
    /// Disconnection level when the probe disconnected.
    pub level: f64,
    pub ipv4: String,
    pub prefixv4: String,
    pub lat: f64,
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_type_round_trips_through_str() {
        for kind in [
            StreamType::Asn,
            StreamType::Country,
            StreamType::Admin1,
            StreamType::Admin2,
        ] {
            assert_eq!(kind.as_str().parse::<StreamType>().unwrap(), kind);
        }
        assert!("admin3".parse::<StreamType>().is_err());
    }

    #[test]
    fn stream_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&StreamType::Admin1).unwrap(),
            "\"admin1\""
        );
    }
}
