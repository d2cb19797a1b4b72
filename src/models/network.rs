//! Reference entities: networks, countries and Atlas vantage points.

use serde::{Deserialize, Serialize};

use crate::api::{AsnId, LocationId, NetworkRecord};

/// A monitored network, identified by its ASN or negative IXP id.
///
/// Identity is immutable; only the participation flags change after
/// creation, toggled by admin/ingestion tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub number: AsnId,
    pub name: String,
    /// Participates in link-delay and forwarding anomaly analysis.
    pub tartiflette: bool,
    /// Participates in network disconnection analysis.
    pub disco: bool,
    /// Participates in AS dependency analysis.
    pub ashash: bool,
}

impl Network {
    pub fn new(number: AsnId, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
            tartiflette: false,
            disco: false,
            ashash: false,
        }
    }

    /// External representation, with the storage flags renamed to their
    /// analysis-facing names.
    pub fn record(&self) -> NetworkRecord {
        NetworkRecord {
            number: self.number,
            name: self.name.clone(),
            hegemony: self.ashash,
            delay_forwarding: self.tartiflette,
            disco: self.disco,
        }
    }
}

/// The mutable participation flags of a [`Network`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFlags {
    pub tartiflette: bool,
    pub disco: bool,
    pub ashash: bool,
}

/// A country, keyed by its short code (at most 4 characters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub tartiflette: bool,
    pub disco: bool,
}

impl Country {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            tartiflette: false,
            disco: false,
        }
    }
}

/// The mutable participation flags of a [`Country`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryFlags {
    pub tartiflette: bool,
    pub disco: bool,
}

/// A stored Atlas vantage point. No uniqueness is declared over
/// (type, name, af); readers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasLocation {
    pub id: LocationId,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub af: i32,
}

/// Insert shape for a vantage point; the surrogate key is assigned by the
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub af: i32,
}

impl NewLocation {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, af: i32) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            af,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_renames_participation_flags() {
        let mut network = Network::new(AsnId::new(2497), "IIJ");
        network.ashash = true;
        let record = network.record();
        assert!(record.hegemony);
        assert!(!record.delay_forwarding);
        assert_eq!(record.number, AsnId::new(2497));
    }

    #[test]
    fn new_network_starts_with_all_flags_off() {
        let network = Network::new(AsnId::new(-400644), "AMS-IX");
        assert!(!network.tartiflette && !network.disco && !network.ashash);
        assert!(network.number.is_ixp());
    }
}
