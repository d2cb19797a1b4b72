//! Repository trait definitions.
//!
//! The storage surface is split into per-concern traits so backends can be
//! implemented and tested piecewise; [`FullRepository`] combines them for
//! consumers that need the whole store (the service layer, the HTTP state).

pub mod account;
pub mod alarms;
pub mod disco;
pub mod error;
pub mod network;
pub mod series;

pub use account::AccountRepository;
pub use alarms::AlarmRepository;
pub use disco::DiscoRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use network::NetworkRepository;
pub use series::TimeSeriesRepository;

use async_trait::async_trait;

use crate::api::{AsnId, LocationId, TimeRange};
use crate::models::StreamType;

/// Filter for single-network time series (delay, forwarding) and their
/// alarms. Every query rides the timestamp index; `asn` narrows along the
/// composite index.
#[derive(Debug, Clone, Default)]
pub struct SeriesQuery {
    pub asn: Option<AsnId>,
    pub range: TimeRange,
}

impl SeriesQuery {
    pub fn for_asn(asn: AsnId) -> Self {
        Self {
            asn: Some(asn),
            ..Default::default()
        }
    }

    pub fn in_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }
}

/// Filter for dependency scores and their alarms.
#[derive(Debug, Clone, Default)]
pub struct HegemonyQuery {
    pub originasn: Option<AsnId>,
    pub asn: Option<AsnId>,
    pub af: Option<i32>,
    pub range: TimeRange,
}

/// Filter for dependency-cone sizes.
#[derive(Debug, Clone, Default)]
pub struct ConeQuery {
    pub asn: Option<AsnId>,
    pub af: Option<i32>,
    pub range: TimeRange,
}

/// Filter for vantage-point delay series and alarms.
#[derive(Debug, Clone, Default)]
pub struct AtlasDelayQuery {
    pub startpoint: Option<LocationId>,
    pub endpoint: Option<LocationId>,
    pub range: TimeRange,
}

/// Filter for disconnection events: stream identity plus a window the
/// event must overlap.
#[derive(Debug, Clone, Default)]
pub struct DiscoQuery {
    pub streamtype: Option<StreamType>,
    pub streamname: Option<String>,
    pub window: TimeRange,
}

/// Filter for vantage-point listings.
#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub af: Option<i32>,
}

/// Combined repository trait covering the whole storage surface.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait FullRepository:
    NetworkRepository
    + TimeSeriesRepository
    + AlarmRepository
    + DiscoRepository
    + AccountRepository
{
    /// Verify the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;
}
