//! Repository trait for the append-only measurement series.

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::{AtlasDelayQuery, ConeQuery, HegemonyQuery, SeriesQuery};
use crate::api::{
    DelayRecord, ForwardingRecord, HegemonyConeRecord, HegemonyRecord, NetworkDelayRecord,
};
use crate::models::{AtlasDelay, Delay, Forwarding, Hegemony, HegemonyCone};

/// Repository trait for time-series operations.
///
/// Inserts are batched and append-only; rows are never updated. Every
/// insert fails with a constraint violation when a referenced network or
/// location is absent. Fetches return representation records with the
/// related names already resolved, ordered by timestamp.
#[async_trait]
pub trait TimeSeriesRepository: Send + Sync {
    async fn insert_delays(&self, rows: &[Delay]) -> RepositoryResult<usize>;

    async fn insert_forwardings(&self, rows: &[Forwarding]) -> RepositoryResult<usize>;

    async fn insert_hegemonies(&self, rows: &[Hegemony]) -> RepositoryResult<usize>;

    async fn insert_hegemony_cones(&self, rows: &[HegemonyCone]) -> RepositoryResult<usize>;

    async fn insert_atlas_delays(&self, rows: &[AtlasDelay]) -> RepositoryResult<usize>;

    async fn fetch_delay(&self, query: &SeriesQuery) -> RepositoryResult<Vec<DelayRecord>>;

    async fn fetch_forwarding(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingRecord>>;

    async fn fetch_hegemony(&self, query: &HegemonyQuery)
        -> RepositoryResult<Vec<HegemonyRecord>>;

    async fn fetch_hegemony_cone(
        &self,
        query: &ConeQuery,
    ) -> RepositoryResult<Vec<HegemonyConeRecord>>;

    async fn fetch_network_delay(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayRecord>>;
}
