//! Repository trait for anomaly alarms.

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::{AtlasDelayQuery, HegemonyQuery, SeriesQuery};
use crate::api::{
    AlarmId, DelayAlarmRecord, ForwardingAlarmRecord, HegemonyAlarmRecord,
    NetworkDelayAlarmRecord,
};
use crate::models::{NewAtlasDelayAlarm, NewDelayAlarm, NewForwardingAlarm, NewHegemonyAlarm};

/// Repository trait for alarm operations.
///
/// Delay and forwarding alarms own their measurement-session pairs; the
/// alarm row and its child rows are written in one atomic operation, and
/// fetches rebuild both wire renderings of the pair list from the child
/// rows.
#[async_trait]
pub trait AlarmRepository: Send + Sync {
    async fn insert_delay_alarm(&self, alarm: &NewDelayAlarm) -> RepositoryResult<AlarmId>;

    async fn insert_forwarding_alarm(
        &self,
        alarm: &NewForwardingAlarm,
    ) -> RepositoryResult<AlarmId>;

    async fn insert_hegemony_alarm(&self, alarm: &NewHegemonyAlarm) -> RepositoryResult<AlarmId>;

    async fn insert_atlas_delay_alarm(
        &self,
        alarm: &NewAtlasDelayAlarm,
    ) -> RepositoryResult<AlarmId>;

    async fn fetch_delay_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<DelayAlarmRecord>>;

    async fn fetch_forwarding_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingAlarmRecord>>;

    async fn fetch_hegemony_alarms(
        &self,
        query: &HegemonyQuery,
    ) -> RepositoryResult<Vec<HegemonyAlarmRecord>>;

    async fn fetch_network_delay_alarms(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayAlarmRecord>>;
}
