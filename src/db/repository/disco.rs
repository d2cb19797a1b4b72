//! Repository trait for disconnection events.

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::DiscoQuery;
use crate::api::{DiscoEventRecord, DiscoProbeRecord, EventId};
use crate::models::{NewDiscoEvent, NewDiscoProbe};

/// Repository trait for disconnection-event operations.
///
/// An event owns its probe records: inserting persists parent and
/// children together, deleting the parent removes the children. The
/// dominant read is "events for this stream overlapping this window",
/// served by the composite (streamtype, streamname, starttime, endtime)
/// index.
#[async_trait]
pub trait DiscoRepository: Send + Sync {
    /// Insert an event together with its probe records.
    async fn insert_event(&self, event: &NewDiscoEvent) -> RepositoryResult<EventId>;

    /// Attach one more probe record to an existing event.
    async fn add_probe(&self, event: EventId, probe: &NewDiscoProbe) -> RepositoryResult<()>;

    /// Events matching the stream identity whose [start, end] interval
    /// overlaps the query window, children nested, ordered by start time.
    async fn fetch_events(&self, query: &DiscoQuery) -> RepositoryResult<Vec<DiscoEventRecord>>;

    /// Probe records of one event.
    async fn fetch_probes(&self, event: EventId) -> RepositoryResult<Vec<DiscoProbeRecord>>;

    /// Delete an event and its probe records. Returns the number of rows
    /// removed, the event included.
    async fn delete_event(&self, event: EventId) -> RepositoryResult<usize>;
}
