//! In-memory repository implementation.
//!
//! Backs the full repository surface with keyed maps behind a
//! `parking_lot::RwLock`. Referential integrity is enforced by hand the
//! way the relational backend enforces it with constraints: inserts check
//! their foreign-key targets, deletes cascade, and the account email is
//! unique. Intended for unit tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::api::{
    render_sessions, AlarmId, AsnId, CountryRecord, DelayAlarmRecord, DelayRecord,
    DiscoEventRecord, DiscoProbeRecord, EventId, ForwardingAlarmRecord, ForwardingRecord,
    HegemonyAlarmRecord, HegemonyConeRecord, HegemonyRecord, LocationId, LocationRecord,
    MonitoredAsnRecord, NetworkDelayAlarmRecord, NetworkDelayRecord, NetworkRecord, UserId,
};
use crate::db::repository::{
    AccountRepository, AlarmRepository, AtlasDelayQuery, ConeQuery, DiscoQuery, DiscoRepository,
    ErrorContext, FullRepository, HegemonyQuery, LocationFilter, NetworkRepository,
    RepositoryError, RepositoryResult, SeriesQuery, TimeSeriesRepository,
};
use crate::models::{
    AtlasDelay, AtlasLocation, Capability, Country, CountryFlags, Delay, EmailChangeRequest,
    Forwarding, Hegemony, HegemonyCone, IhrUser, MonitoredAsn, Network, NetworkFlags,
    NewAtlasDelayAlarm, NewDelayAlarm, NewDiscoEvent, NewDiscoProbe, NewForwardingAlarm,
    NewHegemonyAlarm, NewLocation, NewUser, NotifyLevel,
};

#[derive(Debug, Clone)]
struct StoredEvent {
    id: i64,
    mongoid: String,
    streamtype: crate::models::StreamType,
    streamname: String,
    starttime: DateTime<Utc>,
    endtime: DateTime<Utc>,
    avglevel: f64,
    nbdiscoprobes: i32,
    totalprobes: i32,
    ongoing: bool,
}

#[derive(Debug, Clone)]
struct StoredProbe {
    event: i64,
    probe: NewDiscoProbe,
}

#[derive(Debug, Default)]
struct Store {
    networks: BTreeMap<i64, Network>,
    countries: BTreeMap<String, Country>,
    locations: BTreeMap<i64, AtlasLocation>,

    delays: Vec<Delay>,
    forwardings: Vec<Forwarding>,
    hegemonies: Vec<Hegemony>,
    cones: Vec<HegemonyCone>,
    atlas_delays: Vec<AtlasDelay>,

    delay_alarms: BTreeMap<i64, NewDelayAlarm>,
    forwarding_alarms: BTreeMap<i64, NewForwardingAlarm>,
    hegemony_alarms: BTreeMap<i64, NewHegemonyAlarm>,
    atlas_delay_alarms: BTreeMap<i64, NewAtlasDelayAlarm>,

    events: BTreeMap<i64, StoredEvent>,
    probes: BTreeMap<i64, StoredProbe>,

    users: BTreeMap<i64, IhrUser>,
    capabilities: BTreeMap<i64, BTreeSet<Capability>>,
    monitored: Vec<MonitoredAsn>,
    email_changes: BTreeMap<i64, EmailChangeRequest>,

    next_location_id: i64,
    next_alarm_id: i64,
    next_event_id: i64,
    next_probe_id: i64,
    next_user_id: i64,
    next_request_id: i64,
}

impl Store {
    fn network_name(&self, asn: AsnId) -> RepositoryResult<String> {
        self.networks
            .get(&asn.value())
            .map(|n| n.name.clone())
            .ok_or_else(|| {
                RepositoryError::internal_with_context(
                    "Dangling network reference",
                    ErrorContext::default()
                        .with_entity("network")
                        .with_entity_id(asn),
                )
            })
    }

    fn require_network(&self, asn: AsnId, operation: &str) -> RepositoryResult<()> {
        if self.networks.contains_key(&asn.value()) {
            return Ok(());
        }
        Err(RepositoryError::constraint_with_context(
            format!("Network {} does not exist", asn),
            ErrorContext::new(operation).with_entity("network"),
        ))
    }

    fn require_location(&self, id: LocationId, operation: &str) -> RepositoryResult<()> {
        if self.locations.contains_key(&id.value()) {
            return Ok(());
        }
        Err(RepositoryError::constraint_with_context(
            format!("Location {} does not exist", id),
            ErrorContext::new(operation).with_entity("atlas_location"),
        ))
    }

    fn location(&self, id: LocationId) -> RepositoryResult<&AtlasLocation> {
        self.locations.get(&id.value()).ok_or_else(|| {
            RepositoryError::internal_with_context(
                "Dangling location reference",
                ErrorContext::default()
                    .with_entity("atlas_location")
                    .with_entity_id(id),
            )
        })
    }

    fn require_user(&self, id: UserId, operation: &str) -> RepositoryResult<&IhrUser> {
        self.users.get(&id.value()).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("User {} not found", id),
                ErrorContext::new(operation).with_entity("ihr_user"),
            )
        })
    }

    fn probe_record(&self, stored: &StoredProbe) -> DiscoProbeRecord {
        DiscoProbeRecord {
            probe_id: stored.probe.probe_id,
            ipv4: stored.probe.ipv4.clone(),
            prefixv4: stored.probe.prefixv4.clone(),
            event: EventId::new(stored.event),
            starttime: stored.probe.starttime,
            endtime: stored.probe.endtime,
            level: stored.probe.level,
            lat: stored.probe.lat,
            lon: stored.probe.lon,
        }
    }

    fn event_record(&self, event: &StoredEvent) -> DiscoEventRecord {
        let mut discoprobes: Vec<DiscoProbeRecord> = self
            .probes
            .values()
            .filter(|p| p.event == event.id)
            .map(|p| self.probe_record(p))
            .collect();
        discoprobes.sort_by_key(|p| p.starttime);

        DiscoEventRecord {
            id: EventId::new(event.id),
            streamtype: event.streamtype,
            streamname: event.streamname.clone(),
            starttime: event.starttime,
            endtime: event.endtime,
            avglevel: event.avglevel,
            nbdiscoprobes: event.nbdiscoprobes,
            totalprobes: event.totalprobes,
            ongoing: event.ongoing,
            discoprobes,
        }
    }
}

/// In-memory implementation of the full repository surface.
#[derive(Debug, Default)]
pub struct LocalRepository {
    store: RwLock<Store>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NetworkRepository for LocalRepository {
    async fn upsert_network(&self, network: &Network) -> RepositoryResult<()> {
        let mut store = self.store.write();
        match store.networks.entry(network.number.value()) {
            Entry::Occupied(mut existing) => existing.get_mut().name = network.name.clone(),
            Entry::Vacant(slot) => {
                slot.insert(network.clone());
            }
        }
        Ok(())
    }

    async fn get_network(&self, asn: AsnId) -> RepositoryResult<NetworkRecord> {
        let store = self.store.read();
        store
            .networks
            .get(&asn.value())
            .map(Network::record)
            .ok_or_else(|| RepositoryError::not_found(format!("Network {} not found", asn)))
    }

    async fn list_networks(&self, search: Option<&str>) -> RepositoryResult<Vec<NetworkRecord>> {
        let store = self.store.read();
        let needle = search.map(str::to_lowercase);
        Ok(store
            .networks
            .values()
            .filter(|n| {
                needle
                    .as_deref()
                    .is_none_or(|q| n.name.to_lowercase().contains(q))
            })
            .map(Network::record)
            .collect())
    }

    async fn set_network_flags(&self, asn: AsnId, flags: NetworkFlags) -> RepositoryResult<()> {
        let mut store = self.store.write();
        let network = store
            .networks
            .get_mut(&asn.value())
            .ok_or_else(|| RepositoryError::not_found(format!("Network {} not found", asn)))?;
        network.tartiflette = flags.tartiflette;
        network.disco = flags.disco;
        network.ashash = flags.ashash;
        Ok(())
    }

    async fn delete_network(&self, asn: AsnId) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        if store.networks.remove(&asn.value()).is_none() {
            return Err(RepositoryError::not_found(format!(
                "Network {} not found",
                asn
            )));
        }
        let mut removed = 1usize;

        let before = store.delays.len();
        store.delays.retain(|r| r.asn != asn);
        removed += before - store.delays.len();

        let before = store.forwardings.len();
        store.forwardings.retain(|r| r.asn != asn);
        removed += before - store.forwardings.len();

        let before = store.hegemonies.len();
        store.hegemonies.retain(|r| r.asn != asn && r.originasn != asn);
        removed += before - store.hegemonies.len();

        let before = store.cones.len();
        store.cones.retain(|r| r.asn != asn);
        removed += before - store.cones.len();

        let doomed: Vec<i64> = store
            .delay_alarms
            .iter()
            .filter(|(_, a)| a.asn == asn)
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            if let Some(alarm) = store.delay_alarms.remove(&id) {
                removed += 1 + alarm.sessions.len();
            }
        }

        let doomed: Vec<i64> = store
            .forwarding_alarms
            .iter()
            .filter(|(_, a)| a.asn == asn)
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            if let Some(alarm) = store.forwarding_alarms.remove(&id) {
                removed += 1 + alarm.sessions.len();
            }
        }

        let doomed: Vec<i64> = store
            .hegemony_alarms
            .iter()
            .filter(|(_, a)| a.asn == asn || a.originasn == asn)
            .map(|(id, _)| *id)
            .collect();
        removed += doomed.len();
        for id in doomed {
            store.hegemony_alarms.remove(&id);
        }

        let before = store.monitored.len();
        store.monitored.retain(|m| m.asn != asn);
        removed += before - store.monitored.len();

        Ok(removed)
    }

    async fn upsert_country(&self, country: &Country) -> RepositoryResult<()> {
        let mut store = self.store.write();
        match store.countries.entry(country.code.clone()) {
            Entry::Occupied(mut existing) => existing.get_mut().name = country.name.clone(),
            Entry::Vacant(slot) => {
                slot.insert(country.clone());
            }
        }
        Ok(())
    }

    async fn get_country(&self, code: &str) -> RepositoryResult<CountryRecord> {
        let store = self.store.read();
        store
            .countries
            .get(code)
            .map(|c| CountryRecord {
                code: c.code.clone(),
                name: c.name.clone(),
            })
            .ok_or_else(|| RepositoryError::not_found(format!("Country {} not found", code)))
    }

    async fn list_countries(&self) -> RepositoryResult<Vec<CountryRecord>> {
        let store = self.store.read();
        Ok(store
            .countries
            .values()
            .map(|c| CountryRecord {
                code: c.code.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn set_country_flags(&self, code: &str, flags: CountryFlags) -> RepositoryResult<()> {
        let mut store = self.store.write();
        let country = store
            .countries
            .get_mut(code)
            .ok_or_else(|| RepositoryError::not_found(format!("Country {} not found", code)))?;
        country.tartiflette = flags.tartiflette;
        country.disco = flags.disco;
        Ok(())
    }

    async fn insert_location(&self, location: &NewLocation) -> RepositoryResult<LocationId> {
        let mut store = self.store.write();
        store.next_location_id += 1;
        let id = store.next_location_id;
        store.locations.insert(
            id,
            AtlasLocation {
                id: LocationId::new(id),
                kind: location.kind.clone(),
                name: location.name.clone(),
                af: location.af,
            },
        );
        Ok(LocationId::new(id))
    }

    async fn get_location(&self, id: LocationId) -> RepositoryResult<AtlasLocation> {
        let store = self.store.read();
        store
            .locations
            .get(&id.value())
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("Location {} not found", id)))
    }

    async fn list_locations(
        &self,
        filter: &LocationFilter,
    ) -> RepositoryResult<Vec<LocationRecord>> {
        let store = self.store.read();
        Ok(store
            .locations
            .values()
            .filter(|l| {
                filter.kind.as_deref().is_none_or(|k| l.kind == k)
                    && filter.name.as_deref().is_none_or(|n| l.name == n)
                    && filter.af.is_none_or(|af| l.af == af)
            })
            .map(|l| LocationRecord {
                kind: l.kind.clone(),
                name: l.name.clone(),
                af: l.af,
            })
            .collect())
    }
}

#[async_trait]
impl TimeSeriesRepository for LocalRepository {
    async fn insert_delays(&self, rows: &[Delay]) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        for row in rows {
            store.require_network(row.asn, "insert_delays")?;
        }
        store.delays.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_forwardings(&self, rows: &[Forwarding]) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        for row in rows {
            store.require_network(row.asn, "insert_forwardings")?;
        }
        store.forwardings.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_hegemonies(&self, rows: &[Hegemony]) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        for row in rows {
            store.require_network(row.originasn, "insert_hegemonies")?;
            store.require_network(row.asn, "insert_hegemonies")?;
        }
        store.hegemonies.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_hegemony_cones(&self, rows: &[HegemonyCone]) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        for row in rows {
            store.require_network(row.asn, "insert_hegemony_cones")?;
        }
        store.cones.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_atlas_delays(&self, rows: &[AtlasDelay]) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        for row in rows {
            store.require_location(row.startpoint, "insert_atlas_delays")?;
            store.require_location(row.endpoint, "insert_atlas_delays")?;
        }
        store.atlas_delays.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn fetch_delay(&self, query: &SeriesQuery) -> RepositoryResult<Vec<DelayRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for row in store
            .delays
            .iter()
            .filter(|r| query.asn.is_none_or(|a| r.asn == a) && query.range.contains(r.timebin))
        {
            records.push(DelayRecord {
                asn: row.asn,
                timebin: row.timebin,
                magnitude: row.magnitude,
                asn_name: store.network_name(row.asn)?,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_forwarding(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for row in store
            .forwardings
            .iter()
            .filter(|r| query.asn.is_none_or(|a| r.asn == a) && query.range.contains(r.timebin))
        {
            records.push(ForwardingRecord {
                asn: row.asn,
                timebin: row.timebin,
                magnitude: row.magnitude,
                asn_name: store.network_name(row.asn)?,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_hegemony(
        &self,
        query: &HegemonyQuery,
    ) -> RepositoryResult<Vec<HegemonyRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for row in store.hegemonies.iter().filter(|r| {
            query.originasn.is_none_or(|a| r.originasn == a)
                && query.asn.is_none_or(|a| r.asn == a)
                && query.af.is_none_or(|af| r.af == af)
                && query.range.contains(r.timebin)
        }) {
            records.push(HegemonyRecord {
                timebin: row.timebin,
                originasn: row.originasn,
                asn: row.asn,
                hege: row.hege,
                af: row.af,
                asn_name: store.network_name(row.asn)?,
                originasn_name: store.network_name(row.originasn)?,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_hegemony_cone(
        &self,
        query: &ConeQuery,
    ) -> RepositoryResult<Vec<HegemonyConeRecord>> {
        let store = self.store.read();
        let mut records: Vec<HegemonyConeRecord> = store
            .cones
            .iter()
            .filter(|r| {
                query.asn.is_none_or(|a| r.asn == a)
                    && query.af.is_none_or(|af| r.af == af)
                    && query.range.contains(r.timebin)
            })
            .map(|r| HegemonyConeRecord {
                timebin: r.timebin,
                asn: r.asn,
                conesize: r.conesize,
                af: r.af,
            })
            .collect();
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_network_delay(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for row in store.atlas_delays.iter().filter(|r| {
            query.startpoint.is_none_or(|p| r.startpoint == p)
                && query.endpoint.is_none_or(|p| r.endpoint == p)
                && query.range.contains(r.timebin)
        }) {
            let start = store.location(row.startpoint)?;
            let end = store.location(row.endpoint)?;
            records.push(NetworkDelayRecord {
                timebin: row.timebin,
                startpoint_type: start.kind.clone(),
                startpoint_name: start.name.clone(),
                startpoint_af: start.af,
                endpoint_type: end.kind.clone(),
                endpoint_name: end.name.clone(),
                endpoint_af: end.af,
                median: row.median,
                nbtracks: row.nbtracks,
                nbprobes: row.nbprobes,
                entropy: row.entropy,
                hop: row.hop,
                nbrealrtts: row.nbrealrtts,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }
}

#[async_trait]
impl AlarmRepository for LocalRepository {
    async fn insert_delay_alarm(&self, alarm: &NewDelayAlarm) -> RepositoryResult<AlarmId> {
        let mut store = self.store.write();
        store.require_network(alarm.asn, "insert_delay_alarm")?;
        store.next_alarm_id += 1;
        let id = store.next_alarm_id;
        store.delay_alarms.insert(id, alarm.clone());
        Ok(AlarmId::new(id))
    }

    async fn insert_forwarding_alarm(
        &self,
        alarm: &NewForwardingAlarm,
    ) -> RepositoryResult<AlarmId> {
        let mut store = self.store.write();
        store.require_network(alarm.asn, "insert_forwarding_alarm")?;
        store.next_alarm_id += 1;
        let id = store.next_alarm_id;
        store.forwarding_alarms.insert(id, alarm.clone());
        Ok(AlarmId::new(id))
    }

    async fn insert_hegemony_alarm(&self, alarm: &NewHegemonyAlarm) -> RepositoryResult<AlarmId> {
        let mut store = self.store.write();
        store.require_network(alarm.originasn, "insert_hegemony_alarm")?;
        store.require_network(alarm.asn, "insert_hegemony_alarm")?;
        store.next_alarm_id += 1;
        let id = store.next_alarm_id;
        store.hegemony_alarms.insert(id, alarm.clone());
        Ok(AlarmId::new(id))
    }

    async fn insert_atlas_delay_alarm(
        &self,
        alarm: &NewAtlasDelayAlarm,
    ) -> RepositoryResult<AlarmId> {
        let mut store = self.store.write();
        store.require_location(alarm.startpoint, "insert_atlas_delay_alarm")?;
        store.require_location(alarm.endpoint, "insert_atlas_delay_alarm")?;
        store.next_alarm_id += 1;
        let id = store.next_alarm_id;
        store.atlas_delay_alarms.insert(id, alarm.clone());
        Ok(AlarmId::new(id))
    }

    async fn fetch_delay_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<DelayAlarmRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for alarm in store.delay_alarms.values().filter(|a| {
            query.asn.is_none_or(|q| a.asn == q) && query.range.contains(a.timebin)
        }) {
            let (msm_prb_ids, msmid) = render_sessions(&alarm.sessions);
            records.push(DelayAlarmRecord {
                asn: alarm.asn,
                asn_name: store.network_name(alarm.asn)?,
                timebin: alarm.timebin,
                link: alarm.link.clone(),
                medianrtt: alarm.medianrtt,
                diffmedian: alarm.diffmedian,
                deviation: alarm.deviation,
                nbprobes: alarm.nbprobes,
                msm_prb_ids,
                msmid,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_forwarding_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingAlarmRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for alarm in store.forwarding_alarms.values().filter(|a| {
            query.asn.is_none_or(|q| a.asn == q) && query.range.contains(a.timebin)
        }) {
            let (msm_prb_ids, msmid) = render_sessions(&alarm.sessions);
            records.push(ForwardingAlarmRecord {
                asn: alarm.asn,
                asn_name: store.network_name(alarm.asn)?,
                timebin: alarm.timebin,
                ip: alarm.ip.clone(),
                correlation: alarm.correlation,
                pktdiff: alarm.pktdiff,
                previoushop: alarm.previoushop.clone(),
                responsibility: alarm.responsibility,
                msm_prb_ids,
                msmid,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_hegemony_alarms(
        &self,
        query: &HegemonyQuery,
    ) -> RepositoryResult<Vec<HegemonyAlarmRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for alarm in store.hegemony_alarms.values().filter(|a| {
            query.originasn.is_none_or(|q| a.originasn == q)
                && query.asn.is_none_or(|q| a.asn == q)
                && query.af.is_none_or(|af| a.af == af)
                && query.range.contains(a.timebin)
        }) {
            records.push(HegemonyAlarmRecord {
                timebin: alarm.timebin,
                originasn: alarm.originasn,
                asn: alarm.asn,
                deviation: alarm.deviation,
                af: alarm.af,
                asn_name: store.network_name(alarm.asn)?,
                originasn_name: store.network_name(alarm.originasn)?,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }

    async fn fetch_network_delay_alarms(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayAlarmRecord>> {
        let store = self.store.read();
        let mut records = Vec::new();
        for alarm in store.atlas_delay_alarms.values().filter(|a| {
            query.startpoint.is_none_or(|p| a.startpoint == p)
                && query.endpoint.is_none_or(|p| a.endpoint == p)
                && query.range.contains(a.timebin)
        }) {
            let start = store.location(alarm.startpoint)?;
            let end = store.location(alarm.endpoint)?;
            records.push(NetworkDelayAlarmRecord {
                timebin: alarm.timebin,
                startpoint_type: start.kind.clone(),
                startpoint_name: start.name.clone(),
                startpoint_af: start.af,
                endpoint_type: end.kind.clone(),
                endpoint_name: end.name.clone(),
                endpoint_af: end.af,
                deviation: alarm.deviation,
            });
        }
        records.sort_by_key(|r| r.timebin);
        Ok(records)
    }
}

#[async_trait]
impl DiscoRepository for LocalRepository {
    async fn insert_event(&self, event: &NewDiscoEvent) -> RepositoryResult<EventId> {
        let mut store = self.store.write();
        store.next_event_id += 1;
        let id = store.next_event_id;
        store.events.insert(
            id,
            StoredEvent {
                id,
                mongoid: event.mongoid.clone(),
                streamtype: event.streamtype,
                streamname: event.streamname.clone(),
                starttime: event.starttime,
                endtime: event.endtime,
                avglevel: event.avglevel,
                nbdiscoprobes: event.nbdiscoprobes,
                totalprobes: event.totalprobes,
                ongoing: event.ongoing,
            },
        );
        for probe in &event.probes {
            store.next_probe_id += 1;
            let probe_id = store.next_probe_id;
            store.probes.insert(
                probe_id,
                StoredProbe {
                    event: id,
                    probe: probe.clone(),
                },
            );
        }
        Ok(EventId::new(id))
    }

    async fn add_probe(&self, event: EventId, probe: &NewDiscoProbe) -> RepositoryResult<()> {
        let mut store = self.store.write();
        if !store.events.contains_key(&event.value()) {
            return Err(RepositoryError::constraint_with_context(
                format!("Event {} does not exist", event),
                ErrorContext::new("add_probe").with_entity("disco_event"),
            ));
        }
        store.next_probe_id += 1;
        let probe_id = store.next_probe_id;
        store.probes.insert(
            probe_id,
            StoredProbe {
                event: event.value(),
                probe: probe.clone(),
            },
        );
        Ok(())
    }

    async fn fetch_events(&self, query: &DiscoQuery) -> RepositoryResult<Vec<DiscoEventRecord>> {
        let store = self.store.read();
        let mut records: Vec<DiscoEventRecord> = store
            .events
            .values()
            .filter(|e| {
                query.streamtype.is_none_or(|t| e.streamtype == t)
                    && query.streamname.as_deref().is_none_or(|n| e.streamname == n)
                    && query.window.start.is_none_or(|s| e.endtime >= s)
                    && query.window.end.is_none_or(|s| e.starttime <= s)
            })
            .map(|e| store.event_record(e))
            .collect();
        records.sort_by_key(|r| r.starttime);
        Ok(records)
    }

    async fn fetch_probes(&self, event: EventId) -> RepositoryResult<Vec<DiscoProbeRecord>> {
        let store = self.store.read();
        if !store.events.contains_key(&event.value()) {
            return Err(RepositoryError::not_found(format!(
                "Event {} not found",
                event
            )));
        }
        let mut records: Vec<DiscoProbeRecord> = store
            .probes
            .values()
            .filter(|p| p.event == event.value())
            .map(|p| store.probe_record(p))
            .collect();
        records.sort_by_key(|p| p.starttime);
        Ok(records)
    }

    async fn delete_event(&self, event: EventId) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        if store.events.remove(&event.value()).is_none() {
            return Err(RepositoryError::not_found(format!(
                "Event {} not found",
                event
            )));
        }
        let before = store.probes.len();
        store.probes.retain(|_, p| p.event != event.value());
        Ok(1 + before - store.probes.len())
    }
}

#[async_trait]
impl AccountRepository for LocalRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<UserId> {
        let mut store = self.store.write();
        if store.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::constraint_with_context(
                format!("Email {} is already registered", user.email),
                ErrorContext::new("create_user").with_entity("ihr_user"),
            ));
        }
        store.next_user_id += 1;
        let id = store.next_user_id;
        store.users.insert(
            id,
            IhrUser {
                id: UserId::new(id),
                email: user.email.clone(),
                password: user.password.clone(),
                is_active: user.is_active,
                is_staff: user.is_staff,
                is_superuser: user.is_superuser,
            },
        );
        Ok(UserId::new(id))
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<IhrUser> {
        let store = self.store.read();
        store.require_user(id, "get_user").cloned()
    }

    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<IhrUser> {
        let store = self.store.read();
        store
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("No account for {}", email)))
    }

    async fn activate_user(&self, id: UserId) -> RepositoryResult<()> {
        let mut store = self.store.write();
        let user = store
            .users
            .get_mut(&id.value())
            .ok_or_else(|| RepositoryError::not_found(format!("User {} not found", id)))?;
        user.is_active = true;
        Ok(())
    }

    async fn set_password(&self, id: UserId, password: &str) -> RepositoryResult<()> {
        let mut store = self.store.write();
        let user = store
            .users
            .get_mut(&id.value())
            .ok_or_else(|| RepositoryError::not_found(format!("User {} not found", id)))?;
        user.password = password.to_string();
        Ok(())
    }

    async fn grant_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()> {
        let mut store = self.store.write();
        store.require_user(id, "grant_capability")?;
        store.capabilities.entry(id.value()).or_default().insert(capability);
        Ok(())
    }

    async fn revoke_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()> {
        let mut store = self.store.write();
        store.require_user(id, "revoke_capability")?;
        if let Some(set) = store.capabilities.get_mut(&id.value()) {
            set.remove(&capability);
        }
        Ok(())
    }

    async fn list_capabilities(&self, id: UserId) -> RepositoryResult<Vec<Capability>> {
        let store = self.store.read();
        store.require_user(id, "list_capabilities")?;
        Ok(store
            .capabilities
            .get(&id.value())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn set_monitored_asn(
        &self,
        user: UserId,
        asn: AsnId,
        level: NotifyLevel,
    ) -> RepositoryResult<()> {
        let mut store = self.store.write();
        store.require_user(user, "set_monitored_asn")?;
        store.require_network(asn, "set_monitored_asn")?;
        match store
            .monitored
            .iter_mut()
            .find(|m| m.user == user && m.asn == asn)
        {
            Some(existing) => existing.notifylevel = level,
            None => store.monitored.push(MonitoredAsn {
                user,
                asn,
                notifylevel: level,
            }),
        }
        Ok(())
    }

    async fn remove_monitored_asn(&self, user: UserId, asn: AsnId) -> RepositoryResult<()> {
        let mut store = self.store.write();
        store.require_user(user, "remove_monitored_asn")?;
        store.monitored.retain(|m| !(m.user == user && m.asn == asn));
        Ok(())
    }

    async fn list_monitored_asns(
        &self,
        user: UserId,
    ) -> RepositoryResult<Vec<MonitoredAsnRecord>> {
        let store = self.store.read();
        store.require_user(user, "list_monitored_asns")?;
        let mut records = Vec::new();
        for m in store.monitored.iter().filter(|m| m.user == user) {
            records.push(MonitoredAsnRecord {
                asn: m.asn,
                asn_name: store.network_name(m.asn)?,
                notifylevel: m.notifylevel.as_i16(),
            });
        }
        Ok(records)
    }

    async fn create_email_change_request(
        &self,
        user: UserId,
        new_email: &str,
        requested_at: DateTime<Utc>,
    ) -> RepositoryResult<EmailChangeRequest> {
        let mut store = self.store.write();
        store.require_user(user, "create_email_change_request")?;
        if store.email_changes.values().any(|r| r.new_email == new_email) {
            return Err(RepositoryError::constraint_with_context(
                format!("A change to {} is already pending", new_email),
                ErrorContext::new("create_email_change_request").with_entity("email_change_request"),
            ));
        }
        store.next_request_id += 1;
        let request = EmailChangeRequest {
            id: store.next_request_id,
            user,
            new_email: new_email.to_string(),
            request_time: requested_at,
        };
        store.email_changes.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_email_change_request(&self, id: i64) -> RepositoryResult<EmailChangeRequest> {
        let store = self.store.read();
        store
            .email_changes
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("Email change {} not found", id)))
    }

    async fn apply_email_change(&self, id: i64) -> RepositoryResult<()> {
        let mut store = self.store.write();
        let request = store
            .email_changes
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("Email change {} not found", id)))?;
        if store
            .users
            .values()
            .any(|u| u.email == request.new_email && u.id != request.user)
        {
            return Err(RepositoryError::constraint_with_context(
                format!("Email {} is already registered", request.new_email),
                ErrorContext::new("apply_email_change").with_entity("ihr_user"),
            ));
        }
        let user = store.users.get_mut(&request.user.value()).ok_or_else(|| {
            RepositoryError::not_found(format!("User {} not found", request.user))
        })?;
        user.email = request.new_email.clone();
        store.email_changes.remove(&id);
        Ok(())
    }

    async fn delete_email_change_request(&self, id: i64) -> RepositoryResult<()> {
        let mut store = self.store.write();
        store
            .email_changes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(format!("Email change {} not found", id)))
    }

    async fn delete_user(&self, id: UserId) -> RepositoryResult<usize> {
        let mut store = self.store.write();
        if store.users.remove(&id.value()).is_none() {
            return Err(RepositoryError::not_found(format!("User {} not found", id)));
        }
        let mut removed = 1usize;
        removed += store
            .capabilities
            .remove(&id.value())
            .map(|set| set.len())
            .unwrap_or(0);
        let before = store.monitored.len();
        store.monitored.retain(|m| m.user != id);
        removed += before - store.monitored.len();
        let before = store.email_changes.len();
        store.email_changes.retain(|_, r| r.user != id);
        removed += before - store.email_changes.len();
        Ok(removed)
    }
}

#[async_trait]
impl FullRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_absent_network() {
        let repo = LocalRepository::new();
        let rows = [Delay {
            timebin: utc(2021, 1, 1, 0),
            asn: AsnId::new(2497),
            magnitude: 1.5,
        }];
        let err = repo.insert_delays(&rows).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn upsert_preserves_existing_flags() {
        let repo = LocalRepository::new();
        let asn = AsnId::new(2497);
        repo.upsert_network(&Network::new(asn, "IIJ")).await.unwrap();
        repo.set_network_flags(
            asn,
            NetworkFlags {
                tartiflette: true,
                disco: false,
                ashash: true,
            },
        )
        .await
        .unwrap();

        // A re-upsert from ingestion refreshes the name only.
        let mut renamed = Network::new(asn, "IIJ Internet Initiative Japan");
        renamed.tartiflette = false;
        repo.upsert_network(&renamed).await.unwrap();

        let record = repo.get_network(asn).await.unwrap();
        assert_eq!(record.name, "IIJ Internet Initiative Japan");
        assert!(record.delay_forwarding);
        assert!(record.hegemony);
    }

    #[tokio::test]
    async fn monitored_asn_upsert_updates_level() {
        let repo = LocalRepository::new();
        let asn = AsnId::new(2497);
        repo.upsert_network(&Network::new(asn, "IIJ")).await.unwrap();
        let user = repo
            .create_user(
                &crate::models::NewUser::user("a@example.org", "secret", &crate::models::Sha256Hasher)
                    .unwrap(),
            )
            .await
            .unwrap();

        repo.set_monitored_asn(user, asn, NotifyLevel::Low).await.unwrap();
        repo.set_monitored_asn(user, asn, NotifyLevel::High).await.unwrap();

        let monitored = repo.list_monitored_asns(user).await.unwrap();
        assert_eq!(monitored.len(), 1);
        assert_eq!(monitored[0].notifylevel, 10);
    }
}
