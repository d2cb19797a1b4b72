//! Integration tests for the in-memory repository.
//!
//! These cover the storage-level properties: cascade deletes, referential
//! integrity on insert, window-overlap queries for disconnection events,
//! and the derived session renderings on alarm reads.

use chrono::{DateTime, TimeZone, Utc};

use ihr_rust::api::{AsnId, TimeRange};
use ihr_rust::db::repositories::LocalRepository;
use ihr_rust::db::repository::{
    AccountRepository, AlarmRepository, DiscoQuery, DiscoRepository, HegemonyQuery,
    LocationFilter, NetworkRepository, RepositoryError, SeriesQuery, TimeSeriesRepository,
};
use ihr_rust::models::{
    AlarmSession, Delay, Forwarding, Hegemony, HegemonyCone, Network, NewDelayAlarm,
    NewDiscoEvent, NewDiscoProbe, NewForwardingAlarm, NewHegemonyAlarm, NewLocation, NewUser,
    NotifyLevel, Sha256Hasher, StreamType,
};

fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

async fn seed_network(repo: &LocalRepository, number: i64, name: &str) -> AsnId {
    let asn = AsnId::new(number);
    repo.upsert_network(&Network::new(asn, name)).await.unwrap();
    asn
}

fn delay_alarm(asn: AsnId, timebin: DateTime<Utc>, sessions: Vec<AlarmSession>) -> NewDelayAlarm {
    NewDelayAlarm {
        asn,
        timebin,
        ip: "203.0.113.1".to_string(),
        link: "203.0.113.1-203.0.113.2".to_string(),
        medianrtt: 42.0,
        diffmedian: 3.5,
        deviation: 12.0,
        nbprobes: 7,
        sessions,
    }
}

// =========================================================
// Cascade deletes
// =========================================================

#[tokio::test]
async fn deleting_a_network_removes_every_referencing_row() {
    let repo = LocalRepository::new();
    let victim = seed_network(&repo, 2497, "IIJ").await;
    let other = seed_network(&repo, 3356, "Lumen").await;
    let t = utc(2021, 1, 1, 0);

    repo.insert_delays(&[
        Delay { timebin: t, asn: victim, magnitude: 1.0 },
        Delay { timebin: t, asn: other, magnitude: 2.0 },
    ])
    .await
    .unwrap();
    repo.insert_forwardings(&[Forwarding { timebin: t, asn: victim, magnitude: 0.5 }])
        .await
        .unwrap();
    // The victim appears on both sides of the dependency table.
    repo.insert_hegemonies(&[
        Hegemony { timebin: t, originasn: victim, asn: other, hege: 0.8, af: 4 },
        Hegemony { timebin: t, originasn: other, asn: victim, hege: 0.2, af: 4 },
        Hegemony { timebin: t, originasn: other, asn: other, hege: 1.0, af: 4 },
    ])
    .await
    .unwrap();
    repo.insert_hegemony_cones(&[HegemonyCone { timebin: t, asn: victim, conesize: 120, af: 4 }])
        .await
        .unwrap();
    repo.insert_delay_alarm(&delay_alarm(victim, t, vec![AlarmSession::new(1, 2)]))
        .await
        .unwrap();
    repo.insert_hegemony_alarm(&NewHegemonyAlarm {
        timebin: t,
        originasn: other,
        asn: victim,
        deviation: 9.0,
        af: 4,
    })
    .await
    .unwrap();

    let user = repo
        .create_user(&NewUser::user("user@example.org", "secret", &Sha256Hasher).unwrap())
        .await
        .unwrap();
    repo.set_monitored_asn(user, victim, NotifyLevel::High).await.unwrap();
    repo.set_monitored_asn(user, other, NotifyLevel::Low).await.unwrap();

    repo.delete_network(victim).await.unwrap();

    // No orphaned rows remain for the deleted network.
    assert!(repo
        .fetch_delay(&SeriesQuery::for_asn(victim))
        .await
        .unwrap()
        .is_empty());
    assert!(repo
        .fetch_forwarding(&SeriesQuery::for_asn(victim))
        .await
        .unwrap()
        .is_empty());
    assert!(repo
        .fetch_delay_alarms(&SeriesQuery::for_asn(victim))
        .await
        .unwrap()
        .is_empty());
    let hegemony = repo.fetch_hegemony(&HegemonyQuery::default()).await.unwrap();
    assert_eq!(hegemony.len(), 1);
    assert_eq!(hegemony[0].originasn, other);
    assert_eq!(hegemony[0].asn, other);
    assert!(repo
        .fetch_hegemony_alarms(&HegemonyQuery::default())
        .await
        .unwrap()
        .is_empty());

    // The other network's rows survive, as does the subscriber account.
    assert_eq!(repo.fetch_delay(&SeriesQuery::for_asn(other)).await.unwrap().len(), 1);
    let monitored = repo.list_monitored_asns(user).await.unwrap();
    assert_eq!(monitored.len(), 1);
    assert_eq!(monitored[0].asn, other);
}

#[tokio::test]
async fn deleting_a_missing_network_reports_not_found() {
    let repo = LocalRepository::new();
    let err = repo.delete_network(AsnId::new(65000)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn deleting_an_event_removes_its_probes() {
    let repo = LocalRepository::new();
    let mut event = NewDiscoEvent::new(
        StreamType::Asn,
        "AS3356",
        utc(2021, 1, 1, 0),
        utc(2021, 1, 1, 2),
    );
    event.probes.push(NewDiscoProbe {
        probe_id: 4048,
        starttime: utc(2021, 1, 1, 0),
        endtime: utc(2021, 1, 1, 1),
        level: 11.0,
        ipv4: "198.51.100.7".to_string(),
        prefixv4: "198.51.100.0/24".to_string(),
        lat: 48.86,
        lon: 2.35,
    });
    let id = repo.insert_event(&event).await.unwrap();

    let removed = repo.delete_event(id).await.unwrap();
    assert_eq!(removed, 2);
    let err = repo.fetch_probes(id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

// =========================================================
// Referential integrity on insert
// =========================================================

#[tokio::test]
async fn series_inserts_require_existing_foreign_keys() {
    let repo = LocalRepository::new();
    let t = utc(2021, 1, 1, 0);

    let err = repo
        .insert_hegemonies(&[Hegemony {
            timebin: t,
            originasn: AsnId::new(1),
            asn: AsnId::new(2),
            hege: 0.1,
            af: 4,
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));

    let err = repo
        .insert_forwarding_alarm(&NewForwardingAlarm {
            asn: AsnId::new(1),
            timebin: t,
            ip: "203.0.113.9".to_string(),
            correlation: -0.9,
            responsibility: 0.7,
            pktdiff: 120.0,
            previoushop: "203.0.113.8".to_string(),
            sessions: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
}

// =========================================================
// IXP pseudo-ASN round-trip
// =========================================================

#[tokio::test]
async fn ixp_round_trips_with_negative_identifier() {
    let repo = LocalRepository::new();
    let ixp = AsnId::new(-400644);
    repo.upsert_network(&Network::new(ixp, "AMS-IX")).await.unwrap();

    let record = repo.get_network(ixp).await.unwrap();
    assert_eq!(record.number, ixp);
    assert_eq!(record.name, "AMS-IX");
    assert!(!record.hegemony && !record.delay_forwarding && !record.disco);
    assert!(record.number.is_ixp());

    // Distinguishable from a real ASN by sign alone.
    let asn = seed_network(&repo, 400644, "Example AS").await;
    assert!(!repo.get_network(asn).await.unwrap().number.is_ixp());
}

// =========================================================
// Alarm session renderings
// =========================================================

#[tokio::test]
async fn alarm_reads_render_sessions_in_both_forms() {
    let repo = LocalRepository::new();
    let asn = seed_network(&repo, 2497, "IIJ").await;
    let t = utc(2021, 3, 4, 5);
    let sessions = vec![
        AlarmSession::new(1748022, 6871),
        AlarmSession::new(1748022, 325),
        AlarmSession::new(1748023, 6871),
    ];

    repo.insert_delay_alarm(&delay_alarm(asn, t, sessions.clone())).await.unwrap();

    let alarms = repo.fetch_delay_alarms(&SeriesQuery::for_asn(asn)).await.unwrap();
    assert_eq!(alarms.len(), 1);
    let alarm = &alarms[0];
    assert_eq!(alarm.asn_name, "IIJ");

    // Both renderings expose the same pairs in insertion order.
    let expected_pairs: Vec<(i64, i32)> = sessions.iter().map(|s| (s.msmid, s.probeid)).collect();
    assert_eq!(alarm.msm_prb_ids, expected_pairs);
    let expected_strings: Vec<String> = sessions.iter().map(|s| s.to_string()).collect();
    assert_eq!(alarm.msmid, expected_strings);
}

// =========================================================
// Disconnection window queries
// =========================================================

#[tokio::test]
async fn disco_event_is_found_by_overlapping_window_only() {
    let repo = LocalRepository::new();
    let event = NewDiscoEvent::new(
        StreamType::Asn,
        "AS3356",
        utc(2021, 1, 1, 0),
        utc(2021, 1, 1, 2),
    );
    repo.insert_event(&event).await.unwrap();

    // A window covering the event includes it.
    let covering = DiscoQuery {
        streamtype: Some(StreamType::Asn),
        streamname: Some("AS3356".to_string()),
        window: TimeRange::new(Some(utc(2020, 12, 31, 0)), Some(utc(2021, 1, 2, 0))),
    };
    assert_eq!(repo.fetch_events(&covering).await.unwrap().len(), 1);

    // A partially overlapping window still includes it.
    let overlapping = DiscoQuery {
        window: TimeRange::new(Some(utc(2021, 1, 1, 1)), Some(utc(2021, 1, 1, 4))),
        ..Default::default()
    };
    assert_eq!(repo.fetch_events(&overlapping).await.unwrap().len(), 1);

    // A disjoint window excludes it.
    let disjoint = DiscoQuery {
        streamtype: Some(StreamType::Asn),
        streamname: Some("AS3356".to_string()),
        window: TimeRange::new(Some(utc(2021, 1, 1, 3)), Some(utc(2021, 1, 1, 5))),
    };
    assert!(repo.fetch_events(&disjoint).await.unwrap().is_empty());

    // A different stream name excludes it too.
    let other_stream = DiscoQuery {
        streamtype: Some(StreamType::Asn),
        streamname: Some("AS2497".to_string()),
        window: TimeRange::new(Some(utc(2020, 12, 31, 0)), Some(utc(2021, 1, 2, 0))),
    };
    assert!(repo.fetch_events(&other_stream).await.unwrap().is_empty());
}

#[tokio::test]
async fn disco_events_nest_their_probes() {
    let repo = LocalRepository::new();
    let mut event = NewDiscoEvent::new(
        StreamType::Country,
        "FR",
        utc(2021, 2, 1, 10),
        utc(2021, 2, 1, 12),
    );
    event.avglevel = 14.5;
    event.nbdiscoprobes = 2;
    event.totalprobes = 40;
    for (probe_id, hour) in [(4048, 10), (5100, 11)] {
        event.probes.push(NewDiscoProbe {
            probe_id,
            starttime: utc(2021, 2, 1, hour),
            endtime: utc(2021, 2, 1, 12),
            level: 14.0,
            ipv4: "None".to_string(),
            prefixv4: "None".to_string(),
            lat: 0.0,
            lon: 0.0,
        });
    }
    let id = repo.insert_event(&event).await.unwrap();

    let events = repo.fetch_events(&DiscoQuery::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    let fetched = &events[0];
    assert_eq!(fetched.id, id);
    assert_eq!(fetched.discoprobes.len(), 2);
    assert!(fetched.discoprobes.iter().all(|p| p.event == id));
    // Probes are ordered by their disconnection time.
    assert_eq!(fetched.discoprobes[0].probe_id, 4048);
}

// =========================================================
// Locations
// =========================================================

#[tokio::test]
async fn duplicate_locations_are_tolerated() {
    let repo = LocalRepository::new();
    let a = repo
        .insert_location(&NewLocation::new("CT", "Paris, FR", 4))
        .await
        .unwrap();
    let b = repo
        .insert_location(&NewLocation::new("CT", "Paris, FR", 4))
        .await
        .unwrap();
    assert_ne!(a, b);

    let filter = LocationFilter {
        kind: Some("CT".to_string()),
        name: Some("Paris, FR".to_string()),
        af: Some(4),
    };
    assert_eq!(repo.list_locations(&filter).await.unwrap().len(), 2);
}

#[tokio::test]
async fn network_delay_flattens_both_endpoints() {
    let repo = LocalRepository::new();
    let start = repo
        .insert_location(&NewLocation::new("CT", "Paris, FR", 4))
        .await
        .unwrap();
    let end = repo
        .insert_location(&NewLocation::new("AS", "AS2497", 6))
        .await
        .unwrap();
    repo.insert_atlas_delays(&[ihr_rust::models::AtlasDelay {
        timebin: utc(2021, 5, 1, 0),
        startpoint: start,
        endpoint: end,
        median: 23.5,
        nbtracks: 100,
        nbprobes: 20,
        entropy: 0.9,
        hop: 2,
        nbrealrtts: 95,
    }])
    .await
    .unwrap();

    let records = repo
        .fetch_network_delay(&ihr_rust::db::repository::AtlasDelayQuery {
            startpoint: Some(start),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.startpoint_type, "CT");
    assert_eq!(record.startpoint_name, "Paris, FR");
    assert_eq!(record.startpoint_af, 4);
    assert_eq!(record.endpoint_type, "AS");
    assert_eq!(record.endpoint_name, "AS2497");
    assert_eq!(record.endpoint_af, 6);
}

// =========================================================
// Range scans
// =========================================================

#[tokio::test]
async fn series_fetches_are_ordered_and_bounded_by_time() {
    let repo = LocalRepository::new();
    let asn = seed_network(&repo, 2497, "IIJ").await;

    // Insert out of order; reads come back sorted.
    let rows: Vec<Delay> = [3, 1, 2]
        .into_iter()
        .map(|h| Delay {
            timebin: utc(2021, 1, 1, h),
            asn,
            magnitude: h as f64,
        })
        .collect();
    repo.insert_delays(&rows).await.unwrap();

    let all = repo.fetch_delay(&SeriesQuery::for_asn(asn)).await.unwrap();
    let times: Vec<DateTime<Utc>> = all.iter().map(|r| r.timebin).collect();
    assert_eq!(times, vec![utc(2021, 1, 1, 1), utc(2021, 1, 1, 2), utc(2021, 1, 1, 3)]);
    assert!(all.iter().all(|r| r.asn_name == "IIJ"));

    let bounded = repo
        .fetch_delay(&SeriesQuery::for_asn(asn).in_range(TimeRange::new(
            Some(utc(2021, 1, 1, 2)),
            Some(utc(2021, 1, 1, 3)),
        )))
        .await
        .unwrap();
    assert_eq!(bounded.len(), 2);
}

#[tokio::test]
async fn hegemony_fetch_filters_by_af_and_resolves_both_names() {
    let repo = LocalRepository::new();
    let origin = seed_network(&repo, 2497, "IIJ").await;
    let dependency = seed_network(&repo, 3356, "Lumen").await;
    let t = utc(2021, 1, 1, 0);

    repo.insert_hegemonies(&[
        Hegemony { timebin: t, originasn: origin, asn: dependency, hege: 0.8, af: 4 },
        Hegemony { timebin: t, originasn: origin, asn: dependency, hege: 0.6, af: 6 },
    ])
    .await
    .unwrap();

    let v4 = repo
        .fetch_hegemony(&HegemonyQuery {
            originasn: Some(origin),
            af: Some(4),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(v4.len(), 1);
    assert_eq!(v4[0].originasn_name, "IIJ");
    assert_eq!(v4[0].asn_name, "Lumen");
    assert_eq!(v4[0].hege, 0.8);
}
