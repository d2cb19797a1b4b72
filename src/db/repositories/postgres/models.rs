//! Row structs for the Diesel backend.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{
    atlas_delay, atlas_delay_alarms, atlas_location, countries, delay, delay_alarms,
    delay_alarms_msms, disco_events, disco_probes, email_change_requests, forwarding,
    forwarding_alarms, forwarding_alarms_msms, hegemony, hegemony_alarms, hegemony_cone,
    ihr_users, monitored_asn, networks, user_capabilities,
};

/// Networks carry a caller-assigned primary key, so one struct serves
/// both reads and inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = networks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NetworkRow {
    pub number: i64,
    pub name: String,
    pub tartiflette: bool,
    pub disco: bool,
    pub ashash: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = countries)]
pub struct CountryRow {
    pub code: String,
    pub name: String,
    pub tartiflette: bool,
    pub disco: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = atlas_location)]
pub struct LocationRow {
    pub id: i64,
    pub name: String,
    pub location_type: String,
    pub af: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = atlas_location)]
pub struct NewLocationRow {
    pub name: String,
    pub location_type: String,
    pub af: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = delay)]
pub struct DelayRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = delay)]
pub struct NewDelayRow {
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forwarding)]
pub struct ForwardingRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forwarding)]
pub struct NewForwardingRow {
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = hegemony)]
pub struct HegemonyRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub originasn: i64,
    pub asn: i64,
    pub hege: f64,
    pub af: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = hegemony)]
pub struct NewHegemonyRow {
    pub timebin: DateTime<Utc>,
    pub originasn: i64,
    pub asn: i64,
    pub hege: f64,
    pub af: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = hegemony_cone)]
pub struct HegemonyConeRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub conesize: i32,
    pub af: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = hegemony_cone)]
pub struct NewHegemonyConeRow {
    pub timebin: DateTime<Utc>,
    pub asn: i64,
    pub conesize: i32,
    pub af: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = atlas_delay)]
pub struct AtlasDelayRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub startpoint: i64,
    pub endpoint: i64,
    pub median: f64,
    pub nbtracks: i32,
    pub nbprobes: i32,
    pub entropy: f64,
    pub hop: i32,
    pub nbrealrtts: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = atlas_delay)]
pub struct NewAtlasDelayRow {
    pub timebin: DateTime<Utc>,
    pub startpoint: i64,
    pub endpoint: i64,
    pub median: f64,
    pub nbtracks: i32,
    pub nbprobes: i32,
    pub entropy: f64,
    pub hop: i32,
    pub nbrealrtts: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = delay_alarms)]
pub struct DelayAlarmRow {
    pub id: i64,
    pub asn: i64,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    pub link: String,
    pub medianrtt: f64,
    pub diffmedian: f64,
    pub deviation: f64,
    pub nbprobes: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = delay_alarms)]
pub struct NewDelayAlarmRow {
    pub asn: i64,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    pub link: String,
    pub medianrtt: f64,
    pub diffmedian: f64,
    pub deviation: f64,
    pub nbprobes: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = delay_alarms_msms)]
pub struct DelayAlarmMsmRow {
    pub id: i64,
    pub alarm: i64,
    pub msmid: i64,
    pub probeid: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = delay_alarms_msms)]
pub struct NewDelayAlarmMsmRow {
    pub alarm: i64,
    pub msmid: i64,
    pub probeid: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forwarding_alarms)]
pub struct ForwardingAlarmRow {
    pub id: i64,
    pub asn: i64,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    pub correlation: f64,
    pub responsibility: f64,
    pub pktdiff: f64,
    pub previoushop: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forwarding_alarms)]
pub struct NewForwardingAlarmRow {
    pub asn: i64,
    pub timebin: DateTime<Utc>,
    pub ip: String,
    pub correlation: f64,
    pub responsibility: f64,
    pub pktdiff: f64,
    pub previoushop: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forwarding_alarms_msms)]
pub struct ForwardingAlarmMsmRow {
    pub id: i64,
    pub alarm: i64,
    pub msmid: i64,
    pub probeid: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forwarding_alarms_msms)]
pub struct NewForwardingAlarmMsmRow {
    pub alarm: i64,
    pub msmid: i64,
    pub probeid: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = hegemony_alarms)]
pub struct HegemonyAlarmRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub originasn: i64,
    pub asn: i64,
    pub deviation: f64,
    pub af: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = hegemony_alarms)]
pub struct NewHegemonyAlarmRow {
    pub timebin: DateTime<Utc>,
    pub originasn: i64,
    pub asn: i64,
    pub deviation: f64,
    pub af: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = atlas_delay_alarms)]
pub struct AtlasDelayAlarmRow {
    pub id: i64,
    pub timebin: DateTime<Utc>,
    pub startpoint: i64,
    pub endpoint: i64,
    pub deviation: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = atlas_delay_alarms)]
pub struct NewAtlasDelayAlarmRow {
    pub timebin: DateTime<Utc>,
    pub startpoint: i64,
    pub endpoint: i64,
    pub deviation: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = disco_events)]
pub struct DiscoEventRow {
    pub id: i64,
    pub mongoid: String,
    pub streamtype: String,
    pub streamname: String,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub avglevel: f64,
    pub nbdiscoprobes: i32,
    pub totalprobes: i32,
    pub ongoing: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = disco_events)]
pub struct NewDiscoEventRow {
    pub mongoid: String,
    pub streamtype: String,
    pub streamname: String,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub avglevel: f64,
    pub nbdiscoprobes: i32,
    pub totalprobes: i32,
    pub ongoing: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = disco_probes)]
pub struct DiscoProbeRow {
    pub id: i64,
    pub probe_id: i32,
    pub event: i64,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub level: f64,
    pub ipv4: String,
    pub prefixv4: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = disco_probes)]
pub struct NewDiscoProbeRow {
    pub probe_id: i32,
    pub event: i64,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub level: f64,
    pub ipv4: String,
    pub prefixv4: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ihr_users)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ihr_users)]
pub struct NewUserRow {
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_capabilities)]
pub struct UserCapabilityRow {
    pub id: i64,
    pub user_id: i64,
    pub capability: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_capabilities)]
pub struct NewUserCapabilityRow {
    pub user_id: i64,
    pub capability: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = monitored_asn)]
pub struct MonitoredAsnRow {
    pub id: i64,
    pub user_id: i64,
    pub asn: i64,
    pub notifylevel: i16,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = monitored_asn)]
pub struct NewMonitoredAsnRow {
    pub user_id: i64,
    pub asn: i64,
    pub notifylevel: i16,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = email_change_requests)]
pub struct EmailChangeRequestRow {
    pub id: i64,
    pub user_id: i64,
    pub new_email: String,
    pub request_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = email_change_requests)]
pub struct NewEmailChangeRequestRow {
    pub user_id: i64,
    pub new_email: String,
    pub request_time: DateTime<Utc>,
}
