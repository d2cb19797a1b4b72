//! Postgres repository implementation using Diesel.
//!
//! This module implements the repository traits against a Postgres
//! database, with the schema created by the embedded migrations.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Connection health monitoring
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task;

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
    AlarmSession, AtlasDelay, AtlasLocation, Capability, Country, CountryFlags, Delay,
    EmailChangeRequest, Forwarding, Hegemony, HegemonyCone, IhrUser, Network, NetworkFlags,
    NewAtlasDelayAlarm, NewDelayAlarm, NewDiscoEvent, NewDiscoProbe, NewForwardingAlarm,
    NewHegemonyAlarm, NewLocation, NewUser, NotifyLevel, StreamType,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let min_pool_size = std::env::var("PG_POOL_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let connection_timeout_sec = std::env::var("PG_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_sec = std::env::var("PG_IDLE_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        let max_retries = std::env::var("PG_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let retry_delay_ms = std::env::var("PG_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);

        Ok(Self {
            database_url,
            max_pool_size,
            min_pool_size,
            connection_timeout_sec,
            idle_timeout_sec,
            max_retries,
            retry_delay_ms,
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total successful queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
    /// Total retried operations
    pub retried_operations: u64,
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    // Metrics counters
    total_queries: std::sync::Arc<AtomicU64>,
    failed_queries: std::sync::Arc<AtomicU64>,
    retried_operations: std::sync::Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        // Run migrations once during initialization
        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: std::sync::Arc::new(AtomicU64::new(0)),
            failed_queries: std::sync::Arc::new(AtomicU64::new(0)),
            retried_operations: std::sync::Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient
    /// failures (connection errors, timeouts, serialization failures).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2; // Exponential backoff
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }

    /// Check if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }
}

/// Resolve network names for a set of ids in one query.
fn network_names<I>(conn: &mut PgConnection, ids: I) -> RepositoryResult<HashMap<i64, String>>
where
    I: IntoIterator<Item = i64>,
{
    let wanted: Vec<i64> = ids.into_iter().collect::<HashSet<i64>>().into_iter().collect();
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, String)> = networks::table
        .filter(networks::number.eq_any(wanted))
        .select((networks::number, networks::name))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

/// Resolve locations for a set of ids in one query.
fn location_map<I>(conn: &mut PgConnection, ids: I) -> RepositoryResult<HashMap<i64, LocationRow>>
where
    I: IntoIterator<Item = i64>,
{
    let wanted: Vec<i64> = ids.into_iter().collect::<HashSet<i64>>().into_iter().collect();
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<LocationRow> = atlas_location::table
        .filter(atlas_location::id.eq_any(wanted))
        .select(LocationRow::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(|r| (r.id, r)).collect())
}

fn require_name(names: &HashMap<i64, String>, id: i64) -> RepositoryResult<String> {
    names.get(&id).cloned().ok_or_else(|| {
        RepositoryError::internal_with_context(
            "Dangling network reference",
            ErrorContext::default()
                .with_entity("network")
                .with_entity_id(id),
        )
    })
}

fn require_location(
    locations: &HashMap<i64, LocationRow>,
    id: i64,
) -> RepositoryResult<&LocationRow> {
    locations.get(&id).ok_or_else(|| {
        RepositoryError::internal_with_context(
            "Dangling location reference",
            ErrorContext::default()
                .with_entity("atlas_location")
                .with_entity_id(id),
        )
    })
}

/// Group msm child rows by alarm id, preserving insertion order.
fn sessions_by_alarm(rows: Vec<(i64, i64, i32)>) -> HashMap<i64, Vec<AlarmSession>> {
    let mut grouped: HashMap<i64, Vec<AlarmSession>> = HashMap::new();
    for (alarm, msmid, probeid) in rows {
        grouped
            .entry(alarm)
            .or_default()
            .push(AlarmSession::new(msmid, probeid));
    }
    grouped
}

#[async_trait]
impl NetworkRepository for PostgresRepository {
    async fn upsert_network(&self, network: &Network) -> RepositoryResult<()> {
        let row = NetworkRow {
            number: network.number.value(),
            name: network.name.clone(),
            tartiflette: network.tartiflette,
            disco: network.disco,
            ashash: network.ashash,
        };
        self.with_conn(move |conn| {
            // Flags of an existing row stay as set by the admin tooling.
            diesel::insert_into(networks::table)
                .values(&row)
                .on_conflict(networks::number)
                .do_update()
                .set(networks::name.eq(excluded(networks::name)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_network(&self, asn: AsnId) -> RepositoryResult<NetworkRecord> {
        let id = asn.value();
        self.with_conn(move |conn| {
            let row: NetworkRow = networks::table
                .find(id)
                .select(NetworkRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| RepositoryError::not_found(format!("Network {} not found", id)))?;
            Ok(NetworkRecord {
                number: AsnId::new(row.number),
                name: row.name,
                hegemony: row.ashash,
                delay_forwarding: row.tartiflette,
                disco: row.disco,
            })
        })
        .await
    }

    async fn list_networks(&self, search: Option<&str>) -> RepositoryResult<Vec<NetworkRecord>> {
        let search = search.map(str::to_string);
        self.with_conn(move |conn| {
            let mut query = networks::table.select(NetworkRow::as_select()).into_boxed();
            if let Some(ref needle) = search {
                query = query.filter(networks::name.ilike(format!("%{}%", needle)));
            }
            let rows: Vec<NetworkRow> = query
                .order(networks::number.asc())
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|row| NetworkRecord {
                    number: AsnId::new(row.number),
                    name: row.name,
                    hegemony: row.ashash,
                    delay_forwarding: row.tartiflette,
                    disco: row.disco,
                })
                .collect())
        })
        .await
    }

    async fn set_network_flags(&self, asn: AsnId, flags: NetworkFlags) -> RepositoryResult<()> {
        let id = asn.value();
        self.with_conn(move |conn| {
            let updated = diesel::update(networks::table.find(id))
                .set((
                    networks::tartiflette.eq(flags.tartiflette),
                    networks::disco.eq(flags.disco),
                    networks::ashash.eq(flags.ashash),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::not_found(format!(
                    "Network {} not found",
                    id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_network(&self, asn: AsnId) -> RepositoryResult<usize> {
        let id = asn.value();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let mut removed = 0usize;

                removed += diesel::delete(
                    delay_alarms_msms::table.filter(
                        delay_alarms_msms::alarm.eq_any(
                            delay_alarms::table
                                .filter(delay_alarms::asn.eq(id))
                                .select(delay_alarms::id),
                        ),
                    ),
                )
                .execute(conn)?;
                removed += diesel::delete(delay_alarms::table.filter(delay_alarms::asn.eq(id)))
                    .execute(conn)?;

                removed += diesel::delete(
                    forwarding_alarms_msms::table.filter(
                        forwarding_alarms_msms::alarm.eq_any(
                            forwarding_alarms::table
                                .filter(forwarding_alarms::asn.eq(id))
                                .select(forwarding_alarms::id),
                        ),
                    ),
                )
                .execute(conn)?;
                removed += diesel::delete(
                    forwarding_alarms::table.filter(forwarding_alarms::asn.eq(id)),
                )
                .execute(conn)?;

                removed += diesel::delete(
                    hegemony_alarms::table.filter(
                        hegemony_alarms::asn
                            .eq(id)
                            .or(hegemony_alarms::originasn.eq(id)),
                    ),
                )
                .execute(conn)?;

                removed +=
                    diesel::delete(delay::table.filter(delay::asn.eq(id))).execute(conn)?;
                removed += diesel::delete(forwarding::table.filter(forwarding::asn.eq(id)))
                    .execute(conn)?;
                removed += diesel::delete(
                    hegemony::table
                        .filter(hegemony::asn.eq(id).or(hegemony::originasn.eq(id))),
                )
                .execute(conn)?;
                removed += diesel::delete(
                    hegemony_cone::table.filter(hegemony_cone::asn.eq(id)),
                )
                .execute(conn)?;
                removed += diesel::delete(
                    monitored_asn::table.filter(monitored_asn::asn.eq(id)),
                )
                .execute(conn)?;

                let network_rows =
                    diesel::delete(networks::table.find(id)).execute(conn)?;
                if network_rows == 0 {
                    return Err(RepositoryError::not_found(format!(
                        "Network {} not found",
                        id
                    )));
                }
                Ok(removed + network_rows)
            })
        })
        .await
    }

    async fn upsert_country(&self, country: &Country) -> RepositoryResult<()> {
        let row = CountryRow {
            code: country.code.clone(),
            name: country.name.clone(),
            tartiflette: country.tartiflette,
            disco: country.disco,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(countries::table)
                .values(&row)
                .on_conflict(countries::code)
                .do_update()
                .set(countries::name.eq(excluded(countries::name)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_country(&self, code: &str) -> RepositoryResult<CountryRecord> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let row: CountryRow = countries::table
                .find(code.as_str())
                .select(CountryRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    RepositoryError::not_found(format!("Country {} not found", code))
                })?;
            Ok(CountryRecord {
                code: row.code,
                name: row.name,
            })
        })
        .await
    }

    async fn list_countries(&self) -> RepositoryResult<Vec<CountryRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<CountryRow> = countries::table
                .order(countries::code.asc())
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|row| CountryRecord {
                    code: row.code,
                    name: row.name,
                })
                .collect())
        })
        .await
    }

    async fn set_country_flags(&self, code: &str, flags: CountryFlags) -> RepositoryResult<()> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(countries::table.find(code.as_str()))
                .set((
                    countries::tartiflette.eq(flags.tartiflette),
                    countries::disco.eq(flags.disco),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::not_found(format!(
                    "Country {} not found",
                    code
                )));
            }
            Ok(())
        })
        .await
    }

    async fn insert_location(&self, location: &NewLocation) -> RepositoryResult<LocationId> {
        let row = NewLocationRow {
            name: location.name.clone(),
            location_type: location.kind.clone(),
            af: location.af,
        };
        self.with_conn(move |conn| {
            let id: i64 = diesel::insert_into(atlas_location::table)
                .values(&row)
                .returning(atlas_location::id)
                .get_result(conn)?;
            Ok(LocationId::new(id))
        })
        .await
    }

    async fn get_location(&self, id: LocationId) -> RepositoryResult<AtlasLocation> {
        let id = id.value();
        self.with_conn(move |conn| {
            let row: LocationRow = atlas_location::table
                .find(id)
                .select(LocationRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    RepositoryError::not_found(format!("Location {} not found", id))
                })?;
            Ok(AtlasLocation {
                id: LocationId::new(row.id),
                kind: row.location_type,
                name: row.name,
                af: row.af,
            })
        })
        .await
    }

    async fn list_locations(
        &self,
        filter: &LocationFilter,
    ) -> RepositoryResult<Vec<LocationRecord>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = atlas_location::table.select(LocationRow::as_select()).into_boxed();
            if let Some(ref kind) = filter.kind {
                query = query.filter(atlas_location::location_type.eq(kind.clone()));
            }
            if let Some(ref name) = filter.name {
                query = query.filter(atlas_location::name.eq(name.clone()));
            }
            if let Some(af) = filter.af {
                query = query.filter(atlas_location::af.eq(af));
            }
            let rows: Vec<LocationRow> = query
                .order(atlas_location::id.asc())
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|row| LocationRecord {
                    kind: row.location_type,
                    name: row.name,
                    af: row.af,
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl TimeSeriesRepository for PostgresRepository {
    async fn insert_delays(&self, rows: &[Delay]) -> RepositoryResult<usize> {
        let new_rows: Vec<NewDelayRow> = rows
            .iter()
            .map(|r| NewDelayRow {
                timebin: r.timebin,
                asn: r.asn.value(),
                magnitude: r.magnitude,
            })
            .collect();
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(delay::table)
                .values(&new_rows)
                .execute(conn)?)
        })
        .await
    }

    async fn insert_forwardings(&self, rows: &[Forwarding]) -> RepositoryResult<usize> {
        let new_rows: Vec<NewForwardingRow> = rows
            .iter()
            .map(|r| NewForwardingRow {
                timebin: r.timebin,
                asn: r.asn.value(),
                magnitude: r.magnitude,
            })
            .collect();
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(forwarding::table)
                .values(&new_rows)
                .execute(conn)?)
        })
        .await
    }

    async fn insert_hegemonies(&self, rows: &[Hegemony]) -> RepositoryResult<usize> {
        let new_rows: Vec<NewHegemonyRow> = rows
            .iter()
            .map(|r| NewHegemonyRow {
                timebin: r.timebin,
                originasn: r.originasn.value(),
                asn: r.asn.value(),
                hege: r.hege,
                af: r.af,
            })
            .collect();
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(hegemony::table)
                .values(&new_rows)
                .execute(conn)?)
        })
        .await
    }

    async fn insert_hegemony_cones(&self, rows: &[HegemonyCone]) -> RepositoryResult<usize> {
        let new_rows: Vec<NewHegemonyConeRow> = rows
            .iter()
            .map(|r| NewHegemonyConeRow {
                timebin: r.timebin,
                asn: r.asn.value(),
                conesize: r.conesize,
                af: r.af,
            })
            .collect();
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(hegemony_cone::table)
                .values(&new_rows)
                .execute(conn)?)
        })
        .await
    }

    async fn insert_atlas_delays(&self, rows: &[AtlasDelay]) -> RepositoryResult<usize> {
        let new_rows: Vec<NewAtlasDelayRow> = rows
            .iter()
            .map(|r| NewAtlasDelayRow {
                timebin: r.timebin,
                startpoint: r.startpoint.value(),
                endpoint: r.endpoint.value(),
                median: r.median,
                nbtracks: r.nbtracks,
                nbprobes: r.nbprobes,
                entropy: r.entropy,
                hop: r.hop,
                nbrealrtts: r.nbrealrtts,
            })
            .collect();
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(atlas_delay::table)
                .values(&new_rows)
                .execute(conn)?)
        })
        .await
    }

    async fn fetch_delay(&self, query: &SeriesQuery) -> RepositoryResult<Vec<DelayRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = delay::table.select(DelayRow::as_select()).into_boxed();
            if let Some(asn) = query.asn {
                q = q.filter(delay::asn.eq(asn.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(delay::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(delay::timebin.le(end));
            }
            let rows: Vec<DelayRow> = q
                .order(delay::timebin.asc())
                .load(conn)?;
            let names = network_names(conn, rows.iter().map(|r| r.asn))?;
            rows.into_iter()
                .map(|row| {
                    Ok(DelayRecord {
                        asn: AsnId::new(row.asn),
                        timebin: row.timebin,
                        magnitude: row.magnitude,
                        asn_name: require_name(&names, row.asn)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_forwarding(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = forwarding::table.select(ForwardingRow::as_select()).into_boxed();
            if let Some(asn) = query.asn {
                q = q.filter(forwarding::asn.eq(asn.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(forwarding::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(forwarding::timebin.le(end));
            }
            let rows: Vec<ForwardingRow> = q
                .order(forwarding::timebin.asc())
                .load(conn)?;
            let names = network_names(conn, rows.iter().map(|r| r.asn))?;
            rows.into_iter()
                .map(|row| {
                    Ok(ForwardingRecord {
                        asn: AsnId::new(row.asn),
                        timebin: row.timebin,
                        magnitude: row.magnitude,
                        asn_name: require_name(&names, row.asn)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_hegemony(
        &self,
        query: &HegemonyQuery,
    ) -> RepositoryResult<Vec<HegemonyRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = hegemony::table.select(HegemonyRow::as_select()).into_boxed();
            if let Some(originasn) = query.originasn {
                q = q.filter(hegemony::originasn.eq(originasn.value()));
            }
            if let Some(asn) = query.asn {
                q = q.filter(hegemony::asn.eq(asn.value()));
            }
            if let Some(af) = query.af {
                q = q.filter(hegemony::af.eq(af));
            }
            if let Some(start) = query.range.start {
                q = q.filter(hegemony::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(hegemony::timebin.le(end));
            }
            let rows: Vec<HegemonyRow> = q
                .order(hegemony::timebin.asc())
                .load(conn)?;
            let names = network_names(
                conn,
                rows.iter().flat_map(|r| [r.asn, r.originasn]),
            )?;
            rows.into_iter()
                .map(|row| {
                    Ok(HegemonyRecord {
                        timebin: row.timebin,
                        originasn: AsnId::new(row.originasn),
                        asn: AsnId::new(row.asn),
                        hege: row.hege,
                        af: row.af,
                        asn_name: require_name(&names, row.asn)?,
                        originasn_name: require_name(&names, row.originasn)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_hegemony_cone(
        &self,
        query: &ConeQuery,
    ) -> RepositoryResult<Vec<HegemonyConeRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = hegemony_cone::table.select(HegemonyConeRow::as_select()).into_boxed();
            if let Some(asn) = query.asn {
                q = q.filter(hegemony_cone::asn.eq(asn.value()));
            }
            if let Some(af) = query.af {
                q = q.filter(hegemony_cone::af.eq(af));
            }
            if let Some(start) = query.range.start {
                q = q.filter(hegemony_cone::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(hegemony_cone::timebin.le(end));
            }
            let rows: Vec<HegemonyConeRow> = q
                .order(hegemony_cone::timebin.asc())
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|row| HegemonyConeRecord {
                    timebin: row.timebin,
                    asn: AsnId::new(row.asn),
                    conesize: row.conesize,
                    af: row.af,
                })
                .collect())
        })
        .await
    }

    async fn fetch_network_delay(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = atlas_delay::table.select(AtlasDelayRow::as_select()).into_boxed();
            if let Some(startpoint) = query.startpoint {
                q = q.filter(atlas_delay::startpoint.eq(startpoint.value()));
            }
            if let Some(endpoint) = query.endpoint {
                q = q.filter(atlas_delay::endpoint.eq(endpoint.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(atlas_delay::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(atlas_delay::timebin.le(end));
            }
            let rows: Vec<AtlasDelayRow> = q
                .order(atlas_delay::timebin.asc())
                .load(conn)?;
            let locations = location_map(
                conn,
                rows.iter().flat_map(|r| [r.startpoint, r.endpoint]),
            )?;
            rows.into_iter()
                .map(|row| {
                    let start = require_location(&locations, row.startpoint)?;
                    let end = require_location(&locations, row.endpoint)?;
                    Ok(NetworkDelayRecord {
                        timebin: row.timebin,
                        startpoint_type: start.location_type.clone(),
                        startpoint_name: start.name.clone(),
                        startpoint_af: start.af,
                        endpoint_type: end.location_type.clone(),
                        endpoint_name: end.name.clone(),
                        endpoint_af: end.af,
                        median: row.median,
                        nbtracks: row.nbtracks,
                        nbprobes: row.nbprobes,
                        entropy: row.entropy,
                        hop: row.hop,
                        nbrealrtts: row.nbrealrtts,
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl AlarmRepository for PostgresRepository {
    async fn insert_delay_alarm(&self, alarm: &NewDelayAlarm) -> RepositoryResult<AlarmId> {
        let alarm = alarm.clone();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let id: i64 = diesel::insert_into(delay_alarms::table)
                    .values(&NewDelayAlarmRow {
                        asn: alarm.asn.value(),
                        timebin: alarm.timebin,
                        ip: alarm.ip.clone(),
                        link: alarm.link.clone(),
                        medianrtt: alarm.medianrtt,
                        diffmedian: alarm.diffmedian,
                        deviation: alarm.deviation,
                        nbprobes: alarm.nbprobes,
                    })
                    .returning(delay_alarms::id)
                    .get_result(conn)?;
                let children: Vec<NewDelayAlarmMsmRow> = alarm
                    .sessions
                    .iter()
                    .map(|s| NewDelayAlarmMsmRow {
                        alarm: id,
                        msmid: s.msmid,
                        probeid: s.probeid,
                    })
                    .collect();
                diesel::insert_into(delay_alarms_msms::table)
                    .values(&children)
                    .execute(conn)?;
                Ok(AlarmId::new(id))
            })
        })
        .await
    }

    async fn insert_forwarding_alarm(
        &self,
        alarm: &NewForwardingAlarm,
    ) -> RepositoryResult<AlarmId> {
        let alarm = alarm.clone();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let id: i64 = diesel::insert_into(forwarding_alarms::table)
                    .values(&NewForwardingAlarmRow {
                        asn: alarm.asn.value(),
                        timebin: alarm.timebin,
                        ip: alarm.ip.clone(),
                        correlation: alarm.correlation,
                        responsibility: alarm.responsibility,
                        pktdiff: alarm.pktdiff,
                        previoushop: alarm.previoushop.clone(),
                    })
                    .returning(forwarding_alarms::id)
                    .get_result(conn)?;
                let children: Vec<NewForwardingAlarmMsmRow> = alarm
                    .sessions
                    .iter()
                    .map(|s| NewForwardingAlarmMsmRow {
                        alarm: id,
                        msmid: s.msmid,
                        probeid: s.probeid,
                    })
                    .collect();
                diesel::insert_into(forwarding_alarms_msms::table)
                    .values(&children)
                    .execute(conn)?;
                Ok(AlarmId::new(id))
            })
        })
        .await
    }

    async fn insert_hegemony_alarm(&self, alarm: &NewHegemonyAlarm) -> RepositoryResult<AlarmId> {
        let row = NewHegemonyAlarmRow {
            timebin: alarm.timebin,
            originasn: alarm.originasn.value(),
            asn: alarm.asn.value(),
            deviation: alarm.deviation,
            af: alarm.af,
        };
        self.with_conn(move |conn| {
            let id: i64 = diesel::insert_into(hegemony_alarms::table)
                .values(&row)
                .returning(hegemony_alarms::id)
                .get_result(conn)?;
            Ok(AlarmId::new(id))
        })
        .await
    }

    async fn insert_atlas_delay_alarm(
        &self,
        alarm: &NewAtlasDelayAlarm,
    ) -> RepositoryResult<AlarmId> {
        let row = NewAtlasDelayAlarmRow {
            timebin: alarm.timebin,
            startpoint: alarm.startpoint.value(),
            endpoint: alarm.endpoint.value(),
            deviation: alarm.deviation,
        };
        self.with_conn(move |conn| {
            let id: i64 = diesel::insert_into(atlas_delay_alarms::table)
                .values(&row)
                .returning(atlas_delay_alarms::id)
                .get_result(conn)?;
            Ok(AlarmId::new(id))
        })
        .await
    }

    async fn fetch_delay_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<DelayAlarmRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = delay_alarms::table.select(DelayAlarmRow::as_select()).into_boxed();
            if let Some(asn) = query.asn {
                q = q.filter(delay_alarms::asn.eq(asn.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(delay_alarms::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(delay_alarms::timebin.le(end));
            }
            let rows: Vec<DelayAlarmRow> = q
                .order(delay_alarms::timebin.asc())
                .load(conn)?;

            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let children: Vec<(i64, i64, i32)> = delay_alarms_msms::table
                .filter(delay_alarms_msms::alarm.eq_any(&ids))
                .order(delay_alarms_msms::id.asc())
                .select((
                    delay_alarms_msms::alarm,
                    delay_alarms_msms::msmid,
                    delay_alarms_msms::probeid,
                ))
                .load(conn)?;
            let mut sessions = sessions_by_alarm(children);
            let names = network_names(conn, rows.iter().map(|r| r.asn))?;

            rows.into_iter()
                .map(|row| {
                    let (msm_prb_ids, msmid) =
                        render_sessions(&sessions.remove(&row.id).unwrap_or_default());
                    Ok(DelayAlarmRecord {
                        asn: AsnId::new(row.asn),
                        asn_name: require_name(&names, row.asn)?,
                        timebin: row.timebin,
                        link: row.link,
                        medianrtt: row.medianrtt,
                        diffmedian: row.diffmedian,
                        deviation: row.deviation,
                        nbprobes: row.nbprobes,
                        msm_prb_ids,
                        msmid,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_forwarding_alarms(
        &self,
        query: &SeriesQuery,
    ) -> RepositoryResult<Vec<ForwardingAlarmRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = forwarding_alarms::table.select(ForwardingAlarmRow::as_select()).into_boxed();
            if let Some(asn) = query.asn {
                q = q.filter(forwarding_alarms::asn.eq(asn.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(forwarding_alarms::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(forwarding_alarms::timebin.le(end));
            }
            let rows: Vec<ForwardingAlarmRow> = q
                .order(forwarding_alarms::timebin.asc())
                .load(conn)?;

            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let children: Vec<(i64, i64, i32)> = forwarding_alarms_msms::table
                .filter(forwarding_alarms_msms::alarm.eq_any(&ids))
                .order(forwarding_alarms_msms::id.asc())
                .select((
                    forwarding_alarms_msms::alarm,
                    forwarding_alarms_msms::msmid,
                    forwarding_alarms_msms::probeid,
                ))
                .load(conn)?;
            let mut sessions = sessions_by_alarm(children);
            let names = network_names(conn, rows.iter().map(|r| r.asn))?;

            rows.into_iter()
                .map(|row| {
                    let (msm_prb_ids, msmid) =
                        render_sessions(&sessions.remove(&row.id).unwrap_or_default());
                    Ok(ForwardingAlarmRecord {
                        asn: AsnId::new(row.asn),
                        asn_name: require_name(&names, row.asn)?,
                        timebin: row.timebin,
                        ip: row.ip,
                        correlation: row.correlation,
                        pktdiff: row.pktdiff,
                        previoushop: row.previoushop,
                        responsibility: row.responsibility,
                        msm_prb_ids,
                        msmid,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_hegemony_alarms(
        &self,
        query: &HegemonyQuery,
    ) -> RepositoryResult<Vec<HegemonyAlarmRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = hegemony_alarms::table.select(HegemonyAlarmRow::as_select()).into_boxed();
            if let Some(originasn) = query.originasn {
                q = q.filter(hegemony_alarms::originasn.eq(originasn.value()));
            }
            if let Some(asn) = query.asn {
                q = q.filter(hegemony_alarms::asn.eq(asn.value()));
            }
            if let Some(af) = query.af {
                q = q.filter(hegemony_alarms::af.eq(af));
            }
            if let Some(start) = query.range.start {
                q = q.filter(hegemony_alarms::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(hegemony_alarms::timebin.le(end));
            }
            let rows: Vec<HegemonyAlarmRow> = q
                .order(hegemony_alarms::timebin.asc())
                .load(conn)?;
            let names = network_names(
                conn,
                rows.iter().flat_map(|r| [r.asn, r.originasn]),
            )?;
            rows.into_iter()
                .map(|row| {
                    Ok(HegemonyAlarmRecord {
                        timebin: row.timebin,
                        originasn: AsnId::new(row.originasn),
                        asn: AsnId::new(row.asn),
                        deviation: row.deviation,
                        af: row.af,
                        asn_name: require_name(&names, row.asn)?,
                        originasn_name: require_name(&names, row.originasn)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_network_delay_alarms(
        &self,
        query: &AtlasDelayQuery,
    ) -> RepositoryResult<Vec<NetworkDelayAlarmRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = atlas_delay_alarms::table.select(AtlasDelayAlarmRow::as_select()).into_boxed();
            if let Some(startpoint) = query.startpoint {
                q = q.filter(atlas_delay_alarms::startpoint.eq(startpoint.value()));
            }
            if let Some(endpoint) = query.endpoint {
                q = q.filter(atlas_delay_alarms::endpoint.eq(endpoint.value()));
            }
            if let Some(start) = query.range.start {
                q = q.filter(atlas_delay_alarms::timebin.ge(start));
            }
            if let Some(end) = query.range.end {
                q = q.filter(atlas_delay_alarms::timebin.le(end));
            }
            let rows: Vec<AtlasDelayAlarmRow> = q
                .order(atlas_delay_alarms::timebin.asc())
                .load(conn)?;
            let locations = location_map(
                conn,
                rows.iter().flat_map(|r| [r.startpoint, r.endpoint]),
            )?;
            rows.into_iter()
                .map(|row| {
                    let start = require_location(&locations, row.startpoint)?;
                    let end = require_location(&locations, row.endpoint)?;
                    Ok(NetworkDelayAlarmRecord {
                        timebin: row.timebin,
                        startpoint_type: start.location_type.clone(),
                        startpoint_name: start.name.clone(),
                        startpoint_af: start.af,
                        endpoint_type: end.location_type.clone(),
                        endpoint_name: end.name.clone(),
                        endpoint_af: end.af,
                        deviation: row.deviation,
                    })
                })
                .collect()
        })
        .await
    }
}

fn event_record(row: DiscoEventRow, probes: Vec<DiscoProbeRow>) -> RepositoryResult<DiscoEventRecord> {
    let streamtype = StreamType::from_str(&row.streamtype).map_err(|e| {
        RepositoryError::internal_with_context(
            e,
            ErrorContext::default()
                .with_entity("disco_event")
                .with_entity_id(row.id),
        )
    })?;
    Ok(DiscoEventRecord {
        id: EventId::new(row.id),
        streamtype,
        streamname: row.streamname,
        starttime: row.starttime,
        endtime: row.endtime,
        avglevel: row.avglevel,
        nbdiscoprobes: row.nbdiscoprobes,
        totalprobes: row.totalprobes,
        ongoing: row.ongoing,
        discoprobes: probes.into_iter().map(probe_record).collect(),
    })
}

fn probe_record(row: DiscoProbeRow) -> DiscoProbeRecord {
    DiscoProbeRecord {
        probe_id: row.probe_id,
        ipv4: row.ipv4,
        prefixv4: row.prefixv4,
        event: EventId::new(row.event),
        starttime: row.starttime,
        endtime: row.endtime,
        level: row.level,
        lat: row.lat,
        lon: row.lon,
    }
}

#[async_trait]
impl DiscoRepository for PostgresRepository {
    async fn insert_event(&self, event: &NewDiscoEvent) -> RepositoryResult<EventId> {
        let event = event.clone();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let id: i64 = diesel::insert_into(disco_events::table)
                    .values(&NewDiscoEventRow {
                        mongoid: event.mongoid.clone(),
                        streamtype: event.streamtype.as_str().to_string(),
                        streamname: event.streamname.clone(),
                        starttime: event.starttime,
                        endtime: event.endtime,
                        avglevel: event.avglevel,
                        nbdiscoprobes: event.nbdiscoprobes,
                        totalprobes: event.totalprobes,
                        ongoing: event.ongoing,
                    })
                    .returning(disco_events::id)
                    .get_result(conn)?;
                let children: Vec<NewDiscoProbeRow> = event
                    .probes
                    .iter()
                    .map(|p| NewDiscoProbeRow {
                        probe_id: p.probe_id,
                        event: id,
                        starttime: p.starttime,
                        endtime: p.endtime,
                        level: p.level,
                        ipv4: p.ipv4.clone(),
                        prefixv4: p.prefixv4.clone(),
                        lat: p.lat,
                        lon: p.lon,
                    })
                    .collect();
                diesel::insert_into(disco_probes::table)
                    .values(&children)
                    .execute(conn)?;
                Ok(EventId::new(id))
            })
        })
        .await
    }

    async fn add_probe(&self, event: EventId, probe: &NewDiscoProbe) -> RepositoryResult<()> {
        let event = event.value();
        let probe = probe.clone();
        self.with_conn(move |conn| {
            diesel::insert_into(disco_probes::table)
                .values(&NewDiscoProbeRow {
                    probe_id: probe.probe_id,
                    event,
                    starttime: probe.starttime,
                    endtime: probe.endtime,
                    level: probe.level,
                    ipv4: probe.ipv4.clone(),
                    prefixv4: probe.prefixv4.clone(),
                    lat: probe.lat,
                    lon: probe.lon,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn fetch_events(&self, query: &DiscoQuery) -> RepositoryResult<Vec<DiscoEventRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut q = disco_events::table.select(DiscoEventRow::as_select()).into_boxed();
            if let Some(streamtype) = query.streamtype {
                q = q.filter(disco_events::streamtype.eq(streamtype.as_str()));
            }
            if let Some(ref streamname) = query.streamname {
                q = q.filter(disco_events::streamname.eq(streamname.clone()));
            }
            // Overlap: the event interval intersects the query window.
            if let Some(start) = query.window.start {
                q = q.filter(disco_events::endtime.ge(start));
            }
            if let Some(end) = query.window.end {
                q = q.filter(disco_events::starttime.le(end));
            }
            let rows: Vec<DiscoEventRow> = q
                .order(disco_events::starttime.asc())
                .load(conn)?;

            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let probe_rows: Vec<DiscoProbeRow> = disco_probes::table
                .filter(disco_probes::event.eq_any(&ids))
                .order(disco_probes::starttime.asc())
                .load(conn)?;
            let mut by_event: HashMap<i64, Vec<DiscoProbeRow>> = HashMap::new();
            for probe in probe_rows {
                by_event.entry(probe.event).or_default().push(probe);
            }

            rows.into_iter()
                .map(|row| {
                    let probes = by_event.remove(&row.id).unwrap_or_default();
                    event_record(row, probes)
                })
                .collect()
        })
        .await
    }

    async fn fetch_probes(&self, event: EventId) -> RepositoryResult<Vec<DiscoProbeRecord>> {
        let id = event.value();
        self.with_conn(move |conn| {
            let exists: i64 = disco_events::table
                .filter(disco_events::id.eq(id))
                .count()
                .get_result(conn)?;
            if exists == 0 {
                return Err(RepositoryError::not_found(format!(
                    "Event {} not found",
                    id
                )));
            }
            let rows: Vec<DiscoProbeRow> = disco_probes::table
                .filter(disco_probes::event.eq(id))
                .order(disco_probes::starttime.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(probe_record).collect())
        })
        .await
    }

    async fn delete_event(&self, event: EventId) -> RepositoryResult<usize> {
        let id = event.value();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let probes =
                    diesel::delete(disco_probes::table.filter(disco_probes::event.eq(id)))
                        .execute(conn)?;
                let events =
                    diesel::delete(disco_events::table.find(id)).execute(conn)?;
                if events == 0 {
                    return Err(RepositoryError::not_found(format!(
                        "Event {} not found",
                        id
                    )));
                }
                Ok(events + probes)
            })
        })
        .await
    }
}

fn user_from_row(row: UserRow) -> IhrUser {
    IhrUser {
        id: UserId::new(row.id),
        email: row.email,
        password: row.password,
        is_active: row.is_active,
        is_staff: row.is_staff,
        is_superuser: row.is_superuser,
    }
}

#[async_trait]
impl AccountRepository for PostgresRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<UserId> {
        let row = NewUserRow {
            email: user.email.clone(),
            password: user.password.clone(),
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        };
        self.with_conn(move |conn| {
            let id: i64 = diesel::insert_into(ihr_users::table)
                .values(&row)
                .returning(ihr_users::id)
                .get_result(conn)?;
            Ok(UserId::new(id))
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> RepositoryResult<IhrUser> {
        let id = id.value();
        self.with_conn(move |conn| {
            let row: UserRow = ihr_users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| RepositoryError::not_found(format!("User {} not found", id)))?;
            Ok(user_from_row(row))
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> RepositoryResult<IhrUser> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let row: UserRow = ihr_users::table
                .filter(ihr_users::email.eq(&email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    RepositoryError::not_found(format!("No account for {}", email))
                })?;
            Ok(user_from_row(row))
        })
        .await
    }

    async fn activate_user(&self, id: UserId) -> RepositoryResult<()> {
        let id = id.value();
        self.with_conn(move |conn| {
            let updated = diesel::update(ihr_users::table.find(id))
                .set(ihr_users::is_active.eq(true))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::not_found(format!("User {} not found", id)));
            }
            Ok(())
        })
        .await
    }

    async fn set_password(&self, id: UserId, password: &str) -> RepositoryResult<()> {
        let id = id.value();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(ihr_users::table.find(id))
                .set(ihr_users::password.eq(&password))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::not_found(format!("User {} not found", id)));
            }
            Ok(())
        })
        .await
    }

    async fn grant_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()> {
        let row = NewUserCapabilityRow {
            user_id: id.value(),
            capability: capability.as_str().to_string(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(user_capabilities::table)
                .values(&row)
                .on_conflict((user_capabilities::user_id, user_capabilities::capability))
                .do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn revoke_capability(&self, id: UserId, capability: Capability) -> RepositoryResult<()> {
        let id = id.value();
        let capability = capability.as_str();
        self.with_conn(move |conn| {
            diesel::delete(
                user_capabilities::table
                    .filter(user_capabilities::user_id.eq(id))
                    .filter(user_capabilities::capability.eq(capability)),
            )
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_capabilities(&self, id: UserId) -> RepositoryResult<Vec<Capability>> {
        let id = id.value();
        self.with_conn(move |conn| {
            let tags: Vec<String> = user_capabilities::table
                .filter(user_capabilities::user_id.eq(id))
                .order(user_capabilities::capability.asc())
                .select(user_capabilities::capability)
                .load(conn)?;
            tags.iter()
                .map(|tag| {
                    Capability::from_str(tag).map_err(|e| {
                        RepositoryError::internal_with_context(
                            e.to_string(),
                            ErrorContext::default()
                                .with_entity("user_capability")
                                .with_entity_id(id),
                        )
                    })
                })
                .collect()
        })
        .await
    }

    async fn set_monitored_asn(
        &self,
        user: UserId,
        asn: AsnId,
        level: NotifyLevel,
    ) -> RepositoryResult<()> {
        let row = NewMonitoredAsnRow {
            user_id: user.value(),
            asn: asn.value(),
            notifylevel: level.as_i16(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(monitored_asn::table)
                .values(&row)
                .on_conflict((monitored_asn::user_id, monitored_asn::asn))
                .do_update()
                .set(monitored_asn::notifylevel.eq(row.notifylevel))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn remove_monitored_asn(&self, user: UserId, asn: AsnId) -> RepositoryResult<()> {
        let user = user.value();
        let asn = asn.value();
        self.with_conn(move |conn| {
            diesel::delete(
                monitored_asn::table
                    .filter(monitored_asn::user_id.eq(user))
                    .filter(monitored_asn::asn.eq(asn)),
            )
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_monitored_asns(
        &self,
        user: UserId,
    ) -> RepositoryResult<Vec<MonitoredAsnRecord>> {
        let user = user.value();
        self.with_conn(move |conn| {
            let rows: Vec<MonitoredAsnRow> = monitored_asn::table
                .filter(monitored_asn::user_id.eq(user))
                .order(monitored_asn::asn.asc())
                .load(conn)?;
            let names = network_names(conn, rows.iter().map(|r| r.asn))?;
            rows.into_iter()
                .map(|row| {
                    Ok(MonitoredAsnRecord {
                        asn: AsnId::new(row.asn),
                        asn_name: require_name(&names, row.asn)?,
                        notifylevel: row.notifylevel,
                    })
                })
                .collect()
        })
        .await
    }

    async fn create_email_change_request(
        &self,
        user: UserId,
        new_email: &str,
        requested_at: DateTime<Utc>,
    ) -> RepositoryResult<EmailChangeRequest> {
        let row = NewEmailChangeRequestRow {
            user_id: user.value(),
            new_email: new_email.to_string(),
            request_time: requested_at,
        };
        self.with_conn(move |conn| {
            let stored: EmailChangeRequestRow = diesel::insert_into(email_change_requests::table)
                .values(&row)
                .returning(EmailChangeRequestRow::as_returning())
                .get_result(conn)?;
            Ok(EmailChangeRequest {
                id: stored.id,
                user: UserId::new(stored.user_id),
                new_email: stored.new_email,
                request_time: stored.request_time,
            })
        })
        .await
    }

    async fn get_email_change_request(&self, id: i64) -> RepositoryResult<EmailChangeRequest> {
        self.with_conn(move |conn| {
            let row: EmailChangeRequestRow = email_change_requests::table
                .find(id)
                .select(EmailChangeRequestRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    RepositoryError::not_found(format!("Email change {} not found", id))
                })?;
            Ok(EmailChangeRequest {
                id: row.id,
                user: UserId::new(row.user_id),
                new_email: row.new_email,
                request_time: row.request_time,
            })
        })
        .await
    }

    async fn apply_email_change(&self, id: i64) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let request: EmailChangeRequestRow = email_change_requests::table
                    .find(id)
                    .select(EmailChangeRequestRow::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| {
                        RepositoryError::not_found(format!("Email change {} not found", id))
                    })?;
                diesel::update(ihr_users::table.find(request.user_id))
                    .set(ihr_users::email.eq(&request.new_email))
                    .execute(conn)?;
                diesel::delete(email_change_requests::table.find(id)).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn delete_email_change_request(&self, id: i64) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let deleted =
                diesel::delete(email_change_requests::table.find(id)).execute(conn)?;
            if deleted == 0 {
                return Err(RepositoryError::not_found(format!(
                    "Email change {} not found",
                    id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_user(&self, id: UserId) -> RepositoryResult<usize> {
        let id = id.value();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let mut removed = 0usize;
                removed += diesel::delete(
                    user_capabilities::table.filter(user_capabilities::user_id.eq(id)),
                )
                .execute(conn)?;
                removed += diesel::delete(
                    monitored_asn::table.filter(monitored_asn::user_id.eq(id)),
                )
                .execute(conn)?;
                removed += diesel::delete(
                    email_change_requests::table.filter(email_change_requests::user_id.eq(id)),
                )
                .execute(conn)?;
                let users = diesel::delete(ihr_users::table.find(id)).execute(conn)?;
                if users == 0 {
                    return Err(RepositoryError::not_found(format!(
                        "User {} not found",
                        id
                    )));
                }
                Ok(removed + users)
            })
        })
        .await
    }
}

#[async_trait]
impl FullRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            sql_query("SELECT 1").execute(conn)?;
            Ok(true)
        })
        .await
    }
}
