//! Repository trait for reference entities: networks, countries and
//! Atlas vantage points.

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::LocationFilter;
use crate::api::{AsnId, CountryRecord, LocationId, LocationRecord, NetworkRecord};
use crate::models::{AtlasLocation, Country, CountryFlags, Network, NetworkFlags, NewLocation};

/// Repository trait for reference-entity operations.
///
/// Networks and countries are created by the ingestion pipeline; only
/// their participation flags change afterwards. Deleting a network
/// cascades through every metric, alarm and subscription row that
/// references it.
#[async_trait]
pub trait NetworkRepository: Send + Sync {
    /// Insert a network, or refresh the name of an existing one.
    /// Participation flags of an existing row are left untouched; they
    /// change only through [`set_network_flags`](Self::set_network_flags).
    async fn upsert_network(&self, network: &Network) -> RepositoryResult<()>;

    /// Point lookup by ASN / IXP id.
    async fn get_network(&self, asn: AsnId) -> RepositoryResult<NetworkRecord>;

    /// List networks, optionally filtered by a case-insensitive name
    /// substring.
    async fn list_networks(&self, search: Option<&str>) -> RepositoryResult<Vec<NetworkRecord>>;

    /// Replace the participation flags of a network. Last writer wins.
    async fn set_network_flags(&self, asn: AsnId, flags: NetworkFlags) -> RepositoryResult<()>;

    /// Delete a network and every row referencing it. Returns the total
    /// number of rows removed, the network itself included.
    async fn delete_network(&self, asn: AsnId) -> RepositoryResult<usize>;

    /// Insert a country, or refresh the name of an existing one.
    async fn upsert_country(&self, country: &Country) -> RepositoryResult<()>;

    /// Point lookup by country code.
    async fn get_country(&self, code: &str) -> RepositoryResult<CountryRecord>;

    async fn list_countries(&self) -> RepositoryResult<Vec<CountryRecord>>;

    /// Replace the participation flags of a country.
    async fn set_country_flags(&self, code: &str, flags: CountryFlags) -> RepositoryResult<()>;

    /// Insert a vantage point and return its surrogate key. No
    /// deduplication: identical (type, name, af) triples may coexist.
    async fn insert_location(&self, location: &NewLocation) -> RepositoryResult<LocationId>;

    /// Point lookup by surrogate key.
    async fn get_location(&self, id: LocationId) -> RepositoryResult<AtlasLocation>;

    async fn list_locations(
        &self,
        filter: &LocationFilter,
    ) -> RepositoryResult<Vec<LocationRecord>>;
}
