//! Resolvers backed by MMDB databases.
//!
//! Each supported database layout is described by a [`DatabaseSchema`] that
//! turns a raw MMDB record into [`LocationInformation`] or [`AsnInformation`].
//! [`MmdbResolver`] is generic over the schema, so one implementation serves
//! MaxMind and IPinfo databases alike, and [`VendorResolverFactory`] picks the
//! schemas for the configured vendor.

use std::marker::PhantomData;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use maxminddb::{geoip2, MaxMindDbError, Reader};
use serde::{Deserialize, Deserializer};

use crate::config::{DatabaseVendorType, ResolverConfig};
use crate::error::{Error, Result};
use crate::metrics::ResolveTimer;
use crate::resolver::{AsnInformation, GeoIpResolver, LocationInformation, ResolverFactory};

/// Layout of one kind of MMDB database.
pub trait DatabaseSchema: 'static {
    /// What a successful lookup produces.
    type Output: 'static;

    /// Name used in log messages.
    const NAME: &'static str;

    /// Looks up `address` and converts the record, `Ok(None)` on a miss.
    fn decode(
        reader: &Reader<Vec<u8>>,
        address: IpAddr,
    ) -> std::result::Result<Option<Self::Output>, MaxMindDbError>;
}

/// MaxMind GeoIP2 / GeoLite2 City.
#[derive(Debug)]
pub struct MaxMindCity;

/// MaxMind GeoIP2 / GeoLite2 ASN.
#[derive(Debug)]
pub struct MaxMindAsn;

/// IPinfo standard location.
#[derive(Debug)]
pub struct IpinfoLocation;

/// IPinfo ASN.
#[derive(Debug)]
pub struct IpinfoAsn;

impl DatabaseSchema for MaxMindCity {
    type Output = LocationInformation;
    const NAME: &'static str = "MaxMindCityResolver";

    fn decode(
        reader: &Reader<Vec<u8>>,
        address: IpAddr,
    ) -> std::result::Result<Option<LocationInformation>, MaxMindDbError> {
        let result = reader.lookup(address)?;
        if !result.has_data() {
            return Ok(None);
        }
        let Some(city) = result.decode::<geoip2::City>()? else {
            return Ok(None);
        };

        // coordinates are mandatory for a location
        let (Some(latitude), Some(longitude)) = (city.location.latitude, city.location.longitude)
        else {
            return Ok(None);
        };

        Ok(Some(LocationInformation {
            latitude,
            longitude,
            country_iso_code: city.country.iso_code.map(|s| s.to_string()),
            city_name: city.city.names.english.map(|s| s.to_string()),
            // most specific subdivision comes last
            region: city
                .subdivisions
                .last()
                .and_then(|s| s.names.english.as_ref().map(|n| n.to_string())),
            time_zone: city.location.time_zone.map(|s| s.to_string()),
        }))
    }
}

impl DatabaseSchema for MaxMindAsn {
    type Output = AsnInformation;
    const NAME: &'static str = "MaxMindAsnResolver";

    fn decode(
        reader: &Reader<Vec<u8>>,
        address: IpAddr,
    ) -> std::result::Result<Option<AsnInformation>, MaxMindDbError> {
        let result = reader.lookup(address)?;
        if !result.has_data() {
            return Ok(None);
        }
        Ok(result
            .decode::<geoip2::Asn>()?
            .map(|asn| AsnInformation {
                organization: asn.autonomous_system_organization.map(|s| s.to_string()),
                asn: asn.autonomous_system_number,
            }))
    }
}

/// Record of the IPinfo standard location database.
#[derive(Debug, Deserialize)]
struct IpinfoLocationRecord {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default, deserialize_with = "coordinate")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    lng: Option<f64>,
}

/// Record of the IPinfo ASN database.
#[derive(Debug, Deserialize)]
struct IpinfoAsnRecord {
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

/// IPinfo builds store coordinates either as numbers or as decimal strings.
fn coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Coordinate>::deserialize(deserializer)? {
        Some(Coordinate::Number(v)) => Some(v),
        Some(Coordinate::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// IPinfo writes missing values as empty strings.
#[inline]
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Parses the number out of an IPinfo `AS15169` style identifier.
fn parse_asn(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits = value
        .strip_prefix("AS")
        .or_else(|| value.strip_prefix("as"))
        .unwrap_or(value);
    digits.parse().ok()
}

impl DatabaseSchema for IpinfoLocation {
    type Output = LocationInformation;
    const NAME: &'static str = "IpinfoLocationResolver";

    fn decode(
        reader: &Reader<Vec<u8>>,
        address: IpAddr,
    ) -> std::result::Result<Option<LocationInformation>, MaxMindDbError> {
        let result = reader.lookup(address)?;
        if !result.has_data() {
            return Ok(None);
        }
        Ok(result
            .decode::<IpinfoLocationRecord>()?
            .and_then(IpinfoLocationRecord::into_location))
    }
}

impl IpinfoLocationRecord {
    fn into_location(self) -> Option<LocationInformation> {
        Some(LocationInformation {
            latitude: self.lat?,
            longitude: self.lng?,
            country_iso_code: non_empty(self.country),
            city_name: non_empty(self.city),
            region: non_empty(self.region),
            time_zone: non_empty(self.timezone),
        })
    }
}

impl DatabaseSchema for IpinfoAsn {
    type Output = AsnInformation;
    const NAME: &'static str = "IpinfoAsnResolver";

    fn decode(
        reader: &Reader<Vec<u8>>,
        address: IpAddr,
    ) -> std::result::Result<Option<AsnInformation>, MaxMindDbError> {
        let result = reader.lookup(address)?;
        if !result.has_data() {
            return Ok(None);
        }
        Ok(result
            .decode::<IpinfoAsnRecord>()?
            .map(IpinfoAsnRecord::into_asn))
    }
}

impl IpinfoAsnRecord {
    fn into_asn(self) -> AsnInformation {
        AsnInformation {
            asn: self.asn.as_deref().and_then(parse_asn),
            organization: non_empty(self.name),
        }
    }
}

/// A resolver answering from one MMDB database laid out as `S`.
///
/// A resolver without a database is disabled and misses every lookup.
pub struct MmdbResolver<S> {
    reader: Option<Reader<Vec<u8>>>,
    path: Option<Utf8PathBuf>,
    timer: ResolveTimer,
    _schema: PhantomData<fn() -> S>,
}

impl<S> std::fmt::Debug for MmdbResolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmdbResolver")
            .field("schema", &std::any::type_name::<S>())
            .field("path", &self.path)
            .field("enabled", &self.reader.is_some())
            .finish()
    }
}

impl<S: DatabaseSchema> MmdbResolver<S> {
    /// Loads the database at `path`.
    pub fn open(path: &Utf8Path, timer: ResolveTimer) -> Result<Self> {
        if !path.exists() {
            return Err(Error::DatabaseNotFound {
                path: path.to_path_buf(),
            });
        }

        let reader = Reader::open_readfile(path).map_err(|source| Error::DatabaseOpen {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            "{} loaded {} ({})",
            S::NAME,
            path,
            reader.metadata.database_type
        );

        Ok(Self {
            reader: Some(reader),
            path: Some(path.to_path_buf()),
            timer,
            _schema: PhantomData,
        })
    }

    /// A resolver with no database.
    pub fn disabled(timer: ResolveTimer) -> Self {
        Self {
            reader: None,
            path: None,
            timer,
            _schema: PhantomData,
        }
    }

    /// Path of the loaded database, if any.
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Like [`GeoIpResolver::lookup`], but reports database errors.
    pub fn try_lookup(&self, address: IpAddr) -> Result<Option<S::Output>> {
        let Some(reader) = &self.reader else {
            return Ok(None);
        };

        self.timer
            .time(|| S::decode(reader, address))
            .map_err(|source| Error::LookupFailed {
                ip: address.to_string(),
                source,
            })
    }
}

impl<S: DatabaseSchema> GeoIpResolver<S::Output> for MmdbResolver<S> {
    #[inline]
    fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    fn lookup(&self, address: IpAddr) -> Option<S::Output> {
        match self.try_lookup(address) {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!("{}: {:#}", S::NAME, anyhow::Error::from(err));
                None
            }
        }
    }

    fn name(&self) -> &str {
        S::NAME
    }
}

/// Opens the database for `S`, falling back to a disabled resolver.
fn open_or_disabled<S: DatabaseSchema>(
    config: &ResolverConfig,
    path: Option<&Utf8Path>,
    timer: &ResolveTimer,
) -> Box<dyn GeoIpResolver<S::Output>> {
    if !config.enabled {
        return Box::new(MmdbResolver::<S>::disabled(timer.clone()));
    }

    let Some(path) = path else {
        tracing::debug!("{}: no database configured", S::NAME);
        return Box::new(MmdbResolver::<S>::disabled(timer.clone()));
    };

    match MmdbResolver::<S>::open(path, timer.clone()) {
        Ok(resolver) => Box::new(resolver),
        Err(err) => {
            tracing::warn!("{} disabled: {:#}", S::NAME, anyhow::Error::from(err));
            Box::new(MmdbResolver::<S>::disabled(timer.clone()))
        }
    }
}

/// Builds MMDB resolvers for the vendor named in the configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct VendorResolverFactory;

impl ResolverFactory for VendorResolverFactory {
    fn create_location_resolver(
        &self,
        config: &ResolverConfig,
        timer: &ResolveTimer,
    ) -> Box<dyn GeoIpResolver<LocationInformation>> {
        let path = config.city_db_path.as_deref();
        match config.vendor {
            DatabaseVendorType::MaxMind => open_or_disabled::<MaxMindCity>(config, path, timer),
            DatabaseVendorType::Ipinfo => open_or_disabled::<IpinfoLocation>(config, path, timer),
        }
    }

    fn create_asn_resolver(
        &self,
        config: &ResolverConfig,
        timer: &ResolveTimer,
    ) -> Box<dyn GeoIpResolver<AsnInformation>> {
        let path = config.asn_db_path.as_deref();
        match config.vendor {
            DatabaseVendorType::MaxMind => open_or_disabled::<MaxMindAsn>(config, path, timer),
            DatabaseVendorType::Ipinfo => open_or_disabled::<IpinfoAsn>(config, path, timer),
        }
    }
}
