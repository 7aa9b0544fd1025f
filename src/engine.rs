//! The per-record enrichment pass.

use std::net::IpAddr;
use std::sync::LazyLock;

use prometheus::Registry;
use rustc_hash::FxHashMap;

use crate::config::ResolverConfig;
use crate::metrics::ResolveTimer;
use crate::record::{FieldValue, Record, INTERNAL_FIELD_PREFIX};
use crate::resolver::{AsnInformation, GeoIpResolver, LocationInformation, ResolverFactory};

/// Fields that may contain IP addresses, mapped to the prefix of the fields
/// derived from them. ONLY these fields are ever looked up.
static IP_ADDRESS_FIELDS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut fields = FxHashMap::default();
    fields.insert("source_ip", "source");
    fields.insert("host_ip", "host");
    fields.insert("destination_ip", "destination");
    fields
});

/// Adds geolocation and ASN fields derived from a record's IP address fields.
///
/// For every `source_ip`, `host_ip` or `destination_ip` field holding an
/// address, the engine writes `{prefix}_geo_*` fields from the location
/// resolver and `{prefix}_as_*` fields from the ASN resolver.
///
/// The engine holds no mutable state, so a single instance can enrich records
/// from many threads at once.
pub struct EnrichmentEngine {
    location: Box<dyn GeoIpResolver<LocationInformation>>,
    asn: Box<dyn GeoIpResolver<AsnInformation>>,
    enabled: bool,
}

impl std::fmt::Debug for EnrichmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentEngine")
            .field("location", &self.location.name())
            .field("asn", &self.asn.name())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl EnrichmentEngine {
    /// Builds both resolvers through `factory`, sharing one resolve timer
    /// registered in `registry`.
    ///
    /// Never fails: when neither resolver is enabled the engine simply passes
    /// records through.
    pub fn new(factory: &dyn ResolverFactory, config: &ResolverConfig, registry: &Registry) -> Self {
        let timer = ResolveTimer::register(registry);

        let location = factory.create_location_resolver(config, &timer);
        let asn = factory.create_asn_resolver(config, &timer);

        tracing::info!("Created Geo IP resolvers for '{}'", config.vendor);
        Self::from_resolvers(location, asn)
    }

    /// Wraps two ready-made resolvers.
    pub fn from_resolvers(
        location: Box<dyn GeoIpResolver<LocationInformation>>,
        asn: Box<dyn GeoIpResolver<AsnInformation>>,
    ) -> Self {
        tracing::info!("'{}' enabled: {}", location.name(), location.is_enabled());
        tracing::info!("'{}' enabled: {}", asn.name(), asn.is_enabled());

        // decided once, a resolver enabled later is not picked up
        let enabled = location.is_enabled() || asn.is_enabled();

        Self {
            location,
            asn,
            enabled,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enriches `record` in place.
    ///
    /// Returns `false` without touching the record when the engine is
    /// disabled, `true` otherwise, whether or not any field was added.
    pub fn enrich<R: Record + ?Sized>(&self, record: &mut R) -> bool {
        if !self.enabled {
            return false;
        }

        for (key, prefix) in candidate_fields(record) {
            let Some(address) = record.get_field(&key).and_then(routable_address) else {
                continue;
            };

            if let Some(location) = self.location.lookup(address) {
                add_location_fields(record, prefix, location);
            }

            if let Some(asn) = self.asn.lookup(address) {
                add_asn_fields(record, prefix, asn);
            }
        }

        true
    }
}

/// Names of the record's IP address fields, paired with their output prefix.
fn candidate_fields<R: Record + ?Sized>(record: &R) -> Vec<(String, &'static str)> {
    record
        .field_names()
        .into_iter()
        .filter(|name| !name.starts_with(INTERNAL_FIELD_PREFIX))
        .filter_map(|name| {
            let prefix = *IP_ADDRESS_FIELDS.get(name.as_str())?;
            Some((name, prefix))
        })
        .collect()
}

/// Extracts an address from a field value; anything but an address or a
/// string holding one yields `None`.
fn routable_address(value: &FieldValue) -> Option<IpAddr> {
    match value {
        FieldValue::Ip(ip) => Some(*ip),
        FieldValue::Str(s) => parse_ip_field_value(s),
        _ => None,
    }
}

/// Parses a textual field value as an IPv4 or IPv6 address. Leading and
/// trailing characters up to and including U+0020 (space and the C0
/// controls) are ignored; other Unicode whitespace is not. Values that are
/// not addresses yield `None`.
#[doc(hidden)]
pub fn parse_ip_field_value(value: &str) -> Option<IpAddr> {
    match value.trim_matches(|c: char| c <= ' ').parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            // field is not an IP
            tracing::trace!("not an IP address: {:?}", value);
            None
        }
    }
}

fn add_location_fields<R: Record + ?Sized>(record: &mut R, prefix: &str, info: LocationInformation) {
    let mut lat = ryu::Buffer::new();
    let mut lon = ryu::Buffer::new();
    let coordinates = format!("{},{}", lat.format(info.latitude), lon.format(info.longitude));

    // only when both parts are known, unlike the fields below
    let name = match (&info.city_name, &info.country_iso_code) {
        (Some(city), Some(country)) => Some(format!("{city}, {country}")),
        _ => None,
    };

    record.add_field(&format!("{prefix}_geo_coordinates"), coordinates.into());
    record.add_field(&format!("{prefix}_geo_country"), info.country_iso_code.into());
    record.add_field(&format!("{prefix}_geo_city"), info.city_name.into());
    record.add_field(&format!("{prefix}_geo_region"), info.region.into());
    record.add_field(&format!("{prefix}_geo_timeZone"), info.time_zone.into());

    if let Some(name) = name {
        record.add_field(&format!("{prefix}_geo_name"), name.into());
    }
}

fn add_asn_fields<R: Record + ?Sized>(record: &mut R, prefix: &str, info: AsnInformation) {
    record.add_field(&format!("{prefix}_as_organization"), info.organization.into());
    record.add_field(&format!("{prefix}_as_number"), info.asn.into());
}
