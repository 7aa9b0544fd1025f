//! Resolver capabilities consumed by the enrichment engine.

use std::marker::PhantomData;
use std::net::IpAddr;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::ResolverConfig;
use crate::metrics::ResolveTimer;

/// Geolocation of an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationInformation {
    pub latitude: f64,
    pub longitude: f64,
    pub country_iso_code: Option<String>,
    pub city_name: Option<String>,
    pub region: Option<String>,
    pub time_zone: Option<String>,
}

/// Autonomous system that announces an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsnInformation {
    pub organization: Option<String>,
    pub asn: Option<u32>,
}

/// Something that can answer "what do you know about this address?".
///
/// Lookups must be cheap and safe to run from many threads at once; a miss,
/// a disabled resolver and an internal failure all look the same to callers.
pub trait GeoIpResolver<T>: Send + Sync {
    /// Whether this resolver has a database to answer from.
    fn is_enabled(&self) -> bool;

    /// Returns the data for `address`, or `None` on a miss.
    fn lookup(&self, address: IpAddr) -> Option<T>;

    /// Name used in log messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Builds the two resolvers an engine needs.
pub trait ResolverFactory {
    fn create_location_resolver(
        &self,
        config: &ResolverConfig,
        timer: &ResolveTimer,
    ) -> Box<dyn GeoIpResolver<LocationInformation>>;

    fn create_asn_resolver(
        &self,
        config: &ResolverConfig,
        timer: &ResolveTimer,
    ) -> Box<dyn GeoIpResolver<AsnInformation>>;
}

/// A resolver that is never enabled and never answers.
#[derive(Debug)]
pub struct DisabledResolver<T>(PhantomData<fn() -> T>);

impl<T> DisabledResolver<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DisabledResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GeoIpResolver<T> for DisabledResolver<T> {
    #[inline]
    fn is_enabled(&self) -> bool {
        false
    }

    #[inline]
    fn lookup(&self, _address: IpAddr) -> Option<T> {
        None
    }

    fn name(&self) -> &str {
        "DisabledResolver"
    }
}

/// An in-memory resolver answering from a fixed table.
///
/// Handy for fixtures and for hosts that keep a small allow-list of known
/// addresses instead of a database.
#[derive(Debug, Clone)]
pub struct StaticResolver<T> {
    entries: FxHashMap<IpAddr, T>,
    timer: Option<ResolveTimer>,
}

impl<T> Default for StaticResolver<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            timer: None,
        }
    }
}

impl<T> StaticResolver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for `address`.
    pub fn with_entry(mut self, address: IpAddr, data: T) -> Self {
        self.entries.insert(address, data);
        self
    }

    /// Records every lookup in `timer`.
    pub fn with_timer(mut self, timer: ResolveTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(IpAddr, T)> for StaticResolver<T> {
    fn from_iter<I: IntoIterator<Item = (IpAddr, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            timer: None,
        }
    }
}

impl<T: Clone + Send + Sync> GeoIpResolver<T> for StaticResolver<T> {
    #[inline]
    fn is_enabled(&self) -> bool {
        true
    }

    fn lookup(&self, address: IpAddr) -> Option<T> {
        match &self.timer {
            Some(timer) => timer.time(|| self.entries.get(&address).cloned()),
            None => self.entries.get(&address).cloned(),
        }
    }

    fn name(&self) -> &str {
        "StaticResolver"
    }
}
