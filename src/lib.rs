//! The geoipenrich library for geolocation and ASN enrichment of log records.
//!
//! An [`EnrichmentEngine`] looks at the `source_ip`, `host_ip` and
//! `destination_ip` fields of a [`Record`], resolves each address against a
//! location and an ASN resolver, and writes the results back as
//! `{source,host,destination}_geo_*` and `*_as_*` fields.
//!
//! # Examples
//!
//! Enriching a message with in-memory resolvers:
//!
//! ```rust
//! use geoipenrich::{AsnInformation, EnrichmentEngine, Message, Record, StaticResolver};
//! use geoipenrich::LocationInformation;
//!
//! let ip = "192.0.2.7".parse().unwrap();
//! let engine = EnrichmentEngine::from_resolvers(
//!     Box::new(StaticResolver::<LocationInformation>::new()),
//!     Box::new(StaticResolver::new().with_entry(
//!         ip,
//!         AsnInformation { organization: Some("Example ISP".into()), asn: Some(64500) },
//!     )),
//! );
//!
//! let mut msg = Message::new().with_field("host_ip", "192.0.2.7");
//! assert!(engine.enrich(&mut msg));
//! assert!(msg.get_field("host_as_number").is_some());
//! ```
//!
//! Loading MaxMind databases from a directory:
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use geoipenrich::{EnrichmentEngine, ResolverConfig, VendorResolverFactory};
//!
//! let config = ResolverConfig::default().with_database_dir(Utf8Path::new("/usr/share/GeoIP"));
//! let registry = prometheus::Registry::new();
//! let engine = EnrichmentEngine::new(&VendorResolverFactory, &config, &registry);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod metrics;
pub mod mmdb;
pub mod record;
pub mod resolver;

pub use crate::config::{DatabaseVendorType, ResolverConfig};
pub use crate::engine::EnrichmentEngine;
pub use crate::error::Error;
pub use crate::metrics::ResolveTimer;
pub use crate::mmdb::{DatabaseSchema, MmdbResolver, VendorResolverFactory};
pub use crate::record::{FieldValue, Message, Record, INTERNAL_FIELD_PREFIX};
pub use crate::resolver::{
    AsnInformation, DisabledResolver, GeoIpResolver, LocationInformation, ResolverFactory,
    StaticResolver,
};
