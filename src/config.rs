use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which family of MMDB databases the resolvers read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseVendorType {
    /// MaxMind GeoIP2 / GeoLite2 City and ASN databases
    #[default]
    #[value(name = "maxmind")]
    MaxMind,
    /// IPinfo standard location and ASN databases
    Ipinfo,
}

impl DatabaseVendorType {
    /// Default file name of the location database.
    pub fn city_file_name(self) -> &'static str {
        match self {
            DatabaseVendorType::MaxMind => "GeoLite2-City.mmdb",
            DatabaseVendorType::Ipinfo => "standard_location.mmdb",
        }
    }

    /// Default file name of the ASN database.
    pub fn asn_file_name(self) -> &'static str {
        match self {
            DatabaseVendorType::MaxMind => "GeoLite2-ASN.mmdb",
            DatabaseVendorType::Ipinfo => "asn.mmdb",
        }
    }

    /// The first existing standard directory for this vendor's databases.
    pub fn default_dir(self) -> Utf8PathBuf {
        let candidates: &[&str] = match self {
            // Look for standard directories in this order
            DatabaseVendorType::MaxMind => &[
                "/usr/share/GeoIP",
                "/opt/homebrew/var/GeoIP",
                "/var/lib/GeoIP",
            ],
            DatabaseVendorType::Ipinfo => &["/usr/share/IPinfo"],
        };

        candidates
            .iter()
            .map(|p| Utf8PathBuf::from(*p))
            .find(|p| p.exists())
            .unwrap_or_else(|| Utf8PathBuf::from(candidates[0]))
    }
}

impl fmt::Display for DatabaseVendorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseVendorType::MaxMind => f.write_str("MaxMind"),
            DatabaseVendorType::Ipinfo => f.write_str("IPinfo"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Settings the resolver factory builds resolvers from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Master switch; when false both resolvers are disabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub vendor: DatabaseVendorType,
    #[serde(default)]
    pub city_db_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub asn_db_path: Option<Utf8PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vendor: DatabaseVendorType::default(),
            city_db_path: None,
            asn_db_path: None,
        }
    }
}

impl ResolverConfig {
    /// Reads a JSON configuration file.
    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| Error::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fills unset database paths with the vendor's file names inside `dir`.
    pub fn with_database_dir(mut self, dir: &Utf8Path) -> Self {
        if self.city_db_path.is_none() {
            self.city_db_path = Some(dir.join(self.vendor.city_file_name()));
        }
        if self.asn_db_path.is_none() {
            self.asn_db_path = Some(dir.join(self.vendor.asn_file_name()));
        }
        self
    }
}
