use camino::Utf8PathBuf;

/// Error types for the geoipenrich library.
///
/// None of these ever reach a caller of
/// [`EnrichmentEngine::enrich`](crate::EnrichmentEngine::enrich); they surface
/// while configuring the engine and are absorbed by the resolvers into
/// "disabled" or "miss".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// MMDB database file was not found at the expected path.
    #[error("database not found: {path}")]
    DatabaseNotFound { path: Utf8PathBuf },

    /// MMDB database file exists but could not be opened.
    #[error("failed to open database {path}")]
    DatabaseOpen {
        path: Utf8PathBuf,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// IP address lookup failed in the MMDB database.
    #[error("lookup failed for {ip}")]
    LookupFailed {
        ip: String,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// Resolver configuration file is malformed.
    #[error("invalid configuration in {path}")]
    InvalidConfig {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A metric could not be created or registered.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
