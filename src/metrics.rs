//! Timing instrument shared by the location and ASN resolvers.

use prometheus::{Histogram, HistogramOpts, Registry};

use crate::error::Result;

const RESOLVE_TIME_NAME: &str = "geoip_resolver_engine_resolve_time_seconds";
const RESOLVE_TIME_HELP: &str = "Time spent resolving an IP address against a GeoIP database";

/// A cloneable handle to the resolve-time histogram.
///
/// Clones share the same underlying histogram, so the location and ASN
/// resolvers both report into one series.
#[derive(Clone, Debug)]
pub struct ResolveTimer {
    histogram: Option<Histogram>,
}

impl ResolveTimer {
    /// Creates the histogram and registers it in `registry`.
    ///
    /// Never fails: if registration is rejected (for example because an engine
    /// was already created against the same registry) the histogram keeps
    /// working unregistered.
    pub fn register(registry: &Registry) -> Self {
        Self::try_register(registry).unwrap_or_else(|err| {
            tracing::warn!("could not register {}: {}", RESOLVE_TIME_NAME, err);
            Self::unregistered()
        })
    }

    /// Creates the histogram and registers it in `registry`, reporting a
    /// rejected registration as [`Error::Metrics`](crate::Error::Metrics).
    pub fn try_register(registry: &Registry) -> Result<Self> {
        let histogram = Histogram::with_opts(histogram_opts())?;
        registry.register(Box::new(histogram.clone()))?;
        Ok(Self {
            histogram: Some(histogram),
        })
    }

    /// Creates a histogram that is not exported anywhere.
    pub fn unregistered() -> Self {
        match Histogram::with_opts(histogram_opts()) {
            Ok(histogram) => Self {
                histogram: Some(histogram),
            },
            Err(err) => {
                tracing::warn!("resolve timing disabled: {}", err);
                Self { histogram: None }
            }
        }
    }

    /// Runs `f`, recording its duration.
    #[inline]
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.histogram.as_ref().map(Histogram::start_timer);
        f()
    }

    /// Number of observations recorded so far.
    pub fn sample_count(&self) -> u64 {
        self.histogram
            .as_ref()
            .map_or(0, Histogram::get_sample_count)
    }
}

fn histogram_opts() -> HistogramOpts {
    HistogramOpts::new(RESOLVE_TIME_NAME, RESOLVE_TIME_HELP).buckets(vec![
        0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05,
    ])
}

impl Default for ResolveTimer {
    fn default() -> Self {
        Self::unregistered()
    }
}
