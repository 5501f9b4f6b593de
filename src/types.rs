use serde::{Deserialize, Serialize};

/// One raw location observation from the provider.
///
/// Fixes arrive at a nominal but non-guaranteed rate (100 ms - 1 s apart)
/// and are consumed immediately; nothing holds a backlog of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Speed in m/s as reported by the provider, when it has one.
    pub reported_speed_ms: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy_m: f64,
}

/// Where a temperature reading came from, in falling priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureSource {
    PhoneSensor,
    WeatherApi,
    Cached,
    None,
}

/// The (value, source) pair supplied by the external temperature provider.
/// This crate only consumes it; the fallback cascade lives elsewhere.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub temp_c: Option<f64>,
    pub source: TemperatureSource,
}

impl Default for TemperatureReading {
    fn default() -> Self {
        TemperatureReading {
            temp_c: None,
            source: TemperatureSource::None,
        }
    }
}

/// Fused telemetry snapshot published by the estimator.
///
/// Immutable: a new value replaces the previous one. `total_distance_km`
/// never decreases within a session and `speed_kmh` stays in [0, 200].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusedSample {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_ms: f64,
    pub speed_kmh: f64,
    pub total_distance_km: f64,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
    pub temperature_c: Option<f64>,
    pub temperature_source: TemperatureSource,
}
