use crate::config::TrackerConfig;
use crate::filter::{FilterVerdict, FixFilter};
use crate::smoothing::{Observation, Smoother};
use crate::types::{FusedSample, RawFix, TemperatureSource};

/// Fuses validated fixes into speed and distance estimates.
///
/// Owns the fix filter, the smoothing strategy and the distance
/// accumulator; all three reset together. Pure computation, no I/O.
pub struct SpeedTracker {
    filter: FixFilter,
    smoother: Smoother,
    max_speed_kmh: f64,
    total_distance_km: f64,
    last_raw_speed_kmh: f64,
    fixes_accepted: u64,
    fixes_rejected: u64,
}

impl SpeedTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        SpeedTracker {
            filter: FixFilter::new(config),
            smoother: Smoother::from_config(config),
            max_speed_kmh: config.max_speed_kmh,
            total_distance_km: 0.0,
            last_raw_speed_kmh: 0.0,
            fixes_accepted: 0,
            fixes_rejected: 0,
        }
    }

    /// Consume one raw fix. Returns a fused sample when the smoothing
    /// strategy publishes one; `None` when the fix was rejected or the
    /// strategy is still batching. Temperature fields are left empty for
    /// the caller to enrich.
    pub fn process(&mut self, fix: &RawFix) -> Option<FusedSample> {
        let (distance_km, elapsed_s, hold_speed) = match self.filter.accept(fix) {
            FilterVerdict::Accepted {
                distance_km,
                elapsed_s,
                hold_speed,
            } => (distance_km, elapsed_s, hold_speed),
            FilterVerdict::Rejected(_) => {
                self.fixes_rejected += 1;
                return None;
            }
        };

        self.fixes_accepted += 1;
        self.total_distance_km += distance_km;

        let raw_speed_kmh = self.derive_raw_speed(fix, distance_km, elapsed_s, hold_speed);
        self.last_raw_speed_kmh = raw_speed_kmh;

        let estimate = self.smoother.smooth(&Observation {
            speed_kmh: raw_speed_kmh,
            distance_km: self.total_distance_km,
            latitude: fix.latitude,
            longitude: fix.longitude,
            elapsed_s,
        })?;

        let speed_kmh = estimate.speed_kmh.clamp(0.0, self.max_speed_kmh);
        Some(FusedSample {
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed_ms: speed_kmh / 3.6,
            speed_kmh,
            total_distance_km: estimate.distance_km,
            accuracy_m: fix.accuracy_m,
            timestamp_ms: fix.timestamp_ms,
            temperature_c: None,
            temperature_source: TemperatureSource::None,
        })
    }

    /// Provider speed wins when present and positive; otherwise speed is
    /// derived from distance over time, and sub-meter movement holds the
    /// previous value rather than recomputing from jitter.
    fn derive_raw_speed(
        &self,
        fix: &RawFix,
        distance_km: f64,
        elapsed_s: f64,
        hold_speed: bool,
    ) -> f64 {
        if let Some(speed_ms) = fix.reported_speed_ms {
            if speed_ms > 0.0 {
                return (speed_ms * 3.6).clamp(0.0, self.max_speed_kmh);
            }
        }
        if hold_speed {
            return self.last_raw_speed_kmh;
        }
        if elapsed_s > 0.0 {
            (distance_km / elapsed_s * 3600.0).clamp(0.0, self.max_speed_kmh)
        } else {
            0.0
        }
    }

    /// Running distance accumulator, km. Advances on every accepted fix
    /// regardless of what the smoothing strategy publishes.
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    /// Zero the distance and forget the previous fix, so the next fix is
    /// a fresh session start.
    pub fn reset_distance(&mut self) {
        self.total_distance_km = 0.0;
        self.last_raw_speed_kmh = 0.0;
        self.filter.reset();
        self.smoother.reset();
        log::debug!("distance reset");
    }

    pub fn fixes_accepted(&self) -> u64 {
        self.fixes_accepted
    }

    pub fn fixes_rejected(&self) -> u64 {
        self.fixes_rejected
    }
}
