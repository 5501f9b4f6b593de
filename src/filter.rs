use crate::config::TrackerConfig;
use crate::geo::haversine_km;
use crate::types::RawFix;

/// Why a fix was dropped. Rejections are diagnostics, never errors;
/// they are logged and otherwise absorbed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RejectReason {
    /// Consecutive fixes arrived closer together than the minimum interval.
    TooFast { elapsed_s: f64 },
    /// Implausible position jump, treated as sensor error rather than motion.
    Teleportation { distance_km: f64 },
}

/// Outcome of validating one candidate fix against the previous one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterVerdict {
    Accepted {
        /// Great-circle distance from the previous fix, km. 0 for the
        /// first fix of a session.
        distance_km: f64,
        /// Seconds since the previous fix. 0 for the first fix.
        elapsed_s: f64,
        /// Sub-meter movement: count the distance but keep the previous
        /// speed instead of recomputing it from jitter.
        hold_speed: bool,
    },
    Rejected(RejectReason),
}

/// Validates raw fixes before they reach estimation.
///
/// Owns the previous-fix memory; `reset` clears it so the next fix is
/// treated as a fresh session start.
pub struct FixFilter {
    min_interval_s: f64,
    max_jump_km: f64,
    min_move_km: f64,
    low_accuracy_m: f64,
    previous: Option<RawFix>,
}

impl FixFilter {
    pub fn new(config: &TrackerConfig) -> Self {
        FixFilter {
            min_interval_s: config.min_fix_interval_s,
            max_jump_km: config.max_jump_km,
            min_move_km: config.min_move_km,
            low_accuracy_m: config.low_accuracy_m,
            previous: None,
        }
    }

    /// Validate `candidate` against the previous fix.
    ///
    /// Every candidate becomes the anchor for the next comparison,
    /// accepted or not, so a teleport (GPS reacquired after a tunnel)
    /// costs exactly one dropped fix before tracking resumes at the new
    /// location.
    pub fn accept(&mut self, candidate: &RawFix) -> FilterVerdict {
        if candidate.accuracy_m > self.low_accuracy_m {
            log::warn!(
                "low GPS accuracy: {:.1} m, using fix anyway",
                candidate.accuracy_m
            );
        }

        let (elapsed_s, distance_km) = match &self.previous {
            Some(prev) => (
                (candidate.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0,
                haversine_km(
                    prev.latitude,
                    prev.longitude,
                    candidate.latitude,
                    candidate.longitude,
                ),
            ),
            None => {
                self.previous = Some(candidate.clone());
                return FilterVerdict::Accepted {
                    distance_km: 0.0,
                    elapsed_s: 0.0,
                    hold_speed: false,
                };
            }
        };
        self.previous = Some(candidate.clone());

        if elapsed_s < self.min_interval_s {
            log::debug!("fix dropped, update too fast: {:.3} s", elapsed_s);
            return FilterVerdict::Rejected(RejectReason::TooFast { elapsed_s });
        }
        if distance_km > self.max_jump_km {
            log::debug!(
                "fix dropped, teleportation: {:.1} m",
                distance_km * 1000.0
            );
            return FilterVerdict::Rejected(RejectReason::Teleportation { distance_km });
        }

        let hold_speed = distance_km > 0.0 && distance_km < self.min_move_km;
        FilterVerdict::Accepted {
            distance_km,
            elapsed_s,
            hold_speed,
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
