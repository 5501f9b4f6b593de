//! The three interchangeable smoothing strategies behind the estimator:
//! moving average, scalar Kalman per channel, constant-velocity Kalman.
//!
//! Everything here is pure computation: samples in, estimates out. No
//! async, no I/O, so it is unit-testable with synthetic traces.

use nalgebra::Vector4;

use crate::config::{SmoothingStrategy, TrackerConfig};
use crate::geo::latlon_to_meters;

/// One raw per-fix measurement handed to a strategy.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub speed_kmh: f64,
    /// Running distance total, km. Non-decreasing.
    pub distance_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Seconds since the previous accepted fix. 0 on the first fix.
    pub elapsed_s: f64,
}

/// Smoothed (speed, distance) pair a strategy decided to publish.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothedEstimate {
    pub speed_kmh: f64,
    pub distance_km: f64,
}

// ─── Moving average ──────────────────────────────────────────────────────────

/// Batches the last N raw speed and distance values and emits their mean
/// on every Nth input, then clears. ~10 Hz fixes become ~1 Hz output.
pub struct MovingAverage {
    speeds: Vec<f64>,
    distances: Vec<f64>,
    window: usize,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        MovingAverage {
            speeds: Vec::with_capacity(window),
            distances: Vec::with_capacity(window),
            window,
        }
    }

    fn push(&mut self, speed_kmh: f64, distance_km: f64) -> Option<SmoothedEstimate> {
        self.speeds.push(speed_kmh);
        self.distances.push(distance_km);
        if self.speeds.len() < self.window {
            return None;
        }
        let n = self.speeds.len() as f64;
        let estimate = SmoothedEstimate {
            speed_kmh: self.speeds.iter().sum::<f64>() / n,
            distance_km: self.distances.iter().sum::<f64>() / n,
        };
        self.speeds.clear();
        self.distances.clear();
        Some(estimate)
    }

    fn clear(&mut self) {
        self.speeds.clear();
        self.distances.clear();
    }
}

// ─── Scalar Kalman ───────────────────────────────────────────────────────────

/// One-dimensional Kalman filter: `gain = P/(P+R)`,
/// `estimate += gain * (z - estimate)`, `P = (1-gain)*P + Q`.
pub struct ScalarKalman {
    process_noise: f64,
    measurement_noise: f64,
    error: f64,
    initial_error: f64,
    estimate: f64,
}

impl ScalarKalman {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_error: f64) -> Self {
        ScalarKalman {
            process_noise,
            measurement_noise,
            error: initial_error,
            initial_error,
            estimate: 0.0,
        }
    }

    pub fn update(&mut self, measurement: f64) -> f64 {
        let gain = self.error / (self.error + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.error = (1.0 - gain) * self.error + self.process_noise;
        self.estimate
    }

    pub fn reset(&mut self) {
        self.estimate = 0.0;
        self.error = self.initial_error;
    }
}

// ─── Constant-velocity Kalman over [x, y, vx, vy] ────────────────────────────

/// Constant-velocity filter in local tangent-plane meters.
///
/// Predict: `x += vx*dt + 0.5*ax*dt²` (acceleration inputs are zero
/// without an inertial sensor), `P += Q`. Update: identity measurement
/// model over [x, y, vx, vy]; the innovation covariance is inverted per
/// diagonal element only (`K[i] = P[i]/(P[i]+R)`), which is the shipped
/// behavior of this filter, not a full matrix solve.
pub struct ConstantVelocityEkf {
    state: Vector4<f64>,
    covariance: Vector4<f64>,
    process_noise: f64,
    measurement_noise: f64,
    initial_covariance: f64,
    origin: Option<(f64, f64)>,
    last_local: Option<(f64, f64)>,
}

impl ConstantVelocityEkf {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_covariance: f64) -> Self {
        ConstantVelocityEkf {
            state: Vector4::zeros(),
            covariance: Vector4::repeat(initial_covariance),
            process_noise,
            measurement_noise,
            initial_covariance,
            origin: None,
            last_local: None,
        }
    }

    /// Predict step with acceleration inputs defaulting to zero.
    pub fn predict(&mut self, dt: f64, ax: f64, ay: f64) {
        let dt2 = dt * dt;
        self.state[0] += self.state[2] * dt + 0.5 * ax * dt2;
        self.state[1] += self.state[3] * dt + 0.5 * ay * dt2;
        self.state[2] += ax * dt;
        self.state[3] += ay * dt;
        for i in 0..4 {
            self.covariance[i] += self.process_noise;
        }
    }

    /// Measurement update with per-diagonal gains.
    pub fn update(&mut self, measurement: Vector4<f64>) {
        for i in 0..4 {
            let innovation_cov = self.covariance[i] + self.measurement_noise;
            let gain = self.covariance[i] / innovation_cov;
            self.state[i] += gain * (measurement[i] - self.state[i]);
            self.covariance[i] = (1.0 - gain) * self.covariance[i];
        }
    }

    pub fn speed_ms(&self) -> f64 {
        (self.state[2] * self.state[2] + self.state[3] * self.state[3]).sqrt()
    }

    fn observe(&mut self, obs: &Observation) -> SmoothedEstimate {
        let (origin_lat, origin_lon) = match self.origin {
            Some(origin) => origin,
            None => {
                self.origin = Some((obs.latitude, obs.longitude));
                self.last_local = Some((0.0, 0.0));
                return SmoothedEstimate {
                    speed_kmh: obs.speed_kmh,
                    distance_km: obs.distance_km,
                };
            }
        };

        let (x, y) = latlon_to_meters(obs.latitude, obs.longitude, origin_lat, origin_lon);

        // Decompose the scalar speed along the displacement direction to
        // get the velocity observation.
        let (vx, vy) = match self.last_local {
            Some((px, py)) => {
                let dx = x - px;
                let dy = y - py;
                let norm = (dx * dx + dy * dy).sqrt();
                if norm > 1e-9 {
                    let v = obs.speed_kmh / 3.6;
                    (v * dx / norm, v * dy / norm)
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };

        if obs.elapsed_s > 0.0 {
            self.predict(obs.elapsed_s, 0.0, 0.0);
        }
        self.update(Vector4::new(x, y, vx, vy));
        self.last_local = Some((x, y));

        SmoothedEstimate {
            speed_kmh: self.speed_ms() * 3.6,
            distance_km: obs.distance_km,
        }
    }

    fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Vector4::repeat(self.initial_covariance);
        self.origin = None;
        self.last_local = None;
    }
}

// ─── Strategy dispatch ───────────────────────────────────────────────────────

/// Closed set of smoothing strategies, selected at construction time.
pub enum Smoother {
    MovingAverage(MovingAverage),
    ScalarKalman {
        speed: ScalarKalman,
        distance: ScalarKalman,
    },
    ConstantVelocity(ConstantVelocityEkf),
}

impl Smoother {
    pub fn from_config(config: &TrackerConfig) -> Self {
        match config.strategy {
            SmoothingStrategy::MovingAverage => {
                Smoother::MovingAverage(MovingAverage::new(config.average_window))
            }
            SmoothingStrategy::ScalarKalman => Smoother::ScalarKalman {
                speed: ScalarKalman::new(
                    config.kalman_process_noise,
                    config.kalman_measurement_noise,
                    config.kalman_initial_error,
                ),
                distance: ScalarKalman::new(
                    config.kalman_process_noise,
                    config.kalman_measurement_noise,
                    config.kalman_initial_error,
                ),
            },
            SmoothingStrategy::ConstantVelocityEkf => {
                Smoother::ConstantVelocity(ConstantVelocityEkf::new(
                    config.ekf_process_noise,
                    config.ekf_measurement_noise,
                    config.ekf_initial_covariance,
                ))
            }
        }
    }

    /// Consume one raw measurement. `None` means the strategy has nothing
    /// new to publish yet (moving average between batch boundaries).
    pub fn smooth(&mut self, obs: &Observation) -> Option<SmoothedEstimate> {
        match self {
            Smoother::MovingAverage(avg) => avg.push(obs.speed_kmh, obs.distance_km),
            Smoother::ScalarKalman { speed, distance } => Some(SmoothedEstimate {
                speed_kmh: speed.update(obs.speed_kmh),
                distance_km: distance.update(obs.distance_km),
            }),
            Smoother::ConstantVelocity(ekf) => Some(ekf.observe(obs)),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Smoother::MovingAverage(avg) => avg.clear(),
            Smoother::ScalarKalman { speed, distance } => {
                speed.reset();
                distance.reset();
            }
            Smoother::ConstantVelocity(ekf) => ekf.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn moving_average_emits_every_nth_input() {
        let mut avg = MovingAverage::new(3);
        assert!(avg.push(10.0, 1.0).is_none());
        assert!(avg.push(20.0, 2.0).is_none());
        let out = avg.push(30.0, 3.0).unwrap();
        assert_abs_diff_eq!(out.speed_kmh, 20.0);
        assert_abs_diff_eq!(out.distance_km, 2.0);

        // Buffer cleared; the next batch starts from scratch.
        assert!(avg.push(60.0, 4.0).is_none());
    }

    #[test]
    fn scalar_kalman_converges_to_steady_measurement() {
        let mut k = ScalarKalman::new(0.01, 1.0, 1.0);
        let mut estimate = 0.0;
        for _ in 0..50 {
            estimate = k.update(42.0);
        }
        assert_relative_eq!(estimate, 42.0, max_relative = 0.05);
    }

    #[test]
    fn scalar_kalman_moves_toward_measurement() {
        let mut k = ScalarKalman::new(1.0, 1.0, 1.0);
        let first = k.update(10.0);
        assert!(first > 0.0 && first < 10.0);
    }

    #[test]
    fn scalar_kalman_reset_restores_initial_state() {
        let mut k = ScalarKalman::new(1.0, 1.0, 1.0);
        k.update(10.0);
        k.reset();
        let first = k.update(10.0);
        // gain 1/(1+1) from the restored initial error
        assert_abs_diff_eq!(first, 5.0);
    }

    #[test]
    fn cv_ekf_predict_integrates_velocity() {
        let mut ekf = ConstantVelocityEkf::new(0.1, 4.0, 10.0);
        ekf.state = Vector4::new(0.0, 0.0, 3.0, 4.0);
        ekf.predict(2.0, 0.0, 0.0);
        assert_abs_diff_eq!(ekf.state[0], 6.0);
        assert_abs_diff_eq!(ekf.state[1], 8.0);
        assert_abs_diff_eq!(ekf.speed_ms(), 5.0);
    }

    #[test]
    fn cv_ekf_gain_uses_diagonal_innovation_only() {
        // Each gain is P[i]/(P[i]+R) with no cross-coupling between state
        // components: a measurement that only moves one component must
        // leave the others untouched. Pinned so nobody "fixes" it into a
        // full matrix solve without noticing.
        let mut ekf = ConstantVelocityEkf::new(0.0, 10.0, 10.0);
        ekf.update(Vector4::new(100.0, 0.0, 0.0, 0.0));
        // gain = 10/(10+10) = 0.5
        assert_abs_diff_eq!(ekf.state[0], 50.0);
        assert_abs_diff_eq!(ekf.state[1], 0.0);
        assert_abs_diff_eq!(ekf.state[2], 0.0);
        assert_abs_diff_eq!(ekf.state[3], 0.0);
        assert_abs_diff_eq!(ekf.covariance[0], 5.0);
    }

    #[test]
    fn cv_ekf_first_observation_passes_through() {
        let mut ekf = ConstantVelocityEkf::new(0.1, 4.0, 10.0);
        let out = ekf.observe(&Observation {
            speed_kmh: 36.0,
            distance_km: 0.5,
            latitude: 41.0,
            longitude: 29.0,
            elapsed_s: 0.0,
        });
        assert_abs_diff_eq!(out.speed_kmh, 36.0);
        assert_abs_diff_eq!(out.distance_km, 0.5);
    }

    #[test]
    fn cv_ekf_tracks_steady_motion() {
        let mut ekf = ConstantVelocityEkf::new(0.1, 4.0, 10.0);
        // Northbound at 10 m/s, one fix per second.
        let mut total = 0.0;
        let mut last = SmoothedEstimate {
            speed_kmh: 0.0,
            distance_km: 0.0,
        };
        for i in 0..60 {
            let lat = 41.0 + i as f64 * 10.0 / 111_190.0;
            total += 0.010;
            last = ekf.observe(&Observation {
                speed_kmh: 36.0,
                distance_km: total,
                latitude: lat,
                longitude: 29.0,
                elapsed_s: 1.0,
            });
        }
        assert_relative_eq!(last.speed_kmh, 36.0, max_relative = 0.15);
    }
}
