use std::time::Duration;

/// Which smoothing strategy the estimator runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmoothingStrategy {
    /// Batch N raw values, publish their mean, clear. ~1 Hz output
    /// from ~10 Hz input with the default window.
    MovingAverage,
    /// Independent scalar Kalman filter per channel (speed, distance).
    ScalarKalman,
    /// Constant-velocity Kalman over [x, y, vx, vy] in local meters.
    ConstantVelocityEkf,
}

/// Everything tunable about the fix filter, estimator, link and scheduler.
///
/// Constructors take the config; no module reads process-wide constants.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    // ── Fix filter ──
    /// Updates closer together than this are dropped as too fast.
    pub min_fix_interval_s: f64,
    /// Jumps longer than this between consecutive fixes are dropped
    /// as teleportation.
    pub max_jump_km: f64,
    /// Below this distance the previous speed is held (sub-meter jitter).
    pub min_move_km: f64,
    /// Accuracy beyond this only downgrades confidence, never rejects.
    pub low_accuracy_m: f64,

    // ── Estimator ──
    pub strategy: SmoothingStrategy,
    /// Hard ceiling on published speed, km/h.
    pub max_speed_kmh: f64,
    /// Moving-average window (samples per emission).
    pub average_window: usize,
    /// Scalar Kalman parameters, shared by both channels.
    pub kalman_process_noise: f64,
    pub kalman_measurement_noise: f64,
    pub kalman_initial_error: f64,
    /// Constant-velocity EKF noise diagonals.
    pub ekf_process_noise: f64,
    pub ekf_measurement_noise: f64,
    pub ekf_initial_covariance: f64,

    // ── Link session ──
    /// Gap between failed connect attempts.
    pub connect_retry_delay: Duration,

    // ── Scheduler ──
    /// Transmission period.
    pub send_period: Duration,
    /// Reconnect attempts after a failed send before giving up.
    pub reconnect_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_fix_interval_s: 0.5,
            max_jump_km: 0.03,
            min_move_km: 0.001,
            low_accuracy_m: 50.0,
            strategy: SmoothingStrategy::MovingAverage,
            max_speed_kmh: 200.0,
            average_window: 10,
            kalman_process_noise: 1.0,
            kalman_measurement_noise: 1.0,
            kalman_initial_error: 1.0,
            ekf_process_noise: 0.1,
            ekf_measurement_noise: 4.0,
            ekf_initial_covariance: 10.0,
            connect_retry_delay: Duration::from_millis(500),
            send_period: Duration::from_secs(1),
            reconnect_retries: 2,
        }
    }
}
