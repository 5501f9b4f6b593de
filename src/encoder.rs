//! Telemetry line encoder.
//!
//! The output is a wire contract with the peripheral firmware: field
//! order, precision and the `.` decimal separator are all fixed. Any
//! deviation breaks the consumer, so treat changes here as protocol
//! changes, not formatting tweaks.

use std::fmt::Write;

use crate::types::FusedSample;

/// Encode one fused sample as the ASCII line the peripheral parses:
/// `SPEED:%.2f,DIST:%.3f,LAT:%.6f,LON:%.6f[,TEMP:%.1f]\n`
///
/// TEMP and its leading comma are present only when the temperature is
/// known. Pure and total; Rust's formatter never localizes the decimal
/// separator.
pub fn encode(sample: &FusedSample) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "SPEED:{:.2},DIST:{:.3},LAT:{:.6},LON:{:.6}",
        sample.speed_kmh, sample.total_distance_km, sample.latitude, sample.longitude,
    );
    if let Some(temp) = sample.temperature_c {
        let _ = write!(line, ",TEMP:{:.1}", temp);
    }
    line.push('\n');
    line
}
