//! Async glue between the fix provider and the estimator.
//!
//! One task owns the `SpeedTracker`, consumes raw fixes in arrival order
//! from an mpsc channel and publishes each fused sample into a
//! single-slot watch channel. The transmitter only ever reads the latest
//! committed value; there is no backlog.

use tokio::sync::{mpsc, watch};

use crate::config::TrackerConfig;
use crate::estimator::SpeedTracker;
use crate::types::{FusedSample, RawFix, TemperatureReading};

/// Run the fusion pipeline until the fix channel closes.
///
/// `temperature` carries the latest reading from the external provider;
/// its value is stamped onto every published sample. A message on
/// `reset` zeroes the distance accumulator and starts a fresh session.
pub async fn run_pipeline(
    config: TrackerConfig,
    mut fixes: mpsc::Receiver<RawFix>,
    temperature: watch::Receiver<TemperatureReading>,
    mut reset: mpsc::Receiver<()>,
    latest: watch::Sender<Option<FusedSample>>,
) {
    let mut tracker = SpeedTracker::new(&config);

    loop {
        tokio::select! {
            // Reset commands take priority over buffered fixes so a
            // reset is not applied mid-way through stale data.
            biased;
            cmd = reset.recv() => {
                if cmd.is_none() { break }
                tracker.reset_distance();
            }
            fix = fixes.recv() => {
                let Some(fix) = fix else { break };
                if let Some(mut sample) = tracker.process(&fix) {
                    let reading = *temperature.borrow();
                    sample.temperature_c = reading.temp_c;
                    sample.temperature_source = reading.source;
                    if log::log_enabled!(log::Level::Trace) {
                        if let Ok(json) = serde_json::to_string(&sample) {
                            log::trace!("fused: {}", json);
                        }
                    }
                    if latest.send(Some(sample)).is_err() {
                        // Nobody is listening anymore.
                        break;
                    }
                }
            }
        }
    }

    log::debug!(
        "pipeline stopped: {} fixes accepted, {} rejected, {:.3} km",
        tracker.fixes_accepted(),
        tracker.fixes_rejected(),
        tracker.total_distance_km()
    );
}
