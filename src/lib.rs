//! GPS speed/distance fusion pushed over a serial radio link to an
//! embedded display.
//!
//! Raw fixes flow through the fix filter and the speed tracker into a
//! latest-value slot; the transmitter drains that slot on a fixed period
//! and frames each sample as one ASCII line for the peripheral. The
//! computation layer (filter, smoothing, estimator, encoder) is free of
//! async and I/O so it can be exercised with recorded traces; the link
//! and scheduler live on tokio.

pub mod config;
pub mod encoder;
pub mod estimator;
pub mod filter;
pub mod geo;
pub mod link;
pub mod pipeline;
pub mod scheduler;
pub mod smoothing;
pub mod types;

pub use config::{SmoothingStrategy, TrackerConfig};
pub use encoder::encode;
pub use estimator::SpeedTracker;
pub use filter::{FilterVerdict, FixFilter, RejectReason};
pub use link::{LinkError, LinkSession, LinkState, TcpTransport, Transport, SPP_SERVICE_UUID};
pub use scheduler::{run_transmitter, TransmitStats};
pub use types::{FusedSample, RawFix, TemperatureReading, TemperatureSource};
