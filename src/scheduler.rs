//! Periodic transmitter: every tick, push the latest fused sample over
//! the link. Never queues; a slow link silently skips intermediate
//! samples. A failed send triggers one bounded reconnect; an exhausted
//! reconnect ends the session with a link-lost error.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::interval;

use crate::config::TrackerConfig;
use crate::encoder::encode;
use crate::link::{LinkError, LinkSession, Transport};
use crate::types::FusedSample;

/// Transmit counters reported when the transmitter stops.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransmitStats {
    pub lines_sent: u64,
    pub reconnects: u64,
}

/// Run the transmit loop until shutdown is signalled or the link is
/// lost. Holds the session lock only for the duration of one operation,
/// so an externally triggered `disconnect` interleaves safely.
///
/// Returns the counters on orderly shutdown and
/// `LinkError::TransmissionExhausted` when a post-failure reconnect ran
/// out of attempts; the caller must then start a new session explicitly.
pub async fn run_transmitter<T: Transport>(
    config: &TrackerConfig,
    link: Arc<Mutex<LinkSession<T>>>,
    latest: watch::Receiver<Option<FusedSample>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<TransmitStats, LinkError> {
    let mut ticker = interval(config.send_period);
    let mut stats = TransmitStats::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                log::debug!(
                    "transmitter stopping after {} lines, {} reconnects",
                    stats.lines_sent,
                    stats.reconnects
                );
                return Ok(stats);
            }
        }

        // Latest committed sample only; earlier ones are intentionally
        // skipped rather than backed up.
        let sample = latest.borrow().clone();
        let Some(sample) = sample else { continue };
        let line = encode(&sample);

        let mut session = link.lock().await;
        if !session.is_connected() {
            continue;
        }

        if session.send(line.as_bytes()).await {
            stats.lines_sent += 1;
            continue;
        }

        log::warn!("send failed, attempting reconnect");
        stats.reconnects += 1;
        match session.reconnect(config.reconnect_retries).await {
            Ok(()) => log::info!("link restored, resuming transmission"),
            Err(e) => {
                log::error!("reconnect exhausted, link lost: {}", e);
                return Err(LinkError::TransmissionExhausted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::link::LinkState;
    use crate::types::TemperatureSource;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::AsyncWrite;

    #[derive(Clone, Default)]
    struct MockStream {
        written: Arc<StdMutex<Vec<u8>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "peer gone",
                )));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        script: Arc<StdMutex<VecDeque<io::Result<MockStream>>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockTransport {
        fn push_ok(&self, stream: MockStream) {
            self.script.lock().unwrap().push_back(Ok(stream));
        }

        fn push_err(&self) {
            self.script
                .lock()
                .unwrap()
                .push_back(Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
        }
    }

    impl crate::link::Transport for MockTransport {
        type Stream = MockStream;

        fn connect(
            &self,
            _address: &str,
        ) -> impl Future<Output = io::Result<MockStream>> + Send {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "script empty")));
            async move { outcome }
        }
    }

    fn sample(speed_kmh: f64) -> FusedSample {
        FusedSample {
            latitude: 41.00824,
            longitude: 28.978359,
            speed_ms: speed_kmh / 3.6,
            speed_kmh,
            total_distance_km: 1.32,
            accuracy_m: 5.0,
            timestamp_ms: 0,
            temperature_c: None,
            temperature_source: TemperatureSource::None,
        }
    }

    async fn connected_session(
        transport: MockTransport,
    ) -> Arc<Mutex<LinkSession<MockTransport>>> {
        let mut session = LinkSession::new(transport, Duration::from_millis(500));
        session.connect("addr", 1).await.unwrap();
        Arc::new(Mutex::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn transmits_only_the_latest_sample() {
        let transport = MockTransport::default();
        let stream = MockStream::default();
        let written = stream.written.clone();
        transport.push_ok(stream);
        let link = connected_session(transport).await;

        let (latest_tx, latest_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Two updates land before the first tick fires; only the second
        // may go out.
        latest_tx.send(Some(sample(10.0))).unwrap();
        latest_tx.send(Some(sample(45.5))).unwrap();

        let config = TrackerConfig::default();
        let handle = tokio::spawn({
            let link = link.clone();
            async move { run_transmitter(&config, link, latest_rx, shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        let bytes = written.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("SPEED:45.50,"));
        assert!(!text.contains("SPEED:10.00,"));
        assert!(stats.lines_sent >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_sample_means_no_send() {
        let transport = MockTransport::default();
        let stream = MockStream::default();
        let written = stream.written.clone();
        transport.push_ok(stream);
        let link = connected_session(transport).await;

        let (_latest_tx, latest_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let config = TrackerConfig::default();
        let handle = tokio::spawn({
            let link = link.clone();
            async move { run_transmitter(&config, link, latest_rx, shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert!(written.lock().unwrap().is_empty());
        assert_eq!(stats.lines_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_recovers_through_reconnect() {
        let transport = MockTransport::default();
        let bad = MockStream::default();
        bad.fail_writes.store(true, Ordering::SeqCst);
        let good = MockStream::default();
        let written = good.written.clone();
        transport.push_ok(bad);
        transport.push_ok(good);
        let link = connected_session(transport).await;

        let (latest_tx, latest_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        latest_tx.send(Some(sample(45.5))).unwrap();

        let config = TrackerConfig::default();
        let handle = tokio::spawn({
            let link = link.clone();
            async move { run_transmitter(&config, link, latest_rx, shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        // Failed once, reconnected, then delivered on the new stream.
        assert_eq!(stats.reconnects, 1);
        assert!(stats.lines_sent >= 1);
        assert!(!written.lock().unwrap().is_empty());
        assert!(link.lock().await.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnect_is_terminal() {
        let transport = MockTransport::default();
        let bad = MockStream::default();
        bad.fail_writes.store(true, Ordering::SeqCst);
        transport.push_ok(bad);
        transport.push_err();
        transport.push_err();
        let attempts = transport.attempts.clone();
        let link = connected_session(transport).await;

        let (latest_tx, latest_rx) = watch::channel(None);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        latest_tx.send(Some(sample(45.5))).unwrap();

        let config = TrackerConfig::default();
        let result = run_transmitter(&config, link.clone(), latest_rx, shutdown_rx).await;

        assert!(matches!(result, Err(LinkError::TransmissionExhausted)));
        // Initial connect plus the two reconnect attempts.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(link.lock().await.state(), LinkState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_sending_while_disconnected() {
        let transport = MockTransport::default();
        let stream = MockStream::default();
        let written = stream.written.clone();
        transport.push_ok(stream);
        let link = connected_session(transport).await;

        // Externally triggered disconnect before any tick.
        link.lock().await.disconnect();

        let (latest_tx, latest_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        latest_tx.send(Some(sample(45.5))).unwrap();

        let config = TrackerConfig::default();
        let handle = tokio::spawn({
            let link = link.clone();
            async move { run_transmitter(&config, link, latest_rx, shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.lines_sent, 0);
        assert!(written.lock().unwrap().is_empty());
    }
}
