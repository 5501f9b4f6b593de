use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, Duration};

use speedlink_rs::config::{SmoothingStrategy, TrackerConfig};
use speedlink_rs::link::{LinkSession, TcpTransport};
use speedlink_rs::pipeline::run_pipeline;
use speedlink_rs::scheduler::run_transmitter;
use speedlink_rs::types::{RawFix, TemperatureReading, TemperatureSource};

#[derive(Parser, Debug)]
#[command(name = "speedlink")]
#[command(about = "GPS speed/distance telemetry over a serial radio link", long_about = None)]
struct Args {
    /// Peripheral address (RFCOMM/TCP bridge endpoint)
    #[arg(long, default_value = "127.0.0.1:9100")]
    address: String,

    /// Smoothing strategy (average, kalman, ekf)
    #[arg(long, default_value = "average")]
    strategy: String,

    /// Transmission period in milliseconds
    #[arg(long, default_value = "1000")]
    period_ms: u64,

    /// Connection attempts before giving up
    #[arg(long, default_value = "3")]
    connect_retries: u32,

    /// Ambient temperature in degrees C to stamp on telemetry
    /// (omitted from the wire format when not given)
    #[arg(long)]
    temperature: Option<f64>,

    /// Duration in seconds (0 = run until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let strategy = match args.strategy.as_str() {
        "average" => SmoothingStrategy::MovingAverage,
        "kalman" => SmoothingStrategy::ScalarKalman,
        "ekf" => SmoothingStrategy::ConstantVelocityEkf,
        other => bail!("unknown strategy: {other} (expected average, kalman or ekf)"),
    };
    let config = TrackerConfig {
        strategy,
        send_period: Duration::from_millis(args.period_ms),
        ..TrackerConfig::default()
    };

    println!("[{}] speedlink starting", ts_now());
    println!("  Peripheral: {}", args.address);
    println!("  Strategy: {}", args.strategy);
    println!("  Period: {} ms", args.period_ms);

    // Connect before spinning up any tasks; a peripheral that is not
    // there is a startup failure, not something to limp past.
    let link = Arc::new(Mutex::new(LinkSession::new(
        TcpTransport,
        config.connect_retry_delay,
    )));
    if let Err(e) = link
        .lock()
        .await
        .connect(&args.address, args.connect_retries)
        .await
    {
        let detail = link
            .lock()
            .await
            .last_error()
            .unwrap_or("unknown")
            .to_string();
        bail!("{e} ({detail})");
    }
    println!("[{}] link {}", ts_now(), link.lock().await.state().describe());

    // Channels: raw fixes in arrival order, everything else latest-value.
    let (fix_tx, fix_rx) = mpsc::channel::<RawFix>(100);
    let (temp_tx, temp_rx) = watch::channel(TemperatureReading::default());
    let (reset_tx, reset_rx) = mpsc::channel::<()>(1);
    let (latest_tx, latest_rx) = watch::channel(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // A fixed CLI reading stands in for the external temperature cascade.
    if let Some(temp_c) = args.temperature {
        let _ = temp_tx.send(TemperatureReading {
            temp_c: Some(temp_c),
            source: TemperatureSource::PhoneSensor,
        });
    }

    let provider = tokio::spawn(mock_fix_loop(fix_tx));
    // SIGUSR1 stands in for the reset-distance action on the device UI.
    let reset_driver = tokio::spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("reset signal unavailable: {}", e);
                return;
            }
        };
        while usr1.recv().await.is_some() {
            println!("[{}] distance reset requested", ts_now());
            if reset_tx.send(()).await.is_err() {
                break;
            }
        }
    });
    let pipeline = tokio::spawn(run_pipeline(
        config.clone(),
        fix_rx,
        temp_rx,
        reset_rx,
        latest_tx,
    ));
    let mut transmitter = tokio::spawn({
        let link = link.clone();
        let config = config.clone();
        async move { run_transmitter(&config, link, latest_rx, shutdown_rx).await }
    });

    // Run until the deadline, Ctrl-C, or a lost link.
    let result = tokio::select! {
        _ = wait_deadline(args.duration) => {
            println!("[{}] duration reached, stopping", ts_now());
            let _ = shutdown_tx.send(true);
            (&mut transmitter).await?
        }
        _ = tokio::signal::ctrl_c() => {
            println!("[{}] interrupted, stopping", ts_now());
            let _ = shutdown_tx.send(true);
            (&mut transmitter).await?
        }
        result = &mut transmitter => result?,
    };

    // Teardown order matters: the transmitter is already stopped, then
    // the fix flow, then the link, so nothing touches a released
    // connection. Closing the provider closes the fix channel, which
    // lets the pipeline drain and exit.
    provider.abort();
    reset_driver.abort();
    pipeline.await?;
    link.lock().await.disconnect();

    match result {
        Ok(stats) => {
            println!("\n=== Final Stats ===");
            println!("Lines sent: {}", stats.lines_sent);
            println!("Reconnects: {}", stats.reconnects);
            Ok(())
        }
        Err(e) => {
            let detail = link
                .lock()
                .await
                .last_error()
                .unwrap_or("unknown")
                .to_string();
            println!("[{}] link lost: {} ({})", ts_now(), e, detail);
            bail!("{e}")
        }
    }
}

async fn wait_deadline(duration_secs: u64) {
    if duration_secs == 0 {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;
}

/// Mock location provider: a plausible drive heading north with a gently
/// varying speed, one fix per second (typical GPS hardware cadence, and
/// comfortably above the filter's minimum interval). Stands in for real
/// hardware so the whole loop can run on a desk.
async fn mock_fix_loop(tx: mpsc::Sender<RawFix>) {
    let mut ticker = interval(Duration::from_millis(1000));
    let mut lat = 41.00824_f64;
    let lon = 28.978359_f64;
    let mut count = 0u64;

    loop {
        ticker.tick().await;
        count += 1;

        let t = count as f64;
        let speed_ms = 12.0 + 4.0 * (t * 0.1).sin();
        lat += speed_ms / 111_190.0; // northbound
        let fix = RawFix {
            latitude: lat,
            longitude: lon,
            timestamp_ms: Utc::now().timestamp_millis(),
            reported_speed_ms: Some(speed_ms),
            accuracy_m: 5.0 + 2.0 * (t * 0.3).sin().abs(),
        };

        match tx.try_send(fix) {
            Ok(_) => {
                if count % 50 == 0 {
                    log::debug!("[gps] {} fixes produced", count);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Pipeline is behind; drop this fix.
            }
        }
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
