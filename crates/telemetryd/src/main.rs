//! Telemetry Daemon - Main Entry Point
//!
//! Spawns the acquisition loop and stands in for the presentation layer
//! with a periodic snapshot log line.

use acquisition::{AcquisitionConfig, AcquisitionLoop};
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;
use telemetry_store::TelemetryStore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Daemon settings: acquisition config plus local knobs
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    acquisition: AcquisitionConfig,
    /// How often the consumer side logs a snapshot (ms)
    snapshot_interval_ms: Option<u64>,
}

impl Settings {
    fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.unwrap_or(1_000))
    }
}

/// Load `telemetryd.toml` (optional) with `TELEMETRYD_*` env overrides
fn load_settings() -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name("telemetryd").required(false))
        .add_source(config::Environment::with_prefix("TELEMETRYD").separator("__"))
        .build()?
        .try_deserialize()
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== OBD Telemetry Daemon v{} ===", env!("CARGO_PKG_VERSION"));

    let settings = load_settings().context("loading configuration")?;
    let snapshot_interval = settings.snapshot_interval();

    let store = TelemetryStore::new();
    let task = AcquisitionLoop::new(settings.acquisition, store.clone());
    let mut acquisition = tokio::spawn(task.run());

    let mut ticker = tokio::time::interval(snapshot_interval);
    loop {
        tokio::select! {
            result = &mut acquisition => {
                result.context("acquisition task panicked")??;
                return Ok(());
            }
            _ = ticker.tick() => {
                let snapshot = store.snapshot()?;
                info!(
                    "connected={} rpm={} speed={} coolant={:.1} intake={:.1} throttle={:.1} battery={:.2} dtcs={} vin={:?}",
                    snapshot.connected,
                    snapshot.rpm,
                    snapshot.speed,
                    snapshot.coolant_temp,
                    snapshot.intake_temp,
                    snapshot.throttle,
                    snapshot.battery_voltage,
                    snapshot.dtc_count,
                    snapshot.vin,
                );
            }
        }
    }
}
