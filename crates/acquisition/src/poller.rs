//! The acquisition loop state machine

use crate::config::AcquisitionConfig;
use crate::error::AcquisitionError;
use crate::services;
use obd_client::{pid, ConnectionManager, Connector, NetConnector, Parameter};
use std::time::Duration;
use telemetry_store::TelemetryStore;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Message stored when the first connect attempt fails
const MSG_CONNECT_FAILED: &str = "Connection failed";

/// Message stored when the failure threshold trips
const MSG_LINK_LOST: &str = "Connection lost (timeout)";

/// Loop states. `Failed` is implicit: the task returns instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    /// First connection attempt; failure here is terminal
    Connecting,
    /// One-time VIN and stored-code fetch after the first connect
    FetchingIdentity,
    /// Steady state: one parameter per cycle, then command flags
    Polling,
    /// Failure threshold tripped; tear the link down
    LinkLost,
    /// Reconnect attempts, repeated indefinitely
    Reconnecting,
}

/// The perpetual acquisition task.
///
/// Owns the connection and writes everything it learns into the shared
/// store. `run` returns only when the very first connection attempt fails
/// or the store becomes unusable.
pub struct AcquisitionLoop<C: Connector> {
    connection: ConnectionManager<C>,
    store: TelemetryStore,
    config: AcquisitionConfig,
    rotation_index: usize,
    consecutive_failures: u32,
}

impl AcquisitionLoop<NetConnector> {
    /// Loop for a real adapter described by the config
    pub fn new(config: AcquisitionConfig, store: TelemetryStore) -> Self {
        let connection = ConnectionManager::new(config.link.clone());
        Self::with_connection(config, store, connection)
    }
}

impl<C: Connector> AcquisitionLoop<C> {
    /// Loop over an injected connection manager (used by tests)
    pub fn with_connection(
        config: AcquisitionConfig,
        store: TelemetryStore,
        connection: ConnectionManager<C>,
    ) -> Self {
        Self {
            connection,
            store,
            config,
            rotation_index: 0,
            consecutive_failures: 0,
        }
    }

    /// Drive the state machine forever.
    pub async fn run(mut self) -> Result<(), AcquisitionError> {
        info!("Acquisition task starting");

        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = LoopState::Connecting;
        loop {
            state = match state {
                LoopState::Connecting => match self.connection.connect().await {
                    Ok(()) => {
                        self.store.set_connected()?;
                        LoopState::FetchingIdentity
                    }
                    Err(e) => {
                        self.store.set_disconnected(MSG_CONNECT_FAILED)?;
                        error!("Initial connection failed, acquisition halting: {}", e);
                        return Err(AcquisitionError::ConnectFailed(e));
                    }
                },

                LoopState::FetchingIdentity => {
                    self.fetch_identity().await?;
                    LoopState::Polling
                }

                LoopState::Polling => {
                    ticker.tick().await;
                    self.poll_cycle().await?
                }

                LoopState::LinkLost => {
                    warn!(
                        "{} consecutive failures - connection lost",
                        self.consecutive_failures
                    );
                    self.store.set_disconnected(MSG_LINK_LOST)?;
                    self.connection.disconnect().await;
                    tokio::time::sleep(Duration::from_millis(self.config.reconnect_wait_ms)).await;
                    LoopState::Reconnecting
                }

                LoopState::Reconnecting => {
                    self.consecutive_failures = 0;
                    match self.connection.connect().await {
                        Ok(()) => {
                            info!("Reconnected");
                            self.store.set_connected()?;
                            ticker.reset();
                            LoopState::Polling
                        }
                        Err(e) => {
                            warn!("Reconnection failed, will retry: {}", e);
                            tokio::time::sleep(Duration::from_millis(
                                self.config.reconnect_retry_wait_ms,
                            ))
                            .await;
                            LoopState::Reconnecting
                        }
                    }
                }
            };
        }
    }

    /// One-time identity fetch after the first connect.
    ///
    /// Link trouble here is not fatal; the polling loop's failure counter
    /// picks up a dead link soon enough.
    async fn fetch_identity(&mut self) -> Result<(), AcquisitionError> {
        tokio::time::sleep(Duration::from_millis(self.config.identity_settle_ms)).await;

        let Some(channel) = self.connection.channel_mut() else {
            return Ok(());
        };

        if let Err(e) = services::refresh_stored_codes(channel, &self.store).await {
            match e {
                AcquisitionError::Store(_) => return Err(e),
                _ => warn!("Initial trouble-code fetch failed: {}", e),
            }
        }

        if let Some(channel) = self.connection.channel_mut() {
            if let Err(e) = services::fetch_vehicle_identity(channel, &self.store).await {
                match e {
                    AcquisitionError::Store(_) => return Err(e),
                    _ => warn!("VIN fetch failed: {}", e),
                }
            }
        }

        Ok(())
    }

    /// One polling cycle: a single parameter query, then the command flags.
    async fn poll_cycle(&mut self) -> Result<LoopState, AcquisitionError> {
        let parameter = Parameter::ROTATION[self.rotation_index];
        self.rotation_index = (self.rotation_index + 1) % Parameter::ROTATION.len();

        let result = match self.connection.channel_mut() {
            Some(channel) => pid::query(channel, parameter).await,
            None => Ok(None),
        };

        match result {
            Ok(Some(reading)) => {
                debug!(
                    "{}: {:.1} {}",
                    parameter.label(),
                    reading.value,
                    parameter.unit()
                );
                self.store.apply_reading(&reading)?;
                self.consecutive_failures = 0;
            }
            Ok(None) => {
                self.consecutive_failures += 1;
                warn!(
                    "{} query failed ({} consecutive)",
                    parameter.label(),
                    self.consecutive_failures
                );
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "{} query failed ({} consecutive): {}",
                    parameter.label(),
                    self.consecutive_failures,
                    e
                );
            }
        }

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            return Ok(LoopState::LinkLost);
        }

        self.service_command_flags().await?;
        Ok(LoopState::Polling)
    }

    /// Drain pending consumer requests, clear before refresh.
    ///
    /// Flags are acknowledged whether or not the operation succeeded; a
    /// failed attempt is not retried until the consumer asks again.
    async fn service_command_flags(&mut self) -> Result<(), AcquisitionError> {
        let flags = self.store.command_flags()?;

        if flags.clear_requested {
            info!("Processing trouble-code clear request");
            if let Some(channel) = self.connection.channel_mut() {
                match services::clear_stored_codes(channel, &self.store).await {
                    Ok(true) => info!("Trouble codes cleared"),
                    Ok(false) => warn!("Trouble-code clear was not acknowledged"),
                    Err(e @ AcquisitionError::Store(_)) => return Err(e),
                    Err(e) => warn!("Trouble-code clear failed: {}", e),
                }
            }
            self.store.acknowledge_clear()?;
        }

        if flags.refresh_requested {
            info!("Processing trouble-code refresh request");
            if let Some(channel) = self.connection.channel_mut() {
                match services::refresh_stored_codes(channel, &self.store).await {
                    Ok(()) => {}
                    Err(e @ AcquisitionError::Store(_)) => return Err(e),
                    Err(e) => warn!("Trouble-code refresh failed: {}", e),
                }
            }
            self.store.acknowledge_refresh()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_client::mock::{ConnectAttempt, Reply, ScriptedAdapter, ScriptedConnector};
    use obd_client::LinkConfig;
    use telemetry_store::TelemetrySnapshot;

    fn test_config() -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval_ms: 10,
            max_consecutive_failures: 3,
            reconnect_wait_ms: 50,
            reconnect_retry_wait_ms: 20,
            identity_settle_ms: 0,
            link: LinkConfig {
                stabilize_delay_ms: 0,
                disconnect_settle_ms: 0,
                command_timeout_ms: 30,
                ..LinkConfig::default()
            },
        }
    }

    fn spawn_loop(connector: ScriptedConnector, config: AcquisitionConfig) -> (TelemetryStore, tokio::task::JoinHandle<Result<(), AcquisitionError>>) {
        let store = TelemetryStore::new();
        let connection = ConnectionManager::with_connector(config.link.clone(), connector);
        let task = AcquisitionLoop::with_connection(config, store.clone(), connection);
        let handle = tokio::spawn(task.run());
        (store, handle)
    }

    /// Adapter that answers every rotation parameter with plausible data
    fn healthy_adapter() -> ScriptedAdapter {
        ScriptedAdapter::new()
            .on("010C", Reply::text("41 0C 1A F8 \r>"))
            .on("010D", Reply::text("41 0D 3C \r>"))
            .on("0105", Reply::text("41 05 7B \r>"))
            .on("0111", Reply::text("41 11 40 \r>"))
            .on("010F", Reply::text("41 0F 50 \r>"))
            .on("0142", Reply::text("41 42 36 B0 \r>"))
            .on("03", Reply::text("43 01 01 00 00 00 \r>"))
            .on("0902", Reply::text(
                "49 02 01 57 30 4C 30 58 43\r49 02 02 46 30 38 34 35 31\r49 02 03 32 33 34 35 36\r>",
            ))
    }

    async fn wait_for(
        store: &TelemetryStore,
        what: &str,
        predicate: impl Fn(&TelemetrySnapshot) -> bool,
    ) {
        for _ in 0..10_000 {
            if predicate(&store.snapshot().unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store never reached expected state: {what}");
    }

    #[tokio::test(start_paused = true)]
    async fn first_connect_failure_is_terminal() {
        let connector = ScriptedConnector::new(vec![ConnectAttempt::Refuse]);
        let opens = connector.open_counter();
        let (store, handle) = spawn_loop(connector, test_config());

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(AcquisitionError::ConnectFailed(_))));

        let snapshot = store.snapshot().unwrap();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.error, "Connection failed");
        assert_eq!(opens.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_is_fetched_once_then_polling_updates_parameters() {
        let connector = ScriptedConnector::single(healthy_adapter());
        let (store, handle) = spawn_loop(connector, test_config());

        wait_for(&store, "vin + full rotation", |s| {
            s.vin_fetched && s.rpm == 1726 && s.speed == 60 && s.battery_voltage > 0.0
        })
        .await;

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.connected);
        assert_eq!(snapshot.vin, "W0L0XCF0845123456");
        assert!(snapshot.dtc_fetched);
        assert_eq!(snapshot.dtc_count, 1);
        assert_eq!(snapshot.dtc_codes[0].code, "P0100");
        assert!((snapshot.coolant_temp - 83.0).abs() < f64::EPSILON);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_threshold_marks_disconnected_then_reconnect_recovers() {
        // First session answers nothing to data queries; second is healthy.
        let dead = ScriptedAdapter::new().otherwise(Reply::Silent);
        let connector = ScriptedConnector::new(vec![
            ConnectAttempt::Accept(dead),
            ConnectAttempt::Accept(healthy_adapter()),
        ]);
        let opens = connector.open_counter();
        let (store, handle) = spawn_loop(connector, test_config());

        wait_for(&store, "disconnect after threshold", |s| {
            !s.connected && !s.error.is_empty()
        })
        .await;
        assert_eq!(store.snapshot().unwrap().error, "Connection lost (timeout)");

        wait_for(&store, "reconnect", |s| s.connected && s.rpm == 1726).await;
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.error.is_empty());
        assert_eq!(opens.load(std::sync::atomic::Ordering::Relaxed), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_keeps_retrying_after_failures() {
        let connector = ScriptedConnector::new(vec![
            ConnectAttempt::Accept(ScriptedAdapter::new().otherwise(Reply::Silent)),
            ConnectAttempt::Refuse,
            ConnectAttempt::Refuse,
            ConnectAttempt::Accept(healthy_adapter()),
        ]);
        let opens = connector.open_counter();
        let (store, handle) = spawn_loop(connector, test_config());

        wait_for(&store, "recovery after refused reconnects", |s| {
            s.connected && s.rpm == 1726
        })
        .await;
        assert_eq!(opens.load(std::sync::atomic::Ordering::Relaxed), 4);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn clear_is_serviced_before_refresh() {
        let adapter = healthy_adapter().on("04", Reply::text("44 \r>"));
        let log = adapter.command_log();
        let connector = ScriptedConnector::single(adapter);
        let (store, handle) = spawn_loop(connector, test_config());

        wait_for(&store, "initial fetch", |s| s.vin_fetched).await;

        // Both flags pending before the next cycle drains them.
        store.request_refresh().unwrap();
        store.request_clear().unwrap();

        wait_for(&store, "flags drained", |s| {
            !s.clear_requested && !s.refresh_requested
        })
        .await;

        let log = log.lock().unwrap();
        let clear_pos = log.iter().position(|c| c == "04").expect("clear sent");
        let refresh_after_clear = log
            .iter()
            .skip(clear_pos + 1)
            .filter(|c| c.as_str() == "03")
            .count();
        // Clear triggers its own re-query, then the refresh request runs.
        assert!(refresh_after_clear >= 2);

        handle.abort();
    }
}
