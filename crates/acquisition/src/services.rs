//! Store-writing diagnostic services
//!
//! Trouble-code and vehicle-identity operations share the command channel
//! with the polling rotation and write their results straight into the
//! shared store.

use crate::error::AcquisitionError;
use obd_client::vin::{self, VinOutcome};
use obd_client::{command, dtc, CommandChannel};
use telemetry_store::TelemetryStore;
use tracing::{info, warn};

/// Query stored trouble codes and replace the store's list.
///
/// A response without the `43` header counts as "no codes", not a
/// failure; the fetched flag is set either way.
pub(crate) async fn refresh_stored_codes(
    channel: &mut CommandChannel,
    store: &TelemetryStore,
) -> Result<(), AcquisitionError> {
    let outcome = channel.send(command::READ_STORED_CODES).await?;
    let mut codes = dtc::parse_stored_codes(outcome.text());
    dtc::sort_by_severity(&mut codes);
    info!("Stored trouble codes refreshed: {} found", codes.len());
    store.set_dtcs(codes)?;
    Ok(())
}

/// Ask the controller to clear stored codes.
///
/// Success is recognized only by the `44` acknowledgement. On success the
/// local list is emptied immediately and then re-queried so the store
/// reflects what the controller reports afterwards.
pub(crate) async fn clear_stored_codes(
    channel: &mut CommandChannel,
    store: &TelemetryStore,
) -> Result<bool, AcquisitionError> {
    let outcome = channel.send(command::CLEAR_CODES).await?;
    if !dtc::clear_acknowledged(outcome.text()) {
        warn!("Clear request not acknowledged by controller");
        return Ok(false);
    }

    store.clear_dtcs()?;
    refresh_stored_codes(channel, store).await?;
    Ok(true)
}

/// One-shot VIN fetch.
///
/// Stores the decoded VIN, or a fixed placeholder when the payload is the
/// wrong length or the controller does not answer mode 09 02.
pub(crate) async fn fetch_vehicle_identity(
    channel: &mut CommandChannel,
    store: &TelemetryStore,
) -> Result<(), AcquisitionError> {
    let outcome = channel.send(command::VEHICLE_ID).await?;
    match vin::decode_vin(outcome.text()) {
        VinOutcome::Decoded(vin) => {
            info!("VIN: {}", vin);
            store.set_vin(&vin, true)?;
        }
        VinOutcome::Unavailable => {
            warn!("VIN response did not decode to 17 characters");
            store.set_vin(vin::VIN_UNAVAILABLE, false)?;
        }
        VinOutcome::Unsupported => {
            warn!("Controller does not answer VIN queries");
            store.set_vin(vin::VIN_UNSUPPORTED, false)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_client::mock::{Reply, ScriptedAdapter};
    use std::time::Duration;

    fn channel_for(adapter: ScriptedAdapter) -> CommandChannel {
        CommandChannel::new(adapter.spawn(), Duration::from_millis(2000))
    }

    #[tokio::test]
    async fn refresh_sorts_and_marks_fetched() {
        let adapter = ScriptedAdapter::new()
            .on("03", Reply::text("43 02 01 33 03 00 \r>"));
        let mut channel = channel_for(adapter);
        let store = TelemetryStore::new();

        refresh_stored_codes(&mut channel, &store).await.unwrap();

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.dtc_fetched);
        assert_eq!(snapshot.dtc_count, 2);
        // P0300 (critical) sorts ahead of P0133 (info)
        assert_eq!(snapshot.dtc_codes[0].code, "P0300");
        assert_eq!(snapshot.dtc_codes[1].code, "P0133");
    }

    #[tokio::test]
    async fn refresh_without_header_yields_empty_fetched_list() {
        let adapter = ScriptedAdapter::new().on("03", Reply::text("NO DATA\r>"));
        let mut channel = channel_for(adapter);
        let store = TelemetryStore::new();

        refresh_stored_codes(&mut channel, &store).await.unwrap();

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.dtc_fetched);
        assert_eq!(snapshot.dtc_count, 0);
    }

    #[tokio::test]
    async fn acknowledged_clear_empties_and_requeries() {
        let adapter = ScriptedAdapter::new()
            .on("04", Reply::text("44 \r>"))
            .on("03", Reply::text("43 00 00 00 \r>"));
        let log = adapter.command_log();
        let mut channel = channel_for(adapter);
        let store = TelemetryStore::new();
        store.set_dtcs(vec![dtc::classify("P0300")]).unwrap();

        let cleared = clear_stored_codes(&mut channel, &store).await.unwrap();
        assert!(cleared);
        assert_eq!(store.snapshot().unwrap().dtc_count, 0);
        assert_eq!(log.lock().unwrap().as_slice(), ["04", "03"]);
    }

    #[tokio::test]
    async fn unacknowledged_clear_leaves_codes_alone() {
        let adapter = ScriptedAdapter::new().on("04", Reply::text("NO DATA\r>"));
        let mut channel = channel_for(adapter);
        let store = TelemetryStore::new();
        store.set_dtcs(vec![dtc::classify("P0300")]).unwrap();

        let cleared = clear_stored_codes(&mut channel, &store).await.unwrap();
        assert!(!cleared);
        assert_eq!(store.snapshot().unwrap().dtc_count, 1);
    }

    #[tokio::test]
    async fn vin_outcomes_land_in_the_store() {
        // Valid VIN
        let adapter = ScriptedAdapter::new().on(
            "0902",
            Reply::text(
                "49 02 01 57 30 4C 30 58 43\r49 02 02 46 30 38 34 35 31\r49 02 03 32 33 34 35 36\r>",
            ),
        );
        let store = TelemetryStore::new();
        fetch_vehicle_identity(&mut channel_for(adapter), &store)
            .await
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.vin, "W0L0XCF0845123456");
        assert!(snapshot.vin_fetched);

        // Wrong length
        let adapter = ScriptedAdapter::new().on("0902", Reply::text("49 02 01 57 30 \r>"));
        let store = TelemetryStore::new();
        fetch_vehicle_identity(&mut channel_for(adapter), &store)
            .await
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.vin, vin::VIN_UNAVAILABLE);
        assert!(!snapshot.vin_fetched);

        // Unsupported
        let adapter = ScriptedAdapter::new().on("0902", Reply::text("NO DATA\r>"));
        let store = TelemetryStore::new();
        fetch_vehicle_identity(&mut channel_for(adapter), &store)
            .await
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.vin, vin::VIN_UNSUPPORTED);
        assert!(!snapshot.vin_fetched);
    }
}
