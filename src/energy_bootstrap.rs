use crate::domoticz::TelemetrySink;
use crate::sleeper::Sleeper;
use crate::telemetry_store::TelemetryStore;
use std::time::Duration;
use tracing::{debug, error};

/// Blocks until the sink reports the lifetime energy (kWh) of `energy_idx`, retrying forever.
///
/// The counter must never go backwards downstream, so polling cannot start before it is known.
pub async fn load_lifetime_energy(
    sink: &dyn TelemetrySink,
    energy_idx: u32,
    sleeper: &dyn Sleeper,
    retry_delay: Duration,
) -> TelemetryStore {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match sink.read_device_data(energy_idx).await {
            Ok(kwh) => {
                debug!("Current total energy {} kWh (attempt {})", kwh, attempt);
                return TelemetryStore::with_lifetime_energy(kwh);
            }
            Err(e) => {
                error!("Error while reading current total energy (attempt {}): {}", attempt, e);
                sleeper.sleep(retry_delay).await;
            }
        }
    }
}
