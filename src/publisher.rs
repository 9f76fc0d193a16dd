use crate::config::SensorIds;
use crate::domoticz::TelemetrySink;
use crate::error::SinkError;
use crate::frame_decoder::{AC_POWER, AC_VOLTAGE, DC_VOLTAGE, LIFETIME_ENERGY, TEMPERATURE};
use crate::telemetry_store::TelemetryStore;
use tracing::{error, info, warn};

/// kWh -> Wh for the energy sensor's counter.
const ENERGY_FACTOR: f64 = 1000.0;

/// One device update: a field, optionally paired with a scaled second field.
struct SensorUpdate {
    idx: u32,
    field: &'static str,
    paired: Option<(&'static str, f64)>,
}

/// Pushes the current store to the sink, one device update per published reading.
pub struct Publisher {
    updates: Vec<SensorUpdate>,
}

impl Publisher {
    pub fn new(sensors: SensorIds) -> Self {
        Self {
            updates: vec![
                SensorUpdate {
                    idx: sensors.temperature,
                    field: TEMPERATURE,
                    paired: None,
                },
                SensorUpdate {
                    idx: sensors.dc_voltage,
                    field: DC_VOLTAGE,
                    paired: None,
                },
                SensorUpdate {
                    idx: sensors.ac_voltage,
                    field: AC_VOLTAGE,
                    paired: None,
                },
                SensorUpdate {
                    idx: sensors.energy,
                    field: AC_POWER,
                    paired: Some((LIFETIME_ENERGY, ENERGY_FACTOR)),
                },
            ],
        }
    }

    /// Sends every update once. Failures are logged and not retried; returns how many succeeded.
    pub async fn publish(&self, store: &TelemetryStore, sink: &dyn TelemetrySink) -> usize {
        let mut delivered = 0;
        for update in &self.updates {
            let Some(svalue) = render_svalue(store, update) else {
                warn!("Parameter {} does not exist, skipping idx {}", update.field, update.idx);
                continue;
            };

            match sink.update_device(update.idx, &svalue).await {
                Ok(()) => {
                    info!("Updated idx {} ({}) to {}", update.idx, update.field, svalue);
                    delivered += 1;
                }
                Err(e @ SinkError::Rejected { .. }) => {
                    warn!("Update of idx {} to {} refused: {}", update.idx, svalue, e)
                }
                Err(e) => error!("Failed sending idx {} value {}: {}", update.idx, svalue, e),
            }
        }
        delivered
    }
}

fn render_svalue(store: &TelemetryStore, update: &SensorUpdate) -> Option<String> {
    let value = store.get(update.field)?;
    match update.paired {
        None => Some(value.to_string()),
        Some((field, factor)) => {
            let second = (store.get(field)? * factor).round();
            Some(format!("{value};{second}"))
        }
    }
}
