//! Hosola / Omnik Inverter Bridge Library
//!
//! Polls a Hosola or Omnik solar micro-inverter over its binary TCP protocol, decodes the
//! telemetry frame and forwards temperature, voltages, power and lifetime energy to Domoticz.

pub mod config;
pub mod domoticz;
pub mod energy_bootstrap;
pub mod error;
pub mod frame_decoder;
pub mod inverter_client;
pub mod inverter_id;
pub mod inverter_reader;
pub mod publisher;
pub mod sleeper;
pub mod telemetry_store;

// Re-export commonly used types for easier access
pub use config::Settings;
pub use domoticz::{DomoticzAPI, TelemetrySink};
pub use inverter_client::{InverterTransport, TcpInverterTransport};
pub use inverter_reader::{CycleOutcome, CycleReport, InverterReader, PollSettings};
pub use publisher::Publisher;
pub use sleeper::{Sleeper, TokioSleeper};
pub use telemetry_store::TelemetryStore;
