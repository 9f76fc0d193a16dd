//! Runtime settings, read from environment variables.

use anyhow::{bail, Context};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct InverterSettings {
    pub host: String,
    pub port: u16,
    pub serial: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomoticzSettings {
    pub url: String,
    pub credentials: Option<(String, String)>,
}

/// Domoticz device idx each published reading is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorIds {
    pub energy: u32,
    pub ac_voltage: u32,
    pub dc_voltage: u32,
    pub temperature: u32,
}

impl Default for SensorIds {
    fn default() -> Self {
        Self {
            energy: 13,
            ac_voltage: 14,
            dc_voltage: 15,
            temperature: 16,
        }
    }
}

/// How chatty the diagnostics are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    None,
    Errors,
    Results,
    Verbose,
}

impl Verbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::None => LevelFilter::OFF,
            Verbosity::Errors => LevelFilter::ERROR,
            Verbosity::Results => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
        }
    }
}

impl FromStr for Verbosity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(Verbosity::None),
            "1" | "errors" => Ok(Verbosity::Errors),
            "2" | "results" => Ok(Verbosity::Results),
            "3" | "verbose" => Ok(Verbosity::Verbose),
            other => bail!("unknown debug level '{other}', expected 0-3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub inverter: InverterSettings,
    pub domoticz: DomoticzSettings,
    pub sensors: SensorIds,
    /// Pause between cycles, also the bootstrap retry delay and the short frame penalty.
    pub poll_interval: Duration,
    /// Consecutive failed cycles before readings are zeroed.
    pub max_failures: u32,
    pub temperature_max: f64,
    pub verbosity: Verbosity,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from any key/value source, empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = get("INVERTER_HOST").context("INVERTER_HOST is required")?;
        let serial = get("INVERTER_SERIAL").context("INVERTER_SERIAL is required")?;
        let serial = serial
            .trim()
            .parse::<u64>()
            .with_context(|| format!("INVERTER_SERIAL '{serial}' must contain digits only"))?;
        let url = get("DOMOTICZ_URL").context("DOMOTICZ_URL is required")?;

        let credentials = match (get("DOMOTICZ_USER"), get("DOMOTICZ_PASSWORD")) {
            (Some(user), password) => Some((user, password.unwrap_or_default())),
            (None, _) => None,
        };

        let max_failures = parse_or(&get, "MAX_FAILURES", 2u32)?;
        if max_failures == 0 {
            bail!("MAX_FAILURES must be at least 1");
        }

        let temperature_max = parse_or(&get, "TEMPERATURE_MAX", 200.0f64)?;
        if !temperature_max.is_finite() {
            bail!("TEMPERATURE_MAX must be a finite number");
        }

        let timeout = positive_secs(&get, "INVERTER_CONNECT_TIMEOUT_SECS", 3)?;
        let poll_interval = positive_secs(&get, "POLL_INTERVAL_SECS", 15)?;

        let verbosity = match get("DEBUG_LEVEL") {
            Some(level) => level.parse()?,
            None => Verbosity::default(),
        };

        let defaults = SensorIds::default();
        Ok(Self {
            inverter: InverterSettings {
                host: host.trim().to_string(),
                port: parse_or(&get, "INVERTER_PORT", 8899u16)?,
                serial,
                timeout,
            },
            domoticz: DomoticzSettings { url, credentials },
            sensors: SensorIds {
                energy: parse_or(&get, "IDX_ENERGY", defaults.energy)?,
                ac_voltage: parse_or(&get, "IDX_VAC", defaults.ac_voltage)?,
                dc_voltage: parse_or(&get, "IDX_VDC", defaults.dc_voltage)?,
                temperature: parse_or(&get, "IDX_TEMP", defaults.temperature)?,
            },
            poll_interval,
            max_failures,
            temperature_max,
            verbosity,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{value}'")),
        None => Ok(default),
    }
}

fn positive_secs<G>(get: &G, key: &str, default: u64) -> anyhow::Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let secs = parse_or(get, key, default)?;
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}
