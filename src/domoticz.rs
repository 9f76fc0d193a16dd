use crate::config::DomoticzSettings;
use crate::error::SinkError;
use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

/// The home-automation side of the bridge.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Reads the numeric `Data` of a device, used to recover the lifetime energy.
    async fn read_device_data(&self, idx: u32) -> Result<f64, SinkError>;

    /// Sets the string value of a device; only an explicit `OK` status counts as success.
    async fn update_device(&self, idx: u32, svalue: &str) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    async fn read_device_data(&self, idx: u32) -> Result<f64, SinkError> {
        (**self).read_device_data(idx).await
    }

    async fn update_device(&self, idx: u32, svalue: &str) -> Result<(), SinkError> {
        (**self).update_device(idx, svalue).await
    }
}

pub struct DomoticzAPI {
    endpoint_url: String,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
}

impl DomoticzAPI {
    pub fn new(settings: &DomoticzSettings) -> Self {
        Self {
            endpoint_url: settings.url.trim_end_matches('/').to_string(),
            credentials: settings.credentials.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<T, SinkError> {
        if self.endpoint_url.is_empty() {
            return Err(SinkError::NoConnection);
        }
        let mut request = self
            .client
            .get(format!("{}/json.htm", self.endpoint_url))
            .query(query);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        Ok(request.send().await?.json().await?)
    }
}

#[async_trait]
impl TelemetrySink for DomoticzAPI {
    async fn read_device_data(&self, idx: u32) -> Result<f64, SinkError> {
        let reply: DevicesReply = self
            .get_json(&[("type", "devices".to_string()), ("rid", idx.to_string())])
            .await?;
        let device = reply.result.first().ok_or(SinkError::MissingData)?;
        device.numeric_data()
    }

    async fn update_device(&self, idx: u32, svalue: &str) -> Result<(), SinkError> {
        let reply: CommandReply = self
            .get_json(&[
                ("type", "command".to_string()),
                ("param", "udevice".to_string()),
                ("idx", idx.to_string()),
                ("nvalue", "0".to_string()),
                ("svalue", svalue.to_string()),
            ])
            .await?;
        if reply.status == "OK" {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: reply.status,
            })
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesReply {
    #[serde(default)]
    pub result: Vec<DomoticzDevice>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomoticzDevice {
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

impl DomoticzDevice {
    /// `Data` is usually a string with a unit, e.g. `"1234.567 kWh"`; the leading number is used.
    pub fn numeric_data(&self) -> Result<f64, SinkError> {
        match &self.data {
            serde_json::Value::Number(number) => number.as_f64().ok_or(SinkError::MissingData),
            serde_json::Value::String(text) => {
                leading_number(text).ok_or_else(|| SinkError::NotNumeric(text.clone()))
            }
            serde_json::Value::Null => Err(SinkError::MissingData),
            other => Err(SinkError::NotNumeric(other.to_string())),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub status: String,
}

/// Parses the longest numeric prefix of `text`, ignoring leading whitespace.
fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .map_or(text.len(), |(i, _)| i);
    // Shrink until the prefix parses, "12.5e" or "3-" style tails are dropped
    (1..=end).rev().find_map(|len| text[..len].parse::<f64>().ok())
}
