use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::model::{RawCounters, CAPACITY};

/// Content instances are a few dozen bytes; anything far larger is not ours.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// Where the poller gets its counters from.
pub trait DataSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<RawCounters>> + Send;
}

// ---------- Wire format ----------

// oneM2M "latest content instance" envelope
#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(rename = "m2m:cin")]
    cin: ContentInstance,
}

#[derive(Deserialize, Debug)]
struct ContentInstance {
    con: serde_json::Value,
}

// What the device publishes inside `con`
#[derive(Deserialize, Debug)]
struct DevicePayload {
    #[serde(rename = "carMasuk", default)]
    car_in: Option<u64>,
    #[serde(rename = "carKeluar", default)]
    car_out: Option<u64>,
    #[serde(rename = "slotTersisa", default)]
    slots_left: Option<u64>,
}

impl From<DevicePayload> for RawCounters {
    fn from(p: DevicePayload) -> Self {
        RawCounters {
            vehicles_in_total: p.car_in.unwrap_or(0),
            vehicles_out_total: p.car_out.unwrap_or(0),
            slots_remaining_reported: p.slots_left.unwrap_or(CAPACITY),
        }
    }
}

/// Decodes a full response body.
///
/// `con` is normally a JSON document encoded as a string; an inline object
/// is accepted too.
pub fn parse_envelope(body: &str) -> Result<RawCounters> {
    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.cin.con {
        serde_json::Value::String(content) => parse_content(&content),
        value @ serde_json::Value::Object(_) => {
            Ok(serde_json::from_value::<DevicePayload>(value)?.into())
        }
        other => Err(MonitorError::DataFormat(format!(
            "unexpected content type: {}",
            other
        ))),
    }
}

/// Decodes the device document. Missing or null counters default to zero,
/// a missing slots figure to the lot capacity.
pub fn parse_content(content: &str) -> Result<RawCounters> {
    let payload: DevicePayload = serde_json::from_str(content)?;
    Ok(payload.into())
}

// ---------- HTTP source ----------

pub struct AntaresSource {
    client: reqwest::Client,
    url: String,
    access_key: String,
}

impl AntaresSource {
    pub fn new(cfg: &MonitorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| MonitorError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: cfg.endpoint_url(),
            access_key: cfg.access_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DataSource for AntaresSource {
    fn fetch(&self) -> impl Future<Output = Result<RawCounters>> + Send {
        async move {
            let mut response = self
                .client
                .get(&self.url)
                .header("X-M2M-Origin", &self.access_key)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(MonitorError::Transport(format!(
                    "{} returned HTTP {}",
                    self.url, status
                )));
            }
            if let Some(len) = response.content_length() {
                if len > MAX_RESPONSE_BYTES {
                    return Err(MonitorError::DataFormat(format!(
                        "response too large: {} bytes (max {})",
                        len, MAX_RESPONSE_BYTES
                    )));
                }
            }

            // chunked replies carry no length; cap what is actually read
            let mut buf = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                if (buf.len() + chunk.len()) as u64 > MAX_RESPONSE_BYTES {
                    return Err(MonitorError::DataFormat(format!(
                        "response too large: >{} bytes (max {})",
                        MAX_RESPONSE_BYTES, MAX_RESPONSE_BYTES
                    )));
                }
                buf.extend_from_slice(&chunk);
            }
            let body = String::from_utf8(buf)
                .map_err(|e| MonitorError::DataFormat(format!("response is not UTF-8: {}", e)))?;
            tracing::trace!(bytes = body.len(), "fetched content instance");
            parse_envelope(&body)
        }
    }
}
