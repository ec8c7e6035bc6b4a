//! Manage API client
//!
//! Fetches the per-device configuration overlay at session start. "Device
//! not found" and "device must be bound" are ordinary outcomes here, not
//! failures: the session continues with the server-wide configuration and
//! the welcome path reports the binding code to the user.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{ManagerApiConfig, PrivateConfig};

const CODE_OK: i64 = 0;
const CODE_DEVICE_NOT_FOUND: i64 = 10041;
const CODE_DEVICE_BIND: i64 = 10042;

/// Manage API failure modes
#[derive(Debug, Error)]
pub enum ManageApiError {
    #[error("device not found")]
    DeviceNotFound,
    #[error("device bind required (code {bind_code})")]
    DeviceBind { bind_code: String },
    #[error("manage api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("manage api error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Client for the device-configuration service
pub struct ManageApiClient {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl ManageApiClient {
    pub fn new(config: &ManagerApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
        }
    }

    /// Fetch the overlay for one device
    pub async fn fetch_private_config(
        &self,
        device_id: &str,
        client_id: Option<&str>,
    ) -> Result<PrivateConfig, ManageApiError> {
        let mut request = self
            .client
            .get(format!("{}/config/device", self.base_url))
            .query(&[("device-id", device_id)]);
        if let Some(client_id) = client_id {
            request = request.query(&[("client-id", client_id)]);
        }
        if !self.secret.is_empty() {
            request = request.bearer_auth(&self.secret);
        }
        let envelope: ApiEnvelope = request.send().await?.json().await?;

        match envelope.code {
            CODE_OK => {
                let data = envelope.data.unwrap_or(serde_json::Value::Null);
                debug!("Fetched private config for device {device_id}");
                let private: PrivateConfig = serde_json::from_value(data)
                    .map_err(|e| ManageApiError::Api(format!("malformed config payload: {e}")))?;
                Ok(private)
            }
            CODE_DEVICE_NOT_FOUND => Err(ManageApiError::DeviceNotFound),
            CODE_DEVICE_BIND => {
                let bind_code = envelope
                    .data
                    .as_ref()
                    .and_then(|d| d.get("bind_code"))
                    .and_then(|c| c.as_str())
                    .unwrap_or_default()
                    .to_string();
                Err(ManageApiError::DeviceBind { bind_code })
            }
            other => Err(ManageApiError::Api(format!(
                "code {other}: {}",
                envelope.msg.unwrap_or_default()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsing() {
        let raw = r#"{"code":10042,"msg":"bind required","data":{"bind_code":"834701"}}"#;
        let envelope: ApiEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.code, CODE_DEVICE_BIND);
        assert_eq!(
            envelope.data.unwrap()["bind_code"].as_str(),
            Some("834701")
        );
    }

    #[test]
    fn test_ok_payload_deserializes_overlay() {
        let raw = r#"{"code":0,"data":{"prompt":"custom","selected_module":{"TTS":"premium"},"TTS":{"premium":{"type":"http","url":"http://tts"}}}}"#;
        let envelope: ApiEnvelope = serde_json::from_str(raw).unwrap();
        let private: PrivateConfig =
            serde_json::from_value(envelope.data.unwrap()).unwrap();
        assert_eq!(private.prompt.as_deref(), Some("custom"));
        assert_eq!(private.selected_module.tts.as_deref(), Some("premium"));
        assert!(private.tts.unwrap().contains_key("premium"));
    }
}
