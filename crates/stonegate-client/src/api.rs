use serde_json::{json, Map, Value};
use std::time::Duration;
use stonegate_core::snapshot::metric_number;
use stonegate_core::{
    flatten_poll, DeviceAction, DeviceSnapshot, Measurement, QecBenchmarkRequest,
    RecordStartRequest,
};
use tracing::debug;

use crate::connection::StoneGateClient;
use crate::error::{ClientError, Result};

const UNKNOWN_RECORDING_DETAIL: &str = "unknown recording_id";

impl StoneGateClient {
    pub async fn list_devices(&self) -> Result<Value> {
        self.call("devices.list", json!({}), self.config().call_timeout)
            .await
    }

    /// Ids of every device in the `devices.list` descriptor graph.
    pub async fn device_ids(&self) -> Result<Vec<String>> {
        let listed = self.list_devices().await?;
        let ids = listed
            .get("devices")
            .and_then(Value::as_array)
            .map(|devices| {
                devices
                    .iter()
                    .filter_map(|device| device.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    pub async fn poll_raw(&self) -> Result<Value> {
        self.call("devices.poll", json!({}), self.config().call_timeout)
            .await
    }

    pub async fn poll_all_flat(&self) -> Result<DeviceSnapshot> {
        let result = self.poll_raw().await?;
        Ok(flatten_poll(&result))
    }

    pub async fn backend_info(&self) -> Result<Value> {
        self.call("backend.info", json!({}), self.config().call_timeout)
            .await
    }

    pub async fn device_action(&self, device_id: &str, action: &DeviceAction) -> Result<Value> {
        if device_id.trim().is_empty() {
            return Err(ClientError::Validation(
                "device_id must not be empty".to_string(),
            ));
        }
        let params = json!({"device_id": device_id, "action": action.to_value()});
        self.call("device.action", params, self.config().action_timeout)
            .await
    }

    /// `{"set": {metric: value, ...}}`, the control shape used by the UI.
    pub async fn device_set(&self, device_id: &str, params: Map<String, Value>) -> Result<Value> {
        self.device_action(device_id, &DeviceAction::Set(params))
            .await
    }

    pub async fn device_zero(&self, device_id: &str) -> Result<Value> {
        self.device_action(device_id, &DeviceAction::Zero).await
    }

    pub async fn latest_number(&self, device_id: &str, metric: &str) -> Result<Option<f64>> {
        let snapshot = self.poll_all_flat().await?;
        Ok(metric_number(&snapshot, device_id, metric))
    }

    pub async fn required_number(&self, device_id: &str, metric: &str) -> Result<f64> {
        self.latest_number(device_id, metric)
            .await?
            .ok_or_else(|| ClientError::MissingReading {
                device_id: device_id.to_string(),
                metric: metric.to_string(),
            })
    }

    pub async fn record_start(&self, request: &RecordStartRequest) -> Result<String> {
        self.record_start_with_timeout(request, self.config().action_timeout)
            .await
    }

    pub async fn record_start_with_timeout(
        &self,
        request: &RecordStartRequest,
        timeout: Duration,
    ) -> Result<String> {
        if !request.streams.is_array() {
            return Err(ClientError::Validation(
                "record.start streams must be a JSON array".to_string(),
            ));
        }
        let params = serde_json::to_value(request)
            .map_err(|err| ClientError::Validation(err.to_string()))?;
        let result = self.call("record.start", params, timeout).await?;
        match result.get("recording_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ClientError::UnexpectedResult {
                method: "record.start".to_string(),
                reason: "missing recording_id".to_string(),
            }),
        }
    }

    pub async fn record_stop(&self, recording_id: &str) -> Result<Option<Value>> {
        self.record_stop_with_timeout(recording_id, self.config().action_timeout)
            .await
    }

    /// Stopping an empty or unknown recording id is a no-op that yields `None`.
    pub async fn record_stop_with_timeout(
        &self,
        recording_id: &str,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        if recording_id.is_empty() {
            return Ok(None);
        }
        let params = json!({"recording_id": recording_id});
        match self.call("record.stop", params, timeout).await {
            Ok(result) => Ok(Some(result)),
            Err(ClientError::Rpc(info)) if is_unknown_recording(info.details.as_ref()) => {
                debug!(recording_id, "record_stop_unknown_id");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn qec_decode(
        &self,
        code: &str,
        measurements: &[Measurement],
        extra: Map<String, Value>,
    ) -> Result<Value> {
        let mut params = extra;
        params.insert("code".to_string(), Value::from(code));
        params.insert(
            "measurements".to_string(),
            serde_json::to_value(measurements)
                .map_err(|err| ClientError::Validation(err.to_string()))?,
        );
        self.qec_decode_raw(Value::Object(params)).await
    }

    /// Forwards a caller-built `qec.decode` request unchanged.
    pub async fn qec_decode_raw(&self, params: Value) -> Result<Value> {
        self.call("qec.decode", params, self.config().action_timeout)
            .await
    }

    pub async fn qec_benchmark(&self, request: &QecBenchmarkRequest) -> Result<Value> {
        let params = serde_json::to_value(request)
            .map_err(|err| ClientError::Validation(err.to_string()))?;
        self.call("qec.benchmark", params, self.config().action_timeout)
            .await
    }
}

fn is_unknown_recording(details: Option<&Value>) -> bool {
    details
        .and_then(|details| details.get("detail"))
        .and_then(Value::as_str)
        == Some(UNKNOWN_RECORDING_DETAIL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn offline_client() -> StoneGateClient {
        StoneGateClient::new(ClientConfig::parse("ws://127.0.0.1:9/status").expect("config"))
    }

    #[tokio::test]
    async fn empty_recording_id_skips_the_network() {
        let client = offline_client();
        assert_eq!(client.record_stop("").await.expect("noop"), None);
    }

    #[tokio::test]
    async fn local_validation_precedes_any_call() {
        let client = offline_client();
        assert!(matches!(
            client.device_zero("  ").await,
            Err(ClientError::Validation(_))
        ));
        let request = RecordStartRequest::new(json!({"device_id": "press0"}));
        assert!(matches!(
            client.record_start(&request).await,
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn unknown_recording_detail_is_recognized() {
        assert!(is_unknown_recording(Some(&json!({"detail": "unknown recording_id"}))));
        assert!(!is_unknown_recording(Some(&json!({"detail": "recorder not initialized"}))));
        assert!(!is_unknown_recording(None));
    }
}
