use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub const RPC_RESULT_TYPE: &str = "rpc_result";
pub const DEFAULT_ERROR_CODE: &str = "error";
pub const DEFAULT_ERROR_MESSAGE: &str = "RPC failed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "rpc")]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl RpcRequest {
    /// Builds a request frame; a `null` params value is sent as `{}`.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            empty_params()
        } else {
            params
        };
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "rpc_result")]
pub struct RpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            id: id.into(),
            ok: false,
            result: Value::Null,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, ErrorInfo> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(self.error.unwrap_or_else(ErrorInfo::unspecified))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = if details.is_null() {
            None
        } else {
            Some(details)
        };
        self
    }

    pub fn unspecified() -> Self {
        Self::new(DEFAULT_ERROR_CODE, DEFAULT_ERROR_MESSAGE)
    }

    /// Reads the `error` member of a failure envelope. Missing or empty
    /// fields fall back to generic values instead of rejecting the frame.
    pub fn from_wire(value: Option<&Value>) -> Self {
        let Some(Value::Object(fields)) = value else {
            return Self::unspecified();
        };
        let code = text_field(fields.get("code")).unwrap_or_else(|| DEFAULT_ERROR_CODE.to_string());
        let message =
            text_field(fields.get("message")).unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
        let details = fields.get("details").cloned().unwrap_or(Value::Null);
        Self::new(code, message).with_details(details)
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorInfo {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("unexpected frame type: {0}")]
    UnexpectedType(String),
    #[error("frame has no correlation id")]
    MissingId,
}

pub fn encode_request(request: &RpcRequest) -> Result<String, FrameError> {
    serde_json::to_string(request).map_err(|err| FrameError::Encode(err.to_string()))
}

/// Classifies one inbound text frame. Only `rpc_result` envelopes carrying a
/// non-empty string id are accepted; everything else is reported as an error
/// for the caller to drop.
pub fn parse_rpc_result(text: &str) -> Result<RpcResponse, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| FrameError::Decode(err.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError::Decode("frame is not a JSON object".to_string()));
    };

    match fields.get("type") {
        Some(Value::String(kind)) if kind == RPC_RESULT_TYPE => {}
        Some(Value::String(kind)) => return Err(FrameError::UnexpectedType(kind.clone())),
        Some(other) => return Err(FrameError::UnexpectedType(other.to_string())),
        None => return Err(FrameError::UnexpectedType("<missing>".to_string())),
    }

    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => return Err(FrameError::MissingId),
    };
    let ok = fields.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        let result = fields.remove("result").unwrap_or(Value::Null);
        Ok(RpcResponse::success(id, result))
    } else {
        Ok(RpcResponse::failure(id, ErrorInfo::from_wire(fields.get("error"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_type_tag() {
        let request = RpcRequest::new("rs_1", "devices.poll", Value::Null);
        let encoded = encode_request(&request).expect("encode");
        let value: Value = serde_json::from_str(&encoded).expect("json");
        assert_eq!(
            value,
            json!({"type": "rpc", "id": "rs_1", "method": "devices.poll", "params": {}})
        );
    }

    #[test]
    fn success_envelope_is_parsed() {
        let response =
            parse_rpc_result(r#"{"type":"rpc_result","id":"a","ok":true,"result":{"n":1}}"#)
                .expect("parse");
        assert_eq!(response.id, "a");
        assert_eq!(response.into_result().expect("ok"), json!({"n": 1}));
    }

    #[test]
    fn success_without_result_yields_null() {
        let response =
            parse_rpc_result(r#"{"type":"rpc_result","id":"a","ok":true}"#).expect("parse");
        assert_eq!(response.into_result().expect("ok"), Value::Null);
    }

    #[test]
    fn failure_envelope_carries_error_info() {
        let response = parse_rpc_result(
            r#"{"type":"rpc_result","id":"b","ok":false,"error":{"code":"E2400","message":"rejected","details":{"detail":"unknown recording_id"}}}"#,
        )
        .expect("parse");
        let err = response.into_result().expect_err("failure");
        assert_eq!(err.code, "E2400");
        assert_eq!(err.details, Some(json!({"detail": "unknown recording_id"})));
        assert_eq!(
            err.to_string(),
            r#"E2400: rejected ({"detail":"unknown recording_id"})"#
        );
    }

    #[test]
    fn failure_with_missing_fields_uses_defaults() {
        let response =
            parse_rpc_result(r#"{"type":"rpc_result","id":"c","ok":false,"error":{"details":null}}"#)
                .expect("parse");
        let err = response.into_result().expect_err("failure");
        assert_eq!(err, ErrorInfo::unspecified());
        assert_eq!(err.to_string(), "error: RPC failed");

        let missing_ok = parse_rpc_result(r#"{"type":"rpc_result","id":"d"}"#).expect("parse");
        assert!(!missing_ok.ok);
    }

    #[test]
    fn numeric_error_code_is_stringified() {
        let info = ErrorInfo::from_wire(Some(&json!({"code": 2400, "message": "nope"})));
        assert_eq!(info.code, "2400");
    }

    #[test]
    fn unrelated_and_malformed_frames_are_rejected() {
        assert!(matches!(
            parse_rpc_result("not json"),
            Err(FrameError::Decode(_))
        ));
        assert!(matches!(
            parse_rpc_result("[1,2,3]"),
            Err(FrameError::Decode(_))
        ));
        assert!(matches!(
            parse_rpc_result(r#"{"type":"log","id":"x"}"#),
            Err(FrameError::UnexpectedType(kind)) if kind == "log"
        ));
        assert!(matches!(
            parse_rpc_result(r#"{"id":"x","ok":true}"#),
            Err(FrameError::UnexpectedType(_))
        ));
        assert_eq!(
            parse_rpc_result(r#"{"type":"rpc_result","id":"","ok":true}"#),
            Err(FrameError::MissingId)
        );
        assert_eq!(
            parse_rpc_result(r#"{"type":"rpc_result","id":7,"ok":true}"#),
            Err(FrameError::MissingId)
        );
    }

    #[test]
    fn response_constructors_serialize_wire_shape() {
        let ok = serde_json::to_value(RpcResponse::success("a", json!(1))).expect("ok");
        assert_eq!(ok, json!({"type": "rpc_result", "id": "a", "ok": true, "result": 1}));

        let failed = serde_json::to_value(RpcResponse::failure(
            "b",
            ErrorInfo::new("E1", "bad").with_details(json!({"k": 1})),
        ))
        .expect("failed");
        assert_eq!(
            failed,
            json!({
                "type": "rpc_result",
                "id": "b",
                "ok": false,
                "error": {"code": "E1", "message": "bad", "details": {"k": 1}}
            })
        );
    }
}
