use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Verb-keyed payload carried by `device.action`.
///
/// Known verbs get their own variant; any other object is forwarded
/// unchanged as [`DeviceAction::Raw`]. Verbs and arguments are validated by
/// the backend, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    Set(Map<String, Value>),
    Zero,
    Reset,
    Calibrate(Value),
    OverrideDevice(Value),
    ExtractSyndrome,
    SetTrueBit(u8),
    Raw(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("device action must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl DeviceAction {
    pub fn verb(&self) -> Option<&str> {
        match self {
            Self::Set(_) => Some("set"),
            Self::Zero => Some("zero"),
            Self::Reset => Some("reset"),
            Self::Calibrate(_) => Some("calibrate"),
            Self::OverrideDevice(_) => Some("override_device"),
            Self::ExtractSyndrome => Some("extract_syndrome"),
            Self::SetTrueBit(_) => Some("set_true_bit"),
            Self::Raw(fields) if fields.len() == 1 => fields.keys().next().map(String::as_str),
            Self::Raw(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let single = |verb: &str, payload: Value| {
            let mut fields = Map::new();
            fields.insert(verb.to_string(), payload);
            Value::Object(fields)
        };
        match self {
            Self::Set(params) => single("set", Value::Object(params.clone())),
            Self::Zero => single("zero", Value::Bool(true)),
            Self::Reset => single("reset", Value::Bool(true)),
            Self::Calibrate(payload) => single("calibrate", payload.clone()),
            Self::OverrideDevice(payload) => single("override_device", payload.clone()),
            Self::ExtractSyndrome => single("extract_syndrome", Value::Bool(true)),
            Self::SetTrueBit(bit) => single("set_true_bit", Value::from(*bit)),
            Self::Raw(fields) => Value::Object(fields.clone()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ActionError> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(ActionError::NotAnObject(json_kind(&other))),
        };
        if fields.len() != 1 {
            return Ok(Self::Raw(fields));
        }
        let known = fields
            .iter()
            .next()
            .and_then(|(verb, payload)| known_verb(verb, payload));
        Ok(known.unwrap_or(Self::Raw(fields)))
    }
}

fn known_verb(verb: &str, payload: &Value) -> Option<DeviceAction> {
    match (verb, payload) {
        ("set", Value::Object(params)) => Some(DeviceAction::Set(params.clone())),
        ("zero", Value::Bool(true)) => Some(DeviceAction::Zero),
        ("reset", Value::Bool(true)) => Some(DeviceAction::Reset),
        ("calibrate", payload) => Some(DeviceAction::Calibrate(payload.clone())),
        ("override_device", payload) => Some(DeviceAction::OverrideDevice(payload.clone())),
        ("extract_syndrome", Value::Bool(true)) => Some(DeviceAction::ExtractSyndrome),
        ("set_true_bit", payload) => match payload.as_u64() {
            Some(bit @ (0 | 1)) => Some(DeviceAction::SetTrueBit(bit as u8)),
            _ => None,
        },
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl TryFrom<Value> for DeviceAction {
    type Error = ActionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl Serialize for DeviceAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
