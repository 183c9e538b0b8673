//! Wire types and I/O-free analysis routines shared by the StoneGate client
//! runtime and its command-line tools.

pub mod action;
pub mod condition;
pub mod leak;
pub mod qec;
pub mod recording;
pub mod rpc;
pub mod snapshot;
pub mod stability;

pub use action::{ActionError, DeviceAction};
pub use condition::{eval_condition, CompareOp};
pub use leak::{estimate_leak_rate_per_s, time_constant_s, DEFAULT_P_ATM_KPA};
pub use qec::{Measurement, MeasurementSummary, QecBenchmarkRequest};
pub use recording::{load_recording, parse_recording, RecordStartRequest, Recording, RecordingError};
pub use rpc::{encode_request, parse_rpc_result, ErrorInfo, FrameError, RpcRequest, RpcResponse};
pub use snapshot::{as_number, flatten_measurement, flatten_poll, DeviceSnapshot, MetricMap};
pub use stability::{CriteriaError, StabilityCriteria, StabilityWindow};
