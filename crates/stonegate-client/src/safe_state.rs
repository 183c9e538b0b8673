use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::mem;

use serde_json::{Map, Value};
use stonegate_core::DeviceAction;
use tracing::{info, warn};

use crate::connection::StoneGateClient;
use crate::error::{ClientError, Result};

/// The two backend operations the supervisor needs.
pub trait SafeStateControl {
    fn stop_recording(&self, recording_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn apply_setpoints(
        &self,
        device_id: &str,
        params: &Map<String, Value>,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl SafeStateControl for StoneGateClient {
    fn stop_recording(&self, recording_id: &str) -> impl Future<Output = Result<()>> + Send {
        async move { self.record_stop(recording_id).await.map(|_| ()) }
    }

    fn apply_setpoints(
        &self,
        device_id: &str,
        params: &Map<String, Value>,
    ) -> impl Future<Output = Result<()>> + Send {
        let action = DeviceAction::Set(params.clone());
        async move { self.device_action(device_id, &action).await.map(|_| ()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeStateTarget {
    Recording(String),
    Device(String),
}

impl fmt::Display for SafeStateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeStateTarget::Recording(id) => write!(f, "recording {id}"),
            SafeStateTarget::Device(id) => write!(f, "device {id}"),
        }
    }
}

#[derive(Debug)]
pub struct SafeStateOutcome {
    pub target: SafeStateTarget,
    pub result: std::result::Result<(), ClientError>,
}

impl SafeStateOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Best-effort shutdown: stops every active recording, then applies each
/// non-empty setpoint map, one call at a time.
///
/// Failures are logged and reported in the returned outcomes but never
/// abort the sequence. `active_recordings` is always empty on return.
pub async fn apply_safe_state<C: SafeStateControl>(
    control: &C,
    active_recordings: &mut BTreeSet<String>,
    targets: &BTreeMap<String, Map<String, Value>>,
) -> Vec<SafeStateOutcome> {
    let recordings = mem::take(active_recordings);
    let mut outcomes = Vec::with_capacity(recordings.len() + targets.len());

    for recording_id in recordings {
        let result = control.stop_recording(&recording_id).await;
        outcomes.push(settle(SafeStateTarget::Recording(recording_id), result));
    }
    for (device_id, params) in targets {
        if params.is_empty() {
            continue;
        }
        let result = control.apply_setpoints(device_id, params).await;
        outcomes.push(settle(SafeStateTarget::Device(device_id.clone()), result));
    }

    let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
    info!(targets = outcomes.len(), failed, "safe_state_applied");
    outcomes
}

fn settle(target: SafeStateTarget, result: Result<()>) -> SafeStateOutcome {
    if let Err(err) = &result {
        warn!(%target, error = %err, "safe_state_step_failed");
    }
    SafeStateOutcome { target, result }
}
