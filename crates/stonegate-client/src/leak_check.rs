use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use stonegate_core::{
    estimate_leak_rate_per_s, time_constant_s, StabilityCriteria, DEFAULT_P_ATM_KPA,
};
use tokio::time::Instant;
use tracing::info;

use crate::connection::StoneGateClient;
use crate::error::{ClientError, Result};

pub const PRESSURE_METRIC: &str = "pressure_kPa";
const MIN_STABILIZE_TIMEOUT_S: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LeakCheckConfig {
    pub pressure_sensor_id: String,
    pub pressure_controller_id: String,
    pub target_kpa: f64,
    pub observe: Duration,
    pub sample_period: Duration,
    pub p_atm_kpa: f64,
    pub stable_tolerance_kpa: f64,
    pub stable_window_s: f64,
    pub stable_consecutive: u32,
}

impl Default for LeakCheckConfig {
    fn default() -> Self {
        Self {
            pressure_sensor_id: "press0".to_string(),
            pressure_controller_id: "press_ctrl0".to_string(),
            target_kpa: 40.0,
            observe: Duration::from_secs(60),
            sample_period: Duration::from_secs(1),
            p_atm_kpa: DEFAULT_P_ATM_KPA,
            stable_tolerance_kpa: 0.3,
            stable_window_s: 4.0,
            stable_consecutive: 6,
        }
    }
}

impl LeakCheckConfig {
    pub fn stability_criteria(&self) -> StabilityCriteria {
        let scaled = self.stable_window_s * f64::from(self.stable_consecutive) * 3.0;
        StabilityCriteria {
            tolerance: self.stable_tolerance_kpa,
            window_s: self.stable_window_s,
            consecutive: self.stable_consecutive,
            timeout_s: scaled.max(MIN_STABILIZE_TIMEOUT_S),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakCheckReport {
    /// Pressure once the pumped chamber had settled.
    pub p0_kpa: f64,
    pub p_end_kpa: f64,
    pub observe_s: f64,
    pub samples: usize,
    /// Fitted decay rate; `None` when the drift data gave no usable estimate.
    pub leak_rate_per_s: Option<f64>,
    pub tau_s: Option<f64>,
}

/// Pumps the chamber to `target_kpa`, waits for it to settle, then turns the
/// pump off and fits the drift back toward atmosphere.
pub async fn run_leak_check(
    client: &StoneGateClient,
    config: &LeakCheckConfig,
) -> Result<LeakCheckReport> {
    if config.sample_period.is_zero() {
        return Err(ClientError::Validation(
            "sample_period must be greater than zero".to_string(),
        ));
    }
    let criteria = config.stability_criteria();
    criteria
        .validate()
        .map_err(|err| ClientError::Validation(err.to_string()))?;

    let available: BTreeSet<String> = client.device_ids().await?.into_iter().collect();
    for required in [&config.pressure_controller_id, &config.pressure_sensor_id] {
        if !available.contains(required) {
            let listed: Vec<&str> = available.iter().map(String::as_str).collect();
            return Err(ClientError::Validation(format!(
                "missing device id '{required}', available: [{}]",
                listed.join(", ")
            )));
        }
    }

    let controller = config.pressure_controller_id.as_str();
    let sensor = config.pressure_sensor_id.as_str();
    let seal = setpoints([
        ("sealed", Value::Bool(true)),
        ("pump_enabled", Value::Bool(true)),
    ]);
    client.device_set(controller, seal).await?;
    let target = setpoints([("pressure_setpoint_kPa", Value::from(config.target_kpa))]);
    client.device_set(controller, target).await?;
    client
        .wait_for_stable(sensor, PRESSURE_METRIC, &criteria)
        .await?;

    let p0_kpa = client.required_number(sensor, PRESSURE_METRIC).await?;
    info!(sensor, p0_kpa, "leak_check_stabilized");
    client
        .device_set(controller, setpoints([("pump_enabled", Value::Bool(false))]))
        .await?;

    let mut samples = Vec::new();
    let start = Instant::now();
    loop {
        let t = start.elapsed();
        let p = client.required_number(sensor, PRESSURE_METRIC).await?;
        samples.push((t.as_secs_f64(), p));
        if t >= config.observe {
            break;
        }
        tokio::time::sleep(config.sample_period).await;
    }

    let leak_rate_per_s = estimate_leak_rate_per_s(&samples, config.p_atm_kpa);
    let p_end_kpa = samples.last().map_or(p0_kpa, |&(_, p)| p);
    let report = LeakCheckReport {
        p0_kpa,
        p_end_kpa,
        observe_s: config.observe.as_secs_f64(),
        samples: samples.len(),
        leak_rate_per_s,
        tau_s: leak_rate_per_s.map(time_constant_s).filter(|tau| tau.is_finite()),
    };
    info!(
        p_end_kpa,
        k = ?report.leak_rate_per_s,
        samples = report.samples,
        "leak_check_finished"
    );
    Ok(report)
}

fn setpoints<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
