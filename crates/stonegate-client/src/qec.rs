//! Drives the simulated QEC device: noise readout, per-round syndrome
//! extraction and backend decoding.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use stonegate_core::qec::{choose_repetition_rounds, make_measurement};
use stonegate_core::{as_number, DeviceAction, Measurement, MetricMap};
use tracing::debug;

use crate::connection::StoneGateClient;
use crate::error::Result;

pub use stonegate_core::qec::{DEFAULT_MAX_ROUNDS, DEFAULT_MIN_ROUNDS, DEFAULT_QEC_DEVICE};

pub const REPETITION_CODE: &str = "repetition";

/// Temperature and flip probability reported by the device, when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NoiseEstimate {
    pub temperature_k: Option<f64>,
    pub p_flip: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RepetitionAcquisition {
    pub rounds: u32,
    pub qubit: u32,
    pub basis: String,
    /// Driven once through `set_true_bit` before the first round.
    pub set_true_bit: Option<u8>,
    pub settle: Duration,
}

impl RepetitionAcquisition {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            qubit: 0,
            basis: "Z".to_string(),
            set_true_bit: None,
            settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepetitionRun {
    pub measurements: Vec<Measurement>,
    pub decode: Value,
}

impl StoneGateClient {
    /// Current flat metrics of the QEC device; empty when it is not polled.
    pub async fn read_qec_status(&self, device_id: &str) -> Result<MetricMap> {
        let mut snapshot = self.poll_all_flat().await?;
        Ok(snapshot.remove(device_id).unwrap_or_default())
    }

    pub async fn read_noise_estimate(&self, device_id: &str) -> Result<NoiseEstimate> {
        let status = self.read_qec_status(device_id).await?;
        let metric = |name: &str| status.get(name).and_then(as_number);
        Ok(NoiseEstimate {
            temperature_k: metric("temperature_K"),
            p_flip: metric("p_flip"),
        })
    }

    /// Round count from the device's own flip probability, or `min_rounds`
    /// when it reports none.
    pub async fn choose_repetition_rounds_from_hardware(
        &self,
        device_id: &str,
        min_rounds: u32,
        max_rounds: u32,
    ) -> Result<u32> {
        let noise = self.read_noise_estimate(device_id).await?;
        Ok(match noise.p_flip {
            Some(p_flip) => choose_repetition_rounds(p_flip, min_rounds, max_rounds),
            None => min_rounds,
        })
    }

    pub async fn acquire_repetition_measurements(
        &self,
        device_id: &str,
        acquisition: &RepetitionAcquisition,
    ) -> Result<Vec<Measurement>> {
        if let Some(bit) = acquisition.set_true_bit {
            self.device_action(device_id, &DeviceAction::SetTrueBit(bit))
                .await?;
        }

        let mut measurements = Vec::with_capacity(acquisition.rounds as usize);
        for round in 0..acquisition.rounds {
            self.device_action(device_id, &DeviceAction::ExtractSyndrome)
                .await?;
            if !acquisition.settle.is_zero() {
                tokio::time::sleep(acquisition.settle).await;
            }
            let status = self.read_qec_status(device_id).await?;
            let syndrome = status.get("syndrome").and_then(as_number);
            let bit = u8::from(syndrome.is_some_and(|v| v.trunc() != 0.0));
            debug!(device_id, round, bit, "syndrome_read");
            measurements.push(make_measurement(
                acquisition.qubit,
                &acquisition.basis,
                round,
                bit,
            ));
        }
        Ok(measurements)
    }

    /// Acquires a repetition-code run and decodes it on the backend. With
    /// `rounds == None` the count is chosen from the device's noise readout.
    pub async fn run_repetition_and_decode(
        &self,
        device_id: &str,
        rounds: Option<u32>,
        set_true_bit: Option<u8>,
    ) -> Result<RepetitionRun> {
        let rounds = match rounds {
            Some(rounds) => rounds,
            None => {
                self.choose_repetition_rounds_from_hardware(
                    device_id,
                    DEFAULT_MIN_ROUNDS,
                    DEFAULT_MAX_ROUNDS,
                )
                .await?
            }
        };
        let acquisition = RepetitionAcquisition {
            set_true_bit,
            ..RepetitionAcquisition::new(rounds)
        };
        let measurements = self
            .acquire_repetition_measurements(device_id, &acquisition)
            .await?;
        let decode = self
            .qec_decode(REPETITION_CODE, &measurements, Map::new())
            .await?;
        Ok(RepetitionRun {
            measurements,
            decode,
        })
    }
}
