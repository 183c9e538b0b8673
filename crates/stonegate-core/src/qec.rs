use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_QEC_DEVICE: &str = "qec0";
pub const DEFAULT_MIN_ROUNDS: u32 = 3;
pub const DEFAULT_MAX_ROUNDS: u32 = 9;

const P_FLIP_FLOOR: f64 = 0.01;
const P_FLIP_CEILING: f64 = 0.35;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Measurement {
    pub qubit: u32,
    pub basis: String,
    pub round: u32,
    pub value: u8,
}

pub fn make_measurement(qubit: u32, basis: &str, round: u32, value: u8) -> Measurement {
    Measurement {
        qubit,
        basis: basis.to_string(),
        round,
        value,
    }
}

/// Repetition-code majority vote: 1 only when strictly more than half of the
/// measurements read non-zero.
pub fn repetition_decode_majority(measurements: &[Measurement]) -> u8 {
    if measurements.is_empty() {
        return 0;
    }
    let ones = measurements.iter().filter(|m| m.value != 0).count();
    u8::from(ones * 2 > measurements.len())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeasurementSummary {
    pub count: usize,
    pub ones: usize,
    pub zeros: usize,
}

pub fn summarize_measurements(measurements: &[Measurement]) -> MeasurementSummary {
    let ones = measurements.iter().filter(|m| m.value != 0).count();
    MeasurementSummary {
        count: measurements.len(),
        ones,
        zeros: measurements.len() - ones,
    }
}

/// Monotone demo mapping from temperature to bit-flip probability; colder
/// means less noise.
pub fn p_flip_from_temperature(temperature_k: f64) -> f64 {
    let logistic = 1.0 / (1.0 + (-(temperature_k - 85.0) / 6.0).exp());
    (0.02 + 0.18 * logistic).clamp(0.0, P_FLIP_CEILING)
}

/// Maps a flip probability in `[0.01, 0.35]` linearly onto
/// `[min_rounds, max_rounds]`.
pub fn choose_repetition_rounds(p_flip: f64, min_rounds: u32, max_rounds: u32) -> u32 {
    let span = (P_FLIP_CEILING - P_FLIP_FLOOR).max(1e-9);
    let x = ((p_flip - P_FLIP_FLOOR) / span).clamp(0.0, 1.0);
    let rounds = (f64::from(min_rounds) + f64::from(max_rounds.saturating_sub(min_rounds)) * x)
        .round() as u32;
    rounds.clamp(min_rounds, max_rounds.max(min_rounds))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QecBenchmarkRequest {
    pub code: String,
    pub p_flip: f64,
    pub rounds: u32,
    pub shots: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}
