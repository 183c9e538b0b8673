use std::collections::VecDeque;
use thiserror::Error;

pub const MIN_POLL_INTERVAL_S: f64 = 0.05;
pub const MAX_POLL_INTERVAL_S: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCriteria {
    /// Largest allowed `max - min` spread inside one window.
    pub tolerance: f64,
    pub window_s: f64,
    /// Number of consecutive stable judgments required.
    pub consecutive: u32,
    pub timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CriteriaError {
    #[error("tolerance must be a finite value >= 0, got {0}")]
    Tolerance(f64),
    #[error("window_s must be a finite value > 0, got {0}")]
    Window(f64),
    #[error("consecutive must be at least 1")]
    Consecutive,
    #[error("timeout_s must be a finite value > 0, got {0}")]
    Timeout(f64),
}

impl StabilityCriteria {
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(CriteriaError::Tolerance(self.tolerance));
        }
        if !self.window_s.is_finite() || self.window_s <= 0.0 {
            return Err(CriteriaError::Window(self.window_s));
        }
        if self.consecutive == 0 {
            return Err(CriteriaError::Consecutive);
        }
        if !self.timeout_s.is_finite() || self.timeout_s <= 0.0 {
            return Err(CriteriaError::Timeout(self.timeout_s));
        }
        Ok(())
    }

    pub fn poll_interval_s(&self) -> f64 {
        (self.window_s / 4.0).clamp(MIN_POLL_INTERVAL_S, MAX_POLL_INTERVAL_S)
    }
}

/// Trailing time window of `(timestamp, value)` samples plus the running
/// count of consecutive stable judgments.
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    tolerance: f64,
    window_s: f64,
    required: u32,
    samples: VecDeque<(f64, f64)>,
    stable_count: u32,
}

impl StabilityWindow {
    pub fn new(criteria: &StabilityCriteria) -> Self {
        Self {
            tolerance: criteria.tolerance,
            window_s: criteria.window_s,
            required: criteria.consecutive,
            samples: VecDeque::new(),
            stable_count: 0,
        }
    }

    /// Feeds one poll result taken at `now_s` and reports whether the
    /// required number of consecutive stable windows has been reached.
    ///
    /// A missing (or NaN) value is not recorded and leaves the counter alone.
    pub fn observe(&mut self, now_s: f64, value: Option<f64>) -> bool {
        let value = value.filter(|v| !v.is_nan());
        if let Some(value) = value {
            self.samples.push_back((now_s, value));
        }
        while let Some(&(ts, _)) = self.samples.front() {
            if now_s - ts > self.window_s {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        if value.is_none() {
            return false;
        }
        if let Some(spread) = self.spread() {
            if spread <= self.tolerance {
                self.stable_count += 1;
            } else {
                self.stable_count = 0;
            }
        }
        self.stable_count >= self.required
    }

    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn spread(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let mut values = self.samples.iter().map(|&(_, v)| v);
        let first = values.next()?;
        let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(max - min)
    }
}
