//! Leak-rate fit for a pressure vessel relaxing toward atmosphere.
//!
//! Model: `P(t) - P_atm = (P0 - P_atm) * exp(-k * t)`. Taking the log of the
//! pressure excess turns the decay into a line whose slope is `-k`, which is
//! fitted by ordinary least squares.

pub const DEFAULT_P_ATM_KPA: f64 = 101.3;
pub const MIN_LEAK_SAMPLES: usize = 3;

/// Estimates the decay constant `k` (per second) from `(t, pressure)`
/// samples ordered by time.
///
/// Returns `None` when there is no trustworthy estimate: fewer than three
/// samples, a first sample sitting exactly at `p_atm_kpa`, fewer than three
/// points on the same side of atmosphere as the first one, a degenerate time
/// axis, or a fit that implies rising pressure excess (`k < 0`).
pub fn estimate_leak_rate_per_s(samples: &[(f64, f64)], p_atm_kpa: f64) -> Option<f64> {
    let &(t0, p0) = samples.first()?;
    if samples.len() < MIN_LEAK_SAMPLES {
        return None;
    }
    let dp0 = p0 - p_atm_kpa;
    if dp0 == 0.0 {
        return None;
    }
    let above = dp0 > 0.0;

    let points: Vec<(f64, f64)> = samples
        .iter()
        .filter_map(|&(t, p)| {
            let dp = p - p_atm_kpa;
            if dp == 0.0 || (dp > 0.0) != above {
                return None;
            }
            Some((t - t0, dp.abs().ln()))
        })
        .collect();
    if points.len() < MIN_LEAK_SAMPLES {
        return None;
    }

    let n = points.len() as f64;
    let x_mean = points.iter().map(|&(x, _)| x).sum::<f64>() / n;
    let y_mean = points.iter().map(|&(_, y)| y).sum::<f64>() / n;
    let (num, den) = points.iter().fold((0.0, 0.0), |(num, den), &(x, y)| {
        let dx = x - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    if den == 0.0 {
        return None;
    }

    let k = -(num / den);
    if !k.is_finite() || k < 0.0 {
        return None;
    }
    Some(k)
}

/// Time constant `1/k` in seconds; infinite when there is no decay.
pub fn time_constant_s(k: f64) -> f64 {
    if k > 0.0 {
        1.0 / k
    } else {
        f64::INFINITY
    }
}
