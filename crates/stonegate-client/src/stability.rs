use std::future::Future;
use std::time::Duration;

use stonegate_core::{StabilityCriteria, StabilityWindow};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::StoneGateClient;
use crate::error::{ClientError, Result};

/// Polls `sample` until the trailing window has been stable for
/// `criteria.consecutive` judgments in a row, or fails with
/// [`ClientError::Timeout`] once `criteria.timeout_s` has elapsed.
///
/// Errors returned by `sample` abort the wait. Returns the elapsed time.
pub async fn wait_for_stable<F, Fut>(
    label: &str,
    criteria: &StabilityCriteria,
    mut sample: F,
) -> Result<Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<f64>>>,
{
    criteria
        .validate()
        .map_err(|err| ClientError::Validation(err.to_string()))?;
    let timeout = seconds(criteria.timeout_s, "timeout_s")?;
    let interval = seconds(criteria.poll_interval_s(), "poll interval")?;

    let start = Instant::now();
    let mut window = StabilityWindow::new(criteria);
    while start.elapsed() < timeout {
        let value = sample().await?;
        let now = start.elapsed();
        if window.observe(now.as_secs_f64(), value) {
            debug!(label, elapsed = ?now, "stable");
            return Ok(now);
        }
        tokio::time::sleep(interval).await;
    }

    warn!(label, ?timeout, stable = window.stable_count(), "stability_timeout");
    Err(ClientError::Timeout {
        operation: format!("wait_for_stable {label}"),
        timeout,
    })
}

fn seconds(value: f64, name: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|err| ClientError::Validation(format!("{name} {value}: {err}")))
}

impl StoneGateClient {
    /// Waits until `device_id`'s `metric` settles; see [`wait_for_stable`].
    pub async fn wait_for_stable(
        &self,
        device_id: &str,
        metric: &str,
        criteria: &StabilityCriteria,
    ) -> Result<Duration> {
        let label = format!("{device_id}:{metric}");
        wait_for_stable(&label, criteria, || self.latest_number(device_id, metric)).await
    }
}
