use std::env;
use std::time::Duration;
use url::Url;

use crate::error::{ClientError, Result};

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/status";
pub const WS_URL_ENV: &str = "STONEGATE_WS_URL";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection-scoped settings, owned by one client instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub ws_url: Url,
    /// Deadline for read-style calls (`devices.list`, `devices.poll`, ...).
    pub call_timeout: Duration,
    /// Deadline for calls that drive hardware or the recorder.
    pub action_timeout: Duration,
}

impl ClientConfig {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn parse(ws_url: &str) -> Result<Self> {
        let url = Url::parse(ws_url.trim())
            .map_err(|err| ClientError::Validation(format!("invalid ws url '{ws_url}': {err}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self::new(url)),
            other => Err(ClientError::Validation(format!(
                "unsupported ws url scheme '{other}' in '{ws_url}'"
            ))),
        }
    }

    /// Flag value first, then `STONEGATE_WS_URL`, then the local default.
    pub fn resolve(flag_url: &str) -> Result<Self> {
        Self::parse(&resolve_ws_url(flag_url))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }
}

fn resolve_ws_url(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = env::var(WS_URL_ENV) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_WS_URL.to_string()
}
