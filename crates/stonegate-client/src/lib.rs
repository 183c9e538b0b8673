//! Async client for the StoneGate device-control backend.
//!
//! One [`StoneGateClient`] owns one WebSocket connection. Any number of
//! calls may be in flight at once; a single reader task matches each
//! `rpc_result` frame to its caller by correlation id.

pub mod config;
pub mod error;
pub mod leak_check;
pub mod qec;
pub mod safe_state;
pub mod stability;

mod api;
mod connection;
mod correlator;

pub use config::ClientConfig;
pub use connection::StoneGateClient;
pub use error::{ClientError, Result};
pub use leak_check::{run_leak_check, LeakCheckConfig, LeakCheckReport};
pub use safe_state::{apply_safe_state, SafeStateControl, SafeStateOutcome, SafeStateTarget};
pub use stability::wait_for_stable;
