use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use stonegate_client::{
    run_leak_check, ClientConfig, ClientError, LeakCheckConfig, StoneGateClient,
};
use stonegate_core::{load_recording, DeviceAction, RecordStartRequest};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stonegate")]
#[command(about = "StoneGate backend RPC client", long_about = None)]
struct Cli {
    /// WebSocket URL; falls back to STONEGATE_WS_URL, then ws://localhost:8080/status.
    #[arg(long, global = true, default_value = "")]
    ws: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List device descriptors
    #[command(name = "devices.list")]
    DevicesList,
    /// Poll all device measurements
    #[command(name = "devices.poll")]
    DevicesPoll,
    /// Send a JSON action to a device
    #[command(name = "device.action")]
    DeviceAction {
        device_id: String,
        /// JSON object, e.g. '{"set": {"pump_enabled": false}}'
        #[arg(value_parser = parse_json)]
        action: Value,
    },
    /// Decode QEC measurements on the backend
    #[command(name = "qec.decode")]
    QecDecode {
        #[arg(value_parser = parse_json)]
        params: Value,
    },
    /// Start a backend recorder session
    #[command(name = "record.start")]
    RecordStart {
        /// JSON array of stream descriptors: [{"device_id":"dev","metrics":[...],"rate_hz":2.0}]
        #[arg(value_parser = parse_json)]
        streams: Value,
        #[arg(long, default_value = "")]
        script_name: String,
        #[arg(long, default_value = "")]
        operator: String,
        #[arg(long, default_value = "recording")]
        file_base: String,
        #[arg(long, default_value_t = 10.0)]
        timeout_s: f64,
    },
    /// Stop a backend recorder session
    #[command(name = "record.stop")]
    RecordStop {
        recording_id: String,
        #[arg(long, default_value_t = 10.0)]
        timeout_s: f64,
    },
    /// Load a recording JSONL file
    #[command(name = "record.load")]
    RecordLoad { path: PathBuf },
    /// Pump a chamber down, release it and estimate its leak rate
    #[command(name = "leak-check")]
    LeakCheck(LeakCheckArgs),
}

#[derive(clap::Args, Debug)]
struct LeakCheckArgs {
    #[arg(long, default_value = "press0")]
    press: String,
    #[arg(long, default_value = "press_ctrl0")]
    ctrl: String,
    #[arg(long, default_value_t = 40.0)]
    target_kpa: f64,
    #[arg(long, default_value_t = 60.0)]
    observe_s: f64,
    #[arg(long, default_value_t = 1.0)]
    sample_period_s: f64,
    #[arg(long, default_value_t = 101.3)]
    p_atm_kpa: f64,
    #[arg(long, default_value_t = 0.3)]
    stable_tol_kpa: f64,
    #[arg(long, default_value_t = 4.0)]
    stable_window_s: f64,
    #[arg(long, default_value_t = 6)]
    stable_consecutive: u32,
}

impl LeakCheckArgs {
    fn into_config(self) -> Result<LeakCheckConfig> {
        Ok(LeakCheckConfig {
            pressure_sensor_id: self.press,
            pressure_controller_id: self.ctrl,
            target_kpa: self.target_kpa,
            observe: seconds(self.observe_s, "--observe-s")?,
            sample_period: seconds(self.sample_period_s, "--sample-period-s")?,
            p_atm_kpa: self.p_atm_kpa,
            stable_tolerance_kpa: self.stable_tol_kpa,
            stable_window_s: self.stable_window_s,
            stable_consecutive: self.stable_consecutive,
        })
    }
}

fn parse_json(raw: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {flag} value {value}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match ClientConfig::resolve(&cli.ws) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let client = StoneGateClient::new(config);
    let outcome = run(&client, cli.command).await;
    client.close().await;

    match outcome {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            let rpc = err
                .downcast_ref::<ClientError>()
                .and_then(ClientError::rpc_info);
            match rpc {
                Some(info) => {
                    println!("ERROR: {info}");
                    ExitCode::from(2)
                }
                None => {
                    eprintln!("error: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run(client: &StoneGateClient, command: Command) -> Result<Value> {
    debug!(?command, url = %client.config().ws_url, "command_start");
    let output = match command {
        Command::DevicesList => client.list_devices().await?,
        Command::DevicesPoll => client.poll_raw().await?,
        Command::DeviceAction { device_id, action } => {
            let action = DeviceAction::from_value(action)?;
            client.device_action(&device_id, &action).await?
        }
        Command::QecDecode { params } => client.qec_decode_raw(params).await?,
        Command::RecordStart {
            streams,
            script_name,
            operator,
            file_base,
            timeout_s,
        } => {
            let request = RecordStartRequest {
                script_name,
                operator,
                file_base,
                ..RecordStartRequest::new(streams)
            };
            let params = serde_json::to_value(&request)?;
            let timeout = seconds(timeout_s, "--timeout-s")?;
            client.call("record.start", params, timeout).await?
        }
        Command::RecordStop {
            recording_id,
            timeout_s,
        } => {
            let timeout = seconds(timeout_s, "--timeout-s")?;
            client
                .record_stop_with_timeout(&recording_id, timeout)
                .await?
                .unwrap_or(Value::Null)
        }
        Command::RecordLoad { path } => serde_json::to_value(load_recording(&path)?)?,
        Command::LeakCheck(args) => {
            let report = run_leak_check(client, &args.into_config()?).await?;
            serde_json::to_value(report)?
        }
    };
    Ok(output)
}

fn init_logging() {
    let level = env::var("STONEGATE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dotted_subcommands_parse_json_arguments() {
        let cli = Cli::try_parse_from([
            "stonegate",
            "--ws",
            "ws://bench:9000/status",
            "device.action",
            "press_ctrl0",
            r#"{"set": {"pump_enabled": false}}"#,
        ])
        .expect("parse");
        assert_eq!(cli.ws, "ws://bench:9000/status");
        match cli.command {
            Command::DeviceAction { device_id, action } => {
                assert_eq!(device_id, "press_ctrl0");
                assert_eq!(action, json!({"set": {"pump_enabled": false}}));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_rejected_by_the_parser() {
        let err = Cli::try_parse_from(["stonegate", "qec.decode", "{not json"])
            .expect_err("invalid json");
        assert!(err.to_string().contains("invalid JSON"), "{err}");
    }

    #[test]
    fn record_start_defaults() {
        let cli = Cli::try_parse_from(["stonegate", "record.start", "[]"]).expect("parse");
        match cli.command {
            Command::RecordStart {
                streams,
                script_name,
                operator,
                file_base,
                timeout_s,
            } => {
                assert_eq!(streams, json!([]));
                assert_eq!(script_name, "");
                assert_eq!(operator, "");
                assert_eq!(file_base, "recording");
                assert_eq!(timeout_s, 10.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn leak_check_flags_map_onto_the_procedure_config() {
        let cli = Cli::try_parse_from([
            "stonegate",
            "leak-check",
            "--observe-s",
            "5",
            "--stable-consecutive",
            "3",
        ])
        .expect("parse");
        let Command::LeakCheck(args) = cli.command else {
            panic!("expected leak-check");
        };
        let config = args.into_config().expect("config");
        assert_eq!(config.observe, Duration::from_secs(5));
        assert_eq!(config.stable_consecutive, 3);
        assert_eq!(config.pressure_sensor_id, "press0");
        assert_eq!(config.sample_period, Duration::from_secs(1));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(seconds(-1.0, "--timeout-s").is_err());
    }
}
