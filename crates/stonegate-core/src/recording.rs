use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER_TYPE: &str = "stonegate_recording";
pub const SAMPLE_TYPE: &str = "sample";
pub const FOOTER_TYPE: &str = "stop";
pub const DEFAULT_FILE_BASE: &str = "recording";

/// Parameters of a `record.start` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordStartRequest {
    /// Array of stream descriptors, e.g. `{"device_id", "metrics", "rate_hz"}`.
    pub streams: Value,
    #[serde(default)]
    pub script_name: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default = "default_file_base")]
    pub file_base: String,
}

impl RecordStartRequest {
    pub fn new(streams: Value) -> Self {
        Self {
            streams,
            script_name: String::new(),
            operator: String::new(),
            file_base: default_file_base(),
        }
    }
}

fn default_file_base() -> String {
    DEFAULT_FILE_BASE.to_string()
}

/// Contents of a JSONL recording written by the backend recorder.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Recording {
    pub header: Option<Value>,
    pub samples: Vec<Value>,
    pub footer: Option<Value>,
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to read recording {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn load_recording(path: &Path) -> Result<Recording, RecordingError> {
    let io_error = |source| RecordingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    parse_recording(BufReader::new(file)).map_err(io_error)
}

/// Reads newline-delimited records. Blank, non-JSON, non-object and
/// unrecognized lines are skipped; the first header wins and the last footer
/// wins.
pub fn parse_recording<R: BufRead>(mut reader: R) -> io::Result<Recording> {
    let mut recording = Recording::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let Ok(text) = std::str::from_utf8(&line) else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(text) else {
            continue;
        };
        match record.get("type").and_then(Value::as_str) {
            Some(HEADER_TYPE) if recording.header.is_none() => recording.header = Some(record),
            Some(SAMPLE_TYPE) => recording.samples.push(record),
            Some(FOOTER_TYPE) => recording.footer = Some(record),
            _ => {}
        }
    }
    Ok(recording)
}
