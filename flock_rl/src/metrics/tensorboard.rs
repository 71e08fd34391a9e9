//! Scalar event files readable by TensorBoard.
//!
//! An event file is a sequence of TFRecords:
//!
//! ```text
//! u64 len (LE) | u32 masked_crc32c(len) | payload[len] | u32 masked_crc32c(payload)
//! ```
//!
//! Each payload is a protobuf `Event` holding either the file version or a
//! `Summary` of scalar values.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;

use super::logger::MetricsLogger;

const CRC_MASK_DELTA: u32 = 0xa282_ead8;
const FILE_VERSION: &str = "brain.Event:2";

// ============================================================================
// Protobuf messages (subset of tensorflow/core/util/event.proto)
// ============================================================================

#[derive(Clone, PartialEq, Message)]
struct Event {
    #[prost(double, tag = "1")]
    wall_time: f64,
    #[prost(int64, tag = "2")]
    step: i64,
    #[prost(string, optional, tag = "3")]
    file_version: Option<String>,
    #[prost(message, optional, tag = "5")]
    summary: Option<Summary>,
}

#[derive(Clone, PartialEq, Message)]
struct Summary {
    #[prost(message, repeated, tag = "1")]
    value: Vec<SummaryValue>,
}

#[derive(Clone, PartialEq, Message)]
struct SummaryValue {
    #[prost(string, tag = "1")]
    tag: String,
    #[prost(float, optional, tag = "2")]
    simple_value: Option<f32>,
}

// ============================================================================
// Record framing
// ============================================================================

/// TFRecord checksum: CRC-32C rotated and offset.
fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    crc.rotate_right(15).wrapping_add(CRC_MASK_DELTA)
}

fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = (payload.len() as u64).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&masked_crc32c(payload).to_le_bytes())
}

fn file_version_event(wall_time: f64) -> Vec<u8> {
    Event {
        wall_time,
        file_version: Some(FILE_VERSION.to_string()),
        ..Default::default()
    }
    .encode_to_vec()
}

fn scalars_event<'a>(
    wall_time: f64,
    step: i64,
    scalars: impl IntoIterator<Item = (&'a str, f32)>,
) -> Vec<u8> {
    let value = scalars
        .into_iter()
        .map(|(tag, v)| SummaryValue {
            tag: tag.to_string(),
            simple_value: Some(v),
        })
        .collect();
    Event {
        wall_time,
        step,
        summary: Some(Summary { value }),
        ..Default::default()
    }
    .encode_to_vec()
}

// ============================================================================
// Writer
// ============================================================================

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Writes `events.out.tfevents.<secs>.<host>` into a log directory.
pub struct TensorBoardLogger {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl TensorBoardLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> io::Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;
        let wall_time = now_secs();
        let path = log_dir.join(format!(
            "events.out.tfevents.{}.{}",
            wall_time as u64,
            host_name()
        ));

        let mut writer = BufWriter::new(File::create(&path)?);
        write_record(&mut writer, &file_version_event(wall_time))?;
        writer.flush()?;
        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsLogger for TensorBoardLogger {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>) {
        if metrics.is_empty() {
            return;
        }
        let payload = scalars_event(
            now_secs(),
            step as i64,
            metrics.iter().map(|(k, &v)| (k.as_str(), v)),
        );
        if let Err(e) = write_record(&mut self.writer, &payload) {
            log::warn!("failed to write tensorboard event: {e}");
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for TensorBoardLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("failed to flush {}: {e}", self.path.display());
        }
    }
}
