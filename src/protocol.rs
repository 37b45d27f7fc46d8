//! JSON messages exchanged over the vision-scan WebSocket.
//!
//! Client → server: `{"frame": "data:image/jpeg;base64,...", "phase": 1}`
//! Server → client: `{"frame": "data:image/jpeg;base64,...", "progress": 71.4, "chest_dist": 210.0}`

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;

use crate::error::CycleError;

/// Data URI prefix attached to every outgoing frame.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Client → server
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IncomingFrameMessage {
    /// Bare base64 or a data URI.
    #[serde(default)]
    pub frame: String,
    /// Exercise stage the client is in. 1 = calibration/measurement.
    /// Any JSON number is accepted; `null` means 0.
    #[serde(default, deserialize_with = "deserialize_phase")]
    pub phase: i64,
}

fn deserialize_phase<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = Option::<Number>::deserialize(deserializer)?;
    Ok(number.as_ref().map_or(0, phase_from_number))
}

/// `1.0` is phase 1. Values that are not whole numbers can never be phase 1,
/// so they map to 0.
fn phase_from_number(number: &Number) -> i64 {
    if let Some(phase) = number.as_i64() {
        return phase;
    }
    match number.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => v as i64,
        _ => 0,
    }
}

impl IncomingFrameMessage {
    pub fn parse(text: &str) -> Result<Self, CycleError> {
        serde_json::from_str(text).map_err(CycleError::Parse)
    }

    /// Compressed image bytes carried by `frame`.
    pub fn image_bytes(&self) -> Result<Vec<u8>, CycleError> {
        let encoded = strip_data_uri(&self.frame);
        if encoded.is_empty() {
            return Err(CycleError::EmptyFrame);
        }
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(CycleError::Base64)
    }
}

/// Server → client
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutgoingFrameMessage {
    pub frame: String,
    pub progress: f64,
    pub chest_dist: f64,
}

impl OutgoingFrameMessage {
    pub fn new(jpeg: &[u8], progress: f32, chest_dist: f32) -> Self {
        let mut frame = String::with_capacity(JPEG_DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        frame.push_str(JPEG_DATA_URI_PREFIX);
        general_purpose::STANDARD.encode_string(jpeg, &mut frame);
        Self {
            frame,
            progress: progress as f64,
            chest_dist: chest_dist as f64,
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and finite floats; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Drops everything up to and including the first comma.
pub fn strip_data_uri(frame: &str) -> &str {
    match frame.split_once(',') {
        Some((_, payload)) => payload,
        None => frame,
    }
}
