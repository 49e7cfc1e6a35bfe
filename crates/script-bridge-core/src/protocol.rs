//! Inbound wire protocol.

use serde::Deserialize;

use crate::registry::TaskId;

/// Literal frame that requests the running script be stopped.
pub const STOP_TOKEN: &str = "STOP_SCRIPT";

/// Command decoded from a client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Stop the running script.
    Stop,
    /// Run a task with positional arguments.
    Run { task_id: TaskId, args: Vec<String> },
}

/// Frame could not be decoded into a command.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProtocolError(String);

impl ProtocolError {
    /// Decoder message, suitable for reporting back to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Largest integer a JSON client can send as a float without losing precision.
const MAX_EXACT_FLOAT_ID: f64 = 9_007_199_254_740_991.0;

/// JSON body of a run request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    script_id: serde_json::Number,
    #[serde(default)]
    params: Vec<String>,
}

/// Accept integer ids, including ones written as `1.0`.
fn task_id(number: &serde_json::Number) -> Option<TaskId> {
    if let Some(id) = number.as_i64() {
        return Some(id);
    }
    let value = number.as_f64()?;
    if value.fract() != 0.0 || value.abs() > MAX_EXACT_FLOAT_ID {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let id = value as TaskId;
    Some(id)
}

impl InboundCommand {
    /// Decode a text frame.
    ///
    /// # Errors
    /// Returns error if the frame is neither the stop token nor a valid
    /// run request.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        if frame.trim() == STOP_TOKEN {
            return Ok(Self::Stop);
        }

        let RunRequest { script_id, params } = serde_json::from_str(frame)?;
        let task_id = task_id(&script_id)
            .ok_or_else(|| ProtocolError(format!("invalid scriptId: {script_id}")))?;
        Ok(Self::Run {
            task_id,
            args: params,
        })
    }
}
