//! Outbound event vocabulary.

/// Sentinel frame that terminates every task attempt.
pub const FINISHED_SENTINEL: &str = "SCRIPT_FINISHED";

/// Prefix applied to stderr chunks and error reports on the wire.
pub const ERROR_PREFIX: &str = "Error: ";

/// Status text sent when a running script is stopped on request.
pub const STOPPED_BY_USER: &str = "Script stopped by user";

/// Status text sent when `Stop` arrives with nothing running.
pub const NOTHING_TO_STOP: &str = "No active script to stop";

/// Status text sent when a new run supersedes the running one.
pub const REPLACED_BY_NEW_RUN: &str = "Script replaced by a new request";

/// Event emitted by a session towards its client.
///
/// This is the entire outbound vocabulary; every variant maps to exactly
/// one plain text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// A chunk of the process's stdout, forwarded verbatim.
    Line(String),
    /// A chunk of stderr, or an error report.
    ErrorLine(String),
    /// Free-text status about the task lifecycle.
    StatusMessage(String),
    /// End of the current task attempt.
    Finished,
}

impl OutboundEvent {
    /// Create a line event from stdout text.
    pub fn line<S: Into<String>>(s: S) -> Self {
        Self::Line(s.into())
    }

    /// Create an error line event.
    pub fn error<S: Into<String>>(s: S) -> Self {
        Self::ErrorLine(s.into())
    }

    /// Create a status event.
    pub fn status<S: Into<String>>(s: S) -> Self {
        Self::StatusMessage(s.into())
    }

    /// Status reported after a non-zero exit.
    #[must_use]
    pub fn exit_status(code: Option<i32>) -> Self {
        match code {
            Some(code) => Self::StatusMessage(format!("Script finished with code {code}")),
            None => Self::StatusMessage("Script finished without an exit code".to_string()),
        }
    }

    /// Whether this event closes a task attempt.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Render the event as the text frame sent to the client.
    #[must_use]
    pub fn to_frame(&self) -> String {
        match self {
            Self::Line(text) | Self::StatusMessage(text) => text.clone(),
            Self::ErrorLine(text) => format!("{ERROR_PREFIX}{text}"),
            Self::Finished => FINISHED_SENTINEL.to_string(),
        }
    }
}
