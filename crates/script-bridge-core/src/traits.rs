//! Core traits for spawning and controlling task processes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::registry::Invocation;

/// Lazy sequence of raw output chunks from one process stream.
pub type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when ended by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Spawn error.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Failed to start {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A spawned process owned by exactly one session.
#[async_trait]
pub trait ProcessControl: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Take the stdout chunk stream. Returns `None` after the first call.
    fn take_stdout(&mut self) -> Option<ChunkStream>;

    /// Take the stderr chunk stream. Returns `None` after the first call.
    fn take_stderr(&mut self) -> Option<ChunkStream>;

    /// Wait for the process to exit and reap it.
    async fn wait(&mut self) -> std::io::Result<ExitOutcome>;

    /// Terminate the process immediately.
    ///
    /// Idempotent: a no-op on a process that already ended.
    async fn kill(&mut self);
}

/// Starts processes for task invocations.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Spawn a process for the invocation.
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ProcessControl>, SpawnError>;
}
