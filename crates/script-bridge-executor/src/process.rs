//! Spawned task processes.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use bytes::BytesMut;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use futures::{StreamExt, stream};
use script_bridge_core::{
    ChunkStream, ExitOutcome, Invocation, ProcessControl, SpawnError, Spawner,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};

use crate::resolve::resolve_executable_path;

/// Upper bound for a single output chunk.
const CHUNK_SIZE: usize = 8 * 1024;

/// Turn a pipe into a stream of chunks, one per successful read.
fn chunk_stream<R>(reader: R) -> ChunkStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::try_unfold(reader, |mut reader| async move {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            Ok::<_, std::io::Error>(None)
        } else {
            Ok(Some((buf.freeze(), reader)))
        }
    })
    .boxed()
}

/// One external process running in its own process group.
///
/// Killing the handle signals the whole group so interpreter subprocesses
/// do not outlive the task.
pub struct ProcessHandle {
    child: AsyncGroupChild,
    pid: Option<u32>,
    stdout: Option<ChunkStream>,
    stderr: Option<ChunkStream>,
    exit: Option<ExitOutcome>,
    terminated: bool,
}

impl ProcessHandle {
    /// Spawn the invocation with piped output and no stdin.
    ///
    /// # Errors
    /// Returns error if the program cannot be found or the OS refuses to start it.
    pub async fn spawn(
        invocation: &Invocation,
        working_dir: Option<&Path>,
    ) -> Result<Self, SpawnError> {
        let program = resolve_executable_path(&invocation.program)
            .await
            .ok_or_else(|| SpawnError::ExecutableNotFound(invocation.program.clone()))?;

        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.group_spawn().map_err(|source| SpawnError::Io {
            program: invocation.program.clone(),
            source,
        })?;

        let pid = child.id();
        let stdout = child.inner().stdout.take().map(chunk_stream);
        let stderr = child.inner().stderr.take().map(chunk_stream);

        tracing::info!(
            pid,
            program = %program.display(),
            args = invocation.args.len(),
            "Process spawned"
        );

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
            exit: None,
            terminated: false,
        })
    }

    /// Exit outcome once the process has been reaped.
    #[must_use]
    pub const fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit
    }

    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[async_trait]
impl ProcessControl for ProcessHandle {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<ChunkStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ChunkStream> {
        self.stderr.take()
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let outcome = ExitOutcome::from(self.child.wait().await?);
        self.exit = Some(outcome);
        self.terminated = true;
        tracing::debug!(pid = self.pid, code = ?outcome.code, "Process exited");
        Ok(outcome)
    }

    async fn kill(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Err(e) = self.child.start_kill() {
            // Already gone between the last check and the signal.
            tracing::debug!(pid = self.pid, "Kill signal not delivered: {e}");
        }
        match self.child.wait().await {
            Ok(status) => self.exit = Some(status.into()),
            Err(e) => tracing::warn!(pid = self.pid, "Failed to reap killed process: {e}"),
        }
        tracing::info!(pid = self.pid, "Process killed");
    }
}

/// Spawner that starts real OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner {
    working_dir: Option<PathBuf>,
}

impl ProcessSpawner {
    /// Create a spawner that inherits the server's working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every process from the given directory.
    #[must_use]
    pub fn with_working_dir(working_dir: PathBuf) -> Self {
        Self {
            working_dir: Some(working_dir),
        }
    }
}

#[async_trait]
impl Spawner for ProcessSpawner {
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ProcessControl>, SpawnError> {
        let handle = ProcessHandle::spawn(invocation, self.working_dir.as_deref()).await?;
        Ok(Box::new(handle))
    }
}
