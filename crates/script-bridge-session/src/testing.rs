//! In-memory spawner for state-machine tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use script_bridge_core::{
    ChunkStream, ExitOutcome, Invocation, ProcessControl, SpawnError, Spawner,
};

/// Spawns processes that print fixed stdout chunks and then run until killed.
#[derive(Default)]
pub(crate) struct FakeSpawner {
    output: Vec<&'static str>,
    fail: bool,
    read_error: Option<&'static str>,
    invocations: Mutex<Vec<Invocation>>,
    kills: Arc<AtomicUsize>,
}

impl FakeSpawner {
    pub(crate) fn with_output<const N: usize>(output: [&'static str; N]) -> Self {
        Self {
            output: output.to_vec(),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Processes whose stdout fails after the fixed output.
    pub(crate) fn with_read_error(message: &'static str) -> Self {
        Self {
            read_error: Some(message),
            ..Self::default()
        }
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub(crate) fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Spawner for FakeSpawner {
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ProcessControl>, SpawnError> {
        if self.fail {
            return Err(SpawnError::ExecutableNotFound(invocation.program.clone()));
        }
        self.invocations.lock().unwrap().push(invocation.clone());

        let mut chunks: Vec<std::io::Result<Bytes>> = self
            .output
            .iter()
            .map(|s| Ok(Bytes::from_static(s.as_bytes())))
            .collect();
        if let Some(message) = self.read_error {
            chunks.push(Err(std::io::Error::other(message)));
        }
        let stdout = stream::iter(chunks).chain(stream::pending()).boxed();

        Ok(Box::new(FakeProcess {
            stdout: Some(stdout),
            stderr: Some(stream::empty().boxed()),
            kills: Arc::clone(&self.kills),
            killed: false,
        }))
    }
}

struct FakeProcess {
    stdout: Option<ChunkStream>,
    stderr: Option<ChunkStream>,
    kills: Arc<AtomicUsize>,
    killed: bool,
}

#[async_trait]
impl ProcessControl for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn take_stdout(&mut self) -> Option<ChunkStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ChunkStream> {
        self.stderr.take()
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        if self.killed {
            return Ok(ExitOutcome { code: None });
        }
        std::future::pending().await
    }

    async fn kill(&mut self) {
        if !self.killed {
            self.killed = true;
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }
}
