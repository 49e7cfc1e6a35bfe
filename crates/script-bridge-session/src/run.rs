//! The run pump: one task per running process.
//!
//! The pump owns the process, reads both output streams and forwards each
//! chunk onto a per-run channel consumed by the session loop. The terminal
//! event is sent only after both streams reached EOF and the process was
//! reaped, so it always trails the output.

use bytes::Bytes;
use futures::StreamExt;
use script_bridge_core::{ChunkStream, ExitOutcome, ProcessControl, TaskId};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Event produced by a run pump.
#[derive(Debug)]
pub(crate) enum RunEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    Exited(ExitOutcome),
    Failed(String),
}

impl RunEvent {
    /// Whether this event carries process output.
    pub(crate) const fn is_output(&self) -> bool {
        matches!(self, Self::Stdout(_) | Self::Stderr(_))
    }
}

/// Session-side view of a running process.
pub(crate) struct ActiveRun {
    task_id: TaskId,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    events: mpsc::UnboundedReceiver<RunEvent>,
    pump: Option<JoinHandle<()>>,
}

impl ActiveRun {
    /// Hand the process to a new pump task.
    pub(crate) fn start(task_id: TaskId, process: Box<dyn ProcessControl>) -> Self {
        let (kill_tx, kill_rx) = oneshot::channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let pid = process.id();
        let pump = tokio::spawn(pump(process, kill_rx, events_tx));

        Self {
            task_id,
            pid,
            kill_tx: Some(kill_tx),
            events,
            pump: Some(pump),
        }
    }

    pub(crate) const fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub(crate) const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next event from the pump; `None` once the pump is gone.
    pub(crate) async fn recv(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Request termination. Idempotent.
    pub(crate) fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Kill the process, wait for the pump to reap it and return the output
    /// that was produced before the kill landed.
    pub(crate) async fn stop(mut self) -> Vec<RunEvent> {
        self.kill();
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                tracing::error!(task_id = self.task_id, "Run pump failed: {e}");
            }
        }

        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if event.is_output() {
                pending.push(event);
            }
        }
        pending
    }
}

async fn next_chunk(stream: &mut Option<ChunkStream>) -> Option<std::io::Result<Bytes>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn pump(
    mut process: Box<dyn ProcessControl>,
    mut kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<RunEvent>,
) {
    let mut stdout = process.take_stdout();
    let mut stderr = process.take_stderr();

    loop {
        let drained = stdout.is_none() && stderr.is_none();

        tokio::select! {
            biased;

            // Fires on an explicit kill and when the session drops the run.
            _ = &mut kill_rx => {
                process.kill().await;
                return;
            }
            chunk = next_chunk(&mut stdout) => match chunk {
                Some(Ok(bytes)) => {
                    tracing::debug!(bytes = bytes.len(), "stdout chunk");
                    let _ = events.send(RunEvent::Stdout(bytes));
                }
                Some(Err(e)) => {
                    process.kill().await;
                    let _ = events.send(RunEvent::Failed(format!("Failed to read stdout: {e}")));
                    return;
                }
                None => stdout = None,
            },
            chunk = next_chunk(&mut stderr) => match chunk {
                Some(Ok(bytes)) => {
                    tracing::debug!(bytes = bytes.len(), "stderr chunk");
                    let _ = events.send(RunEvent::Stderr(bytes));
                }
                Some(Err(e)) => {
                    process.kill().await;
                    let _ = events.send(RunEvent::Failed(format!("Failed to read stderr: {e}")));
                    return;
                }
                None => stderr = None,
            },
            result = process.wait(), if drained => {
                let event = match result {
                    Ok(outcome) => RunEvent::Exited(outcome),
                    Err(e) => RunEvent::Failed(e.to_string()),
                };
                let _ = events.send(event);
                return;
            }
        }
    }
}
