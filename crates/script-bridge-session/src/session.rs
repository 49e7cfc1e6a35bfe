//! One client's session: at most one running script at a time.

use std::sync::Arc;

use script_bridge_core::{
    InboundCommand, OutboundEvent, Spawner, TaskId, TaskRegistry,
    event::{NOTHING_TO_STOP, REPLACED_BY_NEW_RUN, STOPPED_BY_USER},
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::run::{ActiveRun, RunEvent};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No script running.
    Idle,
    /// A script is running.
    Busy,
    /// The client went away; no further input is processed.
    Closed,
}

/// Input delivered to a session's control loop.
#[derive(Debug)]
pub(crate) enum SessionInput {
    Command(InboundCommand),
    Malformed(String),
    Close,
}

/// Per-connection state machine.
///
/// Reacts to client commands and to events from its running script, and
/// writes every outbound event to the client channel in generation order.
pub struct Session<S: Spawner> {
    registry: Arc<TaskRegistry>,
    spawner: Arc<S>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    active: Option<ActiveRun>,
    closed: bool,
}

impl<S: Spawner + 'static> Session<S> {
    /// Create an idle session writing to `outbound`.
    #[must_use]
    pub const fn new(
        registry: Arc<TaskRegistry>,
        spawner: Arc<S>,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> Self {
        Self {
            registry,
            spawner,
            outbound,
            active: None,
            closed: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.active.is_some() {
            SessionState::Busy
        } else {
            SessionState::Idle
        }
    }

    /// Run the control loop on its own task.
    pub(crate) fn spawn(self) -> SessionHandle {
        let (inbox, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        SessionHandle { inbox, task }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionInput>) {
        loop {
            tokio::select! {
                input = inbox.recv() => match input {
                    Some(SessionInput::Command(command)) => self.handle_command(command).await,
                    Some(SessionInput::Malformed(message)) => self.handle_malformed(message),
                    Some(SessionInput::Close) | None => {
                        self.close().await;
                        break;
                    }
                },
                event = next_run_event(&mut self.active) => self.handle_run_event(event),
            }
        }
    }

    /// Apply a decoded client command.
    pub async fn handle_command(&mut self, command: InboundCommand) {
        if self.closed {
            return;
        }
        match command {
            InboundCommand::Stop => self.stop().await,
            InboundCommand::Run { task_id, args } => {
                if let Some(run) = self.active.take() {
                    tracing::info!(
                        task_id = run.task_id(),
                        next_task_id = task_id,
                        "Replacing running script"
                    );
                    self.finish_stopped(run, REPLACED_BY_NEW_RUN).await;
                }
                self.start(task_id, &args).await;
            }
        }
    }

    /// Report a frame that could not be decoded.
    pub fn handle_malformed(&mut self, message: String) {
        if self.closed {
            return;
        }
        self.emit(OutboundEvent::ErrorLine(message));
        self.emit(OutboundEvent::Finished);
    }

    /// Tear down after the client disconnected.
    ///
    /// Kills the running script without emitting anything.
    pub async fn close(&mut self) {
        self.closed = true;
        if let Some(run) = self.active.take() {
            let task_id = run.task_id();
            let pid = run.pid();
            run.stop().await;
            tracing::info!(task_id, pid, "Script process killed due to connection closure");
        }
    }

    async fn start(&mut self, task_id: TaskId, args: &[String]) {
        let descriptor = match self.registry.lookup(task_id) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(task_id, "Rejected run: {e}");
                self.fail(e.to_string());
                return;
            }
        };

        if let Err(e) = TaskRegistry::validate(descriptor, args) {
            tracing::warn!(task_id, args = args.len(), "Rejected run: missing arguments");
            self.fail(e.to_string());
            return;
        }

        // Arguments may carry credentials; only their count is logged.
        tracing::info!(task_id, args = args.len(), "Running script");
        let invocation = descriptor.build_invocation(args);

        match self.spawner.spawn(&invocation).await {
            Ok(process) => self.active = Some(ActiveRun::start(task_id, process)),
            Err(e) => {
                tracing::error!(task_id, "Failed to spawn script: {e}");
                self.fail(e.to_string());
            }
        }
    }

    async fn stop(&mut self) {
        match self.active.take() {
            Some(run) => {
                tracing::info!(task_id = run.task_id(), pid = run.pid(), "Stopping script");
                self.finish_stopped(run, STOPPED_BY_USER).await;
            }
            None => {
                tracing::info!("No script process to stop");
                self.emit(OutboundEvent::status(NOTHING_TO_STOP));
            }
        }
    }

    /// Kill a run, flush the output it already produced, then close the attempt.
    async fn finish_stopped(&mut self, run: ActiveRun, status: &str) {
        for event in run.stop().await {
            self.forward_output(event);
        }
        self.emit(OutboundEvent::status(status));
        self.emit(OutboundEvent::Finished);
    }

    fn handle_run_event(&mut self, event: Option<RunEvent>) {
        match event {
            Some(event @ (RunEvent::Stdout(_) | RunEvent::Stderr(_))) => self.forward_output(event),
            Some(RunEvent::Exited(outcome)) => {
                let run = self.active.take();
                tracing::info!(
                    task_id = run.as_ref().map(ActiveRun::task_id),
                    code = ?outcome.code,
                    "Script finished"
                );
                if !outcome.success() {
                    self.emit(OutboundEvent::exit_status(outcome.code));
                }
                self.emit(OutboundEvent::Finished);
            }
            Some(RunEvent::Failed(message)) => {
                self.active = None;
                tracing::error!("Script failed: {message}");
                self.fail(message);
            }
            None => {
                self.active = None;
                tracing::error!("Run pump ended without an exit status");
                self.fail("Script process ended unexpectedly".to_string());
            }
        }
    }

    fn forward_output(&self, event: RunEvent) {
        match event {
            RunEvent::Stdout(bytes) => {
                self.emit(OutboundEvent::Line(String::from_utf8_lossy(&bytes).into_owned()));
            }
            RunEvent::Stderr(bytes) => {
                self.emit(OutboundEvent::ErrorLine(String::from_utf8_lossy(&bytes).into_owned()));
            }
            RunEvent::Exited(_) | RunEvent::Failed(_) => {}
        }
    }

    fn fail(&self, message: String) {
        self.emit(OutboundEvent::ErrorLine(message));
        self.emit(OutboundEvent::Finished);
    }

    fn emit(&self, event: OutboundEvent) {
        if self.closed {
            return;
        }
        if self.outbound.send(event).is_err() {
            tracing::debug!("Client channel closed, dropping event");
        }
    }
}

async fn next_run_event(active: &mut Option<ActiveRun>) -> Option<RunEvent> {
    match active {
        Some(run) => run.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a session's control loop.
pub(crate) struct SessionHandle {
    inbox: mpsc::UnboundedSender<SessionInput>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Queue input for the session. Returns false once the loop has exited.
    pub(crate) fn send(&self, input: SessionInput) -> bool {
        self.inbox.send(input).is_ok()
    }

    /// Close the session and wait until its script has been killed.
    pub(crate) async fn shutdown(self) {
        let _ = self.inbox.send(SessionInput::Close);
        if let Err(e) = self.task.await {
            tracing::error!("Session task failed: {e}");
        }
    }
}
