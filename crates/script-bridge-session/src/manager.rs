//! Session manager: one session per connected client.

use std::{collections::HashMap, sync::Arc};

use script_bridge_core::{InboundCommand, OutboundEvent, Spawner, TaskRegistry};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::session::{Session, SessionHandle, SessionInput};

/// Connection identifier.
pub type ConnectionId = Uuid;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Session not found: {0}")]
    NotFound(ConnectionId),
    #[error("Session already closed: {0}")]
    Closed(ConnectionId),
}

/// Routes client frames to their sessions.
///
/// The connection map is the only state shared between connections; inserts
/// and removals go through its write lock.
pub struct SessionManager<S>
where
    S: Spawner,
{
    registry: Arc<TaskRegistry>,
    spawner: Arc<S>,
    sessions: RwLock<HashMap<ConnectionId, SessionHandle>>,
}

impl<S> SessionManager<S>
where
    S: Spawner + 'static,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(registry: TaskRegistry, spawner: S) -> Self {
        Self {
            registry: Arc::new(registry),
            spawner: Arc::new(spawner),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Open a session whose events are written to `outbound`.
    pub async fn open(&self, outbound: mpsc::UnboundedSender<OutboundEvent>) -> ConnectionId {
        let id = Uuid::new_v4();
        let session = Session::new(Arc::clone(&self.registry), Arc::clone(&self.spawner), outbound);
        self.sessions.write().await.insert(id, session.spawn());
        tracing::info!(%id, "Session opened");
        id
    }

    /// Decode a client frame and deliver it to the session.
    ///
    /// Malformed frames are delivered too; the session reports them.
    ///
    /// # Errors
    /// Returns error if the connection has no live session.
    pub async fn dispatch(&self, id: ConnectionId, frame: &str) -> Result<(), ManagerError> {
        let input = match InboundCommand::decode(frame) {
            Ok(command) => SessionInput::Command(command),
            Err(e) => {
                tracing::warn!(%id, "Invalid client message: {e}");
                SessionInput::Malformed(e.message().to_string())
            }
        };

        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(ManagerError::NotFound(id))?;
        if session.send(input) {
            Ok(())
        } else {
            Err(ManagerError::Closed(id))
        }
    }

    /// Tear down a session, killing its script.
    ///
    /// Returns once the kill has been issued and reaped; returns false if the
    /// connection was unknown.
    pub async fn close(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(session) => {
                session.shutdown().await;
                tracing::info!(%id, "Session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session, e.g. on server shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (id, session) in drained {
            session.shutdown().await;
            tracing::info!(%id, "Session closed on shutdown");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }
}
