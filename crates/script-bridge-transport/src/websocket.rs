//! WebSocket transport: one socket, one session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::StreamExt;
use script_bridge_core::{OutboundEvent, Spawner};
use script_bridge_session::SessionManager;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// WebSocket handler state.
pub struct WsState<S: Spawner> {
    /// Session manager shared by all connections.
    pub manager: Arc<SessionManager<S>>,
}

impl<S: Spawner> Clone for WsState<S> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<S: Spawner> WsState<S> {
    /// Create new WebSocket state.
    #[must_use]
    pub const fn new(manager: Arc<SessionManager<S>>) -> Self {
        Self { manager }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<S>(ws: WebSocketUpgrade, State(state): State<WsState<S>>) -> impl IntoResponse
where
    S: Spawner + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<S>(socket: WebSocket, state: WsState<S>)
where
    S: Spawner + 'static,
{
    let (sender, mut receiver) = socket.split();

    // Channel for sending events to the client
    let (tx, rx) = mpsc::unbounded_channel::<OutboundEvent>();
    let id = state.manager.open(tx).await;
    tracing::info!(%id, "WebSocket connection established");

    // Every event becomes exactly one text frame, in order
    let send_task = tokio::spawn(async move {
        let frames = UnboundedReceiverStream::new(rx)
            .map(|event| Ok::<_, axum::Error>(Message::Text(event.to_frame().into())));
        if let Err(e) = frames.forward(sender).await {
            tracing::debug!("WebSocket send stopped: {e}");
        }
    });

    while let Some(msg) = receiver.next().await {
        let result = match msg {
            Ok(Message::Text(text)) => state.manager.dispatch(id, text.as_str()).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => state.manager.dispatch(id, text).await,
                Err(_) => {
                    tracing::warn!(%id, "Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%id, "WebSocket error: {e}");
                break;
            }
        };

        if let Err(e) = result {
            tracing::error!(%id, "Failed to route message: {e}");
            break;
        }
    }

    // Kills any running script before the entry disappears
    state.manager.close(id).await;
    send_task.abort();

    tracing::info!(%id, "WebSocket connection closed");
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
    tasks: usize,
}

async fn health<S>(State(state): State<WsState<S>>) -> Json<HealthResponse>
where
    S: Spawner + 'static,
{
    Json(HealthResponse {
        status: "ok",
        sessions: state.manager.session_count().await,
        tasks: state.manager.registry().len(),
    })
}

/// Create the bridge router: `/ws` for clients, `/health` for probes.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(SessionManager::new(registry, ProcessSpawner::new()));
/// axum::serve(listener, create_router(manager)).await?;
/// ```
#[must_use]
pub fn create_router<S>(manager: Arc<SessionManager<S>>) -> Router
where
    S: Spawner + 'static,
{
    Router::new()
        .route("/ws", get(ws_handler::<S>))
        .route("/health", get(health::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(WsState::new(manager))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use script_bridge_core::{
        TaskDescriptor, TaskRegistry,
        registry::builtin_catalog,
    };
    use script_bridge_executor::ProcessSpawner;
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let descriptors = builtin_catalog()
            .iter()
            .map(|def| TaskDescriptor::new(def, "python".to_string(), vec![def.script.clone()]))
            .collect::<Vec<_>>();
        let registry = TaskRegistry::new(descriptors).unwrap();
        create_router(Arc::new(SessionManager::new(registry, ProcessSpawner::new())))
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
        assert_eq!(json["tasks"], 8);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = router()
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = tokio_test::assert_ok!(
            router()
                .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
                .await
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
