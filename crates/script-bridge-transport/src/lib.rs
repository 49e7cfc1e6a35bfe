//! Transport layer for the script bridge.
//!
//! Provides:
//! - WebSocket transport and router (feature: websocket)
//!
//! Frames are plain text: one outbound event per frame, and either the stop
//! token or a JSON run request per inbound frame.

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::{WsState, create_router, ws_handler};
