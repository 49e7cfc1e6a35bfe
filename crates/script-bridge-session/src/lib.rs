//! Session orchestration for the script bridge.
//!
//! Provides:
//! - `Session` - Per-connection state machine (idle / busy / closed)
//! - `SessionManager` - Routes frames to sessions and tears them down

pub mod manager;
mod run;
pub mod session;

#[cfg(test)]
mod testing;

pub use manager::{ConnectionId, ManagerError, SessionManager};
pub use session::{Session, SessionState};
