//! Core abstractions for the script bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `InboundCommand` / `OutboundEvent` - The wire vocabulary
//! - `TaskRegistry` - Static task catalog and argument validation
//! - `Spawner` and `ProcessControl` traits

pub mod event;
pub mod protocol;
pub mod registry;
pub mod traits;

pub use event::OutboundEvent;
pub use protocol::{InboundCommand, ProtocolError};
pub use registry::{Invocation, TaskDefinition, TaskDescriptor, TaskId, TaskRegistry};
pub use traits::{ChunkStream, ExitOutcome, ProcessControl, SpawnError, Spawner};
