//! Process spawning for script bridge tasks.
//!
//! Provides:
//! - Command building utilities
//! - Catalog binding (definitions + interpreter -> registry)
//! - `ProcessHandle` / `ProcessSpawner` backed by OS process groups

pub mod catalog;
pub mod command;
pub mod process;
pub mod resolve;

pub use catalog::{CatalogError, bind_catalog};
pub use command::{CommandBuilder, CommandParts};
pub use process::{ProcessHandle, ProcessSpawner};
pub use resolve::resolve_executable_path;
