//! Binding catalog definitions to an interpreter.

use std::path::Path;

use script_bridge_core::{
    TaskDefinition, TaskDescriptor, TaskRegistry, registry::RegistryError,
};
use thiserror::Error;

use crate::command::{CommandBuildError, CommandBuilder};

/// Catalog binding error.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid interpreter: {0}")]
    Interpreter(#[from] CommandBuildError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Build a registry where every task runs `<interpreter> <scripts_dir>/<script>`.
///
/// # Errors
/// Returns error if the interpreter cannot be parsed or ids collide.
pub fn bind_catalog(
    definitions: &[TaskDefinition],
    interpreter: &str,
    scripts_dir: &Path,
) -> Result<TaskRegistry, CatalogError> {
    let mut descriptors = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let script = scripts_dir.join(&definition.script);
        let parts = CommandBuilder::new(interpreter)
            .params([script.to_string_lossy().into_owned()])
            .build()?;
        descriptors.push(TaskDescriptor::new(definition, parts.program, parts.args));
    }

    let registry = TaskRegistry::new(descriptors)?;
    tracing::info!(
        tasks = registry.len(),
        interpreter,
        scripts_dir = %scripts_dir.display(),
        "Task catalog loaded"
    );
    Ok(registry)
}
