//! Task registry: which external program a task id runs and what it needs.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Task identifier as sent by clients.
pub type TaskId = i64;

/// Catalog entry describing a task before it is bound to an interpreter.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskDefinition {
    /// Unique task id.
    pub id: TaskId,
    /// Script file, relative to the scripts directory.
    pub script: String,
    /// Names of the required positional arguments, in order.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Message reported when arguments are missing.
    ///
    /// Derived from `arguments` when absent.
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskDefinition {
    /// Create a definition with a derived validation message.
    pub fn new<S, I>(id: TaskId, script: S, arguments: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            id,
            script: script.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            message: None,
        }
    }

    /// Message reported when required arguments are missing.
    #[must_use]
    pub fn missing_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }

        let id = self.id;
        match self.arguments.as_slice() {
            [] => format!("Script {id} takes no arguments"),
            [only] => format!("{only} is required for Script {id}"),
            [first, second] => format!("Both {first} and {second} are required for Script {id}"),
            [init @ .., last] => format!("{}, and {last} are required for Script {id}", init.join(", ")),
        }
    }
}

/// Concrete program invocation: never a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Task bound to the program that executes it.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    id: TaskId,
    argument_names: Vec<String>,
    missing_message: String,
    program: String,
    base_args: Vec<String>,
}

impl TaskDescriptor {
    /// Bind a definition to a program and its fixed leading arguments.
    #[must_use]
    pub fn new(definition: &TaskDefinition, program: String, base_args: Vec<String>) -> Self {
        Self {
            id: definition.id,
            argument_names: definition.arguments.clone(),
            missing_message: definition.missing_message(),
            program,
            base_args,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Number of caller arguments this task requires.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.argument_names.len()
    }

    #[must_use]
    pub fn argument_names(&self) -> &[String] {
        &self.argument_names
    }

    #[must_use]
    pub fn missing_message(&self) -> &str {
        &self.missing_message
    }

    /// Build the invocation for validated caller arguments.
    ///
    /// Only the first `argument_count` arguments are passed; extras are ignored.
    #[must_use]
    pub fn build_invocation(&self, args: &[String]) -> Invocation {
        let mut all = self.base_args.clone();
        all.extend(args.iter().take(self.argument_count()).cloned());
        Invocation {
            program: self.program.clone(),
            args: all,
        }
    }
}

/// Registry error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown script ID")]
    UnknownTask(TaskId),
    #[error("Duplicate task id {0} in catalog")]
    DuplicateTask(TaskId),
    #[error("Invalid task catalog: {0}")]
    Catalog(String),
}

/// Arguments did not satisfy the task's requirements.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{message}")]
    MissingArguments {
        expected: usize,
        got: usize,
        message: String,
    },
}

/// Immutable lookup table of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, TaskDescriptor>,
}

impl TaskRegistry {
    /// Build a registry from descriptors.
    ///
    /// # Errors
    /// Returns error if two descriptors share an id.
    pub fn new<I>(descriptors: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = TaskDescriptor>,
    {
        let mut tasks = BTreeMap::new();
        for descriptor in descriptors {
            let id = descriptor.id;
            if tasks.insert(id, descriptor).is_some() {
                return Err(RegistryError::DuplicateTask(id));
            }
        }
        Ok(Self { tasks })
    }

    /// Look up a task by id.
    ///
    /// # Errors
    /// Returns `UnknownTask` if the id is not in the catalog.
    pub fn lookup(&self, id: TaskId) -> Result<&TaskDescriptor, RegistryError> {
        self.tasks.get(&id).ok_or(RegistryError::UnknownTask(id))
    }

    /// Check caller arguments against a task's requirements.
    ///
    /// Blank arguments count as missing.
    ///
    /// # Errors
    /// Returns `MissingArguments` carrying the task's message.
    pub fn validate(descriptor: &TaskDescriptor, args: &[String]) -> Result<(), ValidationError> {
        let expected = descriptor.argument_count();
        let got = args
            .iter()
            .take(expected)
            // Blank counts as missing whatever the task's arity.
            .filter(|arg| !arg.trim().is_empty())
            .count();

        if got < expected {
            return Err(ValidationError::MissingArguments {
                expected,
                got,
                message: descriptor.missing_message.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }
}

/// The built-in wallet tooling catalog.
#[must_use]
pub fn builtin_catalog() -> Vec<TaskDefinition> {
    const PROJECT: &str = "Infura Project ID";
    const WALLET: &str = "Wallet Address";

    vec![
        TaskDefinition::new(1, "script1.py", [PROJECT]),
        TaskDefinition::new(2, "script2.py", Vec::<String>::new()),
        TaskDefinition::new(3, "script3.py", [PROJECT, WALLET]),
        TaskDefinition::new(
            4,
            "script4.py",
            [PROJECT, "Sender Address", "Private Key", "Receiver Address"],
        ),
        TaskDefinition::new(5, "script5.py", [PROJECT, WALLET]),
        TaskDefinition::new(6, "script6.py", [PROJECT, WALLET]),
        TaskDefinition::new(7, "script7.py", [PROJECT, WALLET]),
        TaskDefinition::new(8, "script8.py", [PROJECT, "Private Key", "Receiver Address"]),
    ]
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "task", default)]
    tasks: Vec<TaskDefinition>,
}

/// Parse a TOML catalog made of `[[task]]` tables.
///
/// # Errors
/// Returns `Catalog` if the document is invalid or defines no tasks.
pub fn parse_catalog(input: &str) -> Result<Vec<TaskDefinition>, RegistryError> {
    let file: CatalogFile =
        toml::from_str(input).map_err(|e| RegistryError::Catalog(e.to_string()))?;
    if file.tasks.is_empty() {
        return Err(RegistryError::Catalog("no [[task]] entries".to_string()));
    }
    tracing::debug!(tasks = file.tasks.len(), "Parsed task catalog");
    Ok(file.tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TaskRegistry {
        let catalog = builtin_catalog();
        let descriptors = catalog.iter().map(|def| {
            TaskDescriptor::new(def, "python".to_string(), vec![def.script.clone()])
        });
        TaskRegistry::new(descriptors).unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_builtin_thresholds() {
        let registry = registry();
        let counts: Vec<(TaskId, usize)> = registry
            .ids()
            .map(|id| (id, registry.lookup(id).unwrap().argument_count()))
            .collect();
        assert_eq!(
            counts,
            vec![(1, 1), (2, 0), (3, 2), (4, 4), (5, 2), (6, 2), (7, 2), (8, 3)]
        );
    }

    #[test]
    fn test_unknown_task() {
        let registry = registry();
        let err = registry.lookup(9).unwrap_err();
        assert_eq!(err, RegistryError::UnknownTask(9));
        assert_eq!(err.to_string(), "Unknown script ID");
        assert!(registry.lookup(0).is_err());
        assert!(registry.lookup(-1).is_err());
    }

    #[test]
    fn test_missing_arguments_for_every_task() {
        let registry = registry();
        for id in registry.ids() {
            let descriptor = registry.lookup(id).unwrap();
            let expected = descriptor.argument_count();
            if expected == 0 {
                assert!(TaskRegistry::validate(descriptor, &[]).is_ok());
                continue;
            }
            let short = vec!["value".to_string(); expected - 1];
            let err = TaskRegistry::validate(descriptor, &short).unwrap_err();
            let ValidationError::MissingArguments {
                expected: want,
                got,
                message,
            } = err;
            assert_eq!(want, expected);
            assert_eq!(got, expected - 1);
            assert!(message.contains(&format!("Script {id}")), "{message}");
        }
    }

    #[test]
    fn test_builtin_messages() {
        let registry = registry();
        assert_eq!(
            registry.lookup(1).unwrap().missing_message(),
            "Infura Project ID is required for Script 1"
        );
        assert_eq!(
            registry.lookup(6).unwrap().missing_message(),
            "Both Infura Project ID and Wallet Address are required for Script 6"
        );
        assert_eq!(
            registry.lookup(4).unwrap().missing_message(),
            "Infura Project ID, Sender Address, Private Key, and Receiver Address are required for Script 4"
        );
        assert_eq!(
            registry.lookup(8).unwrap().missing_message(),
            "Infura Project ID, Private Key, and Receiver Address are required for Script 8"
        );
    }

    #[test]
    fn test_blank_argument_is_missing() {
        let registry = registry();
        let task = registry.lookup(1).unwrap();
        assert!(TaskRegistry::validate(task, &args(&["  "])).is_err());
        assert!(TaskRegistry::validate(task, &args(&["project"])).is_ok());

        let task = registry.lookup(3).unwrap();
        let err = TaskRegistry::validate(task, &args(&["project", ""])).unwrap_err();
        assert!(matches!(err, ValidationError::MissingArguments { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_invocation_drops_extra_arguments() {
        let registry = registry();
        let task = registry.lookup(3).unwrap();
        let invocation = task.build_invocation(&args(&["p", "w", "extra"]));
        assert_eq!(invocation.program, "python");
        assert_eq!(invocation.args, args(&["script3.py", "p", "w"]));
    }

    #[test]
    fn test_argument_is_not_shell_interpreted() {
        let registry = registry();
        let task = registry.lookup(1).unwrap();
        let invocation = task.build_invocation(&args(&["\"; rm -rf / #"]));
        assert_eq!(invocation.args[1], "\"; rm -rf / #");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let def = TaskDefinition::new(1, "a.py", ["x"]);
        let result = TaskRegistry::new([
            TaskDescriptor::new(&def, "python".into(), vec![]),
            TaskDescriptor::new(&def, "python".into(), vec![]),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateTask(1));
    }

    #[test]
    fn test_parse_catalog() {
        let input = r#"
            [[task]]
            id = 10
            script = "report.py"
            arguments = ["Account", "Month"]

            [[task]]
            id = 11
            script = "ping.py"
            message = "custom"
        "#;
        let tasks = parse_catalog(input).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[0].missing_message(),
            "Both Account and Month are required for Script 10"
        );
        assert!(tasks[1].arguments.is_empty());
        assert_eq!(tasks[1].missing_message(), "custom");
    }

    #[test]
    fn test_parse_catalog_errors() {
        assert!(matches!(parse_catalog(""), Err(RegistryError::Catalog(_))));
        assert!(matches!(
            parse_catalog("[[task]]\nid = \"x\""),
            Err(RegistryError::Catalog(_))
        ));
    }
}
