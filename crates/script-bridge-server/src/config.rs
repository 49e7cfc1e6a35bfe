//! Server configuration from environment variables.

use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{self, PathBuf},
};

use script_bridge_core::{
    TaskRegistry,
    registry::{RegistryError, builtin_catalog, parse_catalog},
};
use script_bridge_executor::{CatalogError, bind_catalog};
use thiserror::Error;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default interpreter for catalog scripts.
pub const DEFAULT_INTERPRETER: &str = "python";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("failed to read catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] RegistryError),
    #[error(transparent)]
    Binding(#[from] CatalogError),
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address (`HOST`).
    pub host: IpAddr,
    /// Listening port (`PORT`).
    pub port: u16,
    /// Directory holding the scripts (`SCRIPT_BRIDGE_SCRIPTS_DIR`).
    pub scripts_dir: PathBuf,
    /// Interpreter command line (`SCRIPT_BRIDGE_INTERPRETER`).
    pub interpreter: String,
    /// Optional TOML catalog replacing the built-in one (`SCRIPT_BRIDGE_CATALOG`).
    pub catalog_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function. Empty values count as unset.
    ///
    /// # Errors
    /// Returns error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let host = match get("HOST") {
            Some(value) => value.trim().parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value,
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        // Scripts run from this directory and receive paths under it, so it
        // must not be relative to the server's own working directory.
        let scripts_dir = match get("SCRIPT_BRIDGE_SCRIPTS_DIR") {
            Some(value) => path::absolute(&value).map_err(|_| ConfigError::Invalid {
                name: "SCRIPT_BRIDGE_SCRIPTS_DIR",
                value,
            })?,
            None => std::env::current_dir().map_err(|_| ConfigError::Invalid {
                name: "SCRIPT_BRIDGE_SCRIPTS_DIR",
                value: ".".to_string(),
            })?,
        };

        Ok(Self {
            host,
            port,
            scripts_dir,
            interpreter: get("SCRIPT_BRIDGE_INTERPRETER")
                .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
            catalog_path: get("SCRIPT_BRIDGE_CATALOG").map(PathBuf::from),
        })
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Load the catalog and bind it to the interpreter and scripts directory.
    ///
    /// # Errors
    /// Returns error if the catalog file is unreadable or invalid.
    pub fn load_registry(&self) -> Result<TaskRegistry, ConfigError> {
        let definitions = match &self.catalog_path {
            Some(path) => {
                let input = fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
                    path: path.clone(),
                    source,
                })?;
                parse_catalog(&input)?
            }
            None => builtin_catalog(),
        };
        Ok(bind_catalog(&definitions, &self.interpreter, &self.scripts_dir)?)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::Path};

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.scripts_dir.is_absolute());
        assert_eq!(config.port, 3000);
        assert_eq!(config.addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.interpreter, "python");
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("HOST", "127.0.0.1"),
            ("SCRIPT_BRIDGE_SCRIPTS_DIR", "/srv/scripts"),
            ("SCRIPT_BRIDGE_INTERPRETER", "python3 -u"),
            ("SCRIPT_BRIDGE_CATALOG", "/etc/bridge/tasks.toml"),
        ]))
        .unwrap();
        assert_eq!(config.addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.scripts_dir, PathBuf::from("/srv/scripts"));
        assert_eq!(config.interpreter, "python3 -u");
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/bridge/tasks.toml")));
    }

    #[test]
    fn test_relative_scripts_dir_is_absolute() {
        let config =
            ServerConfig::from_lookup(lookup(&[("SCRIPT_BRIDGE_SCRIPTS_DIR", "scripts")])).unwrap();
        assert!(config.scripts_dir.is_absolute());
        assert_eq!(
            config.scripts_dir,
            std::env::current_dir().unwrap().join("scripts")
        );

        let registry = config.load_registry().unwrap();
        let invocation = registry.lookup(2).unwrap().build_invocation(&[]);
        assert!(Path::new(&invocation.args[0]).is_absolute());
    }

    #[test]
    fn test_empty_port_uses_default() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("HOST", "localhost:1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HOST", .. }));
    }

    #[test]
    fn test_builtin_registry() {
        let config = ServerConfig::from_lookup(lookup(&[("SCRIPT_BRIDGE_SCRIPTS_DIR", "/srv")])).unwrap();
        let registry = config.load_registry().unwrap();
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_missing_catalog_file() {
        let config = ServerConfig::from_lookup(lookup(&[(
            "SCRIPT_BRIDGE_CATALOG",
            "/definitely/not/here/tasks.toml",
        )]))
        .unwrap();
        assert!(matches!(
            config.load_registry(),
            Err(ConfigError::CatalogRead { .. })
        ));
    }
}
