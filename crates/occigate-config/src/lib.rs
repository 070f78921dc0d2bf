//! occigate configuration
//!
//! `occigate.kdl` is discovered from the environment, the working directory
//! or the user config directory and parsed into a [`Config`]:
//!
//! ```kdl
//! server {
//!     listen "0.0.0.0:3000"
//!     base-url "http://localhost:3000"
//! }
//! backend "opennebula" {
//!     timeout 30
//!     serialize-writes #true
//!     endpoint "http://one.example.org:2633/RPC2"
//!     user "oneadmin"
//!     password "secret"
//! }
//! schema {
//!     extensions "/etc/occigate/model"
//! }
//! log-level "info"
//! ```

pub mod error;

pub use error::*;

use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a config file directly
pub const CONFIG_ENV: &str = "OCCIGATE_CONFIG";

const CANDIDATES: [&str; 2] = ["occigate.local.kdl", "occigate.kdl"];

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: String,
    base_url: Option<String>,
}

impl ServerConfig {
    /// Externally visible base URL, derived from `listen` when unset
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Adapter name: `dummy` or `opennebula`
    pub name: String,
    pub timeout: Duration,
    pub serialize_writes: bool,
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub datastore: Option<String>,
    pub bridge: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "dummy".to_string(),
            timeout: Duration::from_secs(30),
            serialize_writes: true,
            endpoint: None,
            user: None,
            password: None,
            datastore: None,
            bridge: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaConfig {
    /// Extension schema files or directories
    pub extensions: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub schema: SchemaConfig,
    pub log_level: String,
    /// File the configuration was read from
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            schema: SchemaConfig::default(),
            log_level: "info".to_string(),
            source: None,
        }
    }
}

impl Config {
    /// Load the discovered config file, or defaults when there is none
    pub fn discover() -> Result<Self> {
        match find_config_file() {
            Ok(path) => load_config(&path),
            Err(ConfigError::ConfigFileNotFound) => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// occigate's directory under the user config directory
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("occigate"))
}

/// Find the config file
///
/// Search order:
/// 1. `OCCIGATE_CONFIG`
/// 2. current directory: `occigate.local.kdl`, `occigate.kdl`
/// 3. `./.occigate/` with the same names
/// 4. `<config_dir>/occigate/occigate.kdl`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".occigate");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("occigate.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Read and parse a config file
///
/// Relative extension paths are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    if let Some(dir) = path.parent() {
        for extension in &mut config.schema.extensions {
            if extension.is_relative() {
                *extension = dir.join(&*extension);
            }
        }
    }
    config.source = Some(path.to_path_buf());
    Ok(config)
}

/// Parse config text
pub fn parse_config(content: &str) -> Result<Config> {
    let doc: KdlDocument = content.parse()?;
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => parse_server(node, &mut config.server)?,
            "backend" => config.backend = parse_backend(node)?,
            "schema" => parse_schema(node, &mut config.schema)?,
            "log-level" => config.log_level = required_string(node)?.to_string(),
            other => {
                return Err(ConfigError::Invalid(format!("unknown node '{}'", other)));
            }
        }
    }

    Ok(config)
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

fn required_string(node: &KdlNode) -> Result<&str> {
    first_string(node).ok_or_else(|| {
        ConfigError::Invalid(format!("'{}' requires a string value", node.name().value()))
    })
}

fn first_bool(node: &KdlNode) -> Result<bool> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| {
            ConfigError::Invalid(format!("'{}' requires #true or #false", node.name().value()))
        })
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn parse_server(node: &KdlNode, server: &mut ServerConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "listen" => server.listen = required_string(child)?.to_string(),
            "base-url" => server.base_url = Some(required_string(child)?.to_string()),
            other => {
                return Err(ConfigError::Invalid(format!("unknown server option '{}'", other)));
            }
        }
    }
    Ok(())
}

fn parse_timeout(node: &KdlNode) -> Result<Duration> {
    let value = node.entries().first().map(|e| e.value());
    let seconds = value
        .and_then(|v| v.as_integer().map(|i| i as f64).or_else(|| v.as_float()))
        .filter(|s| *s > 0.0)
        .ok_or_else(|| {
            ConfigError::Invalid("timeout requires a positive number of seconds".to_string())
        })?;
    Ok(Duration::from_secs_f64(seconds))
}

fn parse_backend(node: &KdlNode) -> Result<BackendConfig> {
    let mut backend = BackendConfig {
        name: required_string(node)?.to_string(),
        ..BackendConfig::default()
    };

    for child in children(node) {
        match child.name().value() {
            "timeout" => backend.timeout = parse_timeout(child)?,
            "serialize-writes" => backend.serialize_writes = first_bool(child)?,
            "endpoint" => backend.endpoint = Some(required_string(child)?.to_string()),
            "user" => backend.user = Some(required_string(child)?.to_string()),
            "password" => backend.password = Some(required_string(child)?.to_string()),
            "datastore" => backend.datastore = Some(required_string(child)?.to_string()),
            "bridge" => backend.bridge = Some(required_string(child)?.to_string()),
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown backend option '{}'",
                    other
                )));
            }
        }
    }
    Ok(backend)
}

fn parse_schema(node: &KdlNode, schema: &mut SchemaConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "extensions" => {
                for entry in child.entries() {
                    let path = entry.value().as_string().ok_or_else(|| {
                        ConfigError::Invalid("extensions takes path strings".to_string())
                    })?;
                    schema.extensions.push(PathBuf::from(path));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!("unknown schema option '{}'", other)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const FULL: &str = r#"
server {
    listen "127.0.0.1:8080"
    base-url "https://occi.example.org/"
}
backend "opennebula" {
    timeout 12
    serialize-writes #false
    endpoint "http://one:2633/RPC2"
    user "oneadmin"
    password "secret"
    datastore "ssd"
}
schema {
    extensions "model" "/etc/occigate/extra.kdl"
}
log-level "debug"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(FULL).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.base_url(), "https://occi.example.org");
        assert_eq!(config.backend.name, "opennebula");
        assert_eq!(config.backend.timeout, Duration::from_secs(12));
        assert!(!config.backend.serialize_writes);
        assert_eq!(config.backend.user.as_deref(), Some("oneadmin"));
        assert_eq!(config.backend.datastore.as_deref(), Some("ssd"));
        assert_eq!(config.backend.bridge, None);
        assert_eq!(config.schema.extensions.len(), 2);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend.name, "dummy");
        assert!(config.backend.serialize_writes);
        assert_eq!(config.server.base_url(), "http://0.0.0.0:3000");
    }

    #[test]
    fn test_rejects_unknown_nodes() {
        assert!(matches!(
            parse_config("listen \"0.0.0.0:1\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("backend \"dummy\" { retries 3 }"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("backend \"dummy\" { timeout 0 }"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(parse_config("server {").is_err());
    }

    #[test]
    fn test_fractional_timeout() {
        let config = parse_config("backend \"dummy\" { timeout 0.5 }").unwrap();
        assert_eq!(config.backend.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_load_resolves_relative_extensions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("occigate.kdl");
        fs::write(&path, FULL).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.schema.extensions[0], temp_dir.path().join("model"));
        assert_eq!(
            config.schema.extensions[1],
            PathBuf::from("/etc/occigate/extra.kdl")
        );
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("occigate.kdl"), "// test").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("occigate.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("occigate.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("occigate.local.kdl"), "// local").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("occigate.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_occigate_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let local_dir = temp_dir.path().join(".occigate");
        fs::create_dir(&local_dir).unwrap();
        fs::write(local_dir.join("occigate.kdl"), "// in dir").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with(".occigate/occigate.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();
        fs::write(temp_dir.path().join("occigate.kdl"), "// ignored").unwrap();

        unsafe {
            std::env::set_var(CONFIG_ENV, config_path.to_str().unwrap());
        }

        let result = find_config_file();

        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_discover_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let found = find_config_file();
        let config = Config::discover();

        std::env::set_current_dir(original_dir).unwrap();
        // A global config on the machine running the tests takes precedence
        if matches!(found, Err(ConfigError::ConfigFileNotFound)) {
            assert_eq!(config.unwrap(), Config::default());
        }
    }
}
