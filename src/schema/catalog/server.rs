use configparser::ini::Ini;
use thiserror::Error;

use std::path::Path;
use std::result::Result;
use std::string::String;


pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_BACKLOG: usize = 64;

/// Process-level settings: socket, worker pool sizing and the initial
/// serving state. Loaded once at startup from an INI file.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfiguration {
    pub bind_address: String,
    pub worker_count: usize,
    pub backlog: usize,
    pub enabled: bool,
    pub services_file: Option<String>,
    pub layers_directory: Option<String>,
}

impl ServerConfiguration {
    pub fn new() -> ServerConfiguration {
        ServerConfiguration {
            bind_address: String::from("127.0.0.1:9000"),
            worker_count: DEFAULT_WORKER_COUNT,
            backlog: DEFAULT_BACKLOG,
            enabled: true,
            services_file: None,
            layers_directory: None,
        }
    }

    pub fn load(path: &Path) -> Result<ServerConfiguration, ServerConfigError> {
        let mut ini = Ini::new();
        ini.load(path)?;
        return Self::parse(&ini);
    }

    fn parse(ini: &Ini) -> Result<ServerConfiguration, ServerConfigError> {
        let mut config = ServerConfiguration::new();
        if let Some(address) = ini.get("server", "address") {
            config.bind_address = address;
        }
        if let Some(count) = ini.getuint("server", "worker_count")? {
            if count == 0 {
                return Err(ServerConfigError::from(String::from(
                    "worker_count must be at least 1",
                )));
            }
            config.worker_count = count as usize;
        }
        if let Some(backlog) = ini.getuint("server", "backlog")? {
            config.backlog = backlog as usize;
        }
        if let Some(enabled) = ini.getbool("server", "enabled")? {
            config.enabled = enabled;
        }
        config.services_file = ini.get("catalog", "services_file");
        config.layers_directory = ini.get("catalog", "layers_directory");
        return Ok(config);
    }
}

#[derive(Debug, Error)]
#[error("Server configuration parsing failed: {reason}")]
pub struct ServerConfigError {
    reason: String,
}

impl From<String> for ServerConfigError {
    fn from(reason: String) -> Self {
        return ServerConfigError { reason };
    }
}
