use crate::constants::{default_borough_files, DEFAULT_TABLE};
use crate::enrich::EnrichmentConfig;
use crate::error::{EtlError, Result};
use crate::extract::ExtractConfig;
use crate::load::LoadConfig;
use crate::pipeline::PipelineConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DB_ENV_PREFIX: &str = "TARGET_DB";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extract: ExtractConfig,
    pub pipeline: PipelineConfig,
    pub load: LoadConfig,
    pub enrichment: EnrichmentConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path if given, else `config.toml` if present, else built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => {
                info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.load.table.trim().is_empty() {
            return Err(EtlError::Config("[load] table must not be empty".to_string()));
        }
        if self.load.key.is_empty() {
            return Err(EtlError::Config("[load] key must name at least one column".to_string()));
        }
        if self.extract.sources.is_empty() {
            warn!("[extract] lists no sources; extraction will produce no rows");
        }
        Ok(())
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/raw".into(),
            sources: default_borough_files()
                .into_iter()
                .map(|(borough, file)| crate::extract::BoroughSource {
                    borough: borough.to_string(),
                    file: file.into(),
                })
                .collect(),
            expected_secs_per_row: crate::extract::EXPECTED_PER_ROW,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            policy: Default::default(),
            key: crate::load::NaturalKey::by_borough().columns().to_vec(),
            replace: false,
        }
    }
}

/// Loads `.env.<env>` when an environment name is given, falling back to `.env`.
pub fn setup_env(env: Option<&str>) {
    match env {
        Some(name) => {
            let file = format!(".env.{name}");
            match dotenv::from_filename(&file) {
                Ok(_) => info!("Loaded environment from {}", file),
                Err(e) => warn!("Could not load {}: {}", file, e),
            }
            std::env::set_var("ENV", name);
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
}

/// Relational store connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub schema: String,
    pub sslmode: Option<String>,
}

impl DbConfig {
    /// Reads `<PREFIX>_USER`, `_PASSWORD`, `_HOST`, `_PORT`, `_NAME`, `_SCHEMA`, `_SSLMODE`.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let vars: HashMap<String, String> = ["USER", "PASSWORD", "HOST", "PORT", "NAME", "SCHEMA", "SSLMODE"]
            .iter()
            .filter_map(|key| {
                let name = format!("{prefix}_{key}");
                std::env::var(&name).ok().map(|value| (key.to_lowercase(), value))
            })
            .collect();
        Self::from_map(&vars)
    }

    /// Builds from lower-case keys (`user`, `password`, `host`, `port`,
    /// `name`/`dbname`, `schema`, `sslmode`). Only presence is checked.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str, alias: Option<&str>| {
            get(key)
                .or_else(|| alias.and_then(|a| get(a)))
                .ok_or_else(|| EtlError::Config(format!("missing required database parameter '{key}'")))
        };

        let user = require("user", None)?;
        let host = require("host", None)?;
        let port = require("port", None)?;
        let dbname = require("dbname", Some("name"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| EtlError::Config(format!("database port '{port}' is not a valid port number")))?;

        Ok(Self {
            user,
            password: vars.get("password").cloned().unwrap_or_default(),
            host,
            port,
            dbname,
            schema: get("schema").unwrap_or_else(|| "public".to_string()),
            sslmode: get("sslmode"),
        })
    }
}

// Never print the password
impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgresql://{}:***@{}:{}/{} (schema {})",
            self.user, self.host, self.port, self.dbname, self.schema
        )
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("schema", &self.schema)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}
