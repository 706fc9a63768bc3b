//! Server configuration.
//!
//! Every setting has a default and can be overridden through an environment
//! variable (a `.env` file in the working directory is honoured as well).

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::filter::MAX_POINTS;
use crate::upload::{DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_UPLOAD_DIR: &str = "UPLOAD_DIR";
pub const ENV_STATIC_DIR: &str = "STATIC_DIR";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_MAX_POINTS: &str = "MAX_POINTS";
pub const ENV_MAX_UPLOAD_BYTES: &str = "MAX_UPLOAD_BYTES";
pub const ENV_RETENTION_HOURS: &str = "RETENTION_HOURS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "SWEEP_INTERVAL_SECS";

const DEFAULT_PORT: u16 = 5050;
const DEFAULT_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// A configuration variable held a value that could not be used.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Settings the server reads once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where uploads are stored and swept
    pub upload_dir: PathBuf,
    /// Optional directory with a built front end, served for unknown routes
    pub static_dir: Option<PathBuf>,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Point budget of the filter
    pub max_points: NonZeroUsize,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
    /// Age after which uploaded files are deleted
    pub retention: Duration,
    /// Period of the retention sweep
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploaded_files"),
            static_dir: None,
            allowed_origins: vec![DEFAULT_ORIGIN.to_string()],
            max_points: NonZeroUsize::new(MAX_POINTS).unwrap_or(NonZeroUsize::MIN),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// Unset or blank variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = ServerConfig::default();

        let max_points = match get(ENV_MAX_POINTS) {
            Some(raw) => NonZeroUsize::new(parse_var::<usize>(ENV_MAX_POINTS, &raw)?).ok_or_else(
                || ConfigError {
                    name: ENV_MAX_POINTS,
                    value: raw.clone(),
                    reason: "must be greater than zero".to_string(),
                },
            )?,
            None => defaults.max_points,
        };

        let allowed_origins = match get(ENV_ALLOWED_ORIGINS) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.allowed_origins,
        };

        Ok(ServerConfig {
            host: get(ENV_HOST).unwrap_or(defaults.host),
            port: optional_var(&get, ENV_PORT)?.unwrap_or(defaults.port),
            upload_dir: get(ENV_UPLOAD_DIR).map(PathBuf::from).unwrap_or(defaults.upload_dir),
            static_dir: get(ENV_STATIC_DIR).map(PathBuf::from),
            allowed_origins,
            max_points,
            max_upload_bytes: optional_var(&get, ENV_MAX_UPLOAD_BYTES)?
                .unwrap_or(defaults.max_upload_bytes),
            retention: optional_var::<u64, _>(&get, ENV_RETENTION_HOURS)?
                .map(|hours| Duration::from_secs(hours * 60 * 60))
                .unwrap_or(defaults.retention),
            sweep_interval: optional_var::<u64, _>(&get, ENV_SWEEP_INTERVAL_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        })
    }

    /// Address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional_var<T, G>(get: &G, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name).map(|raw| parse_var(name, &raw)).transpose()
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
