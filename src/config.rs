use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::solver::SolverConfig;

/// Environment variable that overrides `session_secret`.
pub const SECRET_ENV: &str = "STEPWISE_SESSION_SECRET";

/// Smallest accepted cookie signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 64;

/// Service configuration.
///
/// Every field has a default, so an empty (or missing) file is valid.
///
/// ```toml
/// bind = "0.0.0.0:8080"
/// data_dir = "/var/lib/stepwise"
///
/// [solver]
/// program = "node"
/// args = ["scripts/mathsteps-bridge.js"]
/// timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the web server listens on
    pub bind: SocketAddr,

    /// Directory for users and study guides
    pub data_dir: PathBuf,

    /// Secret used to sign the identity cookie
    pub session_secret: Option<String>,

    /// External solver command
    pub solver: SolverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("database"),
            session_secret: None,
            solver: SolverConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply the
    /// environment override for the session secret.
    ///
    /// # Arguments
    /// * `path` - Config file; `None` means defaults only
    ///
    /// # Returns
    /// * `Result<Config, ConfigError>` - The configuration or why it is unusable
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&fs::read_to_string(path)?)?,
            None => Config::default(),
        };

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.session_secret = Some(secret);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reject secrets too short to sign cookies with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.session_secret {
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                Err(ConfigError::ShortSecret(secret.len()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_solver_table_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/tmp/guides"

            [solver]
            timeout_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/guides"));
        assert_eq!(config.solver.timeout_secs, 3);
        assert_eq!(config.solver.program, "node");
        assert_eq!(config.bind, Config::default().bind);
    }

    #[test]
    fn short_secret_is_rejected() {
        let config = Config {
            session_secret: Some("too short".into()),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ShortSecret(9))));
    }

    #[test]
    fn unknown_types_are_reported() {
        assert!(matches!(
            Config::from_toml("bind = 3"),
            Err(ConfigError::Toml(_))
        ));
    }
}
