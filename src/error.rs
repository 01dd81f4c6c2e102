//! Error types

use thiserror::Error;

/// Failure to render one expression node
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("expression nested too deeply")]
    TooDeep,

    #[error("expression could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by the external equation solver
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to start solver: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("solver rejected the equation: {0}")]
    Rejected(String),

    #[error("solver produced unreadable output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("solver did not finish within {0} seconds")]
    Timeout(u64),
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a study guide needs a title")]
    EmptyTitle,

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registration and login errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password cannot be empty")]
    EmptyFields,

    #[error("Email address is already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Password hashing failed")]
    Hashing,

    #[error("user directory i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("user directory is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("session secret must be at least 64 bytes, got {0}")]
    ShortSecret(usize),
}
