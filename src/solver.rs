use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::SolverError;

/// Anything that can turn an equation into a raw step sequence.
///
/// The returned value is the solver's own JSON; it is classified later by
/// the normalizer. Closures implement this trait, which is how tests stub
/// the solver out.
#[async_trait]
pub trait EquationSolver: Send + Sync {
    async fn solve_equation(&self, equation: &str) -> Result<Value, SolverError>;
}

#[async_trait]
impl<F> EquationSolver for F
where
    F: Fn(&str) -> Result<Value, SolverError> + Send + Sync,
{
    async fn solve_equation(&self, equation: &str) -> Result<Value, SolverError> {
        self(equation)
    }
}

/// How to launch the external solver process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Program to execute
    pub program: String,

    /// Arguments placed before the equation
    pub args: Vec<String>,

    /// Seconds before the process is killed
    pub timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            program: "node".to_string(),
            args: vec!["scripts/mathsteps-bridge.js".to_string()],
            timeout_secs: 10,
        }
    }
}

/// Solver backed by an external process that prints its steps as JSON.
///
/// The equation is passed as the last argument. A non-zero exit status
/// means the equation was rejected; whatever the process wrote to stderr
/// becomes the error detail. A process still running after
/// `timeout_secs` is killed.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    config: SolverConfig,
}

impl CommandSolver {
    pub fn new(config: SolverConfig) -> Self {
        CommandSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

#[async_trait]
impl EquationSolver for CommandSolver {
    async fn solve_equation(&self, equation: &str) -> Result<Value, SolverError> {
        debug!("running {} for {:?}", self.config.program, equation);

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(equation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        // Dropping the unfinished wait drops the child, which kills it.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "solver still running for {:?} after {}s, killed",
                    equation, self.config.timeout_secs
                );
                return Err(SolverError::Timeout(self.config.timeout_secs));
            }
        };

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("solver rejected {:?}: {}", equation, detail);
            return Err(SolverError::Rejected(detail));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
