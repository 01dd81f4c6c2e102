use log::{debug, warn};
use serde_json::Value;

use crate::normalize::normalize_value;
use crate::solver::EquationSolver;
use crate::step::SolveOutcome;

/// Reason given for every solver failure. Solver detail is logged, not shown.
pub const INVALID_EQUATION: &str = "Invalid equation";

/// Final text when the solver's steps normalize to nothing.
pub const NO_SOLUTION: &str = "No solution found";

/// Solve one equation and normalize the result.
///
/// Blank input is rejected without calling the solver. Otherwise the
/// solver runs exactly once; errors and empty step sequences both become
/// [`SolveOutcome::Failed`].
///
/// # Arguments
/// * `solver` - The external solver
/// * `input` - Equation text as typed by the user
///
/// # Returns
/// * `SolveOutcome` - Solution text and steps, or the failure reason
pub async fn solve(solver: &dyn EquationSolver, input: &str) -> SolveOutcome {
    if input.trim().is_empty() {
        return failed();
    }

    let raw = match solver.solve_equation(input).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("solve failed for {:?}: {}", input, e);
            return failed();
        }
    };

    if is_empty_sequence(&raw) {
        debug!("solver returned no steps for {:?}", input);
        return failed();
    }

    let steps = normalize_value(&raw);
    let final_text = steps
        .last()
        .map(|step| step.to_text.clone())
        .unwrap_or_else(|| NO_SOLUTION.to_string());

    SolveOutcome::Solved { final_text, steps }
}

fn failed() -> SolveOutcome {
    SolveOutcome::Failed {
        reason: INVALID_EQUATION.to_string(),
    }
}

fn is_empty_sequence(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// One solve request within a [`SolveSession`], carrying the input it was
/// started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveTicket {
    seq: u64,
    input: String,
}

impl SolveTicket {
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// The view state of one user interaction: the latest applied input and
/// its outcome.
///
/// Requests are numbered as they start. An outcome is only installed if
/// its request is the newest one, so a slow response to an older request
/// can never overwrite a newer result. The input is installed together
/// with its outcome, never ahead of it.
#[derive(Debug, Clone, Default)]
pub struct SolveSession {
    current: Option<(String, SolveOutcome)>,
    pending: Option<String>,
    issued: u64,
    applied: u64,
}

impl SolveSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input of the outcome currently shown, empty before the first result.
    pub fn input(&self) -> &str {
        self.current.as_ref().map_or("", |(input, _)| input.as_str())
    }

    /// Outcome of the most recent request that has completed and was current.
    pub fn outcome(&self) -> Option<&SolveOutcome> {
        self.current.as_ref().map(|(_, outcome)| outcome)
    }

    /// The applied input and outcome as a pair.
    pub fn current(&self) -> Option<(&str, &SolveOutcome)> {
        self.current
            .as_ref()
            .map(|(input, outcome)| (input.as_str(), outcome))
    }

    /// Input of a request that was started but has not been applied yet.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Register a new request for `input`, superseding any in flight.
    pub fn begin(&mut self, input: &str) -> SolveTicket {
        self.issued += 1;
        self.pending = Some(input.to_string());
        SolveTicket {
            seq: self.issued,
            input: input.to_string(),
        }
    }

    /// Install `outcome` for the ticket's input if `ticket` is still the
    /// newest request.
    ///
    /// # Returns
    /// * `bool` - Whether the outcome replaced the session's current one
    pub fn apply(&mut self, ticket: SolveTicket, outcome: SolveOutcome) -> bool {
        if ticket.seq != self.issued || ticket.seq <= self.applied {
            debug!("discarding stale solve response #{}", ticket.seq);
            return false;
        }
        self.applied = ticket.seq;
        self.pending = None;
        self.current = Some((ticket.input, outcome));
        true
    }

    /// Run a request to completion and install its outcome.
    pub async fn solve(&mut self, solver: &dyn EquationSolver, input: &str) -> &SolveOutcome {
        let ticket = self.begin(input);
        let outcome = solve(solver, input).await;
        self.apply(ticket, outcome);
        let (_, outcome) = self.current.get_or_insert_with(|| (input.to_string(), failed()));
        outcome
    }
}
