#![cfg(not(tarpaulin_include))]

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use stepwise::{CommandSolver, Config, SolveOutcome, render_lines, solve};

/// Solve equations from the command line and print every step
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file (only the [solver] table is used)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Equations to solve; read one per line from stdin when none are given
    equations: Vec<String>,
}

fn print_outcome(out: &mut impl Write, equation: &str, outcome: &SolveOutcome) -> io::Result<()> {
    writeln!(out, "{}", equation)?;
    writeln!(out, "Solution: {}", outcome.solution_text())?;
    for line in render_lines(outcome.steps()) {
        writeln!(out, "{}", line)?;
    }
    writeln!(out)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let solver = CommandSolver::new(config.solver);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.equations.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            print_outcome(&mut out, &line, &solve(&solver, &line).await)?;
        }
    } else {
        for equation in &cli.equations {
            print_outcome(&mut out, equation, &solve(&solver, equation).await)?;
        }
    }

    Ok(())
}
