/*!
# Stepwise

A study-guide web application that solves algebraic equations one step at a
time and lets users keep the worked solutions they care about.

## Overview

Equations are handed to an external symbolic solver. Whatever it returns
(plain strings, structured step objects with nested expression trees, or a
JSON string holding either) is normalized into one canonical step model,
rendered as human-readable text and, on request, persisted into named study
guides owned by the signed-in user.

## Architecture

### Core (always built)
- **step**: Raw and canonical step types, expression node classification
- **normalize**: Turns any raw step payload into canonical steps
- **render**: Expression rendering, change-type humanizing, step line layout
- **session**: One-shot solving and the per-user solve session
- **solver**: The solver trait and the external process adapter
- **store**: Study guide persistence (gzip-compressed JSON)
- **config**: TOML configuration with environment overrides
- **error**: Error types for every layer

### Web (feature `web`)
- **identity**: Signed identity cookie and the `CurrentUser` extractor
- **login**: Local user directory, login/signup/logout, route gate
- **pages**: Handlebars page templates
- **app**: Routing, shared state, JSON API

## Data Persistence

- Study guides: one gzip-compressed JSON document, replaced atomically
- Users: a JSON table keyed by email, passwords hashed with Argon2
- Steps are stored in their canonical form, which reads back unchanged

## Routes

- `/`, `/login`, `/register`, `/logout` - Landing page and authentication
- `/dashboard` - Solve an equation and save it to a study guide
- `/study-guide`, `/study-guide/{id}` - Saved guides and their equations
- `/profile` - The signed-in user's details
- `/api/solve`, `/api/study-guides` - JSON equivalents
*/

pub mod config;
pub mod error;
pub mod normalize;
pub mod render;
pub mod session;
pub mod solver;
pub mod step;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod identity;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod pages;

pub use config::Config;
pub use error::{AuthError, ConfigError, RenderError, SolverError, StoreError};
pub use normalize::{normalize, normalize_str, normalize_value, to_persisted};
pub use render::{flatten, humanize, render_expression, render_lines};
pub use session::{SolveSession, SolveTicket, solve};
pub use solver::{CommandSolver, EquationSolver, SolverConfig};
pub use step::{CanonicalStep, ExpressionNode, RawStep, SolveOutcome};
pub use store::{FileStore, StudyGuideStore};
