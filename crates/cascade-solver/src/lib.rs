//! # cascade-solver
//!
//! The solver-shaped half of cascade: flattening the validated task tree into
//! atomic steps, materializing background busy blocks, and posing the
//! three-stage lexicographic optimization (total utility, then
//! cumulative-utility-function integral, then total scheduled length) as a
//! constraint program.
//!
//! The CP model itself is a backend-independent description ([`model`]);
//! lowering and search are delegated to the Pumpkin solver ([`backend`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascade_solver::{schedule, ProcessedAST};
//!
//! let ast = cascade_parser::parse_file(path)?;
//! let processed = ProcessedAST::from_ast(&ast)?;
//! let solution = schedule(&processed, window_start, window_end)?;
//! println!("{} tasks placed", solution.entries.len());
//! ```

pub mod background;
pub mod curve;
pub mod model;
pub mod processed;
pub mod stages;

mod backend;

pub use background::{background_blocks, Block};
pub use processed::{AtomicTask, ProcessedAST};
pub use stages::{schedule, BasicModel, CufModel, IntervalLenModel, TotalUtilityModel};

use cascade_core::AstError;
use thiserror::Error;

/// Scheduling pipeline error
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("Schedule start {start} is too close to or later than end {end}")]
    Window { start: String, end: String },

    #[error("No feasible schedule exists under the given constraints")]
    Infeasible,

    #[error("Solver limit reached without a feasible solution")]
    SolverLimit,

    #[error("Failed to fetch calendar {url}: {message}")]
    CalendarFetch { url: String, message: String },

    #[error("Failed to parse calendar {url}: {message}")]
    CalendarParse { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ast(#[from] AstError),

    #[error("Internal error: {0}")]
    Internal(String),
}
