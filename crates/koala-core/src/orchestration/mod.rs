//! Tool-use orchestration
//!
//! [`Brain`] owns the two entry points: prompt runs started by the operator
//! and sampling requests pushed by a tool provider. [`ToolRunner`] is the
//! completion loop a prompt run drives.

mod brain;
mod runner;
mod sampling;

pub use brain::Brain;
pub use runner::{RunOutcome, ToolRunner};
pub use sampling::SAMPLING_SUMMARY;
