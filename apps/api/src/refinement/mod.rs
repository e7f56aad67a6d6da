//! The refinement core: per-section convergence loops and the orchestrator
//! that runs them over a whole document.

pub mod broker;
pub mod checkpoint;
pub mod ledger;
pub mod orchestrator;
pub mod overlay;
pub mod resolution;
pub mod workflow;

#[cfg(test)]
pub mod testing;

pub use broker::{InteractionError, UserInteractionChannel};
pub use orchestrator::{IssueReport, Orchestrator, RefinementInputs, RunStatus};
