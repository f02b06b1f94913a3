//! Scenario replay: deterministic runs of recall, record and admin steps.
//!
//! A [`Scenario`] is loaded from JSON and driven through a fresh
//! [`MemoryManager`](crate::manager::MemoryManager) by [`run_scenario`]. The
//! resulting [`ScenarioRun`] carries every step's events and written items
//! plus per-step cache versions and phase snapshots, and digests to the same
//! value for the same scenario and configuration.
//!
//! # Module layout
//!
//! - [`error`]: `ScenarioError`, `ScenarioResult`
//! - [`scenario`]: `Scenario`, `ScenarioStep`, `StepKind`, `AdminAction`
//! - [`runner`]: `run_scenario`, `ScenarioRun` and its step reports
//! - [`artifact`]: `run.json` / `run.digest` persistence

pub mod artifact;
pub mod error;
pub mod runner;
pub mod scenario;

pub use artifact::{read_recorded_digest, read_run_artifact, write_run_artifact, RunArtifact};
pub use error::{ScenarioError, ScenarioResult};
pub use runner::{
    run_scenario, run_scenario_on, RecallStep, RunMeta, ScenarioRun, StepCounts, WriteStep,
};
pub use scenario::{AdminAction, Scenario, ScenarioStep, StepKind};
