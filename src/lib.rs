//! Relocation Agent Orchestrator
//!
//! Simulates the financial and quality-of-life impact of moving from one
//! location to one or more others:
//! - Runs independent analysis stages (risk, expense, compliance) as a DAG
//! - Bounds concurrency, honours cancellation and per-stage timeouts
//! - Applies a per-stage failure policy before aggregation
//! - Folds settled results into a deterministic multi-year wealth projection
//! - Records every run in an audit log
//!
//! RUN:
//! VALIDATE → CONTEXT → EXECUTE (DAG) → POLICY → AGGREGATE → AUDIT

pub mod agent;
pub mod aggregation;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod policy;
pub mod providers;
pub mod registry;
pub mod stages;
pub mod state;

pub use error::Result;

// Re-export common types
pub use agent::{Orchestrator, RunOutcome};
pub use config::SimulationConfig;
pub use error::{OrchestrationError, RunError};
pub use models::*;
pub use registry::{StageRegistry, StageSpec};
