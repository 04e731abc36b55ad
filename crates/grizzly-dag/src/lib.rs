//! Model dependency graph, SQL dependency extraction, and the refresh
//! scheduler that drives dbt-style derived models.

pub mod analyzer;
pub mod graph;
pub mod scheduler;

pub use analyzer::extract_references;
pub use graph::{DependencyGraph, ExecutionState};
pub use scheduler::{refresh_model, PeriodicScheduler, ScheduleRecord};
