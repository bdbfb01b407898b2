pub mod branch;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod history;
pub mod scheduler;
pub mod state;
pub mod store;

pub use branch::BranchEvaluator;
pub use engine::FlowEngine;
pub use executor::NodeExecutor;
pub use graph::{Edge, ExecutionMode, FlowGraph, Node};
pub use history::build_history;
pub use scheduler::{NodeResult, NodeStatus, RunSummary, Scheduler};
pub use state::RunState;
pub use store::{FlowStore, NodeRunState, RunOutcome};
