use std::sync::Arc;

use cogflow_core::config::ModelConfig;
use cogflow_core::error::Result;
use cogflow_core::traits::{BranchSelector, LlmClient, ProgressSink};
use cogflow_core::types::RunId;

use crate::branch::BranchEvaluator;
use crate::executor::NodeExecutor;
use crate::graph::FlowGraph;
use crate::scheduler::{RunSummary, Scheduler};

/// The external collaborators a run needs, bundled for reuse across runs.
pub struct FlowEngine {
    executor: NodeExecutor,
    evaluator: BranchEvaluator,
}

impl FlowEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        selector: Arc<dyn BranchSelector>,
        model: ModelConfig,
    ) -> Self {
        Self {
            executor: NodeExecutor::new(llm, model),
            evaluator: BranchEvaluator::new(selector),
        }
    }

    /// Run `graph` once, reporting progress to `sink`.
    pub async fn run(&self, graph: &FlowGraph, sink: &dyn ProgressSink) -> Result<RunSummary> {
        self.run_with_id(graph, sink, RunId::new()).await
    }

    pub async fn run_with_id(
        &self,
        graph: &FlowGraph,
        sink: &dyn ProgressSink,
        run_id: RunId,
    ) -> Result<RunSummary> {
        Scheduler::new(graph, &self.executor, &self.evaluator, sink)
            .run(run_id)
            .await
    }
}
