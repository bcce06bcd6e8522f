//! Pluggable evaluation tracing.
//!
//! A tracer observes the evaluator as it walks an AST: one hook per node
//! visited and one per function/transform invocation. The hooks default to
//! empty so [`NoopTracer`] costs nothing; [`RecordingTracer`] accumulates
//! events and is how the test suite proves that short-circuit operators
//! never touch the branch they skip.

use crate::expressions::CallPool;

/// Observer hooks invoked during evaluation.
pub trait EvalTracer {
    /// Called when the evaluator enters a node; `kind` is the node-kind
    /// label (e.g. `"BinaryExpression"`).
    fn on_node(&mut self, kind: &'static str) {
        let _ = kind;
    }

    /// Called before a function or transform is invoked.
    fn on_call(&mut self, pool: CallPool, name: &str) {
        let _ = (pool, name);
    }
}

/// The default tracer: observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Records every event for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    /// Node-kind labels in visit order.
    pub nodes: Vec<&'static str>,
    /// Function and transform names in invocation order.
    pub calls: Vec<String>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvalTracer for RecordingTracer {
    fn on_node(&mut self, kind: &'static str) {
        self.nodes.push(kind);
    }

    fn on_call(&mut self, _pool: CallPool, name: &str) {
        self.calls.push(name.to_owned());
    }
}
