//! Operation dispatch and plan execution
//!
//! Operations are a closed set of tagged variants: an atomic node or a rule,
//! both addressed by URI. The plan executor drives an ordered operation list,
//! dispatching to the node executor or the rule engine, and stops at the
//! first failure; partial mutations stay in the graph as evidence.

mod instructions;
mod node;

pub use instructions::{AddLink, CreateEntity, GraphUpdates, InstructionError, InstructionResult, RdfInstructions, UpdateEntity};
pub use node::NodeExecutor;

use crate::catalogue::Catalogue;
use crate::kg::KgError;
use crate::kg::KnowledgeBase;
use crate::provenance::Recorder;
use crate::rules::{RuleEngine, RuleError};
use oxigraph::model::NamedNode;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// A required input had no value; no subprocess was spawned
    #[error("Missing required input '{input}' for {node}")]
    MissingInput { node: String, input: String },

    /// Non-zero exit or unparseable stdout; detail carries the stderr tail
    #[error("Script failure in {node}: {detail}")]
    Script { node: String, detail: String },

    /// The script exceeded its time budget and was killed
    #[error("{node} timed out after {seconds}s")]
    Timeout { node: String, seconds: u64 },

    /// The run was cancelled while this step was in flight
    #[error("Run cancelled")]
    Cancelled,

    /// A declared output's value does not conform to its datatype
    #[error("Output '{output}' of {node} has the wrong datatype: {detail}")]
    OutputType {
        node: String,
        output: String,
        detail: String,
    },

    /// A plan referenced an operation the catalogue does not contain
    #[error("Unknown operation {0}")]
    UnknownOperation(String),

    /// Invalid `_rdf_instructions` program
    #[error(transparent)]
    Instructions(#[from] InstructionError),

    /// Rule engine failure
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Knowledge layer failure
    #[error(transparent)]
    Kg(#[from] KgError),

    /// Runtime plumbing failure
    #[error("Executor error: {0}")]
    Internal(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Cloneable cancellation signal; checked between planner iterations and
/// raced against in-flight subprocesses.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run this flag belongs to
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One plan step: a node execution or a rule application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Node(NamedNode),
    Rule(NamedNode),
}

impl Operation {
    pub fn uri(&self) -> &NamedNode {
        match self {
            Operation::Node(uri) | Operation::Rule(uri) => uri,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Node(uri) => write!(f, "node {}", uri.as_str()),
            Operation::Rule(uri) => write!(f, "rule {}", uri.as_str()),
        }
    }
}

/// A failed plan, tagged with the offending step
#[derive(Debug)]
pub struct StepFailure {
    /// Zero-based index of the failed step
    pub step: usize,
    pub operation: Operation,
    pub error: ExecError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}) failed: {}", self.step, self.operation, self.error)
    }
}

/// Drives ordered operation lists against the graph
pub struct PlanExecutor<'a> {
    catalogue: &'a Catalogue,
    nodes: &'a NodeExecutor,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(catalogue: &'a Catalogue, nodes: &'a NodeExecutor) -> Self {
        Self { catalogue, nodes }
    }

    /// Execute a whole plan in order; stops at the first failing step.
    ///
    /// Mutations made by completed steps remain in the graph either way.
    pub fn execute(
        &self,
        kb: &KnowledgeBase,
        ctx: &NamedNode,
        plan: &[Operation],
        recorder: &mut Recorder,
        rules: &mut RuleEngine,
        cancel: &CancelFlag,
    ) -> Result<usize, Box<StepFailure>> {
        for (step, operation) in plan.iter().enumerate() {
            self.execute_step(kb, ctx, operation, recorder, rules, cancel)
                .map_err(|error| {
                    Box::new(StepFailure {
                        step,
                        operation: operation.clone(),
                        error,
                    })
                })?;
        }
        Ok(plan.len())
    }

    /// Execute a single operation
    pub fn execute_step(
        &self,
        kb: &KnowledgeBase,
        ctx: &NamedNode,
        operation: &Operation,
        recorder: &mut Recorder,
        rules: &mut RuleEngine,
        cancel: &CancelFlag,
    ) -> ExecResult<()> {
        debug!("Executing {}", operation);
        match operation {
            Operation::Node(uri) => {
                let node = self
                    .catalogue
                    .node(uri)
                    .ok_or_else(|| ExecError::UnknownOperation(uri.as_str().to_string()))?;
                self.nodes.execute(kb, node, ctx, recorder, cancel)?;
                Ok(())
            }
            Operation::Rule(uri) => {
                let rule = self
                    .catalogue
                    .rule(uri)
                    .ok_or_else(|| ExecError::UnknownOperation(uri.as_str().to_string()))?;
                rules.apply_rule(kb, rule, recorder)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_operation_display() {
        let op = Operation::Node(NamedNode::new("http://x/n").unwrap());
        assert_eq!(op.to_string(), "node http://x/n");
        let op = Operation::Rule(NamedNode::new("http://x/r").unwrap());
        assert_eq!(op.to_string(), "rule http://x/r");
    }
}
