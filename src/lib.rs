//! KCE — Knowledge-CAD-Engine
//!
//! A knowledge-driven automation engine that solves domain problems
//! (parametric design, calculation, configuration) by composing
//! declaratively-defined operations over a semantic knowledge graph. A
//! caller submits an initial state (triples describing the problem) and a
//! goal (a SPARQL ASK that must hold); the engine searches for, executes,
//! and records a plan whose combined effects make the goal hold.
//!
//! # Architecture
//!
//! - [`kg`] — the knowledge layer: triple store, SPARQL query/update,
//!   forward-closure reasoning, and the human-readable blob sink
//! - [`catalogue`] — declarative definitions (atomic nodes, rules,
//!   capability templates, workflows), their loader, initial states, and
//!   goal targets
//! - [`rules`] — the rule engine with its per-run fired-bindings cache
//! - [`exec`] — operation dispatch, the plan executor, and the
//!   subprocess-backed atomic-node executor
//! - [`planner`] — goal-directed search with continuous replanning
//! - [`provenance`] — execution runs, state-node chains, PROV-style links
//! - [`engine`] — the façade wiring it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use kce::config::EngineConfig;
//! use kce::engine::{Engine, SolveRequest};
//! use kce::catalogue::{InitialState, TargetDescription};
//! use kce::planner::ExecutionMode;
//!
//! let engine = Engine::open(EngineConfig::durable("kce_data/db")).unwrap();
//! engine.load_definitions_dir("defs".as_ref()).unwrap();
//!
//! let outcome = engine
//!     .solve(SolveRequest {
//!         target: TargetDescription::parse(
//!             r#"askQuery: "ASK { ?c <http://example.org/props#out> 2 }""#,
//!         )
//!         .unwrap(),
//!         initial_state: InitialState::parse(
//!             "entities:\n  - uri: \"http://example.org/data#c1\"\n",
//!             "http://example.org/data#",
//!         )
//!         .unwrap(),
//!         run_id: None,
//!         mode: ExecutionMode::User,
//!     })
//!     .unwrap();
//! assert!(outcome.succeeded);
//! ```

pub mod catalogue;
pub mod config;
pub mod engine;
pub mod exec;
pub mod kg;
pub mod planner;
pub mod provenance;
pub mod rules;
pub mod vocab;

// Re-export main types for convenience
pub use catalogue::{
    ArgumentStyle, AtomicNode, Catalogue, CatalogueLoader, DefinitionError, Effect, EffectKind,
    InitialState, Invocation, LoadReport, OutputParsing, Parameter, Rule, TargetDescription,
    Workflow,
};
pub use config::{EngineConfig, StoreBackend};
pub use engine::{Engine, EngineError, EngineResult, LogEntry, RunOutcome, SolveRequest};
pub use exec::{CancelFlag, ExecError, NodeExecutor, Operation, PlanExecutor, RdfInstructions};
pub use kg::{Bindings, KgError, KnowledgeBase, NamespaceManager, QueryOutcome, Reasoner};
pub use planner::{
    ChooseCandidate, ExecutionMode, FailureReason, FirstCandidate, OracleDecision, PlanOutcome,
    Planner, StateSnapshot,
};
pub use provenance::{Event, EventKind, Recorder, RunStatus};
pub use rules::{RuleEngine, RuleError};

// Re-export the RDF model for callers and the CLI
pub use oxigraph::model as rdf_model;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
