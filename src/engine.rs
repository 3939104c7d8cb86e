//! Engine façade
//!
//! Wires the knowledge base, catalogue, rule engine, node executor, and
//! planner together behind one entry point. A run takes a target and an
//! initial state, merges the state under its workflow context, and drives
//! the planner until the goal holds or the run fails; the outcome plus the
//! recorded state-node chain is everything a caller needs for inspection.

use crate::catalogue::{
    Catalogue, CatalogueLoader, DefinitionError, InitialState, LoadReport, StateError,
    TargetDescription, TargetError,
};
use crate::config::EngineConfig;
use crate::exec::{CancelFlag, ExecError, NodeExecutor};
use crate::kg::{KgError, KnowledgeBase, QueryOutcome};
use crate::planner::{
    ChooseCandidate, ExecutionMode, FailureReason, FirstCandidate, PlanOutcome, Planner,
    PlannerError,
};
use crate::provenance::{Recorder, RunStatus};
use crate::rules::RuleEngine;
use crate::vocab::kce;
use oxigraph::model::{NamedNode, Term};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Kg(#[from] KgError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// What to solve
pub struct SolveRequest {
    pub target: TargetDescription,
    pub initial_state: InitialState,
    /// Caller-supplied run id; generated when absent
    pub run_id: Option<String>,
    pub mode: ExecutionMode,
}

/// The single result a run boundary surfaces
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub succeeded: bool,
    /// Failure reason when the run did not succeed
    pub reason: Option<FailureReason>,
    /// Last recorded state node, for inspection entry
    pub last_state: Option<NamedNode>,
    /// Executed plan steps (including failed attempts)
    pub steps: usize,
}

/// One row of a run's execution log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub index: i64,
    pub timestamp: String,
    pub event: Option<String>,
    pub operation: Option<String>,
    pub error: Option<String>,
    pub log_ref: Option<String>,
}

/// The planning-and-execution kernel
pub struct Engine {
    config: EngineConfig,
    kb: KnowledgeBase,
}

impl Engine {
    /// Open (or create) the engine's knowledge base per `config`
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let kb = KnowledgeBase::open(&config)?;
        Ok(Self { config, kb })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Load every definition document under `dir`
    pub fn load_definitions_dir(&self, dir: &Path) -> EngineResult<LoadReport> {
        let loader = CatalogueLoader::new(&self.kb, self.config.script_roots.clone());
        Ok(loader.load_dir(dir)?)
    }

    /// Load a single definition document
    pub fn load_definitions_file(&self, path: &Path) -> EngineResult<LoadReport> {
        let loader = CatalogueLoader::new(&self.kb, self.config.script_roots.clone());
        Ok(loader.load_file(path)?)
    }

    /// Solve with a fresh cancel flag and the default oracle
    pub fn solve(&self, request: SolveRequest) -> EngineResult<RunOutcome> {
        self.solve_with(request, &CancelFlag::new(), &FirstCandidate)
    }

    /// Solve with caller-controlled cancellation and expert-mode oracle
    pub fn solve_with(
        &self,
        request: SolveRequest,
        cancel: &CancelFlag,
        oracle: &dyn ChooseCandidate,
    ) -> EngineResult<RunOutcome> {
        let run_id = request
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ctx = request.initial_state.context.clone();

        info!("Run {} starting against context {}", run_id, ctx);
        self.kb.add_triples(request.initial_state.triples.clone())?;
        // Reasoning checkpoint: the merged initial graph may entail types
        // the first preconditions depend on.
        self.kb.reason()?;

        let catalogue = Catalogue::from_graph(&self.kb)?;
        let mut recorder =
            Recorder::begin_run(&self.kb, &run_id, request.target.ask_query(), &ctx)?;
        let nodes = NodeExecutor::new(&self.config)?;
        let mut rules = RuleEngine::new();
        let planner = Planner::new(&self.kb, &catalogue, &self.config, ctx);

        let outcome = planner.solve(
            &request.target,
            &nodes,
            &mut rules,
            &mut recorder,
            cancel,
            request.mode,
            oracle,
        );

        match outcome {
            Ok(PlanOutcome::Succeeded { steps }) => {
                recorder.end_run(&self.kb, RunStatus::Succeeded, None)?;
                Ok(RunOutcome {
                    run_id,
                    succeeded: true,
                    reason: None,
                    last_state: recorder.last_state().cloned(),
                    steps,
                })
            }
            Ok(PlanOutcome::Failed { reason }) => {
                recorder.end_run(&self.kb, RunStatus::Failed, Some(&reason.to_string()))?;
                Ok(RunOutcome {
                    run_id,
                    succeeded: false,
                    reason: Some(reason),
                    last_state: recorder.last_state().cloned(),
                    steps: 0,
                })
            }
            Err(error) => {
                if let Err(e) =
                    recorder.end_run(&self.kb, RunStatus::Failed, Some(&error.to_string()))
                {
                    warn!("Could not finalize failed run {}: {}", run_id, e);
                }
                Err(error.into())
            }
        }
    }

    /// Raw SPARQL access, for the CLI `query` command
    pub fn query(&self, sparql: &str) -> EngineResult<QueryOutcome> {
        Ok(self.kb.query(sparql)?)
    }

    /// The recorded state-node chain of a run, in execution order
    pub fn run_log(&self, run_id: &str) -> EngineResult<Vec<LogEntry>> {
        let run_uri = crate::vocab::run_uri(run_id);
        let sparql = format!(
            "SELECT ?index ?ts ?kind ?op ?err ?log WHERE {{
                ?state {in_run} {run} ;
                       {state_index} ?index ;
                       {timestamp} ?ts .
                OPTIONAL {{ ?state {event_kind} ?kind }}
                OPTIONAL {{ ?state {operation} ?op }}
                OPTIONAL {{ ?state {error_detail} ?err }}
                OPTIONAL {{ ?state {log_ref} ?log }}
            }} ORDER BY ?index",
            in_run = kce::IN_RUN,
            run = run_uri,
            state_index = kce::STATE_INDEX,
            timestamp = kce::TIMESTAMP,
            event_kind = kce::EVENT_KIND,
            operation = kce::OPERATION,
            error_detail = kce::ERROR_DETAIL,
            log_ref = kce::HUMAN_READABLE_LOG,
        );

        let mut entries = Vec::new();
        for row in self.kb.select(&sparql)? {
            entries.push(LogEntry {
                index: literal_value(row.get("index"))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(-1),
                timestamp: literal_value(row.get("ts")).unwrap_or_default(),
                event: named_value(row.get("kind")),
                operation: named_value(row.get("op")),
                error: literal_value(row.get("err")),
                log_ref: literal_value(row.get("log")),
            });
        }
        Ok(entries)
    }

    /// Read a human-readable payload referenced from a log entry
    pub fn human_readable(&self, blob_ref: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.kb.get_human_readable(blob_ref)?)
    }
}

fn literal_value(term: Option<&Term>) -> Option<String> {
    match term {
        Some(Term::Literal(lit)) => Some(lit.value().to_string()),
        _ => None,
    }
}

fn named_value(term: Option<&Term>) -> Option<String> {
    match term {
        Some(Term::NamedNode(node)) => Some(node.as_str().to_string()),
        _ => None,
    }
}
