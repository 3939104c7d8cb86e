//! Goal-directed planner
//!
//! The planner runs a bounded search with continuous replanning: evaluate
//! the goal ASK, fire eligible rules, compute the frontier of applicable and
//! contributive nodes, execute one operation, repeat. Search state is
//! explicit — the wanted-term set, the visited state fingerprints, and the
//! depth counter — and every decision is recorded as a state node.

use crate::catalogue::{AtomicNode, Catalogue, TargetDescription};
use crate::config::EngineConfig;
use crate::exec::{CancelFlag, ExecError, NodeExecutor, Operation, PlanExecutor};
use crate::kg::{KgError, KnowledgeBase};
use crate::provenance::{Event, EventKind, Recorder};
use crate::rules::{RuleEngine, RuleError};
use oxigraph::model::{NamedNode, NamedNodeRef};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use spargebra::algebra::{GraphPattern, PropertyPathExpression};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Planner errors (infrastructure, not search outcomes)
#[derive(Error, Debug)]
pub enum PlannerError {
    /// The goal ASK could not be analyzed
    #[error("Goal analysis failed: {0}")]
    Goal(String),

    /// Knowledge layer failure
    #[error(transparent)]
    Kg(#[from] KgError),
}

pub type PlannerResult<T> = Result<T, PlannerError>;

/// Why a run failed to reach its goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No applicable, contributive operation exists
    NoProgress,
    /// The step budget ran out before the goal held
    DepthExhausted,
    /// Same state fingerprint, and every candidate already failed there
    RevisitedFailedState,
    /// A step failed and no alternative made progress afterwards
    StepFailed(String),
    /// The run was cancelled
    Cancelled,
    /// The expert-mode oracle aborted the run
    OracleAbort,
    /// A critical rule's consequent failed
    CriticalRule(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoProgress => write!(f, "NoProgress"),
            FailureReason::DepthExhausted => write!(f, "DepthExhausted"),
            FailureReason::RevisitedFailedState => write!(f, "RevisitedFailedState"),
            FailureReason::StepFailed(detail) => write!(f, "StepFailed: {}", detail),
            FailureReason::Cancelled => write!(f, "Cancelled"),
            FailureReason::OracleAbort => write!(f, "OracleAbort"),
            FailureReason::CriticalRule(detail) => write!(f, "CriticalRule: {}", detail),
        }
    }
}

/// Search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Succeeded { steps: usize },
    Failed { reason: FailureReason },
}

/// `expert` surfaces tied candidates to the oracle; `user` never pauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    User,
    Expert,
}

/// Best-effort view handed to the oracle at a decision point
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub context: NamedNode,
    pub depth: usize,
    pub goal_ask: String,
    /// Goal atoms that do not hold yet
    pub unmet_atoms: Vec<String>,
}

/// Oracle verdict at a decision point
#[derive(Debug, Clone)]
pub enum OracleDecision {
    /// Pick this candidate (accepting a suggestion is the same decision)
    Choose(NamedNode),
    /// Give up the run
    Abort,
}

/// Caller-provided decision hook for expert mode
pub trait ChooseCandidate {
    fn choose(&self, candidates: &[NamedNode], snapshot: &StateSnapshot) -> OracleDecision;
}

/// Default oracle: deterministically take the first candidate
pub struct FirstCandidate;

impl ChooseCandidate for FirstCandidate {
    fn choose(&self, candidates: &[NamedNode], _snapshot: &StateSnapshot) -> OracleDecision {
        match candidates.first() {
            Some(uri) => OracleDecision::Choose(uri.clone()),
            None => OracleDecision::Abort,
        }
    }
}

/// One frontier member with its ordering keys
#[derive(Debug, Clone)]
struct Candidate {
    uri: NamedNode,
    /// Position in the preferred workflow, when the node is a pending step
    workflow_rank: Option<usize>,
    /// Unmet goal atoms this node's effects could newly satisfy
    new_atoms: usize,
}

/// The goal-directed planner
pub struct Planner<'a> {
    kb: &'a KnowledgeBase,
    catalogue: &'a Catalogue,
    config: &'a EngineConfig,
    ctx: NamedNode,
}

impl<'a> Planner<'a> {
    pub fn new(
        kb: &'a KnowledgeBase,
        catalogue: &'a Catalogue,
        config: &'a EngineConfig,
        ctx: NamedNode,
    ) -> Self {
        Self {
            kb,
            catalogue,
            config,
            ctx,
        }
    }

    /// Run the main loop until the goal holds or no progress is possible
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        target: &TargetDescription,
        nodes: &NodeExecutor,
        rules: &mut RuleEngine,
        recorder: &mut Recorder,
        cancel: &CancelFlag,
        mode: ExecutionMode,
        oracle: &dyn ChooseCandidate,
    ) -> PlannerResult<PlanOutcome> {
        let goal = GoalAnalysis::new(target.ask_query())?;
        let executor = PlanExecutor::new(self.catalogue, nodes);

        // Terms worth tracking: goal terms now, plus precondition terms of
        // contributive-but-blocked nodes as regression discovers them.
        let mut wanted: FxHashSet<String> = goal.terms.clone();
        // Operations that failed, keyed by the state fingerprint they failed in.
        let mut failed_ops: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        // (fingerprint, operation) pairs already attempted; re-attempting one
        // means the step changed nothing goal-relevant, so the search is stuck.
        let mut attempted: FxHashSet<(String, String)> = FxHashSet::default();
        // Nodes that already succeeded, for workflow-cursor bookkeeping.
        let mut executed: FxHashSet<String> = FxHashSet::default();

        let started = Instant::now();
        let mut steps = 0usize;
        // When the search dead-ends after an execution failure, the run
        // reports that failure rather than a bare planning reason.
        let mut last_step_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return self.give_up(recorder, FailureReason::Cancelled);
            }
            if let Some(budget) = self.config.run_timeout {
                if started.elapsed() > budget {
                    warn!("Run timeout after {:?}; cancelling", budget);
                    cancel.cancel();
                    return self.give_up(recorder, FailureReason::Cancelled);
                }
            }

            if self.kb.ask(&goal.ask)? {
                recorder.emit(self.kb, Event::new(EventKind::GoalReached))?;
                info!("Goal reached after {} step(s)", steps);
                return Ok(PlanOutcome::Succeeded { steps });
            }

            // Fire eligible rules once; any firing changes the graph, so loop.
            match rules.apply_all(self.kb, &self.catalogue.rules, recorder) {
                Ok(fired) if fired > 0 => {
                    debug!("{} rule(s) fired; replanning", fired);
                    continue;
                }
                Ok(_) => {}
                Err(RuleError::CriticalConsequent { rule, detail }) => {
                    return self.give_up(
                        recorder,
                        FailureReason::CriticalRule(format!("{}: {}", rule, detail)),
                    );
                }
                Err(RuleError::Kg(e)) => return Err(e.into()),
            }

            if steps >= self.config.depth_budget {
                return self.give_up(recorder, FailureReason::DepthExhausted);
            }

            let fingerprint = self.state_fingerprint(&wanted)?;
            let tried_here = failed_ops.entry(fingerprint.clone()).or_default().clone();
            let candidates =
                self.frontier(&goal, &mut wanted, &tried_here, &executed)?;

            if candidates.is_empty() {
                let reason = match &last_step_error {
                    Some(detail) => FailureReason::StepFailed(detail.clone()),
                    None if tried_here.is_empty() => FailureReason::NoProgress,
                    None => FailureReason::RevisitedFailedState,
                };
                return self.give_up(recorder, reason);
            }

            let chosen = match self.pick(&goal, &candidates, steps, mode, oracle)? {
                Some(uri) => uri,
                None => return self.give_up(recorder, FailureReason::OracleAbort),
            };

            if !attempted.insert((fingerprint.clone(), chosen.as_str().to_string())) {
                return self.give_up(recorder, FailureReason::RevisitedFailedState);
            }

            recorder.emit(
                self.kb,
                Event::new(EventKind::PlannerDecision)
                    .operation(&chosen)
                    .human_readable(serde_json::json!({
                        "decision": "execute",
                        "candidates": candidates
                            .iter()
                            .map(|c| c.uri.as_str())
                            .collect::<Vec<_>>(),
                        "chosen": chosen.as_str(),
                        "step": steps,
                    })),
            )?;

            let operation = Operation::Node(chosen.clone());
            match executor.execute_step(
                self.kb,
                &self.ctx,
                &operation,
                recorder,
                rules,
                cancel,
            ) {
                Ok(()) => {
                    executed.insert(chosen.as_str().to_string());
                    steps += 1;
                }
                Err(ExecError::Cancelled) => {
                    return self.give_up(recorder, FailureReason::Cancelled);
                }
                Err(error) => {
                    // Recoverable: mark the operation non-productive for this
                    // state and try another candidate.
                    warn!("{} failed: {}; marking non-productive", operation, error);
                    last_step_error = Some(error.to_string());
                    failed_ops
                        .entry(fingerprint)
                        .or_default()
                        .insert(chosen.as_str().to_string());
                    steps += 1;
                }
            }
        }
    }

    fn give_up(
        &self,
        recorder: &mut Recorder,
        reason: FailureReason,
    ) -> PlannerResult<PlanOutcome> {
        recorder.emit(
            self.kb,
            Event::new(EventKind::PlannerDecision).human_readable(serde_json::json!({
                "decision": "give-up",
                "reason": reason.to_string(),
            })),
        )?;
        info!("Planner gave up: {}", reason);
        Ok(PlanOutcome::Failed { reason })
    }

    /// Applicable (all preconditions hold) and contributive (effects touch a
    /// wanted term) nodes. Opaque nodes only qualify as pending workflow
    /// steps; blocked-but-contributive nodes grow the wanted set.
    fn frontier(
        &self,
        goal: &GoalAnalysis,
        wanted: &mut FxHashSet<String>,
        tried_here: &FxHashSet<String>,
        executed: &FxHashSet<String>,
    ) -> PlannerResult<Vec<Candidate>> {
        let unmet = goal.unmet_atoms(self.kb)?;
        let mut candidates = Vec::new();

        for node in &self.catalogue.nodes {
            if tried_here.contains(node.uri.as_str()) {
                continue;
            }

            let workflow_rank = self.workflow_rank(node, executed);
            let contributive = node
                .effect_terms()
                .any(|term| wanted.contains(term.as_str()));
            if node.is_opaque() {
                // Never guess missing intent: opaque nodes are only
                // selectable as explicit workflow steps.
                if workflow_rank.is_none() {
                    continue;
                }
            } else if !contributive && workflow_rank.is_none() {
                continue;
            }

            if !self.preconditions_hold(node)? {
                if contributive {
                    for term in self.precondition_terms(node) {
                        if wanted.insert(term.clone()) {
                            debug!(
                                "Regression: tracking {} wanted by blocked node {}",
                                term, node.uri
                            );
                        }
                    }
                }
                continue;
            }

            let new_atoms = unmet
                .iter()
                .filter(|atom| {
                    node.effect_terms()
                        .any(|term| atom.predicates.contains(&term.as_str().to_string()))
                })
                .count();

            candidates.push(Candidate {
                uri: node.uri.clone(),
                workflow_rank,
                new_atoms,
            });
        }

        Ok(candidates)
    }

    /// Order candidates and pick one, consulting the oracle on ties
    fn pick(
        &self,
        goal: &GoalAnalysis,
        candidates: &[Candidate],
        depth: usize,
        mode: ExecutionMode,
        oracle: &dyn ChooseCandidate,
    ) -> PlannerResult<Option<NamedNode>> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| {
            rank(a.workflow_rank)
                .cmp(&rank(b.workflow_rank))
                .then_with(|| b.new_atoms.cmp(&a.new_atoms))
                .then_with(|| a.uri.as_str().cmp(b.uri.as_str()))
        });

        let best = ordered[0];
        let tied: Vec<NamedNode> = ordered
            .iter()
            .take_while(|c| {
                c.workflow_rank == best.workflow_rank && c.new_atoms == best.new_atoms
            })
            .map(|c| c.uri.clone())
            .collect();

        if mode == ExecutionMode::Expert && tied.len() > 1 {
            let snapshot = StateSnapshot {
                context: self.ctx.clone(),
                depth,
                goal_ask: goal.ask.clone(),
                unmet_atoms: goal
                    .unmet_atoms(self.kb)?
                    .iter()
                    .map(|atom| atom.ask.clone())
                    .collect(),
            };
            return Ok(match oracle.choose(&tied, &snapshot) {
                OracleDecision::Choose(uri) => Some(uri),
                OracleDecision::Abort => None,
            });
        }

        Ok(Some(best.uri.clone()))
    }

    /// Position of `node` as the next pending step of any loaded workflow
    fn workflow_rank(&self, node: &AtomicNode, executed: &FxHashSet<String>) -> Option<usize> {
        for workflow in &self.catalogue.workflows {
            let pending = workflow
                .steps
                .iter()
                .position(|step| !executed.contains(step.as_str()));
            if let Some(cursor) = pending {
                if workflow.steps[cursor] == node.uri {
                    return Some(cursor);
                }
            }
        }
        None
    }

    /// All preconditions, with `?ctx` bound to the operating context
    fn preconditions_hold(&self, node: &AtomicNode) -> PlannerResult<bool> {
        for ask in &node.preconditions {
            let bound = bind_ctx(ask, &self.ctx);
            if !self.kb.ask(&bound)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Predicate IRIs a node's preconditions test, for goal regression
    fn precondition_terms(&self, node: &AtomicNode) -> Vec<String> {
        let mut terms = Vec::new();
        for ask in &node.preconditions {
            if let Ok(analysis) = GoalAnalysis::new(ask) {
                terms.extend(analysis.terms);
            }
        }
        terms
    }

    /// SHA-256 over the sorted serialization of all triples whose predicate
    /// is goal-relevant. Cheap, and stable across runs.
    fn state_fingerprint(&self, wanted: &FxHashSet<String>) -> PlannerResult<String> {
        let mut predicates: Vec<&String> = wanted.iter().collect();
        predicates.sort();

        let mut lines = Vec::new();
        for predicate in predicates {
            let Ok(predicate) = NamedNodeRef::new(predicate) else {
                continue;
            };
            for triple in self.kb.triples_with_predicate(predicate)? {
                lines.push(triple.to_string());
            }
        }
        lines.sort();

        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// `?ctx` bound to a concrete context URI
fn bind_ctx(ask: &str, ctx: &NamedNode) -> String {
    let pattern = Regex::new(r"\?ctx\b").expect("static regex");
    pattern
        .replace_all(ask, regex::NoExpand(&ctx.to_string()))
        .into_owned()
}

fn rank(workflow_rank: Option<usize>) -> usize {
    workflow_rank.unwrap_or(usize::MAX)
}

/// One triple pattern of the goal, evaluable on its own
#[derive(Debug, Clone)]
struct GoalAtom {
    ask: String,
    /// Predicate IRIs this atom tests (one for a plain pattern)
    predicates: Vec<String>,
}

/// Terms and atoms extracted from the goal ASK
struct GoalAnalysis {
    ask: String,
    /// Predicate and object-class IRIs appearing in the goal pattern
    terms: FxHashSet<String>,
    atoms: Vec<GoalAtom>,
}

impl GoalAnalysis {
    fn new(ask: &str) -> Result<Self, PlannerError> {
        let query = spargebra::Query::parse(ask, None)
            .map_err(|e| PlannerError::Goal(e.to_string()))?;
        let pattern = match &query {
            spargebra::Query::Ask { pattern, .. } => pattern,
            spargebra::Query::Select { pattern, .. } => pattern,
            _ => {
                return Err(PlannerError::Goal(
                    "goal must be an ASK (or SELECT) form".to_string(),
                ));
            }
        };

        let mut triples = Vec::new();
        let mut path_predicates = Vec::new();
        collect_patterns(pattern, &mut triples, &mut path_predicates);

        let mut terms = FxHashSet::default();
        let mut atoms = Vec::new();
        for triple in &triples {
            let mut predicates = Vec::new();
            if let NamedNodePattern::NamedNode(predicate) = &triple.predicate {
                terms.insert(predicate.as_str().to_string());
                predicates.push(predicate.as_str().to_string());
            }
            if let TermPattern::NamedNode(object) = &triple.object {
                terms.insert(object.as_str().to_string());
            }
            if let Some(text) = atom_text(triple) {
                atoms.push(GoalAtom {
                    ask: format!("ASK {{ {} }}", text),
                    predicates,
                });
            }
        }
        for predicate in path_predicates {
            terms.insert(predicate);
        }

        Ok(Self {
            ask: ask.to_string(),
            terms,
            atoms,
        })
    }

    /// Atoms whose individual ASK does not hold yet
    fn unmet_atoms(&self, kb: &KnowledgeBase) -> Result<Vec<&GoalAtom>, PlannerError> {
        let mut unmet = Vec::new();
        for atom in &self.atoms {
            match kb.ask(&atom.ask) {
                Ok(true) => {}
                Ok(false) => unmet.push(atom),
                // A malformed atom never blocks planning; it is simply
                // not usable for tie-breaking.
                Err(e) => {
                    debug!("Cannot evaluate goal atom: {}", e);
                }
            }
        }
        Ok(unmet)
    }
}

/// Walk a graph pattern, collecting plain triple patterns and path predicates
fn collect_patterns(
    pattern: &GraphPattern,
    triples: &mut Vec<TriplePattern>,
    path_predicates: &mut Vec<String>,
) {
    match pattern {
        GraphPattern::Bgp { patterns } => triples.extend(patterns.iter().cloned()),
        GraphPattern::Path { path, .. } => collect_path(path, path_predicates),
        GraphPattern::Join { left, right }
        | GraphPattern::Union { left, right }
        | GraphPattern::Minus { left, right } => {
            collect_patterns(left, triples, path_predicates);
            collect_patterns(right, triples, path_predicates);
        }
        GraphPattern::LeftJoin { left, right, .. } => {
            collect_patterns(left, triples, path_predicates);
            collect_patterns(right, triples, path_predicates);
        }
        GraphPattern::Filter { inner, .. }
        | GraphPattern::Graph { inner, .. }
        | GraphPattern::Extend { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Project { inner, .. }
        | GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::Group { inner, .. }
        | GraphPattern::Service { inner, .. } => {
            collect_patterns(inner, triples, path_predicates);
        }
        GraphPattern::Values { .. } => {}
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

fn collect_path(path: &PropertyPathExpression, out: &mut Vec<String>) {
    match path {
        PropertyPathExpression::NamedNode(node) => out.push(node.as_str().to_string()),
        PropertyPathExpression::Reverse(inner)
        | PropertyPathExpression::ZeroOrMore(inner)
        | PropertyPathExpression::OneOrMore(inner)
        | PropertyPathExpression::ZeroOrOne(inner) => collect_path(inner, out),
        PropertyPathExpression::Sequence(left, right)
        | PropertyPathExpression::Alternative(left, right) => {
            collect_path(left, out);
            collect_path(right, out);
        }
        PropertyPathExpression::NegatedPropertySet(nodes) => {
            out.extend(nodes.iter().map(|n| n.as_str().to_string()));
        }
    }
}

/// Serialize one triple pattern back to SPARQL text; `None` when a term
/// cannot be expressed (nested patterns)
fn atom_text(triple: &TriplePattern) -> Option<String> {
    let subject = term_text(&triple.subject)?;
    let predicate = match &triple.predicate {
        NamedNodePattern::NamedNode(node) => node.to_string(),
        NamedNodePattern::Variable(variable) => variable.to_string(),
    };
    let object = term_text(&triple.object)?;
    Some(format!("{} {} {} .", subject, predicate, object))
}

fn term_text(term: &TermPattern) -> Option<String> {
    match term {
        TermPattern::NamedNode(node) => Some(node.to_string()),
        TermPattern::Literal(literal) => Some(literal.to_string()),
        TermPattern::Variable(variable) => Some(variable.to_string()),
        // Blank nodes in a goal pattern are existential, same as variables.
        TermPattern::BlankNode(node) => Some(format!("?kce_bnode_{}", node.as_str())),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_terms_extracted() {
        let goal = GoalAnalysis::new(
            "ASK { ?c <http://x/out> 2 . ?c <http://x/hasPanel> ?p . ?p a <http://x/Panel> }",
        )
        .unwrap();
        assert!(goal.terms.contains("http://x/out"));
        assert!(goal.terms.contains("http://x/hasPanel"));
        assert!(goal.terms.contains("http://x/Panel"));
        assert_eq!(goal.atoms.len(), 3);
    }

    #[test]
    fn test_goal_terms_inside_filter_and_union() {
        let goal = GoalAnalysis::new(
            "ASK { { ?c <http://x/a> ?v . FILTER(?v > 1) } UNION { ?c <http://x/b> ?w } }",
        )
        .unwrap();
        assert!(goal.terms.contains("http://x/a"));
        assert!(goal.terms.contains("http://x/b"));
    }

    #[test]
    fn test_unmet_atoms_shrink_as_graph_grows() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap();
        let goal =
            GoalAnalysis::new("ASK { <http://x/c> <http://x/out> 2 . <http://x/c> <http://x/flag> true }")
                .unwrap();

        assert_eq!(goal.unmet_atoms(&kb).unwrap().len(), 2);
        kb.update("INSERT DATA { <http://x/c> <http://x/out> 2 }").unwrap();
        assert_eq!(goal.unmet_atoms(&kb).unwrap().len(), 1);
        kb.update("INSERT DATA { <http://x/c> <http://x/flag> true }").unwrap();
        assert!(goal.unmet_atoms(&kb).unwrap().is_empty());
    }

    #[test]
    fn test_bind_ctx_substitutes_word_boundary() {
        let ctx = NamedNode::new("http://x/ctx1").unwrap();
        let bound = bind_ctx("ASK { ?ctx <http://x/p> ?ctxother . ?ctx ?q 1 }", &ctx);
        assert!(bound.contains("<http://x/ctx1> <http://x/p> ?ctxother"));
        assert!(bound.contains("<http://x/ctx1> ?q 1"));
    }

    #[test]
    fn test_state_fingerprint_tracks_goal_relevant_triples() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap();
        let catalogue = Catalogue::default();
        let config = EngineConfig::default();
        let ctx = NamedNode::new("http://x/ctx").unwrap();
        let planner = Planner::new(&kb, &catalogue, &config, ctx);

        let mut wanted = FxHashSet::default();
        wanted.insert("http://x/out".to_string());

        let empty = planner.state_fingerprint(&wanted).unwrap();

        // Irrelevant predicate: fingerprint unchanged.
        kb.update("INSERT DATA { <http://x/c> <http://x/other> 9 }").unwrap();
        assert_eq!(planner.state_fingerprint(&wanted).unwrap(), empty);

        // Goal-relevant predicate: fingerprint moves.
        kb.update("INSERT DATA { <http://x/c> <http://x/out> 2 }").unwrap();
        assert_ne!(planner.state_fingerprint(&wanted).unwrap(), empty);
    }

    #[test]
    fn test_default_oracle_is_deterministic() {
        let candidates = vec![
            NamedNode::new("http://x/a").unwrap(),
            NamedNode::new("http://x/b").unwrap(),
        ];
        let snapshot = StateSnapshot {
            context: NamedNode::new("http://x/ctx").unwrap(),
            depth: 0,
            goal_ask: "ASK { ?s ?p ?o }".to_string(),
            unmet_atoms: Vec::new(),
        };
        match FirstCandidate.choose(&candidates, &snapshot) {
            OracleDecision::Choose(uri) => assert_eq!(uri.as_str(), "http://x/a"),
            OracleDecision::Abort => panic!("default oracle must not abort"),
        }
    }
}
