//! Provenance & execution-state recording
//!
//! Every run writes an `ExecutionRun` resource and a chain of
//! `ExecutionStateNode`s into the knowledge base, one per event. State nodes
//! chain through `previousState`, carry timestamps and event kinds, and
//! reference human-readable payloads stored through the blob sink. Output
//! triples are attributed to the state node that produced them with
//! `prov:wasGeneratedBy` over reified statements; resolved inputs are
//! attributed with `prov:used`.

use crate::kg::{KgResult, KnowledgeBase};
use crate::vocab::{self, kce, prov, reif};
use chrono::{SecondsFormat, Utc};
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Term, Triple};
use tracing::debug;

/// What happened at one step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NodeStarted,
    NodeSucceeded,
    NodeFailed,
    RuleFired,
    PlannerDecision,
    GoalReached,
}

impl EventKind {
    fn as_named(self) -> NamedNodeRef<'static> {
        match self {
            EventKind::NodeStarted => kce::NODE_STARTED,
            EventKind::NodeSucceeded => kce::NODE_SUCCEEDED,
            EventKind::NodeFailed => kce::NODE_FAILED,
            EventKind::RuleFired => kce::RULE_FIRED,
            EventKind::PlannerDecision => kce::PLANNER_DECISION,
            EventKind::GoalReached => kce::GOAL_REACHED,
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    fn as_named(self) -> NamedNodeRef<'static> {
        match self {
            RunStatus::Running => kce::RUNNING,
            RunStatus::Succeeded => kce::SUCCEEDED,
            RunStatus::Failed => kce::FAILED,
        }
    }
}

/// One event to record; optional payloads become blobs
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub kind: Option<EventKind>,
    /// The node or rule URI this event concerns
    pub operation: Option<NamedNode>,
    /// Resolved inputs at spawn time (stored as a blob)
    pub input_snapshot: Option<serde_json::Value>,
    /// Raw parsed script output (stored as a blob)
    pub output_snapshot: Option<serde_json::Value>,
    /// Free-form human-readable payload (stored as a blob)
    pub human_readable: Option<serde_json::Value>,
    /// Error text for failure events
    pub error_detail: Option<String>,
    /// Copied from the node definition
    pub external_side_effect: bool,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn operation(mut self, uri: &NamedNode) -> Self {
        self.operation = Some(uri.clone());
        self
    }

    pub fn input_snapshot(mut self, payload: serde_json::Value) -> Self {
        self.input_snapshot = Some(payload);
        self
    }

    pub fn output_snapshot(mut self, payload: serde_json::Value) -> Self {
        self.output_snapshot = Some(payload);
        self
    }

    pub fn human_readable(mut self, payload: serde_json::Value) -> Self {
        self.human_readable = Some(payload);
        self
    }

    pub fn error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn external_side_effect(mut self, flag: bool) -> Self {
        self.external_side_effect = flag;
        self
    }
}

/// Records one run's execution-state graph
pub struct Recorder {
    run_id: String,
    run_uri: NamedNode,
    context: NamedNode,
    next_index: u64,
    last_state: Option<NamedNode>,
}

impl Recorder {
    /// Write the `ExecutionRun` resource and start the chain
    pub fn begin_run(
        kb: &KnowledgeBase,
        run_id: &str,
        goal: &str,
        context: &NamedNode,
    ) -> KgResult<Self> {
        let run_uri = vocab::run_uri(run_id);
        let triples = vec![
            Triple::new(run_uri.clone(), NamedNode::from(rdf::TYPE), NamedNode::from(kce::EXECUTION_RUN)),
            Triple::new(
                run_uri.clone(),
                NamedNode::from(kce::RUN_ID),
                Literal::new_simple_literal(run_id),
            ),
            Triple::new(
                run_uri.clone(),
                NamedNode::from(kce::STARTED_AT),
                timestamp_literal(),
            ),
            Triple::new(
                run_uri.clone(),
                NamedNode::from(kce::STATUS),
                NamedNode::from(RunStatus::Running.as_named()),
            ),
            Triple::new(
                run_uri.clone(),
                NamedNode::from(kce::GOAL),
                Literal::new_simple_literal(goal),
            ),
            Triple::new(
                run_uri.clone(),
                NamedNode::from(kce::WORKFLOW_CONTEXT),
                context.clone(),
            ),
        ];
        kb.add_triples(triples)?;
        debug!("Began run {}", run_id);
        Ok(Self {
            run_id: run_id.to_string(),
            run_uri,
            context: context.clone(),
            next_index: 0,
            last_state: None,
        })
    }

    /// Record one event, chaining `previousState`, and return its state node
    pub fn emit(&mut self, kb: &KnowledgeBase, event: Event) -> KgResult<NamedNode> {
        let index = self.next_index;
        self.next_index += 1;
        let state = vocab::state_uri(&self.run_id, index);
        let event_id = format!("state-{}", index);

        let mut triples = vec![
            Triple::new(
                state.clone(),
                NamedNode::from(rdf::TYPE),
                NamedNode::from(kce::EXECUTION_STATE_NODE),
            ),
            Triple::new(state.clone(), NamedNode::from(kce::IN_RUN), self.run_uri.clone()),
            Triple::new(
                state.clone(),
                NamedNode::from(kce::STATE_INDEX),
                Literal::new_typed_literal(index.to_string(), xsd::INTEGER),
            ),
            Triple::new(state.clone(), NamedNode::from(kce::TIMESTAMP), timestamp_literal()),
        ];
        if let Some(kind) = event.kind {
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::EVENT_KIND),
                NamedNode::from(kind.as_named()),
            ));
        }
        if let Some(previous) = &self.last_state {
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::PREVIOUS_STATE),
                previous.clone(),
            ));
        }
        if let Some(operation) = &event.operation {
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::OPERATION),
                operation.clone(),
            ));
        }
        if let Some(detail) = &event.error_detail {
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::ERROR_DETAIL),
                Literal::new_simple_literal(detail.as_str()),
            ));
        }
        triples.push(Triple::new(
            state.clone(),
            NamedNode::from(kce::HAS_EXTERNAL_SIDE_EFFECT),
            Literal::new_typed_literal(event.external_side_effect.to_string(), xsd::BOOLEAN),
        ));

        if let Some(payload) = &event.input_snapshot {
            let blob = self.store_blob(kb, &format!("{}-inputs", event_id), payload)?;
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::INPUT_SNAPSHOT),
                Literal::new_simple_literal(blob),
            ));
        }
        if let Some(payload) = &event.output_snapshot {
            let blob = self.store_blob(kb, &format!("{}-outputs", event_id), payload)?;
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::OUTPUT_SNAPSHOT),
                Literal::new_simple_literal(blob),
            ));
        }
        if let Some(payload) = &event.human_readable {
            let blob = self.store_blob(kb, &event_id, payload)?;
            triples.push(Triple::new(
                state.clone(),
                NamedNode::from(kce::HUMAN_READABLE_LOG),
                Literal::new_simple_literal(blob),
            ));
        }

        kb.add_triples(triples)?;
        self.last_state = Some(state.clone());
        Ok(state)
    }

    /// Attribute output triples to the state node that produced them.
    ///
    /// Each triple gets a reified statement resource carrying
    /// `prov:wasGeneratedBy`; the triples themselves stay in the default
    /// graph where later queries see them.
    pub fn link_generated(
        &self,
        kb: &KnowledgeBase,
        written: &[Triple],
        state: &NamedNode,
    ) -> KgResult<()> {
        let mut triples = Vec::with_capacity(written.len() * 5);
        for (index, triple) in written.iter().enumerate() {
            let subject_term = match &triple.subject {
                oxigraph::model::Subject::NamedNode(n) => Term::NamedNode(n.clone()),
                oxigraph::model::Subject::BlankNode(b) => Term::BlankNode(b.clone()),
                #[allow(unreachable_patterns)]
                _ => continue,
            };
            let stmt = NamedNode::new_unchecked(format!("{}/gen/{}", state.as_str(), index));
            triples.push(Triple::new(
                stmt.clone(),
                NamedNode::from(rdf::TYPE),
                NamedNode::from(reif::STATEMENT),
            ));
            triples.push(Triple::new(
                stmt.clone(),
                NamedNode::from(reif::SUBJECT),
                subject_term,
            ));
            triples.push(Triple::new(
                stmt.clone(),
                NamedNode::from(reif::PREDICATE),
                triple.predicate.clone(),
            ));
            triples.push(Triple::new(
                stmt.clone(),
                NamedNode::from(reif::OBJECT),
                triple.object.clone(),
            ));
            triples.push(Triple::new(
                stmt,
                NamedNode::from(prov::WAS_GENERATED_BY),
                state.clone(),
            ));
        }
        kb.add_triples(triples)?;
        Ok(())
    }

    /// Attribute the resolved input values of a node execution
    pub fn link_used(
        &self,
        kb: &KnowledgeBase,
        state: &NamedNode,
        values: &[Term],
    ) -> KgResult<()> {
        let triples: Vec<Triple> = values
            .iter()
            .map(|value| {
                Triple::new(state.clone(), NamedNode::from(prov::USED), value.clone())
            })
            .collect();
        kb.add_triples(triples)?;
        Ok(())
    }

    /// Finalize the run resource
    pub fn end_run(
        &mut self,
        kb: &KnowledgeBase,
        status: RunStatus,
        reason: Option<&str>,
    ) -> KgResult<()> {
        kb.delete_pair(self.run_uri.as_ref().into(), kce::STATUS)?;
        let mut triples = vec![
            Triple::new(
                self.run_uri.clone(),
                NamedNode::from(kce::STATUS),
                NamedNode::from(status.as_named()),
            ),
            Triple::new(
                self.run_uri.clone(),
                NamedNode::from(kce::ENDED_AT),
                timestamp_literal(),
            ),
        ];
        if let Some(reason) = reason {
            triples.push(Triple::new(
                self.run_uri.clone(),
                NamedNode::from(kce::FAILURE_REASON),
                Literal::new_simple_literal(reason),
            ));
        }
        kb.add_triples(triples)?;
        debug!("Ended run {} as {:?}", self.run_id, status);
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_uri(&self) -> &NamedNode {
        &self.run_uri
    }

    /// The problem-instance resource this run operates on
    pub fn context(&self) -> &NamedNode {
        &self.context
    }

    /// Most recent state node, if any event was emitted
    pub fn last_state(&self) -> Option<&NamedNode> {
        self.last_state.as_ref()
    }

    fn store_blob(
        &self,
        kb: &KnowledgeBase,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> KgResult<String> {
        let bytes = serde_json::to_vec_pretty(payload).unwrap_or_default();
        kb.store_human_readable(&self.run_id, event_id, &bytes)
    }
}

fn timestamp_literal() -> Literal {
    Literal::new_typed_literal(
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        xsd::DATE_TIME,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb() -> KnowledgeBase {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap()
    }

    fn ctx() -> NamedNode {
        NamedNode::new("http://example.org/ctx").unwrap()
    }

    #[test]
    fn test_begin_emit_end() {
        let kb = kb();
        let context = ctx();
        let mut recorder = Recorder::begin_run(&kb, "run-1", "ASK { ?s ?p ?o }", &context).unwrap();

        let first = recorder
            .emit(&kb, Event::new(EventKind::PlannerDecision))
            .unwrap();
        let second = recorder
            .emit(&kb, Event::new(EventKind::GoalReached))
            .unwrap();
        recorder.end_run(&kb, RunStatus::Succeeded, None).unwrap();

        // The second state chains to the first.
        assert!(kb
            .ask(&format!(
                "ASK {{ {} {} {} }}",
                second,
                kce::PREVIOUS_STATE,
                first
            ))
            .unwrap());
        // The first state has no previous.
        assert!(!kb
            .ask(&format!("ASK {{ {} {} ?p }}", first, kce::PREVIOUS_STATE))
            .unwrap());
        // Run ended as Succeeded.
        assert!(kb
            .ask(&format!(
                "ASK {{ {} {} {} }}",
                recorder.run_uri(),
                kce::STATUS,
                kce::SUCCEEDED
            ))
            .unwrap());
        // Running status was replaced, not duplicated.
        assert!(!kb
            .ask(&format!(
                "ASK {{ {} {} {} }}",
                recorder.run_uri(),
                kce::STATUS,
                kce::RUNNING
            ))
            .unwrap());
    }

    #[test]
    fn test_generated_links_are_reified() {
        let kb = kb();
        let context = ctx();
        let mut recorder = Recorder::begin_run(&kb, "run-2", "ASK { ?s ?p ?o }", &context).unwrap();
        let state = recorder
            .emit(&kb, Event::new(EventKind::NodeSucceeded))
            .unwrap();

        let written = vec![Triple::new(
            context.clone(),
            NamedNode::new("http://example.org/p").unwrap(),
            Literal::new_simple_literal("v"),
        )];
        recorder.link_generated(&kb, &written, &state).unwrap();

        let rows = kb
            .select(&format!(
                "SELECT ?stmt WHERE {{ ?stmt {} <http://example.org/p> ; {} {} }}",
                reif::PREDICATE,
                prov::WAS_GENERATED_BY,
                state
            ))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_blob_refs_recorded() {
        let kb = kb();
        let context = ctx();
        let mut recorder = Recorder::begin_run(&kb, "run-3", "ASK { ?s ?p ?o }", &context).unwrap();
        let state = recorder
            .emit(
                &kb,
                Event::new(EventKind::NodeStarted)
                    .input_snapshot(serde_json::json!({"x": "1"})),
            )
            .unwrap();

        let rows = kb
            .select(&format!(
                "SELECT ?r WHERE {{ {} {} ?r }}",
                state,
                kce::INPUT_SNAPSHOT
            ))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let Term::Literal(blob_ref) = &rows[0]["r"] else {
            panic!("expected literal ref");
        };
        let bytes = kb.get_human_readable(blob_ref.value()).unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["x"], "1");
    }
}
