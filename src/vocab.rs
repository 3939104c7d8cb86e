//! KCE vocabulary
//!
//! URI constants for the catalogue schema and the execution-state graph,
//! plus helpers for minting runtime resource URIs.

use oxigraph::model::NamedNode;

/// KCE schema namespace
pub const KCE_NS: &str = "https://w3id.org/kce/vocab#";

/// Namespace under which runtime resources (runs, state nodes) are minted
pub const KCE_RUN_NS: &str = "https://w3id.org/kce/run/";

/// Namespace for catalogue URIs derived from definition documents
pub const KCE_DEF_NS: &str = "https://w3id.org/kce/def/";

/// W3C PROV namespace (PROV-style links only, not full PROV-O)
pub const PROV_NS: &str = "http://www.w3.org/ns/prov#";

/// KCE schema terms
pub mod kce {
    use oxigraph::model::NamedNodeRef;

    // Catalogue classes
    pub const ATOMIC_NODE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#AtomicNode");
    pub const INPUT_PARAMETER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#InputParameter");
    pub const OUTPUT_PARAMETER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#OutputParameter");
    pub const PRECONDITION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Precondition");
    pub const EFFECT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Effect");
    pub const INVOCATION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Invocation");
    pub const RULE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Rule");
    pub const CAPABILITY_TEMPLATE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#CapabilityTemplate");
    pub const WORKFLOW: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Workflow");
    pub const WORKFLOW_STEP: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#WorkflowStep");

    // Runtime classes
    pub const EXECUTION_RUN: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#ExecutionRun");
    pub const EXECUTION_STATE_NODE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#ExecutionStateNode");

    // Effect kinds
    pub const ASSERT_PROPERTY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#AssertProperty");
    pub const CREATE_ENTITY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#CreateEntity");
    pub const ADD_LINK: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#AddLink");

    // Invocation kinds / styles
    pub const SUBPROCESS_SCRIPT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#SubprocessScript");
    pub const NAMED_CLI: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#NamedCli");
    pub const POSITIONAL_CLI: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#PositionalCli");
    pub const JSON_STDOUT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#JsonStdout");

    // Event kinds
    pub const NODE_STARTED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#NodeStarted");
    pub const NODE_SUCCEEDED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#NodeSucceeded");
    pub const NODE_FAILED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#NodeFailed");
    pub const RULE_FIRED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#RuleFired");
    pub const PLANNER_DECISION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#PlannerDecision");
    pub const GOAL_REACHED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#GoalReached");

    // Run status
    pub const RUNNING: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Running");
    pub const SUCCEEDED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Succeeded");
    pub const FAILED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#Failed");

    // Node structure
    pub const HAS_INPUT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasInput");
    pub const HAS_OUTPUT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasOutput");
    pub const HAS_PRECONDITION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasPrecondition");
    pub const HAS_EFFECT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasEffect");
    pub const HAS_INVOCATION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasInvocation");
    pub const TIMEOUT_SECONDS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#timeoutSeconds");
    pub const HAS_EXTERNAL_SIDE_EFFECT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasExternalSideEffect");

    // Parameters
    pub const PARAM_NAME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#paramName");
    pub const MAPS_TO_PROPERTY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#mapsToRdfProperty");
    pub const DATA_TYPE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#dataType");
    pub const IS_REQUIRED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#isRequired");
    pub const INDEX: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#index");

    // Preconditions and effects
    pub const ASK_QUERY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#askQuery");
    pub const EFFECT_KIND: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#effectKind");
    pub const ON_ENTITY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#onEntity");
    pub const PROPERTY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#property");
    pub const VALUE_FROM_OUTPUT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#valueFromOutput");

    // Invocation spec
    pub const INVOCATION_KIND: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#invocationKind");
    pub const SCRIPT_PATH: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#scriptPath");
    pub const ARGUMENT_STYLE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#argumentPassingStyle");
    pub const OUTPUT_PARSING: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#outputParsingStyle");

    // Rules
    pub const ANTECEDENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#antecedent");
    pub const CONSEQUENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#consequent");
    pub const PRIORITY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#priority");
    pub const CRITICAL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#critical");

    // Capabilities
    pub const IMPLEMENTS_CAPABILITY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#implementsCapability");
    pub const FOR_CAPABILITY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#forCapability");
    pub const HAS_MAPPING: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasMapping");
    pub const FROM_NAME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#fromName");
    pub const TO_NAME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#toName");

    // Workflows
    pub const HAS_STEP: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#hasStep");
    pub const STEP_NODE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#stepNode");
    pub const STEP_ORDER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#stepOrder");

    // Execution runs
    pub const RUN_ID: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#runId");
    pub const STARTED_AT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#startedAt");
    pub const ENDED_AT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#endedAt");
    pub const STATUS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#status");
    pub const GOAL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#goal");
    pub const WORKFLOW_CONTEXT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#workflowContext");
    pub const FAILURE_REASON: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#failureReason");

    // Execution state nodes
    pub const TIMESTAMP: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#timestamp");
    pub const EVENT_KIND: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#eventKind");
    pub const OPERATION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#operationUri");
    pub const PREVIOUS_STATE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#previousState");
    pub const IN_RUN: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#inRun");
    pub const STATE_INDEX: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#stateIndex");
    pub const INPUT_SNAPSHOT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#inputSnapshotRef");
    pub const OUTPUT_SNAPSHOT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#outputSnapshotRef");
    pub const HUMAN_READABLE_LOG: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#humanReadableLogRef");
    pub const ERROR_DETAIL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://w3id.org/kce/vocab#errorDetail");
}

/// RDF reification terms, used to attribute output triples to state nodes
pub mod reif {
    use oxigraph::model::NamedNodeRef;

    pub const STATEMENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#Statement");
    pub const SUBJECT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#subject");
    pub const PREDICATE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#predicate");
    pub const OBJECT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#object");
}

/// PROV-style provenance links
pub mod prov {
    use oxigraph::model::NamedNodeRef;

    pub const WAS_GENERATED_BY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#wasGeneratedBy");
    pub const USED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#used");
}

/// RDFS terms used by the reasoner and for labels
pub mod rdfs {
    use oxigraph::model::NamedNodeRef;

    pub const LABEL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#label");
    pub const SUB_CLASS_OF: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#subClassOf");
    pub const SUB_PROPERTY_OF: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#subPropertyOf");
    pub const DOMAIN: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#domain");
    pub const RANGE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#range");
}

/// OWL terms used by the reasoner
pub mod owl {
    use oxigraph::model::NamedNodeRef;

    pub const INVERSE_OF: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#inverseOf");
    pub const SYMMETRIC_PROPERTY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#SymmetricProperty");
    pub const TRANSITIVE_PROPERTY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#TransitiveProperty");
}

/// Mint the URI of an execution run
pub fn run_uri(run_id: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", KCE_RUN_NS, encode_segment(run_id)))
}

/// Mint the URI of a state node within a run
pub fn state_uri(run_id: &str, index: u64) -> NamedNode {
    NamedNode::new_unchecked(format!(
        "{}{}/state/{}",
        KCE_RUN_NS,
        encode_segment(run_id),
        index
    ))
}

/// Mint the URI of a fresh workflow context for a run
pub fn context_uri(run_id: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}/context", KCE_RUN_NS, encode_segment(run_id)))
}

/// Mint a deterministic catalogue URI from a document stem and item index
pub fn def_uri(doc_stem: &str, index: usize) -> NamedNode {
    NamedNode::new_unchecked(format!(
        "{}{}/{}",
        KCE_DEF_NS,
        encode_segment(doc_stem),
        index
    ))
}

/// Keep run ids and document stems IRI-safe
fn encode_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_uri_minting() {
        let uri = run_uri("run-42");
        assert_eq!(uri.as_str(), "https://w3id.org/kce/run/run-42");

        let state = state_uri("run-42", 3);
        assert_eq!(state.as_str(), "https://w3id.org/kce/run/run-42/state/3");
    }

    #[test]
    fn test_unsafe_characters_are_encoded() {
        let uri = run_uri("run 42/α");
        assert!(!uri.as_str().contains(' '));
        assert!(!uri.as_str().contains("/α"));
    }

    #[test]
    fn test_vocab_terms_share_namespace() {
        assert!(kce::ATOMIC_NODE.as_str().starts_with(KCE_NS));
        assert!(kce::EVENT_KIND.as_str().starts_with(KCE_NS));
        assert!(prov::WAS_GENERATED_BY.as_str().starts_with(PROV_NS));
    }
}
