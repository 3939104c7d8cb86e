//! Ordered plan execution
//!
//! Drives the plan executor directly with a mixed node/rule plan and checks
//! ordering, failure tagging, and the state-node chain it leaves behind.

use kce::catalogue::{Catalogue, CatalogueLoader, InitialState};
use kce::config::EngineConfig;
use kce::exec::{CancelFlag, ExecError, NodeExecutor, Operation, PlanExecutor};
use kce::kg::KnowledgeBase;
use kce::provenance::Recorder;
use kce::rules::RuleEngine;
use kce::vocab::kce as v;
use oxigraph::model::NamedNode;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

const DEFS: &str = r#"
prefixes:
  p: "http://example.org/props#"
  ex: "http://example.org/defs#"
definitions:
  - kind: AtomicNode
    uri: "ex:AddOne"
    inputs:
      - name: x
        mapsToRdfProperty: "p:in"
        dataType: "xsd:integer"
    outputs:
      - name: y
        mapsToRdfProperty: "p:out"
        dataType: "xsd:integer"
    effects:
      - kind: AssertProperty
        property: "p:out"
    invocation:
      kind: SubprocessScript
      scriptPath: scripts/add_one.sh
      argumentPassingStyle: NamedCLI
  - kind: Rule
    uri: "ex:FlagLarge"
    antecedent: "?c <http://example.org/props#out> ?v . FILTER(?v > 1)"
    consequent: "INSERT DATA { ?c <http://example.org/props#flag> true }"
"#;

const STATE: &str = r#"
prefixes:
  p: "http://example.org/props#"
  d: "http://example.org/data#"
context: "d:C"
entities:
  - uri: "d:C"
    properties:
      "p:in": { value: "1", type: "xsd:integer" }
"#;

struct Setup {
    _dir: TempDir,
    kb: KnowledgeBase,
    catalogue: Catalogue,
    nodes: NodeExecutor,
    context: NamedNode,
}

fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let scripts = dir.path().join("scripts");
    fs::create_dir_all(&scripts).unwrap();
    let script = scripts.join("add_one.sh");
    fs::write(&script, "#!/bin/sh\nx=$2\necho \"{\\\"y\\\": $((x + 1))}\"\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(dir.path().join("defs.yaml"), DEFS).unwrap();

    let kb = KnowledgeBase::in_memory(dir.path().join("log")).unwrap();
    CatalogueLoader::new(&kb, Vec::new())
        .load_dir(dir.path())
        .unwrap();

    let state = InitialState::parse(STATE, "http://example.org/data#").unwrap();
    let context = state.context.clone();
    kb.add_triples(state.triples).unwrap();

    let catalogue = Catalogue::from_graph(&kb).unwrap();
    let nodes = NodeExecutor::new(&EngineConfig::default()).unwrap();
    Setup {
        _dir: dir,
        kb,
        catalogue,
        nodes,
        context,
    }
}

fn uri(s: &str) -> NamedNode {
    NamedNode::new(s).unwrap()
}

#[test]
fn test_mixed_plan_runs_in_order() {
    let s = setup();
    let mut recorder =
        Recorder::begin_run(&s.kb, "plan-run", "ASK { ?s ?p ?o }", &s.context).unwrap();
    let mut rules = RuleEngine::new();
    let executor = PlanExecutor::new(&s.catalogue, &s.nodes);

    let plan = vec![
        Operation::Node(uri("http://example.org/defs#AddOne")),
        Operation::Rule(uri("http://example.org/defs#FlagLarge")),
    ];
    let steps = executor
        .execute(
            &s.kb,
            &s.context,
            &plan,
            &mut recorder,
            &mut rules,
            &CancelFlag::new(),
        )
        .unwrap();

    assert_eq!(steps, 2);
    assert!(s
        .kb
        .ask("ASK { <http://example.org/data#C> <http://example.org/props#out> 2 }")
        .unwrap());
    // The rule saw the node's write (read-your-writes across steps).
    assert!(s
        .kb
        .ask("ASK { <http://example.org/data#C> <http://example.org/props#flag> true }")
        .unwrap());

    // The chain is fully linked: every state but the first has a previous.
    let states = s
        .kb
        .select(&format!(
            "SELECT ?s WHERE {{ ?s {} <https://w3id.org/kce/run/plan-run> }}",
            v::IN_RUN
        ))
        .unwrap();
    let linked = s
        .kb
        .select(&format!(
            "SELECT ?s WHERE {{ ?s {} ?prev ; {} <https://w3id.org/kce/run/plan-run> }}",
            v::PREVIOUS_STATE,
            v::IN_RUN
        ))
        .unwrap();
    assert_eq!(states.len(), linked.len() + 1);
}

#[test]
fn test_failure_is_tagged_with_offending_step() {
    let s = setup();
    let mut recorder =
        Recorder::begin_run(&s.kb, "plan-fail", "ASK { ?s ?p ?o }", &s.context).unwrap();
    let mut rules = RuleEngine::new();
    let executor = PlanExecutor::new(&s.catalogue, &s.nodes);

    let plan = vec![
        Operation::Node(uri("http://example.org/defs#AddOne")),
        Operation::Node(uri("http://example.org/defs#DoesNotExist")),
        Operation::Rule(uri("http://example.org/defs#FlagLarge")),
    ];
    let failure = executor
        .execute(
            &s.kb,
            &s.context,
            &plan,
            &mut recorder,
            &mut rules,
            &CancelFlag::new(),
        )
        .unwrap_err();

    assert_eq!(failure.step, 1);
    assert!(matches!(failure.error, ExecError::UnknownOperation(_)));
    // Step 0 completed; its mutation stays as evidence.
    assert!(s
        .kb
        .ask("ASK { <http://example.org/data#C> <http://example.org/props#out> 2 }")
        .unwrap());
}
