//! Declarative catalogue
//!
//! Domain experts author atomic nodes, rules, capability templates, and
//! workflows in definition documents. The loader normalizes them into
//! catalogue triples; this module holds the typed view the planner and
//! executors work from, reconstructed from the graph so a reopened store
//! plans identically after a restart.

mod loader;
mod state;
mod target;

pub use loader::{CatalogueLoader, DefinitionError, DefinitionResult, LoadReport};
pub use state::{InitialState, StateError};
pub use target::{TargetDescription, TargetError};

use crate::kg::{KgResult, KnowledgeBase};
use crate::vocab::{kce, rdfs};
use oxigraph::model::{NamedNode, Term};
use std::path::PathBuf;
use std::time::Duration;

/// How input values are handed to a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentStyle {
    /// `--<name> <value>` pairs
    NamedCli,
    /// Values in declared parameter order
    PositionalCli,
}

/// How script output is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputParsing {
    /// A single JSON object on stdout
    JsonStdout,
}

/// Declarative effect kinds used for goal regression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    AssertProperty,
    CreateEntity,
    AddLink,
}

/// A declared input or output parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Name, unique within the node
    pub name: String,
    /// Property read (inputs) or written (outputs) relative to the context
    pub maps_to: NamedNode,
    /// XSD datatype or class URI
    pub data_type: NamedNode,
    /// Inputs default true, outputs default false
    pub required: bool,
}

/// A declarative effect statement.
///
/// For `CreateEntity`, `property` names the class of the created entity;
/// for the other kinds it is the asserted or linked property.
#[derive(Debug, Clone)]
pub struct Effect {
    pub kind: EffectKind,
    pub on_entity: Option<String>,
    pub property: Option<NamedNode>,
    pub value_from_output: Option<String>,
}

/// How a node is invoked
#[derive(Debug, Clone)]
pub enum Invocation {
    SubprocessScript {
        /// Absolute path, resolved at load time
        script_path: PathBuf,
        argument_style: ArgumentStyle,
        output_parsing: OutputParsing,
    },
}

/// A name-to-name mapping from a node's parameters onto a capability's
#[derive(Debug, Clone)]
pub struct CapabilityMapping {
    pub capability: NamedNode,
    pub mappings: Vec<(String, String)>,
}

/// An executable step in the catalogue
#[derive(Debug, Clone)]
pub struct AtomicNode {
    pub uri: NamedNode,
    pub label: Option<String>,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    /// SPARQL ASK queries over `?ctx`; all must hold for the node to be selectable
    pub preconditions: Vec<String>,
    pub effects: Vec<Effect>,
    pub invocation: Invocation,
    pub timeout: Option<Duration>,
    pub external_side_effect: bool,
    pub capabilities: Vec<CapabilityMapping>,
}

impl AtomicNode {
    /// Property/class URIs this node's effects may assert, for regression
    pub fn effect_terms(&self) -> impl Iterator<Item = &NamedNode> {
        self.effects.iter().filter_map(|e| e.property.as_ref())
    }

    /// Whether any effect creates a new entity (triggers a reasoning pass)
    pub fn creates_entities(&self) -> bool {
        self.effects
            .iter()
            .any(|e| e.kind == EffectKind::CreateEntity)
    }

    /// Nodes without declared effects are opaque to the planner
    pub fn is_opaque(&self) -> bool {
        self.effects.is_empty()
    }
}

/// A declarative graph rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub uri: NamedNode,
    pub label: Option<String>,
    /// SPARQL group-graph-pattern body matched against the graph
    pub antecedent: String,
    /// SPARQL UPDATE template over the antecedent's variables
    pub consequent: String,
    /// Higher fires first
    pub priority: i64,
    /// A failing critical consequent aborts the solve
    pub critical: bool,
}

/// An abstract I/O signature nodes may implement
#[derive(Debug, Clone)]
pub struct CapabilityTemplate {
    pub uri: NamedNode,
    pub label: Option<String>,
    pub inputs: Vec<(String, NamedNode)>,
    pub outputs: Vec<(String, NamedNode)>,
}

/// An optional linear node sequence the planner may prefer as a skeleton
#[derive(Debug, Clone)]
pub struct Workflow {
    pub uri: NamedNode,
    pub label: Option<String>,
    /// Node URIs ordered by step order
    pub steps: Vec<NamedNode>,
}

/// The typed catalogue view
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    pub nodes: Vec<AtomicNode>,
    pub rules: Vec<Rule>,
    pub capabilities: Vec<CapabilityTemplate>,
    pub workflows: Vec<Workflow>,
}

impl Catalogue {
    /// Rebuild the typed view from catalogue triples in the graph
    pub fn from_graph(kb: &KnowledgeBase) -> KgResult<Self> {
        let mut catalogue = Self::default();

        for uri in kb.subjects_of_type(kce::ATOMIC_NODE)? {
            catalogue.nodes.push(read_node(kb, uri)?);
        }
        for uri in kb.subjects_of_type(kce::RULE)? {
            catalogue.rules.push(read_rule(kb, uri)?);
        }
        for uri in kb.subjects_of_type(kce::CAPABILITY_TEMPLATE)? {
            catalogue.capabilities.push(read_capability(kb, uri)?);
        }
        for uri in kb.subjects_of_type(kce::WORKFLOW)? {
            catalogue.workflows.push(read_workflow(kb, uri)?);
        }

        Ok(catalogue)
    }

    /// Look up a node by URI
    pub fn node(&self, uri: &NamedNode) -> Option<&AtomicNode> {
        self.nodes.iter().find(|n| &n.uri == uri)
    }

    /// Look up a rule by URI
    pub fn rule(&self, uri: &NamedNode) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.uri == uri)
    }

    /// Nodes declaring `implementsCapability` for `capability`
    pub fn nodes_implementing(&self, capability: &NamedNode) -> Vec<&AtomicNode> {
        self.nodes
            .iter()
            .filter(|n| n.capabilities.iter().any(|c| &c.capability == capability))
            .collect()
    }
}

fn read_node(kb: &KnowledgeBase, uri: NamedNode) -> KgResult<AtomicNode> {
    let label = get_string(kb, &uri, rdfs::LABEL)?;
    let inputs = read_parameters(kb, &uri, kce::HAS_INPUT)?;
    let outputs = read_parameters(kb, &uri, kce::HAS_OUTPUT)?;

    let mut preconditions = Vec::new();
    for pre in ordered_children(kb, &uri, kce::HAS_PRECONDITION)? {
        if let Some(ask) = get_string(kb, &pre, kce::ASK_QUERY)? {
            preconditions.push(ask);
        }
    }

    let mut effects = Vec::new();
    for effect in ordered_children(kb, &uri, kce::HAS_EFFECT)? {
        let kind = match get_named(kb, &effect, kce::EFFECT_KIND)? {
            Some(k) if k.as_ref() == kce::ASSERT_PROPERTY => EffectKind::AssertProperty,
            Some(k) if k.as_ref() == kce::CREATE_ENTITY => EffectKind::CreateEntity,
            Some(k) if k.as_ref() == kce::ADD_LINK => EffectKind::AddLink,
            _ => continue,
        };
        effects.push(Effect {
            kind,
            on_entity: get_string(kb, &effect, kce::ON_ENTITY)?,
            property: get_named(kb, &effect, kce::PROPERTY)?,
            value_from_output: get_string(kb, &effect, kce::VALUE_FROM_OUTPUT)?,
        });
    }

    let invocation = read_invocation(kb, &uri)?;
    let timeout = get_i64(kb, &uri, kce::TIMEOUT_SECONDS)?
        .map(|secs| Duration::from_secs(secs.max(0) as u64));
    let external_side_effect =
        get_bool(kb, &uri, kce::HAS_EXTERNAL_SIDE_EFFECT)?.unwrap_or(false);

    let mut capabilities = Vec::new();
    for mapping in ordered_children(kb, &uri, kce::IMPLEMENTS_CAPABILITY)? {
        if let Some(capability) = get_named(kb, &mapping, kce::FOR_CAPABILITY)? {
            let mut pairs = Vec::new();
            for entry in ordered_children(kb, &mapping, kce::HAS_MAPPING)? {
                let from = get_string(kb, &entry, kce::FROM_NAME)?;
                let to = get_string(kb, &entry, kce::TO_NAME)?;
                if let (Some(from), Some(to)) = (from, to) {
                    pairs.push((from, to));
                }
            }
            capabilities.push(CapabilityMapping {
                capability,
                mappings: pairs,
            });
        }
    }

    Ok(AtomicNode {
        uri,
        label,
        inputs,
        outputs,
        preconditions,
        effects,
        invocation,
        timeout,
        external_side_effect,
        capabilities,
    })
}

fn read_invocation(kb: &KnowledgeBase, node: &NamedNode) -> KgResult<Invocation> {
    let inv = get_named(kb, node, kce::HAS_INVOCATION)?;
    let (script_path, argument_style) = match &inv {
        Some(inv) => (
            get_string(kb, inv, kce::SCRIPT_PATH)?.unwrap_or_default(),
            get_named(kb, inv, kce::ARGUMENT_STYLE)?,
        ),
        None => (String::new(), None),
    };

    let argument_style = match argument_style {
        Some(s) if s.as_ref() == kce::POSITIONAL_CLI => ArgumentStyle::PositionalCli,
        _ => ArgumentStyle::NamedCli,
    };

    Ok(Invocation::SubprocessScript {
        script_path: PathBuf::from(script_path),
        argument_style,
        // JSON-on-stdout is the only parsing style in the closed set
        output_parsing: OutputParsing::JsonStdout,
    })
}

fn read_parameters(
    kb: &KnowledgeBase,
    node: &NamedNode,
    link: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Vec<Parameter>> {
    let is_output = link == kce::HAS_OUTPUT;
    let mut params = Vec::new();
    for param in ordered_children(kb, node, link)? {
        let name = get_string(kb, &param, kce::PARAM_NAME)?.unwrap_or_default();
        let Some(maps_to) = get_named(kb, &param, kce::MAPS_TO_PROPERTY)? else {
            continue;
        };
        let Some(data_type) = get_named(kb, &param, kce::DATA_TYPE)? else {
            continue;
        };
        let required = get_bool(kb, &param, kce::IS_REQUIRED)?.unwrap_or(!is_output);
        params.push(Parameter {
            name,
            maps_to,
            data_type,
            required,
        });
    }
    Ok(params)
}

fn read_rule(kb: &KnowledgeBase, uri: NamedNode) -> KgResult<Rule> {
    Ok(Rule {
        label: get_string(kb, &uri, rdfs::LABEL)?,
        antecedent: get_string(kb, &uri, kce::ANTECEDENT)?.unwrap_or_default(),
        consequent: get_string(kb, &uri, kce::CONSEQUENT)?.unwrap_or_default(),
        priority: get_i64(kb, &uri, kce::PRIORITY)?.unwrap_or(0),
        critical: get_bool(kb, &uri, kce::CRITICAL)?.unwrap_or(false),
        uri,
    })
}

fn read_capability(kb: &KnowledgeBase, uri: NamedNode) -> KgResult<CapabilityTemplate> {
    let mut inputs = Vec::new();
    for param in ordered_children(kb, &uri, kce::HAS_INPUT)? {
        let name = get_string(kb, &param, kce::PARAM_NAME)?.unwrap_or_default();
        if let Some(dt) = get_named(kb, &param, kce::DATA_TYPE)? {
            inputs.push((name, dt));
        }
    }
    let mut outputs = Vec::new();
    for param in ordered_children(kb, &uri, kce::HAS_OUTPUT)? {
        let name = get_string(kb, &param, kce::PARAM_NAME)?.unwrap_or_default();
        if let Some(dt) = get_named(kb, &param, kce::DATA_TYPE)? {
            outputs.push((name, dt));
        }
    }
    Ok(CapabilityTemplate {
        label: get_string(kb, &uri, rdfs::LABEL)?,
        inputs,
        outputs,
        uri,
    })
}

fn read_workflow(kb: &KnowledgeBase, uri: NamedNode) -> KgResult<Workflow> {
    let mut ordered: Vec<(i64, NamedNode)> = Vec::new();
    for step in kb.objects_for(uri.as_ref().into(), kce::HAS_STEP)? {
        let Term::NamedNode(step) = step else {
            continue;
        };
        let order = get_i64(kb, &step, kce::STEP_ORDER)?.unwrap_or(i64::MAX);
        if let Some(node) = get_named(kb, &step, kce::STEP_NODE)? {
            ordered.push((order, node));
        }
    }
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
    Ok(Workflow {
        label: get_string(kb, &uri, rdfs::LABEL)?,
        steps: ordered.into_iter().map(|(_, node)| node).collect(),
        uri,
    })
}

/// Child resources linked by `link`, ordered by their `kce:index`
fn ordered_children(
    kb: &KnowledgeBase,
    parent: &NamedNode,
    link: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Vec<NamedNode>> {
    let mut children: Vec<(i64, NamedNode)> = Vec::new();
    for child in kb.objects_for(parent.as_ref().into(), link)? {
        if let Term::NamedNode(child) = child {
            let index = get_i64(kb, &child, kce::INDEX)?.unwrap_or(i64::MAX);
            children.push((index, child));
        }
    }
    children.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
    Ok(children.into_iter().map(|(_, child)| child).collect())
}

fn get_string(
    kb: &KnowledgeBase,
    subject: &NamedNode,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Option<String>> {
    Ok(kb
        .get_single(subject.as_ref().into(), predicate)?
        .and_then(|term| match term {
            Term::Literal(lit) => Some(lit.value().to_string()),
            _ => None,
        }))
}

fn get_named(
    kb: &KnowledgeBase,
    subject: &NamedNode,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Option<NamedNode>> {
    Ok(kb
        .get_single(subject.as_ref().into(), predicate)?
        .and_then(|term| match term {
            Term::NamedNode(n) => Some(n),
            _ => None,
        }))
}

fn get_i64(
    kb: &KnowledgeBase,
    subject: &NamedNode,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Option<i64>> {
    Ok(get_string(kb, subject, predicate)?.and_then(|s| s.parse().ok()))
}

fn get_bool(
    kb: &KnowledgeBase,
    subject: &NamedNode,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> KgResult<Option<bool>> {
    Ok(get_string(kb, subject, predicate)?.and_then(|s| s.parse().ok()))
}
