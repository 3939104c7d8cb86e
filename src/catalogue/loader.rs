//! Definition-document loading
//!
//! Parses YAML/JSON definition documents into normalized catalogue triples.
//! Script paths are resolved to absolute paths relative to the defining
//! document (then the configured script roots) and must exist; SPARQL
//! strings are syntactically validated before anything is stored. A load is
//! all-or-nothing: the first error aborts it with nothing written.

use crate::catalogue::state::sanitize_stem;
use crate::kg::{KgError, KnowledgeBase, NamespaceManager};
use crate::vocab::{self, kce, rdfs};
use indexmap::IndexMap;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Triple};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Catalogue loading errors; any of these aborts the load
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// Could not read a document
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Document is not valid YAML/JSON or misses required structure
    #[error("Malformed document {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    /// The `kind` discriminator is missing or unrecognized
    #[error("Unknown definition kind '{kind}' in {path}")]
    UnknownKind { kind: String, path: PathBuf },

    /// Two items in one load share a URI
    #[error("Duplicate catalogue URI within load: {0}")]
    DuplicateUri(String),

    /// A referenced script does not exist on disk
    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    /// A SPARQL string does not parse (or has the wrong form)
    #[error("Invalid SPARQL in {item}: {detail}")]
    Sparql { item: String, detail: String },

    /// A URI or CURIE could not be resolved
    #[error("Invalid IRI '{value}': {detail}")]
    Iri { value: String, detail: String },

    /// Knowledge layer failure while storing the catalogue
    #[error(transparent)]
    Kg(#[from] KgError),
}

pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Summary of one bulk load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: usize,
    pub nodes: usize,
    pub rules: usize,
    pub capabilities: usize,
    pub workflows: usize,
    /// Catalogue triples written
    pub triples: usize,
    /// Triples materialized by the post-load reasoning pass
    pub inferred: usize,
}

/// Loads definition documents into the knowledge base
pub struct CatalogueLoader<'a> {
    kb: &'a KnowledgeBase,
    script_roots: Vec<PathBuf>,
}

impl<'a> CatalogueLoader<'a> {
    pub fn new(kb: &'a KnowledgeBase, script_roots: Vec<PathBuf>) -> Self {
        Self { kb, script_roots }
    }

    /// Load every `*.yaml`/`*.yml`/`*.json` document under `dir`
    pub fn load_dir(&self, dir: &Path) -> DefinitionResult<LoadReport> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir).map_err(|source| DefinitionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DefinitionError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if matches!(ext.as_str(), "yaml" | "yml" | "json") {
                paths.push(path);
            }
        }
        paths.sort();
        self.load_paths(&paths)
    }

    /// Load a single definition document
    pub fn load_file(&self, path: &Path) -> DefinitionResult<LoadReport> {
        self.load_paths(std::slice::from_ref(&path.to_path_buf()))
    }

    fn load_paths(&self, paths: &[PathBuf]) -> DefinitionResult<LoadReport> {
        let mut report = LoadReport::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut triples: Vec<Triple> = Vec::new();

        for path in paths {
            let text = fs::read_to_string(path).map_err(|source| DefinitionError::Io {
                path: path.clone(),
                source,
            })?;
            self.convert_document(&text, path, &mut seen, &mut triples, &mut report)?;
            report.documents += 1;
        }

        report.triples = self.kb.add_triples(triples)?;
        report.inferred = self.kb.reason()?;
        info!(
            "Loaded {} document(s): {} nodes, {} rules, {} capabilities, {} workflows ({} triples, {} inferred)",
            report.documents,
            report.nodes,
            report.rules,
            report.capabilities,
            report.workflows,
            report.triples,
            report.inferred
        );
        Ok(report)
    }

    fn convert_document(
        &self,
        text: &str,
        path: &Path,
        seen: &mut FxHashSet<String>,
        triples: &mut Vec<Triple>,
        report: &mut LoadReport,
    ) -> DefinitionResult<()> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| DefinitionError::Malformed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        warn_unknown_keys(&doc, &["prefixes", "definitions"], "document", path);

        let prefixes: HashMap<String, String> = match doc.get("prefixes") {
            Some(value) => {
                serde_yaml::from_value(value.clone()).map_err(|e| DefinitionError::Malformed {
                    path: path.to_path_buf(),
                    detail: format!("bad prefixes map: {}", e),
                })?
            }
            None => HashMap::new(),
        };
        let ns = NamespaceManager::with_document_prefixes(&prefixes);

        let items = doc
            .get("definitions")
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| DefinitionError::Malformed {
                path: path.to_path_buf(),
                detail: "missing 'definitions' list".to_string(),
            })?;

        let doc_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let doc_stem = sanitize_stem(path);

        for (index, item) in items.iter().enumerate() {
            let kind = item
                .get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DefinitionError::UnknownKind {
                    kind: "<missing>".to_string(),
                    path: path.to_path_buf(),
                })?
                .to_string();

            let uri = self.item_uri(item, &ns, &doc_stem, index)?;
            if !seen.insert(uri.as_str().to_string()) {
                return Err(DefinitionError::DuplicateUri(uri.as_str().to_string()));
            }

            match kind.as_str() {
                "AtomicNode" => {
                    warn_unknown_keys(item, NODE_FIELDS, "AtomicNode", path);
                    let node: NodeDoc = typed(item, path)?;
                    self.convert_node(&uri, &node, &ns, doc_dir, triples)?;
                    report.nodes += 1;
                }
                "Rule" => {
                    warn_unknown_keys(item, RULE_FIELDS, "Rule", path);
                    let rule: RuleDoc = typed(item, path)?;
                    convert_rule(&uri, &rule, triples)?;
                    report.rules += 1;
                }
                "CapabilityTemplate" => {
                    warn_unknown_keys(item, CAPABILITY_FIELDS, "CapabilityTemplate", path);
                    let capability: CapabilityDoc = typed(item, path)?;
                    convert_capability(&uri, &capability, &ns, triples)?;
                    report.capabilities += 1;
                }
                "Workflow" => {
                    warn_unknown_keys(item, WORKFLOW_FIELDS, "Workflow", path);
                    let workflow: WorkflowDoc = typed(item, path)?;
                    convert_workflow(&uri, &workflow, &ns, triples)?;
                    report.workflows += 1;
                }
                other => {
                    return Err(DefinitionError::UnknownKind {
                        kind: other.to_string(),
                        path: path.to_path_buf(),
                    });
                }
            }
        }
        Ok(())
    }

    fn item_uri(
        &self,
        item: &serde_yaml::Value,
        ns: &NamespaceManager,
        doc_stem: &str,
        index: usize,
    ) -> DefinitionResult<NamedNode> {
        match item.get("uri").and_then(|v| v.as_str()) {
            Some(raw) => resolve_named(ns, raw),
            None => Ok(vocab::def_uri(doc_stem, index)),
        }
    }

    fn convert_node(
        &self,
        uri: &NamedNode,
        doc: &NodeDoc,
        ns: &NamespaceManager,
        doc_dir: &Path,
        out: &mut Vec<Triple>,
    ) -> DefinitionResult<()> {
        out.push(type_triple(uri, kce::ATOMIC_NODE));
        if let Some(label) = &doc.label {
            out.push(string_triple(uri, rdfs::LABEL, label));
        }

        for (index, param) in doc.inputs.iter().enumerate() {
            let param_uri = child_uri(uri, "input", index);
            out.push(type_triple(&param_uri, kce::INPUT_PARAMETER));
            out.push(link_triple(uri, kce::HAS_INPUT, &param_uri));
            convert_parameter(&param_uri, param, ns, index, true, out)?;
        }
        for (index, param) in doc.outputs.iter().enumerate() {
            let param_uri = child_uri(uri, "output", index);
            out.push(type_triple(&param_uri, kce::OUTPUT_PARAMETER));
            out.push(link_triple(uri, kce::HAS_OUTPUT, &param_uri));
            convert_parameter(&param_uri, param, ns, index, false, out)?;
        }

        for (index, ask) in doc.preconditions.iter().enumerate() {
            validate_precondition(uri.as_str(), ask)?;
            let pre_uri = child_uri(uri, "precondition", index);
            out.push(type_triple(&pre_uri, kce::PRECONDITION));
            out.push(link_triple(uri, kce::HAS_PRECONDITION, &pre_uri));
            out.push(string_triple(&pre_uri, kce::ASK_QUERY, ask));
            out.push(index_triple(&pre_uri, index));
        }

        for (index, effect) in doc.effects.iter().enumerate() {
            let effect_uri = child_uri(uri, "effect", index);
            out.push(type_triple(&effect_uri, kce::EFFECT));
            out.push(link_triple(uri, kce::HAS_EFFECT, &effect_uri));
            out.push(index_triple(&effect_uri, index));

            let kind = match effect.kind.as_str() {
                "AssertProperty" => kce::ASSERT_PROPERTY,
                "CreateEntity" => kce::CREATE_ENTITY,
                "AddLink" => kce::ADD_LINK,
                other => {
                    return Err(DefinitionError::Malformed {
                        path: doc_dir.to_path_buf(),
                        detail: format!("unknown effect kind '{}' on {}", other, uri),
                    });
                }
            };
            out.push(Triple::new(
                effect_uri.clone(),
                NamedNode::from(kce::EFFECT_KIND),
                NamedNode::from(kind),
            ));
            if let Some(on_entity) = &effect.on_entity {
                out.push(string_triple(&effect_uri, kce::ON_ENTITY, on_entity));
            }
            match &effect.property {
                Some(property) => {
                    let property = resolve_named(ns, property)?;
                    out.push(link_triple(&effect_uri, kce::PROPERTY, &property));
                }
                None => {
                    warn!(
                        "Effect {} of {} declares no property; the planner cannot regress over it",
                        index, uri
                    );
                }
            }
            if let Some(output) = &effect.value_from_output {
                out.push(string_triple(&effect_uri, kce::VALUE_FROM_OUTPUT, output));
            }
        }

        let script = self.resolve_script(&doc.invocation.script_path, doc_dir)?;
        if doc.invocation.kind != "SubprocessScript" {
            return Err(DefinitionError::Malformed {
                path: doc_dir.to_path_buf(),
                detail: format!(
                    "unknown invocation kind '{}' on {}",
                    doc.invocation.kind, uri
                ),
            });
        }
        let style = match doc.invocation.argument_passing_style.as_deref() {
            None | Some("NamedCLI") => kce::NAMED_CLI,
            Some("PositionalCLI") => kce::POSITIONAL_CLI,
            Some(other) => {
                return Err(DefinitionError::Malformed {
                    path: doc_dir.to_path_buf(),
                    detail: format!("unknown argument style '{}' on {}", other, uri),
                });
            }
        };
        match doc.invocation.output_parsing_style.as_deref() {
            None | Some("JSONStdout") => {}
            Some(other) => {
                return Err(DefinitionError::Malformed {
                    path: doc_dir.to_path_buf(),
                    detail: format!("unknown output parsing style '{}' on {}", other, uri),
                });
            }
        }

        let inv_uri = NamedNode::new_unchecked(format!("{}/invocation", uri.as_str()));
        out.push(type_triple(&inv_uri, kce::INVOCATION));
        out.push(link_triple(uri, kce::HAS_INVOCATION, &inv_uri));
        out.push(Triple::new(
            inv_uri.clone(),
            NamedNode::from(kce::INVOCATION_KIND),
            NamedNode::from(kce::SUBPROCESS_SCRIPT),
        ));
        out.push(string_triple(
            &inv_uri,
            kce::SCRIPT_PATH,
            &script.to_string_lossy(),
        ));
        out.push(Triple::new(
            inv_uri.clone(),
            NamedNode::from(kce::ARGUMENT_STYLE),
            NamedNode::from(style),
        ));
        out.push(Triple::new(
            inv_uri,
            NamedNode::from(kce::OUTPUT_PARSING),
            NamedNode::from(kce::JSON_STDOUT),
        ));

        if let Some(timeout) = doc.timeout_seconds {
            out.push(integer_triple(uri, kce::TIMEOUT_SECONDS, timeout as i64));
        }
        out.push(bool_triple(
            uri,
            kce::HAS_EXTERNAL_SIDE_EFFECT,
            doc.has_external_side_effect,
        ));

        for (index, mapping) in doc.implements_capability.iter().enumerate() {
            let capability = resolve_named(ns, &mapping.capability)?;
            let mapping_uri = child_uri(uri, "capability", index);
            out.push(link_triple(uri, kce::IMPLEMENTS_CAPABILITY, &mapping_uri));
            out.push(index_triple(&mapping_uri, index));
            out.push(link_triple(&mapping_uri, kce::FOR_CAPABILITY, &capability));
            for (entry_index, (from, to)) in mapping.mappings.iter().enumerate() {
                let entry_uri = child_uri(&mapping_uri, "map", entry_index);
                out.push(link_triple(&mapping_uri, kce::HAS_MAPPING, &entry_uri));
                out.push(index_triple(&entry_uri, entry_index));
                out.push(string_triple(&entry_uri, kce::FROM_NAME, from));
                out.push(string_triple(&entry_uri, kce::TO_NAME, to));
            }
        }

        debug!("Converted node {}", uri);
        Ok(())
    }

    /// Resolve a script path against the document directory, then the
    /// configured script roots; the script must exist.
    fn resolve_script(&self, raw: &str, doc_dir: &Path) -> DefinitionResult<PathBuf> {
        let raw_path = Path::new(raw);
        let mut candidates = Vec::new();
        if raw_path.is_absolute() {
            candidates.push(raw_path.to_path_buf());
        } else {
            candidates.push(doc_dir.join(raw_path));
            for root in &self.script_roots {
                candidates.push(root.join(raw_path));
            }
        }
        for candidate in candidates {
            if candidate.is_file() {
                return fs::canonicalize(&candidate).map_err(|source| DefinitionError::Io {
                    path: candidate,
                    source,
                });
            }
        }
        Err(DefinitionError::ScriptNotFound(doc_dir.join(raw_path)))
    }
}

// ---- document schemas -------------------------------------------------------

const NODE_FIELDS: &[&str] = &[
    "kind",
    "uri",
    "label",
    "inputs",
    "outputs",
    "preconditions",
    "effects",
    "invocation",
    "timeoutSeconds",
    "hasExternalSideEffect",
    "implementsCapability",
];
const RULE_FIELDS: &[&str] = &[
    "kind",
    "uri",
    "label",
    "antecedent",
    "consequent",
    "priority",
    "critical",
];
const CAPABILITY_FIELDS: &[&str] = &["kind", "uri", "label", "inputs", "outputs"];
const WORKFLOW_FIELDS: &[&str] = &["kind", "uri", "label", "steps"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDoc {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    inputs: Vec<ParamDoc>,
    #[serde(default)]
    outputs: Vec<ParamDoc>,
    #[serde(default)]
    preconditions: Vec<String>,
    #[serde(default)]
    effects: Vec<EffectDoc>,
    invocation: InvocationDoc,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    has_external_side_effect: bool,
    #[serde(default)]
    implements_capability: Vec<CapabilityMappingDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParamDoc {
    name: String,
    maps_to_rdf_property: String,
    data_type: String,
    #[serde(default)]
    is_required: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectDoc {
    kind: String,
    #[serde(default)]
    on_entity: Option<String>,
    #[serde(default)]
    property: Option<String>,
    #[serde(default)]
    value_from_output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationDoc {
    kind: String,
    script_path: String,
    #[serde(default)]
    argument_passing_style: Option<String>,
    #[serde(default)]
    output_parsing_style: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDoc {
    #[serde(default)]
    label: Option<String>,
    antecedent: String,
    consequent: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    critical: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityDoc {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    inputs: Vec<CapabilityParamDoc>,
    #[serde(default)]
    outputs: Vec<CapabilityParamDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityParamDoc {
    name: String,
    data_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowDoc {
    #[serde(default)]
    label: Option<String>,
    steps: Vec<StepDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDoc {
    node: String,
    order: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityMappingDoc {
    capability: String,
    /// Name-to-name pairs, kept in document order
    #[serde(default)]
    mappings: IndexMap<String, String>,
}

// ---- conversion helpers -----------------------------------------------------

fn typed<T: serde::de::DeserializeOwned>(
    item: &serde_yaml::Value,
    path: &Path,
) -> DefinitionResult<T> {
    serde_yaml::from_value(item.clone()).map_err(|e| DefinitionError::Malformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn warn_unknown_keys(value: &serde_yaml::Value, known: &[&str], kind: &str, path: &Path) {
    let Some(mapping) = value.as_mapping() else {
        return;
    };
    for key in mapping.keys() {
        if let Some(key) = key.as_str() {
            if !known.contains(&key) {
                warn!("Ignoring unknown field '{}' on {} in {}", key, kind, path.display());
            }
        }
    }
}

fn convert_parameter(
    param_uri: &NamedNode,
    doc: &ParamDoc,
    ns: &NamespaceManager,
    index: usize,
    is_input: bool,
    out: &mut Vec<Triple>,
) -> DefinitionResult<()> {
    out.push(string_triple(param_uri, kce::PARAM_NAME, &doc.name));
    out.push(index_triple(param_uri, index));

    let property = resolve_named(ns, &doc.maps_to_rdf_property)?;
    out.push(link_triple(param_uri, kce::MAPS_TO_PROPERTY, &property));

    let data_type = resolve_named(ns, &doc.data_type)?;
    out.push(link_triple(param_uri, kce::DATA_TYPE, &data_type));

    // Inputs are required unless stated otherwise; outputs default optional.
    let required = doc.is_required.unwrap_or(is_input);
    out.push(bool_triple(param_uri, kce::IS_REQUIRED, required));
    Ok(())
}

fn convert_rule(uri: &NamedNode, doc: &RuleDoc, out: &mut Vec<Triple>) -> DefinitionResult<()> {
    validate_antecedent(uri.as_str(), &doc.antecedent)?;
    validate_consequent(uri.as_str(), &doc.consequent)?;

    out.push(type_triple(uri, kce::RULE));
    if let Some(label) = &doc.label {
        out.push(string_triple(uri, rdfs::LABEL, label));
    }
    out.push(string_triple(uri, kce::ANTECEDENT, &doc.antecedent));
    out.push(string_triple(uri, kce::CONSEQUENT, &doc.consequent));
    out.push(integer_triple(uri, kce::PRIORITY, doc.priority));
    out.push(bool_triple(uri, kce::CRITICAL, doc.critical));
    Ok(())
}

fn convert_capability(
    uri: &NamedNode,
    doc: &CapabilityDoc,
    ns: &NamespaceManager,
    out: &mut Vec<Triple>,
) -> DefinitionResult<()> {
    out.push(type_triple(uri, kce::CAPABILITY_TEMPLATE));
    if let Some(label) = &doc.label {
        out.push(string_triple(uri, rdfs::LABEL, label));
    }
    for (index, param) in doc.inputs.iter().enumerate() {
        let param_uri = child_uri(uri, "input", index);
        out.push(link_triple(uri, kce::HAS_INPUT, &param_uri));
        out.push(string_triple(&param_uri, kce::PARAM_NAME, &param.name));
        out.push(index_triple(&param_uri, index));
        let data_type = resolve_named(ns, &param.data_type)?;
        out.push(link_triple(&param_uri, kce::DATA_TYPE, &data_type));
    }
    for (index, param) in doc.outputs.iter().enumerate() {
        let param_uri = child_uri(uri, "output", index);
        out.push(link_triple(uri, kce::HAS_OUTPUT, &param_uri));
        out.push(string_triple(&param_uri, kce::PARAM_NAME, &param.name));
        out.push(index_triple(&param_uri, index));
        let data_type = resolve_named(ns, &param.data_type)?;
        out.push(link_triple(&param_uri, kce::DATA_TYPE, &data_type));
    }
    Ok(())
}

fn convert_workflow(
    uri: &NamedNode,
    doc: &WorkflowDoc,
    ns: &NamespaceManager,
    out: &mut Vec<Triple>,
) -> DefinitionResult<()> {
    out.push(type_triple(uri, kce::WORKFLOW));
    if let Some(label) = &doc.label {
        out.push(string_triple(uri, rdfs::LABEL, label));
    }
    for (index, step) in doc.steps.iter().enumerate() {
        let node = resolve_named(ns, &step.node)?;
        let step_uri = child_uri(uri, "step", index);
        out.push(type_triple(&step_uri, kce::WORKFLOW_STEP));
        out.push(link_triple(uri, kce::HAS_STEP, &step_uri));
        out.push(link_triple(&step_uri, kce::STEP_NODE, &node));
        out.push(integer_triple(&step_uri, kce::STEP_ORDER, step.order));
    }
    Ok(())
}

// ---- SPARQL validation ------------------------------------------------------

/// A precondition must be an ASK query over the free variable `?ctx`.
fn validate_precondition(item: &str, ask: &str) -> DefinitionResult<()> {
    match spargebra::Query::parse(ask, None) {
        Ok(spargebra::Query::Ask { .. }) => {}
        Ok(_) => {
            return Err(DefinitionError::Sparql {
                item: item.to_string(),
                detail: "precondition must be an ASK query".to_string(),
            });
        }
        Err(e) => {
            return Err(DefinitionError::Sparql {
                item: item.to_string(),
                detail: e.to_string(),
            });
        }
    }
    if !ask.contains("?ctx") {
        return Err(DefinitionError::Sparql {
            item: item.to_string(),
            detail: "precondition must reference the operating context variable ?ctx".to_string(),
        });
    }
    Ok(())
}

/// Antecedents are group-graph-pattern bodies; wrap and parse.
fn validate_antecedent(item: &str, antecedent: &str) -> DefinitionResult<()> {
    let wrapped = format!("SELECT * WHERE {{ {} }}", antecedent);
    spargebra::Query::parse(&wrapped, None)
        .map(|_| ())
        .map_err(|e| DefinitionError::Sparql {
            item: item.to_string(),
            detail: e.to_string(),
        })
}

/// Consequents are UPDATE templates; substitute each `?var` with a
/// placeholder IRI so the template parses before any bindings exist.
fn validate_consequent(item: &str, consequent: &str) -> DefinitionResult<()> {
    let vars = Regex::new(r"\?[A-Za-z_][A-Za-z0-9_]*").expect("static regex");
    let grounded = vars.replace_all(consequent, "<urn:kce:placeholder>");
    spargebra::Update::parse(&grounded, None)
        .map(|_| ())
        .map_err(|e| DefinitionError::Sparql {
            item: item.to_string(),
            detail: e.to_string(),
        })
}

// ---- triple builders --------------------------------------------------------

fn resolve_named(ns: &NamespaceManager, raw: &str) -> DefinitionResult<NamedNode> {
    let iri = ns.resolve(raw).map_err(|e| DefinitionError::Iri {
        value: raw.to_string(),
        detail: e.to_string(),
    })?;
    NamedNode::new(&iri).map_err(|e| DefinitionError::Iri {
        value: iri,
        detail: e.to_string(),
    })
}

fn child_uri(parent: &NamedNode, segment: &str, index: usize) -> NamedNode {
    NamedNode::new_unchecked(format!("{}/{}/{}", parent.as_str(), segment, index))
}

fn type_triple(subject: &NamedNode, class: NamedNodeRef<'_>) -> Triple {
    Triple::new(subject.clone(), NamedNode::from(rdf::TYPE), NamedNode::from(class))
}

fn link_triple(subject: &NamedNode, predicate: NamedNodeRef<'_>, object: &NamedNode) -> Triple {
    Triple::new(subject.clone(), NamedNode::from(predicate), object.clone())
}

fn string_triple(subject: &NamedNode, predicate: NamedNodeRef<'_>, value: &str) -> Triple {
    Triple::new(
        subject.clone(),
        NamedNode::from(predicate),
        Literal::new_simple_literal(value),
    )
}

fn integer_triple(subject: &NamedNode, predicate: NamedNodeRef<'_>, value: i64) -> Triple {
    Triple::new(
        subject.clone(),
        NamedNode::from(predicate),
        Literal::new_typed_literal(value.to_string(), xsd::INTEGER),
    )
}

fn bool_triple(subject: &NamedNode, predicate: NamedNodeRef<'_>, value: bool) -> Triple {
    Triple::new(
        subject.clone(),
        NamedNode::from(predicate),
        Literal::new_typed_literal(value.to_string(), xsd::BOOLEAN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{ArgumentStyle, Catalogue, Invocation};
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho '{}'\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn kb() -> KnowledgeBase {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap()
    }

    const NODE_DOC: &str = r#"
prefixes:
  p: "http://example.org/props#"
  ex: "http://example.org/defs#"
definitions:
  - kind: AtomicNode
    uri: "ex:AddOne"
    label: "Add one"
    inputs:
      - name: x
        mapsToRdfProperty: "p:in"
        dataType: "xsd:integer"
    outputs:
      - name: y
        mapsToRdfProperty: "p:out"
        dataType: "xsd:integer"
    preconditions:
      - "ASK { ?ctx <http://example.org/props#in> ?v }"
    effects:
      - kind: AssertProperty
        onEntity: ctx
        property: "p:out"
        valueFromOutput: y
    invocation:
      kind: SubprocessScript
      scriptPath: add_one.sh
      argumentPassingStyle: NamedCLI
"#;

    #[test]
    fn test_load_node_document() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "add_one.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(&doc, NODE_DOC).unwrap();

        let kb = kb();
        let report = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap();
        assert_eq!(report.nodes, 1);
        assert!(report.triples > 10);

        let catalogue = Catalogue::from_graph(&kb).unwrap();
        assert_eq!(catalogue.nodes.len(), 1);
        let node = &catalogue.nodes[0];
        assert_eq!(node.uri.as_str(), "http://example.org/defs#AddOne");
        assert_eq!(node.inputs.len(), 1);
        assert!(node.inputs[0].required);
        assert_eq!(node.inputs[0].maps_to.as_str(), "http://example.org/props#in");
        assert_eq!(node.outputs.len(), 1);
        assert!(!node.outputs[0].required);
        assert_eq!(node.preconditions.len(), 1);
        assert_eq!(node.effects.len(), 1);
        assert!(!node.external_side_effect);
        let Invocation::SubprocessScript {
            script_path,
            argument_style,
            ..
        } = &node.invocation;
        assert!(script_path.is_absolute());
        assert_eq!(*argument_style, ArgumentStyle::NamedCli);
    }

    #[test]
    fn test_missing_script_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("defs.yaml");
        fs::write(&doc, NODE_DOC).unwrap();

        let kb = kb();
        let err = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::ScriptNotFound(_)));
        // Nothing was written.
        assert_eq!(kb.len().unwrap(), 0);
    }

    #[test]
    fn test_script_found_via_search_root() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        write_script(&scripts, "add_one.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(&doc, NODE_DOC).unwrap();

        let kb = kb();
        let report = CatalogueLoader::new(&kb, vec![scripts])
            .load_file(&doc)
            .unwrap();
        assert_eq!(report.nodes, 1);
    }

    #[test]
    fn test_unknown_kind_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("defs.yaml");
        fs::write(&doc, "definitions:\n  - kind: Gizmo\n    uri: \"http://x/g\"\n").unwrap();

        let kb = kb();
        let err = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownKind { .. }));
    }

    #[test]
    fn test_duplicate_uri_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("defs.yaml");
        fs::write(
            &doc,
            r#"
definitions:
  - kind: Rule
    uri: "http://x/r"
    antecedent: "?c <http://x/p> ?v"
    consequent: "INSERT DATA { <http://x/c> <http://x/q> 1 }"
  - kind: Rule
    uri: "http://x/r"
    antecedent: "?c <http://x/p> ?v"
    consequent: "INSERT DATA { <http://x/c> <http://x/q> 2 }"
"#,
        )
        .unwrap();

        let kb = kb();
        let err = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateUri(_)));
    }

    #[test]
    fn test_bad_sparql_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("defs.yaml");
        fs::write(
            &doc,
            r#"
definitions:
  - kind: Rule
    uri: "http://x/r"
    antecedent: "this is not sparql {{{"
    consequent: "INSERT DATA { <http://x/c> <http://x/q> 1 }"
"#,
        )
        .unwrap();

        let kb = kb();
        let err = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Sparql { .. }));
    }

    #[test]
    fn test_precondition_without_ctx_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "add_one.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(
            &doc,
            r#"
definitions:
  - kind: AtomicNode
    uri: "http://x/n"
    preconditions:
      - "ASK { ?s ?p ?o }"
    invocation:
      kind: SubprocessScript
      scriptPath: add_one.sh
"#,
        )
        .unwrap();

        let kb = kb();
        let err = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Sparql { .. }));
    }

    #[test]
    fn test_rule_and_workflow_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "go.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(
            &doc,
            r#"
prefixes:
  ex: "http://example.org/defs#"
definitions:
  - kind: AtomicNode
    uri: "ex:Go"
    invocation:
      kind: SubprocessScript
      scriptPath: go.sh
  - kind: Rule
    uri: "ex:Flag"
    antecedent: "?c <http://x/out> ?v . FILTER(?v > 1)"
    consequent: "INSERT DATA { ?c <http://x/flag> true }"
    priority: 7
    critical: true
  - kind: Workflow
    uri: "ex:Main"
    steps:
      - node: "ex:Go"
        order: 1
"#,
        )
        .unwrap();

        let kb = kb();
        CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap();

        let catalogue = Catalogue::from_graph(&kb).unwrap();
        assert_eq!(catalogue.rules.len(), 1);
        assert_eq!(catalogue.rules[0].priority, 7);
        assert!(catalogue.rules[0].critical);
        assert_eq!(catalogue.workflows.len(), 1);
        assert_eq!(catalogue.workflows[0].steps.len(), 1);
        assert_eq!(
            catalogue.workflows[0].steps[0].as_str(),
            "http://example.org/defs#Go"
        );
    }

    #[test]
    fn test_double_load_on_clean_stores_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "add_one.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(&doc, NODE_DOC).unwrap();

        let kb1 = kb();
        let first = CatalogueLoader::new(&kb1, Vec::new())
            .load_file(&doc)
            .unwrap();
        let kb2 = kb();
        let second = CatalogueLoader::new(&kb2, Vec::new())
            .load_file(&doc)
            .unwrap();

        assert_eq!(first.triples, second.triples);
        assert_eq!(kb1.len().unwrap(), kb2.len().unwrap());
    }

    #[test]
    fn test_json_document_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "go.sh");
        let doc = dir.path().join("defs.json");
        fs::write(
            &doc,
            r#"{
  "definitions": [
    {
      "kind": "AtomicNode",
      "uri": "http://example.org/defs#Go",
      "invocation": { "kind": "SubprocessScript", "scriptPath": "go.sh" }
    }
  ]
}"#,
        )
        .unwrap();

        let kb = kb();
        let report = CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap();
        assert_eq!(report.nodes, 1);
    }

    #[test]
    fn test_generated_uris_follow_document_order() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "go.sh");
        let doc = dir.path().join("defs.yaml");
        fs::write(
            &doc,
            r#"
definitions:
  - kind: AtomicNode
    invocation:
      kind: SubprocessScript
      scriptPath: go.sh
  - kind: Rule
    antecedent: "?c <http://x/p> ?v"
    consequent: "INSERT DATA { <http://x/c> <http://x/q> 1 }"
"#,
        )
        .unwrap();

        let kb = kb();
        CatalogueLoader::new(&kb, Vec::new())
            .load_file(&doc)
            .unwrap();

        let catalogue = Catalogue::from_graph(&kb).unwrap();
        assert_eq!(catalogue.nodes.len(), 1);
        assert!(catalogue.nodes[0].uri.as_str().ends_with("defs/0"));
        assert!(catalogue.rules[0].uri.as_str().ends_with("defs/1"));
    }
}
