//! Initial-state documents
//!
//! A JSON-LD-like structured document enumerating the entities of a problem
//! instance. Parsing produces a graph ready to merge into the knowledge base
//! under a fresh workflow context, plus the URI of the context entity node
//! inputs are resolved against.

use crate::kg::NamespaceManager;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, Triple};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Initial-state parsing errors
#[derive(Error, Debug)]
pub enum StateError {
    /// Document is not valid YAML/JSON or misses required structure
    #[error("Malformed initial-state document: {0}")]
    Malformed(String),

    /// A URI, CURIE, or datatype could not be resolved
    #[error("Invalid IRI '{value}': {detail}")]
    Iri { value: String, detail: String },
}

pub type StateResult<T> = Result<T, StateError>;

/// A parsed initial state: the triples to merge and the context entity
#[derive(Debug, Clone)]
pub struct InitialState {
    pub triples: Vec<Triple>,
    /// The problem-instance resource node inputs are read relative to
    pub context: NamedNode,
}

impl InitialState {
    /// Parse a document. Relative entity names resolve against `base_uri`;
    /// the `context` field (or the first entity) names the operating context.
    pub fn parse(text: &str, base_uri: &str) -> StateResult<Self> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| StateError::Malformed(e.to_string()))?;

        let prefixes: HashMap<String, String> = match doc.get("prefixes") {
            Some(value) => serde_yaml::from_value(value.clone())
                .map_err(|e| StateError::Malformed(format!("bad prefixes map: {}", e)))?,
            None => HashMap::new(),
        };
        let ns = NamespaceManager::with_document_prefixes(&prefixes);

        let entities = doc
            .get("entities")
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| StateError::Malformed("missing 'entities' list".to_string()))?;
        if entities.is_empty() {
            return Err(StateError::Malformed("'entities' list is empty".to_string()));
        }

        let mut triples = Vec::new();
        let mut first_entity: Option<NamedNode> = None;

        for entity in entities {
            let uri_raw = entity
                .get("uri")
                .and_then(|v| v.as_str())
                .ok_or_else(|| StateError::Malformed("entity without 'uri'".to_string()))?;
            let subject = resolve_entity(&ns, base_uri, uri_raw)?;
            if first_entity.is_none() {
                first_entity = Some(subject.clone());
            }

            for type_raw in entity_types(entity) {
                let class = resolve_entity(&ns, base_uri, &type_raw)?;
                triples.push(Triple::new(
                    subject.clone(),
                    NamedNode::from(rdf::TYPE),
                    class,
                ));
            }

            if let Some(properties) = entity.get("properties").and_then(|v| v.as_mapping()) {
                for (key, value) in properties {
                    let property_raw = key.as_str().ok_or_else(|| {
                        StateError::Malformed("non-string property key".to_string())
                    })?;
                    let predicate = resolve_entity(&ns, base_uri, property_raw)?;
                    for single in flatten(value) {
                        let object = parse_value(&ns, base_uri, single)?;
                        triples.push(Triple::new(
                            subject.clone(),
                            predicate.clone(),
                            object,
                        ));
                    }
                }
            }
        }

        let context = match doc.get("context").and_then(|v| v.as_str()) {
            Some(raw) => resolve_entity(&ns, base_uri, raw)?,
            None => first_entity.ok_or_else(|| {
                StateError::Malformed("no entities to take the context from".to_string())
            })?,
        };

        Ok(Self { triples, context })
    }
}

/// `type` may be absent, a string, or a list of strings
fn entity_types(entity: &serde_yaml::Value) -> Vec<String> {
    match entity.get("type") {
        Some(serde_yaml::Value::String(s)) => vec![s.clone()],
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// A property value may be a single value object or a list of them
fn flatten(value: &serde_yaml::Value) -> Vec<&serde_yaml::Value> {
    match value {
        serde_yaml::Value::Sequence(seq) => seq.iter().collect(),
        other => vec![other],
    }
}

/// Value objects carry `{value, type}` (literal) or `{ref}` (reference);
/// bare scalars are literals with an inferred XSD type.
fn parse_value(
    ns: &NamespaceManager,
    base_uri: &str,
    value: &serde_yaml::Value,
) -> StateResult<oxigraph::model::Term> {
    match value {
        serde_yaml::Value::Mapping(_) => {
            if let Some(reference) = value.get("ref").and_then(|v| v.as_str()) {
                return Ok(resolve_entity(ns, base_uri, reference)?.into());
            }
            let lexical = value
                .get("value")
                .map(scalar_lexical)
                .ok_or_else(|| StateError::Malformed("value object without 'value' or 'ref'".to_string()))?;
            let datatype = match value.get("type").and_then(|v| v.as_str()) {
                Some(raw) => resolve_entity(ns, base_uri, raw)?,
                None => NamedNode::from(xsd::STRING),
            };
            Ok(Literal::new_typed_literal(lexical, datatype).into())
        }
        serde_yaml::Value::Bool(b) => {
            Ok(Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN).into())
        }
        serde_yaml::Value::Number(n) => {
            let datatype = if n.is_i64() || n.is_u64() {
                xsd::INTEGER
            } else {
                xsd::DOUBLE
            };
            Ok(Literal::new_typed_literal(n.to_string(), datatype).into())
        }
        serde_yaml::Value::String(s) => Ok(Literal::new_simple_literal(s.clone()).into()),
        other => Err(StateError::Malformed(format!(
            "unsupported property value: {:?}",
            other
        ))),
    }
}

fn scalar_lexical(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

/// Absolute IRI or CURIE, else relative to the document base
fn resolve_entity(ns: &NamespaceManager, base_uri: &str, raw: &str) -> StateResult<NamedNode> {
    let iri = match ns.resolve(raw) {
        Ok(iri) => iri,
        Err(_) => format!("{}{}", base_uri, raw),
    };
    NamedNode::new(&iri).map_err(|e| StateError::Iri {
        value: iri,
        detail: e.to_string(),
    })
}

/// Filesystem stem of a document path, made IRI-safe for generated URIs
pub(crate) fn sanitize_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "doc".to_string());
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
