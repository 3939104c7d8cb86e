//! The `_rdf_instructions` protocol
//!
//! A script may return a reserved `_rdf_instructions` key: an explicit,
//! authoritative graph-update program with three optional arrays
//! (`create_entities`, `update_entities`, `add_links`). This module parses
//! the program and lowers it to a batch of deletes and inserts; the node
//! executor applies the batch and stamps provenance.

use crate::kg::{KgError, KnowledgeBase, NamespaceManager};
use crate::vocab::rdfs;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, Term, Triple};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Instruction program errors
#[derive(Error, Debug)]
pub enum InstructionError {
    /// Structurally invalid program
    #[error("Malformed _rdf_instructions: {0}")]
    Malformed(String),

    /// A URI string could not be parsed
    #[error("Invalid IRI '{value}' in _rdf_instructions: {detail}")]
    Iri { value: String, detail: String },

    /// Range lookup failure
    #[error(transparent)]
    Kg(#[from] KgError),
}

pub type InstructionResult<T> = Result<T, InstructionError>;

/// A parsed `_rdf_instructions` program
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RdfInstructions {
    #[serde(default)]
    pub create_entities: Vec<CreateEntity>,
    #[serde(default)]
    pub update_entities: Vec<UpdateEntity>,
    #[serde(default)]
    pub add_links: Vec<AddLink>,
}

/// `{uri, type, properties{}}`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntity {
    pub uri: String,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// `{uri, properties_to_set{}}`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntity {
    pub uri: String,
    #[serde(default)]
    pub properties_to_set: serde_json::Map<String, serde_json::Value>,
}

/// `{subject, predicate, object}`
#[derive(Debug, Clone, Deserialize)]
pub struct AddLink {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// The lowered batch: per-pair deletes, then inserts
#[derive(Debug, Clone, Default)]
pub struct GraphUpdates {
    /// `(subject, predicate)` pairs whose existing values go away first
    pub deletes: Vec<(NamedNode, NamedNode)>,
    pub inserts: Vec<Triple>,
}

const KNOWN_KEYS: &[&str] = &["create_entities", "update_entities", "add_links"];

impl RdfInstructions {
    /// Parse the reserved key's value; unknown sub-keys warn and are ignored
    pub fn parse(value: &serde_json::Value) -> InstructionResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(InstructionError::Malformed(
                "_rdf_instructions must be an object".to_string(),
            ));
        };
        for key in object.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warn!("Ignoring unknown _rdf_instructions key '{}'", key);
            }
        }
        serde_json::from_value(serde_json::Value::Object(
            object
                .iter()
                .filter(|(k, _)| KNOWN_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ))
        .map_err(|e| InstructionError::Malformed(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.create_entities.is_empty()
            && self.update_entities.is_empty()
            && self.add_links.is_empty()
    }

    /// Lower to a delete/insert batch against the current graph
    pub fn lower(
        &self,
        kb: &KnowledgeBase,
        ns: &NamespaceManager,
    ) -> InstructionResult<GraphUpdates> {
        let mut updates = GraphUpdates::default();

        for create in &self.create_entities {
            let subject = parse_iri(ns, &create.uri)?;
            if let Some(entity_type) = &create.entity_type {
                let class = parse_iri(ns, entity_type)?;
                updates.inserts.push(Triple::new(
                    subject.clone(),
                    NamedNode::from(rdf::TYPE),
                    class,
                ));
            }
            for (property, value) in &create.properties {
                let predicate = parse_iri(ns, property)?;
                for object in property_values(kb, ns, &predicate, value)? {
                    updates
                        .inserts
                        .push(Triple::new(subject.clone(), predicate.clone(), object));
                }
            }
        }

        for update in &self.update_entities {
            let subject = parse_iri(ns, &update.uri)?;
            for (property, value) in &update.properties_to_set {
                let predicate = parse_iri(ns, property)?;
                // Overwrite semantics: drop every existing value for the
                // subject+predicate pair, then insert the new one(s).
                updates.deletes.push((subject.clone(), predicate.clone()));
                for object in property_values(kb, ns, &predicate, value)? {
                    updates
                        .inserts
                        .push(Triple::new(subject.clone(), predicate.clone(), object));
                }
            }
        }

        for link in &self.add_links {
            let subject = parse_iri(ns, &link.subject)?;
            let predicate = parse_iri(ns, &link.predicate)?;
            let object = parse_iri(ns, &link.object)?;
            updates
                .inserts
                .push(Triple::new(subject, predicate, object));
        }

        Ok(updates)
    }
}

/// One or many objects for a property value (arrays fan out)
fn property_values(
    kb: &KnowledgeBase,
    ns: &NamespaceManager,
    predicate: &NamedNode,
    value: &serde_json::Value,
) -> InstructionResult<Vec<Term>> {
    match value {
        serde_json::Value::Array(items) => {
            let mut terms = Vec::with_capacity(items.len());
            for item in items {
                terms.extend(property_values(kb, ns, predicate, item)?);
            }
            Ok(terms)
        }
        serde_json::Value::Null => {
            warn!("Ignoring null value for {} in _rdf_instructions", predicate);
            Ok(Vec::new())
        }
        serde_json::Value::Bool(b) => Ok(vec![Literal::new_typed_literal(
            b.to_string(),
            xsd::BOOLEAN,
        )
        .into()]),
        serde_json::Value::Number(n) => {
            let datatype = if n.is_i64() || n.is_u64() {
                xsd::INTEGER
            } else {
                xsd::DOUBLE
            };
            Ok(vec![Literal::new_typed_literal(n.to_string(), datatype).into()])
        }
        serde_json::Value::String(s) => {
            // IRI-shaped strings become references; everything else is a
            // literal typed by the property's declared range when one exists.
            if let Some(iri) = ns.resolve_opt(s) {
                let node = NamedNode::new(&iri).map_err(|e| InstructionError::Iri {
                    value: iri.clone(),
                    detail: e.to_string(),
                })?;
                return Ok(vec![node.into()]);
            }
            match declared_range(kb, predicate)? {
                Some(datatype) => {
                    Ok(vec![Literal::new_typed_literal(s.clone(), datatype).into()])
                }
                None => Ok(vec![Literal::new_simple_literal(s.clone()).into()]),
            }
        }
        serde_json::Value::Object(_) => Err(InstructionError::Malformed(format!(
            "nested object value for {} is not supported",
            predicate
        ))),
    }
}

/// The property's `rdfs:range` when it names an XSD datatype
fn declared_range(
    kb: &KnowledgeBase,
    predicate: &NamedNode,
) -> InstructionResult<Option<NamedNode>> {
    let range = kb.get_single(predicate.as_ref().into(), rdfs::RANGE)?;
    Ok(match range {
        Some(Term::NamedNode(range))
            if range.as_str().starts_with("http://www.w3.org/2001/XMLSchema#") =>
        {
            Some(range)
        }
        _ => None,
    })
}

fn parse_iri(ns: &NamespaceManager, raw: &str) -> InstructionResult<NamedNode> {
    let iri = ns.resolve(raw).map_err(|e| InstructionError::Iri {
        value: raw.to_string(),
        detail: e.to_string(),
    })?;
    NamedNode::new(&iri).map_err(|e| InstructionError::Iri {
        value: iri,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kb() -> KnowledgeBase {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap()
    }

    #[test]
    fn test_create_entities_lowering() {
        let kb = kb();
        let ns = NamespaceManager::new();
        let program = RdfInstructions::parse(&json!({
            "create_entities": [{
                "uri": "http://x/panel1",
                "type": "http://x/Panel",
                "properties": {
                    "http://x/width": 400,
                    "http://x/name": "rear door"
                }
            }]
        }))
        .unwrap();

        let updates = program.lower(&kb, &ns).unwrap();
        assert!(updates.deletes.is_empty());
        assert_eq!(updates.inserts.len(), 3);
        assert!(updates.inserts.iter().any(|t| {
            t.predicate.as_str() == "http://x/width"
                && matches!(&t.object, Term::Literal(l) if l.value() == "400" && l.datatype() == xsd::INTEGER)
        }));
    }

    #[test]
    fn test_update_entities_delete_then_insert() {
        let kb = kb();
        let ns = NamespaceManager::new();
        let program = RdfInstructions::parse(&json!({
            "update_entities": [{
                "uri": "http://x/panel1",
                "properties_to_set": { "http://x/width": 500 }
            }]
        }))
        .unwrap();

        let updates = program.lower(&kb, &ns).unwrap();
        assert_eq!(updates.deletes.len(), 1);
        assert_eq!(updates.deletes[0].1.as_str(), "http://x/width");
        assert_eq!(updates.inserts.len(), 1);
    }

    #[test]
    fn test_add_links() {
        let kb = kb();
        let ns = NamespaceManager::new();
        let program = RdfInstructions::parse(&json!({
            "add_links": [{
                "subject": "http://x/car",
                "predicate": "http://x/hasPanel",
                "object": "http://x/panel1"
            }]
        }))
        .unwrap();

        let updates = program.lower(&kb, &ns).unwrap();
        assert_eq!(updates.inserts.len(), 1);
        assert!(matches!(&updates.inserts[0].object, Term::NamedNode(n) if n.as_str() == "http://x/panel1"));
    }

    #[test]
    fn test_string_values_use_declared_range() {
        let kb = kb();
        kb.update(
            "INSERT DATA { <http://x/width> <http://www.w3.org/2000/01/rdf-schema#range> <http://www.w3.org/2001/XMLSchema#integer> }",
        )
        .unwrap();
        let ns = NamespaceManager::new();
        let program = RdfInstructions::parse(&json!({
            "create_entities": [{
                "uri": "http://x/p",
                "properties": { "http://x/width": "400", "http://x/note": "plain" }
            }]
        }))
        .unwrap();

        let updates = program.lower(&kb, &ns).unwrap();
        let width = updates
            .inserts
            .iter()
            .find(|t| t.predicate.as_str() == "http://x/width")
            .unwrap();
        assert!(matches!(&width.object, Term::Literal(l) if l.datatype() == xsd::INTEGER));
        let note = updates
            .inserts
            .iter()
            .find(|t| t.predicate.as_str() == "http://x/note")
            .unwrap();
        assert!(matches!(&note.object, Term::Literal(l) if l.datatype() == xsd::STRING));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let program = RdfInstructions::parse(&json!({
            "add_links": [],
            "launch_missiles": true
        }))
        .unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            RdfInstructions::parse(&json!([1, 2, 3])),
            Err(InstructionError::Malformed(_))
        ));
    }
}
