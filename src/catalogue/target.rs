//! Target descriptions
//!
//! A goal is either a SPARQL ASK query or a graph pattern evaluated as an
//! ASK with its variables existentially quantified. Both forms normalize to
//! one ASK string the planner evaluates after every step.

use crate::kg::NamespaceManager;
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Target parsing errors
#[derive(Error, Debug)]
pub enum TargetError {
    /// Document is not valid YAML/JSON or misses both goal forms
    #[error("Malformed target document: {0}")]
    Malformed(String),

    /// The resulting query does not parse as an ASK
    #[error("Invalid goal query: {0}")]
    Sparql(String),

    /// A pattern term could not be resolved to an IRI
    #[error("Invalid IRI '{value}': {detail}")]
    Iri { value: String, detail: String },
}

pub type TargetResult<T> = Result<T, TargetError>;

/// A normalized goal
#[derive(Debug, Clone)]
pub struct TargetDescription {
    ask: String,
}

impl TargetDescription {
    /// Parse a target document carrying `askQuery` or `pattern`
    pub fn parse(text: &str) -> TargetResult<Self> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| TargetError::Malformed(e.to_string()))?;

        if let Some(ask) = doc.get("askQuery").and_then(|v| v.as_str()) {
            return Self::from_ask(ask);
        }

        let Some(pattern) = doc.get("pattern").and_then(|v| v.as_sequence()) else {
            return Err(TargetError::Malformed(
                "target needs 'askQuery' or 'pattern'".to_string(),
            ));
        };

        let prefixes: HashMap<String, String> = match doc.get("prefixes") {
            Some(value) => serde_yaml::from_value(value.clone())
                .map_err(|e| TargetError::Malformed(format!("bad prefixes map: {}", e)))?,
            None => HashMap::new(),
        };
        let ns = NamespaceManager::with_document_prefixes(&prefixes);

        let mut body = String::new();
        for triple in pattern {
            let subject = term(
                &ns,
                triple.get("subject").ok_or_else(|| {
                    TargetError::Malformed("pattern triple without 'subject'".to_string())
                })?,
            )?;
            let predicate = term(
                &ns,
                triple.get("predicate").ok_or_else(|| {
                    TargetError::Malformed("pattern triple without 'predicate'".to_string())
                })?,
            )?;
            let object = term(
                &ns,
                triple.get("object").ok_or_else(|| {
                    TargetError::Malformed("pattern triple without 'object'".to_string())
                })?,
            )?;
            let _ = writeln!(body, "  {} {} {} .", subject, predicate, object);
        }
        Self::from_ask(&format!("ASK {{\n{}}}", body))
    }

    /// Validate and wrap a caller-supplied ASK query
    pub fn from_ask(query: &str) -> TargetResult<Self> {
        match spargebra::Query::parse(query, None) {
            Ok(spargebra::Query::Ask { .. }) => Ok(Self {
                ask: query.to_string(),
            }),
            Ok(_) => Err(TargetError::Sparql("goal must be an ASK query".to_string())),
            Err(e) => Err(TargetError::Sparql(e.to_string())),
        }
    }

    /// The goal ASK evaluated against the graph
    pub fn ask_query(&self) -> &str {
        &self.ask
    }
}

/// Serialize one pattern term: `?var`, `{ref}` / IRI string, `{value, type}`
/// literal, or bare scalar.
fn term(ns: &NamespaceManager, value: &serde_yaml::Value) -> TargetResult<String> {
    match value {
        serde_yaml::Value::String(s) if s.starts_with('?') => Ok(s.clone()),
        serde_yaml::Value::String(s) => {
            let iri = ns.resolve(s).map_err(|e| TargetError::Iri {
                value: s.clone(),
                detail: e.to_string(),
            })?;
            Ok(format!("<{}>", iri))
        }
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Mapping(_) => {
            if let Some(reference) = value.get("ref").and_then(|v| v.as_str()) {
                let iri = ns.resolve(reference).map_err(|e| TargetError::Iri {
                    value: reference.to_string(),
                    detail: e.to_string(),
                })?;
                return Ok(format!("<{}>", iri));
            }
            let lexical = value
                .get("value")
                .and_then(scalar)
                .ok_or_else(|| TargetError::Malformed("term object without 'value' or 'ref'".to_string()))?;
            match value.get("type").and_then(|v| v.as_str()) {
                Some(datatype) => {
                    let iri = ns.resolve(datatype).map_err(|e| TargetError::Iri {
                        value: datatype.to_string(),
                        detail: e.to_string(),
                    })?;
                    Ok(format!("\"{}\"^^<{}>", escape(&lexical), iri))
                }
                None => Ok(format!("\"{}\"", escape(&lexical))),
            }
        }
        other => Err(TargetError::Malformed(format!(
            "unsupported pattern term: {:?}",
            other
        ))),
    }
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_query_form() {
        let target = TargetDescription::parse(
            r#"askQuery: "ASK { ?c <http://example.org/props#out> 2 }""#,
        )
        .unwrap();
        assert!(target.ask_query().starts_with("ASK"));
    }

    #[test]
    fn test_pattern_form() {
        let target = TargetDescription::parse(
            r#"
prefixes:
  p: "http://example.org/props#"
pattern:
  - subject: "?c"
    predicate: "p:out"
    object: { value: "2", type: "xsd:integer" }
  - subject: "?c"
    predicate: "p:flag"
    object: true
"#,
        )
        .unwrap();
        let ask = target.ask_query();
        assert!(ask.contains("<http://example.org/props#out>"));
        assert!(ask.contains("\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>"));
        assert!(ask.contains("true"));
        // The normalized form still parses as ASK.
        assert!(TargetDescription::from_ask(ask).is_ok());
    }

    #[test]
    fn test_non_ask_rejected() {
        let err = TargetDescription::parse(r#"askQuery: "SELECT ?s WHERE { ?s ?p ?o }""#)
            .unwrap_err();
        assert!(matches!(err, TargetError::Sparql(_)));
    }

    #[test]
    fn test_missing_forms_rejected() {
        let err = TargetDescription::parse("prefixes: {}\n").unwrap_err();
        assert!(matches!(err, TargetError::Malformed(_)));
    }

    #[test]
    fn test_broken_sparql_rejected() {
        let err = TargetDescription::parse(r#"askQuery: "ASK { broken"#).unwrap_err();
        assert!(matches!(err, TargetError::Malformed(_) | TargetError::Sparql(_)));
    }
}
