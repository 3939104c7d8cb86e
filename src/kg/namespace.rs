//! RDF namespace and prefix management
//!
//! Definition and initial-state documents refer to properties and classes by
//! compact IRIs (`p:out`); this module expands them against the document's
//! declared prefixes plus a set of well-known defaults.

use crate::vocab::{KCE_NS, PROV_NS};
use std::collections::HashMap;
use thiserror::Error;

/// Prefix errors
#[derive(Error, Debug)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Not a compact IRI and not an absolute IRI
    #[error("Not an IRI or compact IRI: {0}")]
    NotAnIri(String),
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Prefix registry seeded with the well-known namespaces
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    /// Prefix → IRI mappings
    prefixes: HashMap<String, String>,
}

impl NamespaceManager {
    /// Create a registry with the default prefixes
    pub fn new() -> Self {
        let mut mgr = Self {
            prefixes: HashMap::new(),
        };

        mgr.add_prefix("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        mgr.add_prefix("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        mgr.add_prefix("xsd", "http://www.w3.org/2001/XMLSchema#");
        mgr.add_prefix("owl", "http://www.w3.org/2002/07/owl#");
        mgr.add_prefix("prov", PROV_NS);
        mgr.add_prefix("kce", KCE_NS);

        mgr
    }

    /// Create a registry extending the defaults with document-local prefixes
    pub fn with_document_prefixes(doc_prefixes: &HashMap<String, String>) -> Self {
        let mut mgr = Self::new();
        for (prefix, iri) in doc_prefixes {
            mgr.add_prefix(prefix.clone(), iri.clone());
        }
        mgr
    }

    /// Register a prefix; later registrations shadow earlier ones
    pub fn add_prefix(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    /// Get the IRI registered for a prefix
    pub fn get_iri(&self, prefix: &str) -> PrefixResult<&str> {
        self.prefixes
            .get(prefix)
            .map(|s| s.as_str())
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))
    }

    /// Resolve a document value to a full IRI.
    ///
    /// Absolute IRIs (`http://…`, `https://…`, `urn:…`, `file://…`) pass
    /// through unchanged; `prefix:local` forms are expanded; anything else is
    /// rejected.
    pub fn resolve(&self, value: &str) -> PrefixResult<String> {
        if Self::is_absolute_iri(value) {
            return Ok(value.to_string());
        }
        if let Some(pos) = value.find(':') {
            let prefix = &value[..pos];
            let local = &value[pos + 1..];
            let iri = self.get_iri(prefix)?;
            return Ok(format!("{}{}", iri, local));
        }
        Err(PrefixError::NotAnIri(value.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but returns `None` instead of erroring,
    /// used by `_rdf_instructions` type inference where a string that is not
    /// IRI-shaped is a literal.
    pub fn resolve_opt(&self, value: &str) -> Option<String> {
        self.resolve(value).ok()
    }

    /// Whether a document string already is an absolute IRI
    pub fn is_absolute_iri(value: &str) -> bool {
        value.starts_with("http://")
            || value.starts_with("https://")
            || value.starts_with("urn:")
            || value.starts_with("file://")
    }

    /// Compact an IRI using the longest matching registered namespace
    pub fn compact(&self, iri: &str) -> Option<String> {
        let mut best: Option<(&str, &str)> = None;
        for (prefix, ns) in &self.prefixes {
            if iri.starts_with(ns.as_str()) {
                match best {
                    Some((_, current)) if current.len() >= ns.len() => {}
                    _ => best = Some((prefix, ns)),
                }
            }
        }
        best.map(|(prefix, ns)| format!("{}:{}", prefix, &iri[ns.len()..]))
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefixes() {
        let mgr = NamespaceManager::new();
        assert_eq!(
            mgr.get_iri("rdf").unwrap(),
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#"
        );
        assert_eq!(mgr.get_iri("kce").unwrap(), KCE_NS);
    }

    #[test]
    fn test_resolve_compact_iri() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("p", "http://example.org/props#");

        assert_eq!(
            mgr.resolve("p:out").unwrap(),
            "http://example.org/props#out"
        );
        assert_eq!(
            mgr.resolve("rdf:type").unwrap(),
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#type"
        );
    }

    #[test]
    fn test_absolute_iri_passthrough() {
        let mgr = NamespaceManager::new();
        assert_eq!(
            mgr.resolve("https://example.org/x").unwrap(),
            "https://example.org/x"
        );
        assert_eq!(mgr.resolve("urn:x:y").unwrap(), "urn:x:y");
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let mgr = NamespaceManager::new();
        assert!(mgr.resolve("nope:thing").is_err());
        assert!(mgr.resolve("bare-word").is_err());
        assert!(mgr.resolve_opt("bare-word").is_none());
    }

    #[test]
    fn test_document_prefixes_shadow_defaults() {
        let mut doc = HashMap::new();
        doc.insert("rdf".to_string(), "http://example.org/not-rdf#".to_string());
        let mgr = NamespaceManager::with_document_prefixes(&doc);
        assert_eq!(
            mgr.resolve("rdf:thing").unwrap(),
            "http://example.org/not-rdf#thing"
        );
    }

    #[test]
    fn test_compact_prefers_longest_namespace() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("a", "http://example.org/");
        mgr.add_prefix("b", "http://example.org/deep/");

        assert_eq!(
            mgr.compact("http://example.org/deep/x"),
            Some("b:x".to_string())
        );
    }
}
