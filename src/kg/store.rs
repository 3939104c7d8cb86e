//! Knowledge graph access layer
//!
//! [`KnowledgeBase`] owns all RDF data. Every other component reads and
//! writes the graph through this façade: SPARQL query/update, bulk triple
//! append, single-value lookup, reasoning trigger, and the human-readable
//! blob sink. Writes are serialized by the single-threaded kernel; the store
//! itself is safe to share by reference.

use crate::config::{EngineConfig, StoreBackend};
use crate::kg::blobs::BlobStore;
use crate::kg::reasoner::Reasoner;
use oxigraph::model::{
    GraphName, GraphNameRef, NamedNode, NamedNodeRef, Quad, Subject, SubjectRef, Term, TermRef,
    Triple,
};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;
use tracing::{debug, info};

/// Knowledge layer errors
#[derive(Error, Debug)]
pub enum KgError {
    /// Malformed or failing SPARQL query
    #[error("Query error: {0}")]
    Query(String),

    /// Malformed or failing SPARQL update
    #[error("Update error: {0}")]
    Update(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(#[from] oxigraph::store::StorageError),

    /// Blob sink I/O error
    #[error("Blob store error: {0}")]
    Blob(#[from] io::Error),

    /// A query returned a different result form than the caller expected
    #[error("Expected a {expected} result, got {got}")]
    UnexpectedForm {
        expected: &'static str,
        got: &'static str,
    },
}

pub type KgResult<T> = Result<T, KgError>;

/// One row of a SELECT result, keyed by variable name
pub type Bindings = BTreeMap<String, Term>;

/// Result of a SPARQL query, dispatched on the query form
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// SELECT: projected variables and materialized rows
    Solutions {
        variables: Vec<String>,
        rows: Vec<Bindings>,
    },
    /// ASK
    Boolean(bool),
    /// CONSTRUCT / DESCRIBE
    Graph(Vec<Triple>),
}

/// Persistent triple store with SPARQL access, reasoning hook, and blob sink
pub struct KnowledgeBase {
    store: Store,
    reasoner: Reasoner,
    blobs: BlobStore,
}

impl KnowledgeBase {
    /// Open the store described by `config`
    pub fn open(config: &EngineConfig) -> KgResult<Self> {
        let store = match &config.backend {
            StoreBackend::InMemory => {
                debug!("Opening in-memory knowledge base");
                Store::new()?
            }
            StoreBackend::Path(path) => {
                info!("Opening knowledge base at {}", path.display());
                Store::open(path)?
            }
        };
        Ok(Self {
            store,
            reasoner: Reasoner::owl_rl(),
            blobs: BlobStore::new(&config.blob_root),
        })
    }

    /// In-memory knowledge base with blobs under `blob_root` (tests, scratch)
    pub fn in_memory(blob_root: impl Into<std::path::PathBuf>) -> KgResult<Self> {
        Ok(Self {
            store: Store::new()?,
            reasoner: Reasoner::owl_rl(),
            blobs: BlobStore::new(blob_root),
        })
    }

    /// Execute a SPARQL query, dispatching on SELECT/ASK/CONSTRUCT/DESCRIBE
    pub fn query(&self, sparql: &str) -> KgResult<QueryOutcome> {
        let results = self
            .store
            .query(sparql)
            .map_err(|e| KgError::Query(e.to_string()))?;
        match results {
            QueryResults::Solutions(iter) => {
                let variables: Vec<String> = iter
                    .variables()
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect();
                let mut rows = Vec::new();
                for solution in iter {
                    let solution = solution.map_err(|e| KgError::Query(e.to_string()))?;
                    let mut row = Bindings::new();
                    for (variable, term) in solution.iter() {
                        row.insert(variable.as_str().to_string(), term.clone());
                    }
                    rows.push(row);
                }
                Ok(QueryOutcome::Solutions { variables, rows })
            }
            QueryResults::Boolean(value) => Ok(QueryOutcome::Boolean(value)),
            QueryResults::Graph(iter) => {
                let mut triples = Vec::new();
                for triple in iter {
                    triples.push(triple.map_err(|e| KgError::Query(e.to_string()))?);
                }
                Ok(QueryOutcome::Graph(triples))
            }
        }
    }

    /// Execute a SELECT query and return its rows
    pub fn select(&self, sparql: &str) -> KgResult<Vec<Bindings>> {
        match self.query(sparql)? {
            QueryOutcome::Solutions { rows, .. } => Ok(rows),
            QueryOutcome::Boolean(_) => Err(KgError::UnexpectedForm {
                expected: "SELECT",
                got: "ASK",
            }),
            QueryOutcome::Graph(_) => Err(KgError::UnexpectedForm {
                expected: "SELECT",
                got: "CONSTRUCT",
            }),
        }
    }

    /// Execute an ASK query
    pub fn ask(&self, sparql: &str) -> KgResult<bool> {
        match self.query(sparql)? {
            QueryOutcome::Boolean(value) => Ok(value),
            QueryOutcome::Solutions { .. } => Err(KgError::UnexpectedForm {
                expected: "ASK",
                got: "SELECT",
            }),
            QueryOutcome::Graph(_) => Err(KgError::UnexpectedForm {
                expected: "ASK",
                got: "CONSTRUCT",
            }),
        }
    }

    /// Execute a SPARQL UPDATE
    pub fn update(&self, sparql: &str) -> KgResult<()> {
        self.store
            .update(sparql)
            .map_err(|e| KgError::Update(e.to_string()))
    }

    /// Append triples to the default graph; returns how many were new
    pub fn add_triples<I>(&self, triples: I) -> KgResult<usize>
    where
        I: IntoIterator<Item = Triple>,
    {
        let mut added = 0;
        for triple in triples {
            if self.store.insert(&triple.in_graph(GraphName::DefaultGraph))? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Insert a single triple; returns whether it was new
    pub fn insert(&self, subject: Subject, predicate: NamedNode, object: Term) -> KgResult<bool> {
        Ok(self.store.insert(&Quad::new(
            subject,
            predicate,
            object,
            GraphName::DefaultGraph,
        ))?)
    }

    /// Whether the default graph contains `(subject, predicate, object)`
    pub fn contains(
        &self,
        subject: SubjectRef<'_>,
        predicate: NamedNodeRef<'_>,
        object: TermRef<'_>,
    ) -> KgResult<bool> {
        let mut iter = self.store.quads_for_pattern(
            Some(subject),
            Some(predicate),
            Some(object),
            Some(GraphNameRef::DefaultGraph),
        );
        match iter.next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e.into()),
            None => Ok(false),
        }
    }

    /// Single-value convenience lookup.
    ///
    /// When the graph holds several values for the pair, the lexically
    /// smallest is returned so repeated calls are deterministic.
    pub fn get_single(
        &self,
        subject: SubjectRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> KgResult<Option<Term>> {
        let mut values = self.objects_for(subject, predicate)?;
        values.sort_by_key(|t| t.to_string());
        Ok(values.into_iter().next())
    }

    /// All objects for `(subject, predicate, ?)`
    pub fn objects_for(
        &self,
        subject: SubjectRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> KgResult<Vec<Term>> {
        let mut values = Vec::new();
        for quad in self.store.quads_for_pattern(
            Some(subject),
            Some(predicate),
            None,
            Some(GraphNameRef::DefaultGraph),
        ) {
            values.push(quad?.object);
        }
        Ok(values)
    }

    /// All named-node subjects with `rdf:type class`
    pub fn subjects_of_type(&self, class: NamedNodeRef<'_>) -> KgResult<Vec<NamedNode>> {
        let mut subjects = Vec::new();
        for quad in self.store.quads_for_pattern(
            None,
            Some(oxigraph::model::vocab::rdf::TYPE),
            Some(class.into()),
            Some(GraphNameRef::DefaultGraph),
        ) {
            if let Subject::NamedNode(node) = quad?.subject {
                subjects.push(node);
            }
        }
        subjects.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(subjects)
    }

    /// All triples carrying `predicate`, used for state fingerprints
    pub fn triples_with_predicate(&self, predicate: NamedNodeRef<'_>) -> KgResult<Vec<Triple>> {
        let mut triples = Vec::new();
        for quad in self.store.quads_for_pattern(
            None,
            Some(predicate),
            None,
            Some(GraphNameRef::DefaultGraph),
        ) {
            let quad = quad?;
            triples.push(Triple::new(quad.subject, quad.predicate, quad.object));
        }
        Ok(triples)
    }

    /// Delete every `(subject, predicate, *)` triple; returns how many went
    pub fn delete_pair(
        &self,
        subject: SubjectRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> KgResult<usize> {
        let mut doomed = Vec::new();
        for quad in self.store.quads_for_pattern(
            Some(subject),
            Some(predicate),
            None,
            Some(GraphNameRef::DefaultGraph),
        ) {
            doomed.push(quad?);
        }
        for quad in &doomed {
            self.store.remove(quad)?;
        }
        Ok(doomed.len())
    }

    /// Total triple count
    pub fn len(&self) -> KgResult<usize> {
        Ok(self.store.len()?)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> KgResult<bool> {
        Ok(self.store.is_empty()?)
    }

    /// Run the forward-closure reasoner to fixpoint; returns inferred count.
    ///
    /// Idempotent: a second call right after the first infers nothing.
    pub fn reason(&self) -> KgResult<usize> {
        let inferred = self.reasoner.materialize(&self.store)?;
        if inferred > 0 {
            debug!("Reasoner materialized {} triples", inferred);
        }
        Ok(inferred)
    }

    /// Store a human-readable payload, returning its blob ref
    pub fn store_human_readable(
        &self,
        run_id: &str,
        event_id: &str,
        payload: &[u8],
    ) -> KgResult<String> {
        Ok(self.blobs.store(run_id, event_id, payload)?)
    }

    /// Read a human-readable payload back by ref
    pub fn get_human_readable(&self, blob_ref: &str) -> KgResult<Option<Vec<u8>>> {
        Ok(self.blobs.read(blob_ref)?)
    }

    /// Blob refs recorded for a run, for offline inspection
    pub fn human_readable_refs(&self, run_id: &str) -> KgResult<Vec<String>> {
        Ok(self.blobs.refs_for_run(run_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::Literal;

    fn kb() -> KnowledgeBase {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap()
    }

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    #[test]
    fn test_insert_select_roundtrip() {
        let kb = kb();
        kb.insert(
            node("http://example.org/c").into(),
            node("http://example.org/p"),
            Literal::from(1).into(),
        )
        .unwrap();

        let rows = kb
            .select("SELECT ?s ?o WHERE { ?s <http://example.org/p> ?o }")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("s"),
            Some(&Term::from(node("http://example.org/c")))
        );
    }

    #[test]
    fn test_ask_dispatch() {
        let kb = kb();
        assert!(!kb
            .ask("ASK { <http://example.org/c> <http://example.org/p> 1 }")
            .unwrap());

        kb.update("INSERT DATA { <http://example.org/c> <http://example.org/p> 1 }")
            .unwrap();
        assert!(kb
            .ask("ASK { <http://example.org/c> <http://example.org/p> 1 }")
            .unwrap());
    }

    #[test]
    fn test_malformed_query_fails_synchronously() {
        let kb = kb();
        let err = kb.query("SELEKT broken").unwrap_err();
        assert!(matches!(err, KgError::Query(_)));
    }

    #[test]
    fn test_form_mismatch_is_reported() {
        let kb = kb();
        let err = kb.ask("SELECT ?s WHERE { ?s ?p ?o }").unwrap_err();
        assert!(matches!(err, KgError::UnexpectedForm { .. }));
    }

    #[test]
    fn test_get_single_is_deterministic() {
        let kb = kb();
        let c = node("http://example.org/c");
        let p = node("http://example.org/p");
        kb.insert(c.clone().into(), p.clone(), Literal::from("b").into())
            .unwrap();
        kb.insert(c.clone().into(), p.clone(), Literal::from("a").into())
            .unwrap();

        let value = kb
            .get_single(c.as_ref().into(), p.as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(value, Term::from(Literal::from("a")));
    }

    #[test]
    fn test_delete_pair_removes_all_values() {
        let kb = kb();
        let c = node("http://example.org/c");
        let p = node("http://example.org/p");
        kb.insert(c.clone().into(), p.clone(), Literal::from(1).into())
            .unwrap();
        kb.insert(c.clone().into(), p.clone(), Literal::from(2).into())
            .unwrap();

        let removed = kb.delete_pair(c.as_ref().into(), p.as_ref()).unwrap();
        assert_eq!(removed, 2);
        assert!(kb
            .get_single(c.as_ref().into(), p.as_ref())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_durable_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::EngineConfig::durable(dir.path().join("db"))
            .with_blob_root(dir.path().join("blobs"));

        {
            let kb = KnowledgeBase::open(&config).unwrap();
            kb.update("INSERT DATA { <http://example.org/c> <http://example.org/p> 7 }")
                .unwrap();
        }

        let kb = KnowledgeBase::open(&config).unwrap();
        assert!(kb
            .ask("ASK { <http://example.org/c> <http://example.org/p> 7 }")
            .unwrap());
    }
}
