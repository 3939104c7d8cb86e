//! Forward-closure reasoning
//!
//! Materializes the RDFS entailments plus the OWL-RL property rules the
//! engine relies on. The closure runs to fixpoint and is idempotent, so the
//! kernel can trigger it after every bulk load or reasoning checkpoint
//! without bookkeeping.

use crate::vocab::{owl, rdfs};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{GraphName, GraphNameRef, NamedNode, NamedNodeRef, Quad, Subject, Term, TermRef};
use oxigraph::store::{StorageError, Store};
use rustc_hash::FxHashSet;
use tracing::debug;

/// One entailment rule of the closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureRule {
    /// rdfs:subClassOf transitivity
    SubClassTransitivity,
    /// rdfs:subPropertyOf transitivity
    SubPropertyTransitivity,
    /// rdf:type inheritance via rdfs:subClassOf
    TypeInheritance,
    /// Triple inheritance via rdfs:subPropertyOf
    PropertyInheritance,
    /// rdfs:domain inference
    DomainInference,
    /// rdfs:range inference
    RangeInference,
    /// owl:inverseOf propagation (both directions)
    InverseOf,
    /// owl:SymmetricProperty propagation
    SymmetricProperty,
    /// owl:TransitiveProperty propagation
    TransitiveProperty,
}

/// Forward-chaining reasoner over a store's default graph
pub struct Reasoner {
    enabled_rules: Vec<ClosureRule>,
}

impl Reasoner {
    /// Reasoner with the full rule set
    pub fn owl_rl() -> Self {
        Self {
            enabled_rules: vec![
                ClosureRule::SubClassTransitivity,
                ClosureRule::SubPropertyTransitivity,
                ClosureRule::TypeInheritance,
                ClosureRule::PropertyInheritance,
                ClosureRule::DomainInference,
                ClosureRule::RangeInference,
                ClosureRule::InverseOf,
                ClosureRule::SymmetricProperty,
                ClosureRule::TransitiveProperty,
            ],
        }
    }

    /// Reasoner with a restricted rule set
    pub fn with_rules(rules: Vec<ClosureRule>) -> Self {
        Self {
            enabled_rules: rules,
        }
    }

    /// Materialize the closure; returns how many triples were inferred
    pub fn materialize(&self, store: &Store) -> Result<usize, StorageError> {
        let mut total = 0;
        loop {
            let mut fresh: Vec<Quad> = Vec::new();
            for rule in &self.enabled_rules {
                self.apply_rule(store, *rule, &mut fresh)?;
            }

            let mut inserted = 0;
            for quad in fresh {
                if store.insert(&quad)? {
                    inserted += 1;
                }
            }
            if inserted == 0 {
                break;
            }
            total += inserted;
            debug!("Closure round inferred {} triples", inserted);
        }
        Ok(total)
    }

    fn apply_rule(
        &self,
        store: &Store,
        rule: ClosureRule,
        out: &mut Vec<Quad>,
    ) -> Result<(), StorageError> {
        match rule {
            ClosureRule::SubClassTransitivity => {
                self.transitive_closure_of(store, rdfs::SUB_CLASS_OF, out)
            }
            ClosureRule::SubPropertyTransitivity => {
                self.transitive_closure_of(store, rdfs::SUB_PROPERTY_OF, out)
            }
            ClosureRule::TypeInheritance => {
                for sub in scan(store, None, Some(rdfs::SUB_CLASS_OF), None)? {
                    let (Some(narrow), Some(wide)) =
                        (term_as_named(&subject_term(&sub.subject)), term_as_named(&sub.object))
                    else {
                        continue;
                    };
                    for typed in scan(store, None, Some(rdf::TYPE), Some(narrow.as_ref().into()))? {
                        out.push(Quad::new(
                            typed.subject,
                            rdf::TYPE,
                            wide.clone(),
                            GraphName::DefaultGraph,
                        ));
                    }
                }
                Ok(())
            }
            ClosureRule::PropertyInheritance => {
                for sub in scan(store, None, Some(rdfs::SUB_PROPERTY_OF), None)? {
                    let (Some(narrow), Some(wide)) =
                        (term_as_named(&subject_term(&sub.subject)), term_as_named(&sub.object))
                    else {
                        continue;
                    };
                    for used in scan(store, None, Some(narrow.as_ref()), None)? {
                        out.push(Quad::new(
                            used.subject,
                            wide.clone(),
                            used.object,
                            GraphName::DefaultGraph,
                        ));
                    }
                }
                Ok(())
            }
            ClosureRule::DomainInference => {
                for decl in scan(store, None, Some(rdfs::DOMAIN), None)? {
                    let (Some(property), Some(class)) =
                        (term_as_named(&subject_term(&decl.subject)), term_as_named(&decl.object))
                    else {
                        continue;
                    };
                    for used in scan(store, None, Some(property.as_ref()), None)? {
                        out.push(Quad::new(
                            used.subject,
                            rdf::TYPE,
                            class.clone(),
                            GraphName::DefaultGraph,
                        ));
                    }
                }
                Ok(())
            }
            ClosureRule::RangeInference => {
                for decl in scan(store, None, Some(rdfs::RANGE), None)? {
                    let (Some(property), Some(class)) =
                        (term_as_named(&subject_term(&decl.subject)), term_as_named(&decl.object))
                    else {
                        continue;
                    };
                    for used in scan(store, None, Some(property.as_ref()), None)? {
                        if let Some(target) = term_as_subject(&used.object) {
                            out.push(Quad::new(
                                target,
                                rdf::TYPE,
                                class.clone(),
                                GraphName::DefaultGraph,
                            ));
                        }
                    }
                }
                Ok(())
            }
            ClosureRule::InverseOf => {
                for decl in scan(store, None, Some(owl::INVERSE_OF), None)? {
                    let (Some(p), Some(q)) =
                        (term_as_named(&subject_term(&decl.subject)), term_as_named(&decl.object))
                    else {
                        continue;
                    };
                    self.invert_edges(store, &p, &q, out)?;
                    self.invert_edges(store, &q, &p, out)?;
                }
                Ok(())
            }
            ClosureRule::SymmetricProperty => {
                for decl in scan(
                    store,
                    None,
                    Some(rdf::TYPE),
                    Some(owl::SYMMETRIC_PROPERTY.into()),
                )? {
                    let Some(p) = term_as_named(&subject_term(&decl.subject)) else {
                        continue;
                    };
                    self.invert_edges(store, &p, &p, out)?;
                }
                Ok(())
            }
            ClosureRule::TransitiveProperty => {
                for decl in scan(
                    store,
                    None,
                    Some(rdf::TYPE),
                    Some(owl::TRANSITIVE_PROPERTY.into()),
                )? {
                    let Some(p) = term_as_named(&subject_term(&decl.subject)) else {
                        continue;
                    };
                    self.transitive_closure_of(store, p.as_ref(), out)?;
                }
                Ok(())
            }
        }
    }

    /// (X p Y), (Y p Z) → (X p Z)
    fn transitive_closure_of(
        &self,
        store: &Store,
        property: NamedNodeRef<'_>,
        out: &mut Vec<Quad>,
    ) -> Result<(), StorageError> {
        let edges = scan(store, None, Some(property), None)?;
        let mut by_source: FxHashSet<(String, String)> = FxHashSet::default();
        for edge in &edges {
            by_source.insert((edge.subject.to_string(), edge.object.to_string()));
        }
        for left in &edges {
            if matches!(left.object, Term::Literal(_)) {
                continue;
            }
            let mid = left.object.to_string();
            for right in &edges {
                if right.subject.to_string() != mid {
                    continue;
                }
                let key = (left.subject.to_string(), right.object.to_string());
                if by_source.contains(&key) {
                    continue;
                }
                out.push(Quad::new(
                    left.subject.clone(),
                    NamedNode::from(property),
                    right.object.clone(),
                    GraphName::DefaultGraph,
                ));
            }
        }
        Ok(())
    }

    /// (X p Y) → (Y q X)
    fn invert_edges(
        &self,
        store: &Store,
        p: &NamedNode,
        q: &NamedNode,
        out: &mut Vec<Quad>,
    ) -> Result<(), StorageError> {
        for edge in scan(store, None, Some(p.as_ref()), None)? {
            if let Some(target) = term_as_subject(&edge.object) {
                out.push(Quad::new(
                    target,
                    q.clone(),
                    subject_term(&edge.subject),
                    GraphName::DefaultGraph,
                ));
            }
        }
        Ok(())
    }
}

impl Default for Reasoner {
    fn default() -> Self {
        Self::owl_rl()
    }
}

fn scan(
    store: &Store,
    subject: Option<oxigraph::model::SubjectRef<'_>>,
    predicate: Option<NamedNodeRef<'_>>,
    object: Option<TermRef<'_>>,
) -> Result<Vec<Quad>, StorageError> {
    store
        .quads_for_pattern(subject, predicate, object, Some(GraphNameRef::DefaultGraph))
        .collect()
}

fn subject_term(subject: &Subject) -> Term {
    match subject {
        Subject::NamedNode(n) => Term::NamedNode(n.clone()),
        Subject::BlankNode(b) => Term::BlankNode(b.clone()),
        #[allow(unreachable_patterns)]
        _ => unreachable!("RDF-star subjects are not produced by this engine"),
    }
}

fn term_as_named(term: &Term) -> Option<NamedNode> {
    match term {
        Term::NamedNode(n) => Some(n.clone()),
        _ => None,
    }
}

fn term_as_subject(term: &Term) -> Option<Subject> {
    match term {
        Term::NamedNode(n) => Some(Subject::NamedNode(n.clone())),
        Term::BlankNode(b) => Some(Subject::BlankNode(b.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(data: &str) -> Store {
        let store = Store::new().unwrap();
        store
            .update(&format!("INSERT DATA {{ {} }}", data))
            .unwrap();
        store
    }

    fn holds(store: &Store, ask: &str) -> bool {
        match store.query(ask).unwrap() {
            oxigraph::sparql::QueryResults::Boolean(b) => b,
            _ => panic!("expected ASK"),
        }
    }

    #[test]
    fn test_subclass_type_inheritance() {
        let store = store_with(
            r#"
            <http://x/Panel> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://x/Part> .
            <http://x/Part> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://x/Thing> .
            <http://x/p1> a <http://x/Panel> .
            "#,
        );

        let inferred = Reasoner::owl_rl().materialize(&store).unwrap();
        assert!(inferred >= 3);
        assert!(holds(&store, "ASK { <http://x/p1> a <http://x/Part> }"));
        assert!(holds(&store, "ASK { <http://x/p1> a <http://x/Thing> }"));
        assert!(holds(
            &store,
            "ASK { <http://x/Panel> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://x/Thing> }"
        ));
    }

    #[test]
    fn test_domain_and_range() {
        let store = store_with(
            r#"
            <http://x/hasPanel> <http://www.w3.org/2000/01/rdf-schema#domain> <http://x/Car> .
            <http://x/hasPanel> <http://www.w3.org/2000/01/rdf-schema#range> <http://x/Panel> .
            <http://x/c1> <http://x/hasPanel> <http://x/p1> .
            "#,
        );

        Reasoner::owl_rl().materialize(&store).unwrap();
        assert!(holds(&store, "ASK { <http://x/c1> a <http://x/Car> }"));
        assert!(holds(&store, "ASK { <http://x/p1> a <http://x/Panel> }"));
    }

    #[test]
    fn test_subproperty_propagates_triples() {
        let store = store_with(
            r#"
            <http://x/narrow> <http://www.w3.org/2000/01/rdf-schema#subPropertyOf> <http://x/wide> .
            <http://x/a> <http://x/narrow> <http://x/b> .
            "#,
        );

        Reasoner::owl_rl().materialize(&store).unwrap();
        assert!(holds(&store, "ASK { <http://x/a> <http://x/wide> <http://x/b> }"));
    }

    #[test]
    fn test_inverse_and_symmetric() {
        let store = store_with(
            r#"
            <http://x/partOf> <http://www.w3.org/2002/07/owl#inverseOf> <http://x/hasPart> .
            <http://x/p1> <http://x/partOf> <http://x/c1> .
            <http://x/near> a <http://www.w3.org/2002/07/owl#SymmetricProperty> .
            <http://x/a> <http://x/near> <http://x/b> .
            "#,
        );

        Reasoner::owl_rl().materialize(&store).unwrap();
        assert!(holds(&store, "ASK { <http://x/c1> <http://x/hasPart> <http://x/p1> }"));
        assert!(holds(&store, "ASK { <http://x/b> <http://x/near> <http://x/a> }"));
    }

    #[test]
    fn test_transitive_property() {
        let store = store_with(
            r#"
            <http://x/above> a <http://www.w3.org/2002/07/owl#TransitiveProperty> .
            <http://x/a> <http://x/above> <http://x/b> .
            <http://x/b> <http://x/above> <http://x/c> .
            "#,
        );

        Reasoner::owl_rl().materialize(&store).unwrap();
        assert!(holds(&store, "ASK { <http://x/a> <http://x/above> <http://x/c> }"));
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let store = store_with(
            r#"
            <http://x/Panel> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://x/Part> .
            <http://x/p1> a <http://x/Panel> .
            "#,
        );

        let reasoner = Reasoner::owl_rl();
        let first = reasoner.materialize(&store).unwrap();
        assert!(first > 0);
        assert_eq!(reasoner.materialize(&store).unwrap(), 0);
    }

    #[test]
    fn test_restricted_rule_set() {
        let store = store_with(
            r#"
            <http://x/hasPanel> <http://www.w3.org/2000/01/rdf-schema#domain> <http://x/Car> .
            <http://x/c1> <http://x/hasPanel> <http://x/p1> .
            "#,
        );

        Reasoner::with_rules(vec![ClosureRule::RangeInference])
            .materialize(&store)
            .unwrap();
        assert!(!holds(&store, "ASK { <http://x/c1> a <http://x/Car> }"));
    }
}
