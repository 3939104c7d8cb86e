//! Rule engine
//!
//! Evaluates the rule catalogue against the current graph. A rule's
//! antecedent is a SPARQL group-graph-pattern; every fresh binding set
//! instantiates the consequent UPDATE template. A per-run fired-bindings
//! cache guarantees each rule fires at most once per unique binding set, so
//! consequents are idempotent even when their authors are not careful.

use crate::catalogue::Rule;
use crate::kg::{Bindings, KgError, KnowledgeBase};
use crate::provenance::{Event, EventKind, Recorder};
use oxigraph::model::Term;
use regex::Regex;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Rule evaluation errors
#[derive(Error, Debug)]
pub enum RuleError {
    /// A critical rule's consequent UPDATE failed
    #[error("Critical rule {rule} failed: {detail}")]
    CriticalConsequent { rule: String, detail: String },

    /// Knowledge layer failure during matching
    #[error(transparent)]
    Kg(#[from] KgError),
}

pub type RuleResult<T> = Result<T, RuleError>;

/// Per-run rule evaluation state
pub struct RuleEngine {
    /// (rule URI, canonical bindings) pairs that already fired this run
    fired: FxHashSet<(String, String)>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            fired: FxHashSet::default(),
        }
    }

    /// Evaluate every rule once, highest priority first; returns fired count.
    ///
    /// Ties are broken by URI lexical order for determinism. Non-critical
    /// consequent failures are reported and skipped; critical ones abort.
    pub fn apply_all(
        &mut self,
        kb: &KnowledgeBase,
        rules: &[Rule],
        recorder: &mut Recorder,
    ) -> RuleResult<usize> {
        let mut ordered: Vec<&Rule> = rules.iter().collect();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.uri.as_str().cmp(b.uri.as_str()))
        });

        let mut fired = 0;
        for rule in ordered {
            fired += self.apply_rule(kb, rule, recorder)?;
        }
        Ok(fired)
    }

    /// Evaluate one rule against all fresh binding sets; returns fired count
    pub fn apply_rule(
        &mut self,
        kb: &KnowledgeBase,
        rule: &Rule,
        recorder: &mut Recorder,
    ) -> RuleResult<usize> {
        let select = format!("SELECT * WHERE {{ {} }}", rule.antecedent);
        let rows = kb.select(&select)?;

        let mut fired = 0;
        for row in rows {
            if row
                .values()
                .any(|term| matches!(term, Term::BlankNode(_)))
            {
                warn!(
                    "Rule {} matched a blank node binding; skipping (cannot substitute into SPARQL)",
                    rule.uri
                );
                continue;
            }

            let key = (rule.uri.as_str().to_string(), bindings_key(&row));
            if self.fired.contains(&key) {
                continue;
            }
            // Cache before executing so a failing consequent is not retried
            // in a tight loop; the run keeps going either way.
            self.fired.insert(key);

            let update = substitute(&rule.consequent, &row);
            match kb.update(&update) {
                Ok(()) => {
                    debug!("Rule {} fired with {}", rule.uri, bindings_key(&row));
                    recorder.emit(
                        kb,
                        Event::new(EventKind::RuleFired)
                            .operation(&rule.uri)
                            .human_readable(bindings_json(&row)),
                    )?;
                    fired += 1;
                }
                Err(e) if rule.critical => {
                    return Err(RuleError::CriticalConsequent {
                        rule: rule.uri.as_str().to_string(),
                        detail: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Rule {} consequent failed (non-critical): {}", rule.uri, e);
                }
            }
        }
        Ok(fired)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical `var=term` form of a binding set; `Bindings` is ordered, so
/// equal bindings always canonicalize identically.
fn bindings_key(bindings: &Bindings) -> String {
    let mut parts = Vec::with_capacity(bindings.len());
    for (variable, term) in bindings {
        parts.push(format!("{}={}", variable, term));
    }
    parts.join("&")
}

fn bindings_json(bindings: &Bindings) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = bindings
        .iter()
        .map(|(variable, term)| (variable.clone(), serde_json::Value::String(term.to_string())))
        .collect();
    serde_json::Value::Object(map)
}

/// Replace each `?var` token in the template with the bound term's
/// N-Triples serialization.
fn substitute(template: &str, bindings: &Bindings) -> String {
    let mut result = template.to_string();
    for (variable, term) in bindings {
        let pattern = Regex::new(&format!(r"\?{}\b", regex::escape(variable)))
            .expect("variable names are word characters");
        let serialized = term.to_string();
        result = pattern
            .replace_all(&result, regex::NoExpand(&serialized))
            .into_owned();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::NamedNode;

    fn kb() -> KnowledgeBase {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBase::in_memory(dir.path().join("blobs")).unwrap()
    }

    fn recorder(kb: &KnowledgeBase) -> Recorder {
        let ctx = NamedNode::new("http://example.org/ctx").unwrap();
        Recorder::begin_run(kb, "rule-test", "ASK { ?s ?p ?o }", &ctx).unwrap()
    }

    fn rule(uri: &str, antecedent: &str, consequent: &str, priority: i64, critical: bool) -> Rule {
        Rule {
            uri: NamedNode::new(uri).unwrap(),
            label: None,
            antecedent: antecedent.to_string(),
            consequent: consequent.to_string(),
            priority,
            critical,
        }
    }

    #[test]
    fn test_rule_fires_once_per_binding_set() {
        let kb = kb();
        kb.update("INSERT DATA { <http://x/c> <http://x/out> 2 }").unwrap();
        let mut recorder = recorder(&kb);

        let flag = rule(
            "http://x/rules/flag",
            "?c <http://x/out> ?v . FILTER(?v > 1)",
            "INSERT DATA { ?c <http://x/flag> true }",
            0,
            false,
        );

        let mut engine = RuleEngine::new();
        let fired = engine
            .apply_all(&kb, std::slice::from_ref(&flag), &mut recorder)
            .unwrap();
        assert_eq!(fired, 1);
        assert!(kb.ask("ASK { <http://x/c> <http://x/flag> true }").unwrap());

        // Same bindings: cached, nothing fires.
        let fired = engine
            .apply_all(&kb, std::slice::from_ref(&flag), &mut recorder)
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[test]
    fn test_state_change_reenables_rule() {
        let kb = kb();
        kb.update("INSERT DATA { <http://x/c> <http://x/out> 2 }").unwrap();
        let mut recorder = recorder(&kb);

        let copy = rule(
            "http://x/rules/copy",
            "?c <http://x/out> ?v",
            "INSERT DATA { ?c <http://x/seen> ?v }",
            0,
            false,
        );

        let mut engine = RuleEngine::new();
        assert_eq!(
            engine
                .apply_all(&kb, std::slice::from_ref(&copy), &mut recorder)
                .unwrap(),
            1
        );

        // A new value is a new binding set, so the rule fires again.
        kb.update("INSERT DATA { <http://x/c> <http://x/out> 5 }").unwrap();
        assert_eq!(
            engine
                .apply_all(&kb, std::slice::from_ref(&copy), &mut recorder)
                .unwrap(),
            1
        );
        assert!(kb.ask("ASK { <http://x/c> <http://x/seen> 5 }").unwrap());
    }

    #[test]
    fn test_priority_order_is_descending() {
        let kb = kb();
        kb.update("INSERT DATA { <http://x/c> <http://x/p> 1 }").unwrap();
        let mut recorder = recorder(&kb);

        // The high-priority rule writes the marker; the low-priority rule
        // only fires if the marker is absent. Ordering decides the outcome.
        let high = rule(
            "http://x/rules/zz-high",
            "?c <http://x/p> ?v",
            "INSERT DATA { <http://x/c> <http://x/marker> \"high\" }",
            10,
            false,
        );
        let low = rule(
            "http://x/rules/aa-low",
            "?c <http://x/p> ?v . FILTER NOT EXISTS { <http://x/c> <http://x/marker> ?m }",
            "INSERT DATA { <http://x/c> <http://x/marker> \"low\" }",
            1,
            false,
        );

        let mut engine = RuleEngine::new();
        engine
            .apply_all(&kb, &[low.clone(), high.clone()], &mut recorder)
            .unwrap();

        assert!(kb
            .ask("ASK { <http://x/c> <http://x/marker> \"high\" }")
            .unwrap());
        assert!(!kb
            .ask("ASK { <http://x/c> <http://x/marker> \"low\" }")
            .unwrap());
    }

    #[test]
    fn test_noncritical_failure_continues() {
        let kb = kb();
        kb.update("INSERT DATA { <http://x/c> <http://x/p> 1 }").unwrap();
        let mut recorder = recorder(&kb);

        let broken = rule(
            "http://x/rules/broken",
            "?c <http://x/p> ?v",
            "THIS IS NOT AN UPDATE",
            5,
            false,
        );
        let fine = rule(
            "http://x/rules/fine",
            "?c <http://x/p> ?v",
            "INSERT DATA { ?c <http://x/ok> true }",
            1,
            false,
        );

        let mut engine = RuleEngine::new();
        let fired = engine
            .apply_all(&kb, &[broken, fine], &mut recorder)
            .unwrap();
        assert_eq!(fired, 1);
        assert!(kb.ask("ASK { <http://x/c> <http://x/ok> true }").unwrap());
    }

    #[test]
    fn test_critical_failure_aborts() {
        let kb = kb();
        kb.update("INSERT DATA { <http://x/c> <http://x/p> 1 }").unwrap();
        let mut recorder = recorder(&kb);

        let broken = rule(
            "http://x/rules/broken",
            "?c <http://x/p> ?v",
            "THIS IS NOT AN UPDATE",
            5,
            true,
        );

        let mut engine = RuleEngine::new();
        let err = engine
            .apply_all(&kb, &[broken], &mut recorder)
            .unwrap_err();
        assert!(matches!(err, RuleError::CriticalConsequent { .. }));
    }

    #[test]
    fn test_substitution_serializes_terms() {
        let mut bindings = Bindings::new();
        bindings.insert(
            "c".to_string(),
            Term::NamedNode(NamedNode::new("http://x/c").unwrap()),
        );
        bindings.insert(
            "v".to_string(),
            Term::Literal(oxigraph::model::Literal::new_typed_literal(
                "2",
                oxigraph::model::vocab::xsd::INTEGER,
            )),
        );

        let update = substitute("INSERT DATA { ?c <http://x/q> ?v }", &bindings);
        assert_eq!(
            update,
            "INSERT DATA { <http://x/c> <http://x/q> \"2\"^^<http://www.w3.org/2001/XMLSchema#integer> }"
        );
    }

    #[test]
    fn test_substitution_respects_word_boundaries() {
        let mut bindings = Bindings::new();
        bindings.insert(
            "v".to_string(),
            Term::NamedNode(NamedNode::new("http://x/val").unwrap()),
        );

        // ?v2 must stay untouched.
        let update = substitute("INSERT DATA { ?v <http://x/q> ?v2 }", &bindings);
        assert!(update.contains("<http://x/val> <http://x/q> ?v2"));
    }
}
