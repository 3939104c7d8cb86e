//! Atomic-node execution
//!
//! Executes one node against an operating context: resolve declared inputs
//! from the graph, spawn the node's script with a sanitized environment,
//! parse its JSON stdout, and reify declared outputs plus any
//! `_rdf_instructions` program into a single write batch. Provenance events
//! bracket the whole execution.

use crate::catalogue::{ArgumentStyle, AtomicNode, Invocation, Parameter};
use crate::config::EngineConfig;
use crate::exec::instructions::{GraphUpdates, RdfInstructions};
use crate::exec::{CancelFlag, ExecError, ExecResult};
use crate::kg::{KnowledgeBase, NamespaceManager};
use crate::provenance::{Event, EventKind, Recorder};
use oxigraph::model::{NamedNode, Term, Triple};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Environment variables scripts keep; everything else is dropped
const ENV_PASSTHROUGH: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TMPDIR"];

/// Maximum stderr bytes kept for diagnostics
const STDERR_TAIL: usize = 8 * 1024;

/// Subprocess result before output parsing
struct RawOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Executes atomic nodes as subprocesses
pub struct NodeExecutor {
    runtime: Runtime,
    default_timeout: Duration,
    kill_grace: Duration,
}

impl NodeExecutor {
    pub fn new(config: &EngineConfig) -> ExecResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecError::Internal(format!("cannot build runtime: {}", e)))?;
        Ok(Self {
            runtime,
            default_timeout: config.default_node_timeout,
            kill_grace: config.kill_grace,
        })
    }

    /// Execute `node` against `ctx`; returns the `NodeSucceeded` state node.
    ///
    /// Any failure is recorded as a `NodeFailed` state node (with the error
    /// detail, including a stderr tail for script failures) before the error
    /// propagates to the planner.
    pub fn execute(
        &self,
        kb: &KnowledgeBase,
        node: &AtomicNode,
        ctx: &NamedNode,
        recorder: &mut Recorder,
        cancel: &CancelFlag,
    ) -> ExecResult<NamedNode> {
        match self.try_execute(kb, node, ctx, recorder, cancel) {
            Ok(state) => Ok(state),
            Err(error) => {
                let failed = Event::new(EventKind::NodeFailed)
                    .operation(&node.uri)
                    .error_detail(error.to_string())
                    .external_side_effect(node.external_side_effect);
                if let Err(e) = recorder.emit(kb, failed) {
                    warn!("Could not record failure of {}: {}", node.uri, e);
                }
                Err(error)
            }
        }
    }

    fn try_execute(
        &self,
        kb: &KnowledgeBase,
        node: &AtomicNode,
        ctx: &NamedNode,
        recorder: &mut Recorder,
        cancel: &CancelFlag,
    ) -> ExecResult<NamedNode> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        // Input preparation, in declared order. A missing required input
        // fails before any subprocess is spawned.
        let mut args: Vec<(String, String)> = Vec::new();
        let mut used: Vec<Term> = Vec::new();
        for input in &node.inputs {
            match kb.get_single(ctx.as_ref().into(), input.maps_to.as_ref())? {
                Some(term) => {
                    args.push((input.name.clone(), argument_form(&term)));
                    used.push(term);
                }
                None if input.required => {
                    return Err(ExecError::MissingInput {
                        node: node.uri.as_str().to_string(),
                        input: input.name.clone(),
                    });
                }
                None => {
                    debug!("Optional input '{}' of {} has no value", input.name, node.uri);
                }
            }
        }

        let input_snapshot = serde_json::Value::Object(
            args.iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
                .collect(),
        );
        recorder.emit(
            kb,
            Event::new(EventKind::NodeStarted)
                .operation(&node.uri)
                .input_snapshot(input_snapshot)
                .external_side_effect(node.external_side_effect),
        )?;

        let Invocation::SubprocessScript {
            script_path,
            argument_style,
            ..
        } = &node.invocation;
        let timeout = node.timeout.unwrap_or(self.default_timeout);

        info!("Executing {} ({})", node.uri, script_path.display());
        let raw = self.invoke(node, script_path, *argument_style, &args, timeout, cancel)?;

        if !raw.success {
            return Err(ExecError::Script {
                node: node.uri.as_str().to_string(),
                detail: format!(
                    "exit code {}; stderr: {}",
                    raw.exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "killed".to_string()),
                    stderr_tail(&raw.stderr)
                ),
            });
        }

        let parsed: serde_json::Value =
            serde_json::from_slice(&raw.stdout).map_err(|e| ExecError::Script {
                node: node.uri.as_str().to_string(),
                detail: format!(
                    "stdout is not valid JSON ({}); stderr: {}",
                    e,
                    stderr_tail(&raw.stderr)
                ),
            })?;
        let object = parsed.as_object().ok_or_else(|| ExecError::Script {
            node: node.uri.as_str().to_string(),
            detail: "stdout is not a single JSON object".to_string(),
        })?;

        // Collect all writes, then apply them as one batch.
        let ns = NamespaceManager::new();
        let mut updates = GraphUpdates::default();
        for output in &node.outputs {
            if let Some(value) = object.get(&output.name) {
                let term = coerce_output(&node.uri, output, value)?;
                updates
                    .inserts
                    .push(Triple::new(ctx.clone(), output.maps_to.clone(), term));
            }
        }
        for (key, value) in object.iter() {
            if key.as_str() == "_rdf_instructions" {
                let program = RdfInstructions::parse(value)?;
                let lowered = program.lower(kb, &ns)?;
                updates.deletes.extend(lowered.deletes);
                updates.inserts.extend(lowered.inserts);
            } else if !node.outputs.iter().any(|o| &o.name == key) {
                warn!("Ignoring undeclared output key '{}' from {}", key, node.uri);
            }
        }

        for (subject, predicate) in &updates.deletes {
            kb.delete_pair(subject.as_ref().into(), predicate.as_ref())?;
        }
        let written = updates.inserts.clone();
        let added = kb.add_triples(updates.inserts)?;
        debug!("{} wrote {} new triple(s)", node.uri, added);

        if node.creates_entities() {
            kb.reason()?;
        }

        let state = recorder.emit(
            kb,
            Event::new(EventKind::NodeSucceeded)
                .operation(&node.uri)
                .output_snapshot(parsed.clone())
                .external_side_effect(node.external_side_effect),
        )?;
        recorder.link_used(kb, &state, &used)?;
        recorder.link_generated(kb, &written, &state)?;
        Ok(state)
    }

    /// Spawn the script and wait, racing the timeout and the cancel flag.
    fn invoke(
        &self,
        node: &AtomicNode,
        script: &Path,
        style: ArgumentStyle,
        args: &[(String, String)],
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> ExecResult<RawOutput> {
        let node_uri = node.uri.as_str().to_string();
        let kill_grace = self.kill_grace;

        self.runtime.block_on(async move {
            let mut command = Command::new(script);
            match style {
                ArgumentStyle::NamedCli => {
                    for (name, value) in args {
                        command.arg(format!("--{}", name)).arg(value);
                    }
                }
                ArgumentStyle::PositionalCli => {
                    for (_, value) in args {
                        command.arg(value);
                    }
                }
            }
            if let Some(dir) = script.parent() {
                command.current_dir(dir);
            }
            command.env_clear();
            for key in ENV_PASSTHROUGH {
                if let Ok(value) = std::env::var(key) {
                    command.env(key, value);
                }
            }
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = command.spawn().map_err(|e| ExecError::Script {
                node: node_uri.clone(),
                detail: format!("cannot spawn {}: {}", script.display(), e),
            })?;

            let mut stdout_pipe = child.stdout.take().ok_or_else(|| ExecError::Internal(
                "child stdout was not piped".to_string(),
            ))?;
            let mut stderr_pipe = child.stderr.take().ok_or_else(|| ExecError::Internal(
                "child stderr was not piped".to_string(),
            ))?;
            let stdout_task = tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = stdout_pipe.read_to_end(&mut buffer).await;
                buffer
            });
            let stderr_task = tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = stderr_pipe.read_to_end(&mut buffer).await;
                buffer
            });

            // Wait in short slices so both the timeout and the cancel flag
            // are observed while the script runs.
            let mut waited = Duration::ZERO;
            let status = loop {
                if cancel.is_cancelled() {
                    // Give the script a grace window to exit on its own,
                    // then kill it.
                    if tokio::time::timeout(kill_grace, child.wait()).await.is_err() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                    return Err(ExecError::Cancelled);
                }
                if waited >= timeout {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(ExecError::Timeout {
                        node: node_uri,
                        seconds: timeout.as_secs(),
                    });
                }

                let slice = Duration::from_millis(50).min(timeout - waited);
                match tokio::time::timeout(slice, child.wait()).await {
                    Ok(status) => {
                        break status
                            .map_err(|e| ExecError::Internal(format!("wait failed: {}", e)))?;
                    }
                    Err(_) => waited += slice,
                }
            };

            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(RawOutput {
                success: status.success(),
                exit_code: status.code(),
                stdout,
                stderr,
            })
        })
    }
}

/// Literals pass their lexical value; URIs pass their IRI form
fn argument_form(term: &Term) -> String {
    match term {
        Term::Literal(lit) => lit.value().to_string(),
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => node.as_str().to_string(),
        #[allow(unreachable_patterns)]
        _ => term.to_string(),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Coerce a JSON output value to the parameter's declared datatype
fn coerce_output(
    node: &NamedNode,
    output: &Parameter,
    value: &serde_json::Value,
) -> ExecResult<Term> {
    use oxigraph::model::Literal;

    let datatype = output.data_type.as_str();
    let type_error = |detail: String| ExecError::OutputType {
        node: node.as_str().to_string(),
        output: output.name.clone(),
        detail,
    };

    let Some(local) = datatype.strip_prefix(XSD_NS) else {
        // Non-XSD datatype: a class URI; the value must be an IRI string.
        let serde_json::Value::String(iri) = value else {
            return Err(type_error(format!("expected an IRI string, got {}", value)));
        };
        let named = NamedNode::new(iri).map_err(|e| type_error(e.to_string()))?;
        return Ok(named.into());
    };

    let lexical = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => {
            return Err(type_error(format!("expected a scalar, got {}", other)));
        }
    };

    match local {
        "integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => {
            lexical
                .parse::<i64>()
                .map_err(|e| type_error(format!("'{}' is not an integer: {}", lexical, e)))?;
        }
        "decimal" | "double" | "float" => {
            lexical
                .parse::<f64>()
                .map_err(|e| type_error(format!("'{}' is not numeric: {}", lexical, e)))?;
        }
        "boolean" => {
            if lexical != "true" && lexical != "false" {
                return Err(type_error(format!("'{}' is not a boolean", lexical)));
            }
        }
        "anyURI" => {
            let named = NamedNode::new(&lexical).map_err(|e| type_error(e.to_string()))?;
            return Ok(named.into());
        }
        _ => {}
    }

    Ok(Literal::new_typed_literal(lexical, output.data_type.clone()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::vocab::xsd;
    use oxigraph::model::Literal;

    fn parameter(datatype: oxigraph::model::NamedNodeRef<'_>) -> Parameter {
        Parameter {
            name: "y".to_string(),
            maps_to: NamedNode::new("http://x/out").unwrap(),
            data_type: datatype.into(),
            required: false,
        }
    }

    fn node_uri() -> NamedNode {
        NamedNode::new("http://x/node").unwrap()
    }

    #[test]
    fn test_coerce_integer_from_number_and_string() {
        let p = parameter(xsd::INTEGER);
        let t = coerce_output(&node_uri(), &p, &serde_json::json!(2)).unwrap();
        assert_eq!(
            t,
            Term::from(Literal::new_typed_literal("2", xsd::INTEGER))
        );
        let t = coerce_output(&node_uri(), &p, &serde_json::json!("3")).unwrap();
        assert_eq!(
            t,
            Term::from(Literal::new_typed_literal("3", xsd::INTEGER))
        );
        assert!(coerce_output(&node_uri(), &p, &serde_json::json!("wide")).is_err());
    }

    #[test]
    fn test_coerce_boolean() {
        let p = parameter(xsd::BOOLEAN);
        assert!(coerce_output(&node_uri(), &p, &serde_json::json!(true)).is_ok());
        assert!(coerce_output(&node_uri(), &p, &serde_json::json!("maybe")).is_err());
    }

    #[test]
    fn test_coerce_any_uri_and_class_reference() {
        let p = parameter(xsd::ANY_URI);
        let t = coerce_output(&node_uri(), &p, &serde_json::json!("http://x/panel")).unwrap();
        assert!(matches!(t, Term::NamedNode(_)));

        let class_param = Parameter {
            name: "panel".to_string(),
            maps_to: NamedNode::new("http://x/hasPanel").unwrap(),
            data_type: NamedNode::new("http://x/Panel").unwrap(),
            required: false,
        };
        let t = coerce_output(&node_uri(), &class_param, &serde_json::json!("http://x/p1")).unwrap();
        assert!(matches!(t, Term::NamedNode(_)));
        assert!(coerce_output(&node_uri(), &class_param, &serde_json::json!(7)).is_err());
    }

    #[test]
    fn test_argument_forms() {
        assert_eq!(
            argument_form(&Term::from(Literal::new_typed_literal("2", xsd::INTEGER))),
            "2"
        );
        assert_eq!(
            argument_form(&Term::from(NamedNode::new("http://x/a").unwrap())),
            "http://x/a"
        );
    }

    #[test]
    fn test_stderr_tail_caps_size() {
        let big = vec![b'x'; 10 * 1024];
        assert_eq!(stderr_tail(&big).len(), STDERR_TAIL);
        assert_eq!(stderr_tail(b"short"), "short");
    }
}
