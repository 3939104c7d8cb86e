//! KCE CLI — command-line front-end for the Knowledge-CAD-Engine
//!
//! Embeds the engine directly: the knowledge base lives in a local
//! directory and survives across invocations, so `load-defs`,
//! `solve-problem`, and `show-log` compose across processes.

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use kce::catalogue::{InitialState, TargetDescription};
use kce::config::EngineConfig;
use kce::engine::{Engine, EngineError, SolveRequest};
use kce::kg::QueryOutcome;
use kce::planner::{ExecutionMode, FailureReason};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const EXIT_OK: i32 = 0;
const EXIT_DEFINITION: i32 = 1;
const EXIT_PLANNING: i32 = 2;
const EXIT_EXECUTION: i32 = 3;
const EXIT_CANCELLED: i32 = 4;

#[derive(Parser)]
#[command(name = "kce", version, about = "Knowledge-CAD-Engine CLI")]
struct Cli {
    /// Knowledge base directory
    #[arg(long, default_value = "kce_data/db", global = true, env = "KCE_DB")]
    db: PathBuf,

    /// Directory for human-readable run logs
    #[arg(long, default_value = "kce_data/log", global = true, env = "KCE_LOG")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Mode {
    User,
    Expert,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or open) the knowledge base
    InitDb,
    /// Load definition documents from a directory
    LoadDefs {
        dir: PathBuf,

        /// Extra directories to search for scripts
        #[arg(long)]
        script_root: Vec<PathBuf>,
    },
    /// Solve a problem: reach the target from the initial state
    SolveProblem {
        /// Target document (askQuery or pattern)
        #[arg(long)]
        target: PathBuf,

        /// Initial-state document
        #[arg(long)]
        initial_state: PathBuf,

        /// Run id; generated when absent
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long, value_enum, default_value = "user")]
        mode: Mode,

        /// Base URI for relative entity names in the initial state
        #[arg(long, default_value = "https://w3id.org/kce/data/")]
        base_uri: String,

        /// Planner step budget
        #[arg(long)]
        depth_budget: Option<usize>,

        /// Wall-clock budget for the whole run, in seconds
        #[arg(long)]
        run_timeout: Option<u64>,
    },
    /// Execute a SPARQL query against the knowledge base
    Query { sparql: String },
    /// Show the recorded execution log of a run
    ShowLog { run_id: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut config = EngineConfig::durable(&cli.db).with_blob_root(&cli.log_dir);

    match cli.command {
        Commands::InitDb => match Engine::open(config) {
            Ok(engine) => {
                let triples = engine.kb().len().unwrap_or(0);
                println!(
                    "Knowledge base ready at {} ({} triples)",
                    cli.db.display(),
                    triples
                );
                EXIT_OK
            }
            Err(e) => fail(&e),
        },
        Commands::LoadDefs { dir, script_root } => {
            for root in script_root {
                config = config.with_script_root(root);
            }
            let engine = match Engine::open(config) {
                Ok(engine) => engine,
                Err(e) => return fail(&e),
            };
            match engine.load_definitions_dir(&dir) {
                Ok(report) => {
                    println!(
                        "Loaded {} document(s): {} nodes, {} rules, {} capabilities, {} workflows",
                        report.documents,
                        report.nodes,
                        report.rules,
                        report.capabilities,
                        report.workflows
                    );
                    EXIT_OK
                }
                Err(e) => fail(&e),
            }
        }
        Commands::SolveProblem {
            target,
            initial_state,
            run_id,
            mode,
            base_uri,
            depth_budget,
            run_timeout,
        } => {
            if let Some(budget) = depth_budget {
                config = config.with_depth_budget(budget);
            }
            if let Some(secs) = run_timeout {
                config = config.with_run_timeout(Duration::from_secs(secs));
            }
            let engine = match Engine::open(config) {
                Ok(engine) => engine,
                Err(e) => return fail(&e),
            };

            let target = match read(&target)
                .and_then(|text| TargetDescription::parse(&text).map_err(|e| e.to_string()))
            {
                Ok(target) => target,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return EXIT_DEFINITION;
                }
            };
            let initial_state = match read(&initial_state)
                .and_then(|text| InitialState::parse(&text, &base_uri).map_err(|e| e.to_string()))
            {
                Ok(state) => state,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return EXIT_DEFINITION;
                }
            };

            let request = SolveRequest {
                target,
                initial_state,
                run_id,
                mode: match mode {
                    Mode::User => ExecutionMode::User,
                    Mode::Expert => ExecutionMode::Expert,
                },
            };

            match engine.solve(request) {
                Ok(outcome) if outcome.succeeded => {
                    println!(
                        "Run {} succeeded after {} step(s)",
                        outcome.run_id, outcome.steps
                    );
                    EXIT_OK
                }
                Ok(outcome) => {
                    let reason = outcome.reason.clone();
                    println!(
                        "Run {} failed: {}",
                        outcome.run_id,
                        reason
                            .as_ref()
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                    match reason {
                        Some(FailureReason::Cancelled) => EXIT_CANCELLED,
                        Some(FailureReason::CriticalRule(_))
                        | Some(FailureReason::StepFailed(_)) => EXIT_EXECUTION,
                        _ => EXIT_PLANNING,
                    }
                }
                Err(e) => fail(&e),
            }
        }
        Commands::Query { sparql } => {
            let engine = match Engine::open(config) {
                Ok(engine) => engine,
                Err(e) => return fail(&e),
            };
            match engine.query(&sparql) {
                Ok(QueryOutcome::Boolean(value)) => {
                    println!("{}", value);
                    EXIT_OK
                }
                Ok(QueryOutcome::Solutions { variables, rows }) => {
                    print_solutions(&variables, &rows);
                    EXIT_OK
                }
                Ok(QueryOutcome::Graph(triples)) => {
                    for triple in triples {
                        println!("{} .", triple);
                    }
                    EXIT_OK
                }
                Err(e) => fail(&e),
            }
        }
        Commands::ShowLog { run_id } => {
            let engine = match Engine::open(config) {
                Ok(engine) => engine,
                Err(e) => return fail(&e),
            };
            match engine.run_log(&run_id) {
                Ok(entries) if entries.is_empty() => {
                    println!("No recorded states for run {}", run_id);
                    EXIT_OK
                }
                Ok(entries) => {
                    let mut table = Table::new();
                    table.set_content_arrangement(ContentArrangement::Dynamic);
                    table.set_header(vec!["#", "timestamp", "event", "operation", "detail"]);
                    for entry in entries {
                        table.add_row(vec![
                            entry.index.to_string(),
                            entry.timestamp,
                            entry.event.map(short_name).unwrap_or_default(),
                            entry.operation.unwrap_or_default(),
                            entry.error.or(entry.log_ref).unwrap_or_default(),
                        ]);
                    }
                    println!("{}", table);
                    EXIT_OK
                }
                Err(e) => fail(&e),
            }
        }
    }
}

fn read(path: &PathBuf) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

fn fail(error: &EngineError) -> i32 {
    eprintln!("Error: {}", error);
    match error {
        EngineError::Definition(_) | EngineError::State(_) | EngineError::Target(_) => {
            EXIT_DEFINITION
        }
        EngineError::Exec(_) => EXIT_EXECUTION,
        EngineError::Planner(_) | EngineError::Kg(_) => EXIT_PLANNING,
    }
}

fn print_solutions(variables: &[String], rows: &[kce::kg::Bindings]) {
    if rows.is_empty() {
        println!("(no results)");
        return;
    }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(variables.iter().map(String::as_str).collect::<Vec<_>>());
    for row in rows {
        let cells: Vec<String> = variables
            .iter()
            .map(|variable| {
                row.get(variable)
                    .map(|term| term.to_string())
                    .unwrap_or_default()
            })
            .collect();
        table.add_row(cells);
    }
    println!("{}", table);
    println!("{} row(s)", rows.len());
}

/// Last segment of a vocabulary IRI, for compact log display
fn short_name(iri: String) -> String {
    iri.rsplit(['#', '/'])
        .next()
        .map(str::to_string)
        .unwrap_or(iri)
}
