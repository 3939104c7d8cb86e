//! Engine configuration
//!
//! All engine-level knobs travel in one explicit struct; nothing is read
//! from the environment or from globals.

use std::path::PathBuf;
use std::time::Duration;

/// Where the knowledge graph lives
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Volatile store, used by tests and throwaway sessions
    InMemory,
    /// Durable store keyed by a filesystem path; survives restarts
    Path(PathBuf),
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Knowledge graph backend
    pub backend: StoreBackend,

    /// Root directory for human-readable blobs (`<root>/<runId>/<eventId>.json`)
    pub blob_root: PathBuf,

    /// Extra directories searched when a definition's script path does not
    /// resolve relative to its document
    pub script_roots: Vec<PathBuf>,

    /// Timeout applied to node subprocesses without a per-node override
    pub default_node_timeout: Duration,

    /// Optional wall-clock budget for a whole run; exceeding it cancels the run
    pub run_timeout: Option<Duration>,

    /// Maximum number of plan steps before the planner gives up
    pub depth_budget: usize,

    /// Grace period between cancelling a run and killing an in-flight subprocess
    pub kill_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            blob_root: PathBuf::from("kce_data/log"),
            script_roots: Vec::new(),
            default_node_timeout: Duration::from_secs(60),
            run_timeout: None,
            depth_budget: 64,
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Configuration backed by a durable store at `path`
    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Path(path.into()),
            ..Self::default()
        }
    }

    /// In-memory configuration with blobs under `blob_root`
    pub fn in_memory(blob_root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::InMemory,
            blob_root: blob_root.into(),
            ..Self::default()
        }
    }

    /// Set the blob root
    pub fn with_blob_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.blob_root = root.into();
        self
    }

    /// Add a script search root
    pub fn with_script_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.script_roots.push(root.into());
        self
    }

    /// Set the default per-node timeout
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.default_node_timeout = timeout;
        self
    }

    /// Set the per-run wall-clock budget
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Set the planner depth budget
    pub fn with_depth_budget(mut self, budget: usize) -> Self {
        self.depth_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(matches!(config.backend, StoreBackend::InMemory));
        assert_eq!(config.default_node_timeout, Duration::from_secs(60));
        assert_eq!(config.depth_budget, 64);
        assert!(config.run_timeout.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::durable("/tmp/kce-db")
            .with_blob_root("/tmp/kce-log")
            .with_node_timeout(Duration::from_secs(5))
            .with_depth_budget(8);

        assert!(matches!(config.backend, StoreBackend::Path(_)));
        assert_eq!(config.blob_root, PathBuf::from("/tmp/kce-log"));
        assert_eq!(config.depth_budget, 8);
    }
}
