use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

/// Validated, immutable run configuration. Built once at startup and passed by
/// reference to every component.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub hosting: HostingConfig,
    pub index: IndexConfig,
    pub retry: RetryPolicy,
    pub run: RunConfig,
}

#[derive(Clone)]
pub struct HostingConfig {
    /// REST root, e.g. `https://git.example.com/rest/api/1.0`.
    pub api_endpoint: String,
    pub token: String,
    pub timeout: Duration,
    /// Sent as `limit` on every paginated request when set.
    pub page_limit: Option<u32>,
}

impl fmt::Debug for HostingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("page_limit", &self.page_limit)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    Elasticsearch { host: String },
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub repo: String,
    pub file: String,
    pub commit: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            repo: "repositories".into(),
            file: "files".into(),
            commit: "commits".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub names: IndexNames,
    pub bulk_chunk_size: usize,
}

/// How the commit collector reacts to a commit that is already indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitScan {
    /// Commits arrive newest first, so the first known commit means the rest
    /// of the branch history is indexed too. Ends the scan, pagination included.
    #[default]
    StopAtKnown,
    /// Read every page and skip only exact duplicates.
    SkipKnown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub history_file: PathBuf,
    pub commit_scan: CommitScan,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            history_file: PathBuf::from(".bitbucketHistory"),
            commit_scan: CommitScan::default(),
        }
    }
}
