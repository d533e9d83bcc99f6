mod config;
mod retry;

pub use config::{
    CommitScan, HostingConfig, IndexBackend, IndexConfig, IndexNames, MirrorConfig, RunConfig,
};
pub use retry::{retry, RetryPolicy};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MirrorError {
    #[cfg(feature = "rusqlite-errors")]
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[cfg(feature = "reqwest-errors")]
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("index error: {0}")]
    Index(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("run history error: {0}")]
    History(String),
}

impl MirrorError {
    /// Connection failures, timeouts and gateway statuses. Everything else
    /// (4xx, 500, malformed payloads, index rejections) is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "reqwest-errors")]
            MirrorError::Transport(e) => e.is_connect() || e.is_timeout(),
            MirrorError::Status { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;

// ── Remote resources ──────────────────────────────────────────────────────
//
// Each type names the keys the pipeline reads; every other field the hosting
// service returns is kept in `extra` and lands in the index unchanged.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub slug: String,
    pub project: Project,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Repository {
    /// `KEY/slug`, used in log lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.project.key, self.slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "displayId")]
    pub display_id: String,
    #[serde(rename = "latestCommit", default, skip_serializing_if = "Option::is_none")]
    pub latest_commit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Branch {
    /// The ref passed to `at`/`until`: the full ref id when known, else the display name.
    pub fn ref_name(&self) -> &str {
        if self.id.is_empty() {
            &self.display_id
        } else {
            &self.id
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    File,
    Directory,
    Submodule,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPath {
    /// Path relative to the directory that was listed.
    #[serde(rename = "toString")]
    pub text: String,
    /// Path of the listed directory; set by the tree walker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: EntryPath,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct Page<T> {
    #[serde(default)]
    pub values: Vec<T>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "isLastPage", default)]
    pub is_last_page: bool,
    #[serde(rename = "nextPageStart", default)]
    pub next_page_start: Option<u64>,
}

// ── Index documents ───────────────────────────────────────────────────────

/// Document field names shared by the writers and the stale-file filter.
pub mod fields {
    pub const ID: &str = "id";
    pub const REPO_NAME: &str = "repo_name";
    pub const PROJECT_KEY: &str = "project_key";
    pub const BRANCH_DISPLAY_ID: &str = "branch.displayId";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    #[serde(flatten)]
    pub entry: TreeEntry,
    pub repo_name: String,
    pub project_key: String,
    pub branch: Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    #[serde(flatten)]
    pub commit: Commit,
    pub repo_name: String,
    pub project_key: String,
    pub branch: Branch,
}

// ── Index operations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

/// Conjunction of field/value phrase matches. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocFilter {
    terms: Vec<(String, String)>,
}

impl DocFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn must(mut self, field: &str, value: &str) -> Self {
        self.terms.push((field.to_string(), value.to_string()));
        self
    }

    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Stale-file filter for one (project, repository, branch).
    pub fn for_branch(project_key: &str, repo_slug: &str, branch: &Branch) -> Self {
        Self::all()
            .must(fields::PROJECT_KEY, project_key)
            .must(fields::REPO_NAME, repo_slug)
            .must(fields::BRANCH_DISPLAY_ID, &branch.display_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub index: String,
    /// `None` lets the index assign a handle.
    pub id: Option<String>,
    pub source: Value,
}

// ── Summaries ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub files_indexed: usize,
    pub commits_indexed: usize,
    pub commits_already_indexed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub projects: usize,
    pub repositories: usize,
    pub branches: usize,
    pub files_indexed: usize,
    pub commits_indexed: usize,
    pub commits_already_indexed: usize,
}

impl SyncSummary {
    pub fn add_branch(&mut self, branch: &BranchSummary) {
        self.branches += 1;
        self.files_indexed += branch.files_indexed;
        self.commits_indexed += branch.commits_indexed;
        self.commits_already_indexed += branch.commits_already_indexed;
    }

    pub fn merge(&mut self, other: &SyncSummary) {
        self.projects += other.projects;
        self.repositories += other.repositories;
        self.branches += other.branches;
        self.files_indexed += other.files_indexed;
        self.commits_indexed += other.commits_indexed;
        self.commits_already_indexed += other.commits_already_indexed;
    }
}

// ── Core traits ───────────────────────────────────────────────────────────

/// Read access to the hosting service's REST API.
pub trait HostingApi: Send + Sync {
    /// GET the resource at `segments` (relative to the API root, each segment
    /// unescaped) and return the decoded JSON body. Non-success statuses are errors.
    fn get(&self, segments: &[String], params: &[(String, String)]) -> Result<Value>;
}

/// The document store the mirror writes into.
pub trait SearchIndex: Send + Sync {
    /// Create `index` if it does not exist. Returns `true` when it was created.
    fn ensure_index(&self, index: &str, mapping: Option<&Value>) -> Result<bool>;

    /// Insert or replace the document with handle `id`.
    fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()>;

    fn search_phrase(&self, index: &str, field: &str, value: &str) -> Result<Vec<Hit>>;

    fn exists(&self, index: &str, field: &str, value: &str) -> Result<bool> {
        Ok(!self.search_phrase(index, field, value)?.is_empty())
    }

    /// Remove every document matching `filter`; returns the number removed.
    fn delete_by_query(&self, index: &str, filter: &DocFilter) -> Result<u64>;

    fn count(&self, index: &str, filter: &DocFilter) -> Result<u64>;

    /// Write all actions in one request. Any rejected action fails the call.
    fn bulk(&self, actions: &[BulkAction]) -> Result<usize>;

    /// Make prior writes visible to subsequent searches.
    fn refresh(&self, index: &str) -> Result<()>;
}

// ── Tests ─────────────────────────────────────────────────────────────────
