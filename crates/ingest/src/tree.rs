use repomirror_store::{BulkIndexWriter, IndexBatch};
use repomirror_types::{
    Branch, DocFilter, EntryKind, FileRecord, HostingApi, MirrorConfig, Repository, Result,
    SearchIndex, TreeEntry,
};

use crate::endpoints;
use crate::pager::{Envelope, Pager};

/// Lists the full file tree of one branch.
pub struct TreeWalker<'a> {
    api: &'a dyn HostingApi,
    page_limit: Option<u32>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(api: &'a dyn HostingApi, page_limit: Option<u32>) -> Self {
        Self { api, page_limit }
    }

    /// Every entry reachable from the branch root, each stamped with the
    /// directory it was listed under (`""` for the root). Directories are
    /// listed depth-first, children in listing order.
    pub fn walk(&self, repo: &Repository, branch: &Branch) -> Result<Vec<TreeEntry>> {
        let mut entries = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(dir) = pending.pop() {
            let mut subdirs = Vec::new();
            let listing = Pager::<TreeEntry>::new(self.api, endpoints::browse(repo, &dir))
                .param("at", branch.ref_name())
                .limit(self.page_limit)
                .envelope(Envelope::Nested("children"));
            for page in listing {
                for mut entry in page? {
                    if entry.kind == EntryKind::Directory {
                        subdirs.push(join(&dir, &entry.path.text));
                    }
                    entry.path.parent = Some(dir.clone());
                    entries.push(entry);
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(entries)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Replace the branch's file records with its current tree. Returns the
/// number of records written.
pub fn index_tree(
    api: &dyn HostingApi,
    index: &dyn SearchIndex,
    config: &MirrorConfig,
    repo: &Repository,
    branch: &Branch,
) -> Result<usize> {
    let file_index = &config.index.names.file;
    let stale = DocFilter::for_branch(&repo.project.key, &repo.slug, branch);
    let removed = index.delete_by_query(file_index, &stale)?;
    tracing::debug!(removed, repo = %repo.label(), branch = %branch.display_id, "removed stale file records");

    let entries = TreeWalker::new(api, config.hosting.page_limit).walk(repo, branch)?;

    let mut batch = IndexBatch::new(file_index);
    for entry in entries {
        let record = FileRecord {
            entry,
            repo_name: repo.slug.clone(),
            project_key: repo.project.key.clone(),
            branch: branch.clone(),
        };
        batch.stage(None, &record)?;
    }

    if batch.is_empty() {
        tracing::info!("Zero files were returned for this branch.");
        return Ok(0);
    }
    tracing::info!("{} files will be indexed", batch.len());
    BulkIndexWriter::new(index, config.index.bulk_chunk_size).flush(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{dir, file, MockHosting};
    use repomirror_store::SqliteIndex;
    use repomirror_types::{
        fields, CommitScan, HostingConfig, IndexBackend, IndexConfig, IndexNames, RetryPolicy,
        RunConfig,
    };
    use serde_json::json;
    use std::time::Duration;

    const BROWSE: &str = "/projects/CORE/repos/api/browse";

    fn repo() -> Repository {
        serde_json::from_value(json!({ "id": 7, "slug": "api", "project": { "key": "CORE" } }))
            .expect("repo")
    }

    fn main_branch() -> Branch {
        serde_json::from_value(json!({ "id": "refs/heads/main", "displayId": "main" }))
            .expect("branch")
    }

    fn config() -> MirrorConfig {
        MirrorConfig {
            hosting: HostingConfig {
                api_endpoint: "http://hosting.invalid".into(),
                token: "t".into(),
                timeout: Duration::from_secs(1),
                page_limit: None,
            },
            index: IndexConfig {
                backend: IndexBackend::Sqlite { path: ":memory:".into() },
                names: IndexNames::default(),
                bulk_chunk_size: 2,
            },
            retry: RetryPolicy::none(),
            run: RunConfig {
                history_file: ".bitbucketHistory".into(),
                commit_scan: CommitScan::StopAtKnown,
            },
        }
    }

    /// root: README, src/, docs/
    /// src: lib.rs, bin/
    /// src/bin: main.rs
    /// docs: (empty)
    fn nested_tree() -> MockHosting {
        let mut mock = MockHosting::new();
        mock.directory(BROWSE, "", vec![file("README"), dir("src"), dir("docs")], 2);
        mock.directory(&format!("{BROWSE}/src"), "src", vec![file("lib.rs"), dir("bin")], 25);
        mock.directory(&format!("{BROWSE}/src/bin"), "src/bin", vec![file("main.rs")], 25);
        mock.directory(&format!("{BROWSE}/docs"), "docs", vec![], 25);
        mock
    }

    #[test]
    fn test_walk_reaches_every_depth_with_parents() {
        let mock = nested_tree();
        let entries = TreeWalker::new(&mock, None)
            .walk(&repo(), &main_branch())
            .expect("walk");

        let listed: Vec<(String, String)> = entries
            .iter()
            .map(|e| (e.path.parent.clone().unwrap_or_default(), e.path.text.clone()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("".into(), "README".into()),
                ("".into(), "src".into()),
                ("".into(), "docs".into()),
                ("src".into(), "lib.rs".into()),
                ("src".into(), "bin".into()),
                ("src/bin".into(), "main.rs".into()),
            ]
        );
    }

    #[test]
    fn test_walk_pins_branch_ref() {
        let mock = nested_tree();
        TreeWalker::new(&mock, None)
            .walk(&repo(), &main_branch())
            .expect("walk");
        for (_, params) in mock.requests() {
            assert!(params.contains(&("at".to_string(), "refs/heads/main".to_string())));
        }
        assert_eq!(mock.request_count(BROWSE), 2);
        assert_eq!(mock.request_count(&format!("{BROWSE}/docs")), 1);
    }

    #[test]
    fn test_index_tree_writes_denormalized_records() {
        let mock = nested_tree();
        let index = SqliteIndex::open_in_memory().expect("index");

        let written = index_tree(&mock, &index, &config(), &repo(), &main_branch()).expect("index");
        assert_eq!(written, 6);

        let filter = DocFilter::all()
            .must(fields::PROJECT_KEY, "CORE")
            .must(fields::REPO_NAME, "api")
            .must(fields::BRANCH_DISPLAY_ID, "main");
        assert_eq!(index.count("files", &filter).expect("count"), 6);

        let hits = index.search_phrase("files", "path.toString", "main.rs").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source["path"]["parent"], "src/bin");
        assert_eq!(hits[0].source["type"], "FILE");
        assert_eq!(hits[0].source["branch"]["id"], "refs/heads/main");
    }

    #[test]
    fn test_reindex_replaces_previous_tree() {
        let index = SqliteIndex::open_in_memory().expect("index");
        index_tree(&nested_tree(), &index, &config(), &repo(), &main_branch()).expect("first");

        let mut shrunk = MockHosting::new();
        shrunk.directory(BROWSE, "", vec![file("README")], 25);
        let written =
            index_tree(&shrunk, &index, &config(), &repo(), &main_branch()).expect("second");

        assert_eq!(written, 1);
        assert_eq!(index.count("files", &DocFilter::all()).expect("count"), 1);
        assert!(!index.exists("files", "path.toString", "lib.rs").expect("exists"));
    }

    #[test]
    fn test_reindex_leaves_other_branches_alone() {
        let index = SqliteIndex::open_in_memory().expect("index");
        let develop: Branch =
            serde_json::from_value(json!({ "id": "refs/heads/develop", "displayId": "develop" }))
                .expect("branch");
        index_tree(&nested_tree(), &index, &config(), &repo(), &develop).expect("develop");
        index_tree(&nested_tree(), &index, &config(), &repo(), &main_branch()).expect("main");

        let mut empty = MockHosting::new();
        empty.directory(BROWSE, "", vec![], 25);
        let written = index_tree(&empty, &index, &config(), &repo(), &main_branch()).expect("empty");

        assert_eq!(written, 0);
        let develop_files = DocFilter::all().must(fields::BRANCH_DISPLAY_ID, "develop");
        assert_eq!(index.count("files", &develop_files).expect("count"), 6);
        assert_eq!(index.count("files", &DocFilter::all()).expect("count"), 6);
    }

    #[test]
    fn test_listing_failure_stops_before_writing() {
        let mut mock = nested_tree();
        mock.fail(&format!("{BROWSE}/src/bin"), 500);
        let index = SqliteIndex::open_in_memory().expect("index");

        let err = index_tree(&mock, &index, &config(), &repo(), &main_branch())
            .expect_err("listing failed");
        assert!(matches!(err, repomirror_types::MirrorError::Status { status: 500, .. }));
        assert_eq!(index.count("files", &DocFilter::all()).expect("count"), 0);
    }
}
