use repomirror_types::{
    Branch, BranchSummary, HostingApi, MirrorConfig, Project, Repository, Result, SearchIndex,
    SyncSummary,
};

use crate::commits::index_commits;
use crate::endpoints;
use crate::pager::{read_all, Pager};
use crate::tree::index_tree;

/// One full crawl: every project, every repository, every branch.
///
/// Runs strictly sequentially. The first error aborts the crawl; writes
/// already made stay in the index.
pub struct CatalogSync<'a> {
    api: &'a dyn HostingApi,
    index: &'a dyn SearchIndex,
    config: &'a MirrorConfig,
}

impl<'a> CatalogSync<'a> {
    pub fn new(
        api: &'a dyn HostingApi,
        index: &'a dyn SearchIndex,
        config: &'a MirrorConfig,
    ) -> Self {
        Self { api, index, config }
    }

    pub fn run(&self) -> Result<SyncSummary> {
        tracing::info!("Indexing repositories");
        let page_limit = self.config.hosting.page_limit;
        let mut summary = SyncSummary::default();

        for page in Pager::<Project>::new(self.api, endpoints::projects()).limit(page_limit) {
            for project in page? {
                tracing::info!(project = %project.key, "Processing project {}", project.name);
                summary.projects += 1;

                let repos = Pager::<Repository>::new(self.api, endpoints::repositories(&project.key))
                    .limit(page_limit);
                for repos_page in repos {
                    for repo in repos_page? {
                        summary.merge(&self.sync_repository(repo)?);
                    }
                }
            }
        }

        tracing::info!(
            projects = summary.projects,
            repositories = summary.repositories,
            branches = summary.branches,
            files = summary.files_indexed,
            commits = summary.commits_indexed,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Attach the repository's branches, write its document (keyed by the
    /// numeric repository id), then index every branch.
    pub fn sync_repository(&self, mut repo: Repository) -> Result<SyncSummary> {
        repo.branches = read_all(
            Pager::<Branch>::new(self.api, endpoints::branches(&repo))
                .limit(self.config.hosting.page_limit),
        )?;

        let doc = serde_json::to_value(&repo)?;
        self.index
            .upsert(&self.config.index.names.repo, &repo.id.to_string(), &doc)?;
        tracing::debug!(repo = %repo.label(), branches = repo.branches.len(), "repository written");

        let mut summary = SyncSummary {
            repositories: 1,
            ..SyncSummary::default()
        };
        for branch in &repo.branches {
            summary.add_branch(&self.sync_branch(&repo, branch)?);
        }
        Ok(summary)
    }

    /// Replace the branch's files, then append its new commits.
    pub fn sync_branch(&self, repo: &Repository, branch: &Branch) -> Result<BranchSummary> {
        tracing::info!("Started indexing: {}@{}", repo.label(), branch.display_id);
        let files_indexed = index_tree(self.api, self.index, self.config, repo, branch)?;
        let commits = index_commits(self.api, self.index, self.config, repo, branch)?;
        Ok(BranchSummary {
            files_indexed,
            commits_indexed: commits.written,
            commits_already_indexed: commits.already_indexed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{branch, commit, dir, file, project, repo, MockHosting};
    use repomirror_store::SqliteIndex;
    use repomirror_types::{
        fields, DocFilter, HostingConfig, IndexBackend, IndexConfig, IndexNames, MirrorError,
        RetryPolicy, RunConfig,
    };
    use std::time::Duration;

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
                bulk_chunk_size: 500,
            },
            retry: RetryPolicy::none(),
            run: RunConfig::default(),
        }
    }

    /// CORE/api (main, develop), CORE/web (main), OPS/empty (no branches).
    fn hosting() -> MockHosting {
        let mut mock = MockHosting::new();
        mock.collection("/projects", vec![project("CORE"), project("OPS")], 1);
        mock.collection(
            "/projects/CORE/repos",
            vec![repo(1, "CORE", "api"), repo(2, "CORE", "web")],
            1,
        );
        mock.collection("/projects/OPS/repos", vec![repo(3, "OPS", "empty")], 25);

        mock.collection(
            "/projects/CORE/repos/api/branches",
            vec![branch("main"), branch("develop")],
            1,
        );
        mock.directory(
            "/projects/CORE/repos/api/browse",
            "",
            vec![file("Cargo.toml"), dir("src")],
            25,
        );
        mock.directory("/projects/CORE/repos/api/browse/src", "src", vec![file("main.rs")], 25);
        mock.collection(
            "/projects/CORE/repos/api/commits",
            vec![commit("a2"), commit("a1")],
            25,
        );

        mock.collection("/projects/CORE/repos/web/branches", vec![branch("main")], 25);
        mock.directory("/projects/CORE/repos/web/browse", "", vec![file("index.html")], 25);
        mock.collection("/projects/CORE/repos/web/commits", vec![commit("w1")], 25);

        mock.collection("/projects/OPS/repos/empty/branches", vec![], 25);
        mock
    }

    #[test]
    fn test_run_mirrors_whole_catalog() {
        let mock = hosting();
        let index = SqliteIndex::open_in_memory().expect("index");
        let cfg = config();

        let summary = CatalogSync::new(&mock, &index, &cfg).run().expect("run");

        assert_eq!(summary.projects, 2);
        assert_eq!(summary.repositories, 3);
        assert_eq!(summary.branches, 3);
        // api: 3 entries on each of two branches; web: 1.
        assert_eq!(summary.files_indexed, 7);
        // develop shares main's history, so its first commit is already known.
        assert_eq!(summary.commits_indexed, 3);
        assert_eq!(summary.commits_already_indexed, 1);

        assert_eq!(index.count("repositories", &DocFilter::all()).expect("count"), 3);
        assert_eq!(index.count("files", &DocFilter::all()).expect("count"), 7);
        assert_eq!(index.count("commits", &DocFilter::all()).expect("count"), 3);
    }

    #[test]
    fn test_repository_document_carries_branches() {
        let mock = hosting();
        let index = SqliteIndex::open_in_memory().expect("index");
        let cfg = config();
        CatalogSync::new(&mock, &index, &cfg).run().expect("run");

        let hits = index.search_phrase("repositories", fields::ID, "1").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
        let branches = hits[0].source["branches"].as_array().expect("branches");
        let names: Vec<_> = branches.iter().map(|b| b["displayId"].as_str()).collect();
        assert_eq!(names, vec![Some("main"), Some("develop")]);
        assert_eq!(hits[0].source["project"]["key"], "CORE");

        let empty = index.search_phrase("repositories", fields::ID, "3").expect("search");
        assert_eq!(empty[0].source["branches"], serde_json::json!([]));
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let mock = hosting();
        let index = SqliteIndex::open_in_memory().expect("index");
        let cfg = config();
        CatalogSync::new(&mock, &index, &cfg).run().expect("first");

        let summary = CatalogSync::new(&mock, &index, &cfg).run().expect("second");

        assert_eq!(summary.commits_indexed, 0);
        assert_eq!(index.count("repositories", &DocFilter::all()).expect("count"), 3);
        assert_eq!(index.count("files", &DocFilter::all()).expect("count"), 7);
        assert_eq!(index.count("commits", &DocFilter::all()).expect("count"), 3);
    }

    #[test]
    fn test_sync_repository_alone() {
        let mock = hosting();
        let index = SqliteIndex::open_in_memory().expect("index");
        let cfg = config();
        let web: Repository = serde_json::from_value(repo(2, "CORE", "web")).expect("repo");

        let summary = CatalogSync::new(&mock, &index, &cfg)
            .sync_repository(web)
            .expect("sync");

        assert_eq!(summary.repositories, 1);
        assert_eq!(summary.branches, 1);
        assert_eq!(summary.files_indexed, 1);
        assert_eq!(mock.request_count("/projects"), 0);
        let web_files = DocFilter::all().must(fields::REPO_NAME, "web");
        assert_eq!(index.count("files", &web_files).expect("count"), 1);
    }

    #[test]
    fn test_failure_aborts_remaining_work() {
        let mut mock = hosting();
        mock.fail("/projects/CORE/repos/api/branches", 403);
        let index = SqliteIndex::open_in_memory().expect("index");
        let cfg = config();

        let err = CatalogSync::new(&mock, &index, &cfg).run().expect_err("forbidden");

        assert!(matches!(err, MirrorError::Status { status: 403, .. }));
        assert_eq!(index.count("repositories", &DocFilter::all()).expect("count"), 0);
        assert_eq!(mock.request_count("/projects/CORE/repos/web/branches"), 0);
        assert_eq!(mock.request_count("/projects/OPS/repos"), 0);
    }
}
