use repomirror_store::{BulkIndexWriter, IndexBatch};
use repomirror_types::{
    fields, Branch, Commit, CommitRecord, CommitScan, HostingApi, MirrorConfig, Repository,
    Result, SearchIndex,
};

use crate::endpoints;
use crate::pager::Pager;

/// Commits found on a branch that are not yet in the commit index.
#[derive(Debug, Default)]
pub struct CommitScanOutcome {
    pub records: Vec<CommitRecord>,
    pub already_indexed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitsIndexed {
    pub written: usize,
    pub already_indexed: usize,
}

/// Reads a branch's history newest first, keeping commits absent from the
/// commit index.
pub struct CommitCollector<'a> {
    api: &'a dyn HostingApi,
    index: &'a dyn SearchIndex,
    commit_index: &'a str,
    scan: CommitScan,
    page_limit: Option<u32>,
}

impl<'a> CommitCollector<'a> {
    pub fn new(
        api: &'a dyn HostingApi,
        index: &'a dyn SearchIndex,
        commit_index: &'a str,
        scan: CommitScan,
    ) -> Self {
        Self {
            api,
            index,
            commit_index,
            scan,
            page_limit: None,
        }
    }

    pub fn page_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn collect(&self, repo: &Repository, branch: &Branch) -> Result<CommitScanOutcome> {
        let history = Pager::<Commit>::new(self.api, endpoints::commits(repo))
            .param("until", branch.ref_name())
            .limit(self.page_limit);

        let mut outcome = CommitScanOutcome::default();
        'pages: for page in history {
            for commit in page? {
                if self.index.exists(self.commit_index, fields::ID, &commit.id)? {
                    outcome.already_indexed += 1;
                    match self.scan {
                        CommitScan::StopAtKnown => {
                            tracing::debug!(commit = %commit.id, "reached indexed history");
                            break 'pages;
                        }
                        CommitScan::SkipKnown => continue,
                    }
                }
                outcome.records.push(CommitRecord {
                    commit,
                    repo_name: repo.slug.clone(),
                    project_key: repo.project.key.clone(),
                    branch: branch.clone(),
                });
            }
        }
        Ok(outcome)
    }
}

/// Append the branch's new commits to the commit index, keyed by hash.
pub fn index_commits(
    api: &dyn HostingApi,
    index: &dyn SearchIndex,
    config: &MirrorConfig,
    repo: &Repository,
    branch: &Branch,
) -> Result<CommitsIndexed> {
    let commit_index = &config.index.names.commit;
    let outcome = CommitCollector::new(api, index, commit_index, config.run.commit_scan)
        .page_limit(config.hosting.page_limit)
        .collect(repo, branch)?;

    // Oldest first: a flush that fails partway leaves the newest commits
    // unindexed, so the next run's scan still reaches them.
    let mut batch = IndexBatch::new(commit_index);
    for record in outcome.records.iter().rev() {
        batch.stage(Some(record.commit.id.clone()), record)?;
    }

    if batch.is_empty() {
        tracing::info!("Zero new commits were returned for this branch.");
    } else {
        tracing::info!("{} commits will be indexed", batch.len());
    }
    let written = BulkIndexWriter::new(index, config.index.bulk_chunk_size).flush(batch)?;
    Ok(CommitsIndexed {
        written,
        already_indexed: outcome.already_indexed,
    })
}
