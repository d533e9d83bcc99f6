//! Path segments of the hosting collections, relative to the API root.
//! Segments are unescaped; the client percent-encodes each one.

use repomirror_types::Repository;

pub fn projects() -> Vec<String> {
    vec!["projects".into()]
}

pub fn repositories(project_key: &str) -> Vec<String> {
    vec!["projects".into(), project_key.into(), "repos".into()]
}

fn repository(repo: &Repository, leaf: &str) -> Vec<String> {
    vec![
        "projects".into(),
        repo.project.key.clone(),
        "repos".into(),
        repo.slug.clone(),
        leaf.into(),
    ]
}

pub fn branches(repo: &Repository) -> Vec<String> {
    repository(repo, "branches")
}

pub fn commits(repo: &Repository) -> Vec<String> {
    repository(repo, "commits")
}

/// Listing of `dir` (`""` for the root), one segment per path component.
pub fn browse(repo: &Repository, dir: &str) -> Vec<String> {
    let mut segments = repository(repo, "browse");
    segments.extend(dir.split('/').filter(|c| !c.is_empty()).map(str::to_string));
    segments
}
