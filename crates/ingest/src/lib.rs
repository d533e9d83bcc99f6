//! Crawls the hosting service's project → repository → branch hierarchy and
//! mirrors it into a [`repomirror_types::SearchIndex`].

mod catalog;
mod client;
mod commits;
pub mod endpoints;
mod pager;
mod tree;

pub use catalog::CatalogSync;
pub use client::HostingClient;
pub use commits::{index_commits, CommitCollector, CommitScanOutcome, CommitsIndexed};
pub use pager::{read_all, Envelope, Pager};
pub use tree::{index_tree, TreeWalker};
