use serde::Serialize;

use repomirror_types::{BulkAction, Result, SearchIndex};

/// Pending writes for one target index, in staging order. Owned by a single
/// traversal and consumed by [`BulkIndexWriter::flush`].
#[derive(Debug, Clone)]
pub struct IndexBatch {
    index: String,
    actions: Vec<BulkAction>,
}

impl IndexBatch {
    pub fn new(index: &str) -> Self {
        Self {
            index: index.to_string(),
            actions: Vec::new(),
        }
    }

    /// Serialize `doc` and queue it. `id = None` lets the index assign a handle.
    pub fn stage<S: Serialize>(&mut self, id: Option<String>, doc: &S) -> Result<()> {
        self.actions.push(BulkAction {
            index: self.index.clone(),
            id,
            source: serde_json::to_value(doc)?,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }
}

pub struct BulkIndexWriter<'a> {
    index: &'a dyn SearchIndex,
    chunk_size: usize,
}

impl<'a> BulkIndexWriter<'a> {
    pub fn new(index: &'a dyn SearchIndex, chunk_size: usize) -> Self {
        Self {
            index,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write the batch in `chunk_size` bulk requests, in order, then refresh the
    /// target index once so following reads observe the writes. An empty batch
    /// is a no-op. Returns the number of documents written.
    pub fn flush(&self, batch: IndexBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        for chunk in batch.actions.chunks(self.chunk_size) {
            written += self.index.bulk(chunk)?;
            tracing::debug!(index = %batch.index, written, total = batch.len(), "bulk chunk written");
        }
        self.index.refresh(&batch.index)?;
        Ok(written)
    }
}
