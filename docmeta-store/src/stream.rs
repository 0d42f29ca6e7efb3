use std::{iter::FusedIterator, sync::Arc};

use crate::{error::MetaResult, reader::MetaIndexInner, DocId};

/// Forward-only iterator over the full tuple of every document, from id 0 to
/// `size - 1`.
///
/// Holds its own reference to the mapped artifact, so it stays valid after
/// the reader it came from is closed or dropped.
#[derive(Debug)]
pub struct MetaIndexInputStream {
    inner: Arc<MetaIndexInner>,
    next: usize,
}

impl MetaIndexInputStream {
    pub(crate) fn new(inner: Arc<MetaIndexInner>) -> Self {
        Self { inner, next: 0 }
    }

    /// Id of the document the next call to `next` yields.
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn size(&self) -> usize {
        self.inner.num_documents
    }

    pub fn keys(&self) -> &[String] {
        &self.inner.schema.keys
    }
}

impl Iterator for MetaIndexInputStream {
    type Item = MetaResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.inner.num_documents {
            return None;
        }
        let id = self.next as DocId;
        self.next += 1;
        Some(self.inner.tuple(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.inner.num_documents.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MetaIndexInputStream {}

impl FusedIterator for MetaIndexInputStream {}
