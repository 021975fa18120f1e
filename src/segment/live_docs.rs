//! Live-document filtering
//!
//! Postings decoding consults an external predicate per decoded record.
//! Deletions are usually held as a roaring bitmap.

use roaring::RoaringBitmap;

use super::types::DocNo;

/// Reports whether a document is still live
pub trait LiveDocs: Send + Sync {
    fn is_live(&self, doc: DocNo) -> bool;
}

impl<F> LiveDocs for F
where
    F: Fn(DocNo) -> bool + Send + Sync,
{
    fn is_live(&self, doc: DocNo) -> bool {
        self(doc)
    }
}

/// Set of deleted documents
#[derive(Clone, Debug, Default)]
pub struct DeletedDocs {
    deleted: RoaringBitmap,
}

impl DeletedDocs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a document deleted. Returns false if it already was.
    pub fn delete(&mut self, doc: DocNo) -> bool {
        self.deleted.insert(doc.as_u32())
    }

    pub fn is_deleted(&self, doc: DocNo) -> bool {
        self.deleted.contains(doc.as_u32())
    }

    pub fn num_deleted(&self) -> u64 {
        self.deleted.len()
    }
}

impl FromIterator<DocNo> for DeletedDocs {
    fn from_iter<I: IntoIterator<Item = DocNo>>(iter: I) -> Self {
        Self {
            deleted: iter.into_iter().map(DocNo::as_u32).collect(),
        }
    }
}

impl LiveDocs for DeletedDocs {
    fn is_live(&self, doc: DocNo) -> bool {
        !self.is_deleted(doc)
    }
}
