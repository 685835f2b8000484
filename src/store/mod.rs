mod fs;
pub mod path;

pub use fs::FsStore;

use crate::error::Result;

/// A page at its current revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub revision: u64,
}

/// One parsed line of a space's change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    /// Seconds since the epoch, UTC.
    pub timestamp: i64,
    pub name: String,
    /// 0 for a binary file write.
    pub revision: u64,
    /// Four octal digits standing in for the author's IP.
    pub code: String,
}

impl ChangeEntry {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.revision == 0
    }
}

/// Store defines the wiki persistence interface.
///
/// Writes to the same `(space, name)` are totally ordered; revision
/// numbers are consecutive under that order.
pub trait Store: Send + Sync {
    /// Current revision of a page.
    fn read_page(&self, space: &str, name: &str) -> Result<Page>;

    /// A specific kept revision of a page.
    fn read_page_revision(&self, space: &str, name: &str, revision: u64) -> Result<String>;

    /// Commit a new revision. An empty `text` deletes the page while
    /// keeping its history. Returns the committed revision number.
    fn write_page(&self, space: &str, name: &str, text: &str, code: &str) -> Result<u64>;

    /// Raw bytes and declared content type of an uploaded file.
    fn read_file(&self, space: &str, name: &str) -> Result<(Vec<u8>, String)>;

    /// Overwrite a file and its content-type sidecar. Last writer wins.
    fn write_file(&self, space: &str, name: &str, data: &[u8], mime: &str, code: &str)
        -> Result<()>;

    /// Ordered names of all current pages in a space.
    fn list_pages(&self, space: &str) -> Result<Vec<String>>;

    /// Kept revision numbers of a page plus its current one, descending.
    fn list_revisions(&self, space: &str, name: &str) -> Result<Vec<u64>>;

    /// Change-log entries, newest first.
    fn read_changes(&self, space: &str, limit: usize, offset: usize) -> Result<Vec<ChangeEntry>>;
}
