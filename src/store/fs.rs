use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::warn;

use super::path::validate_name;
use super::{ChangeEntry, Page, Store};
use crate::error::{Error, Result};

const FIELD_SEPARATOR: char = '\u{1f}';

/// Filesystem-backed wiki store.
///
/// Layout per space root: `page/<name>.gmi`, `keep/<name>/<rev>.gmi`,
/// `file/<name>`, `meta/<name>`, `index`, `changes.log`. The root space
/// lives directly in the base directory, named spaces one level below.
pub struct FsStore {
    base: PathBuf,
    write_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
    log_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsStore {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            write_locks: Mutex::new(HashMap::new()),
            log_locks: Mutex::new(HashMap::new()),
        }
    }

    fn space_dir(&self, space: &str) -> PathBuf {
        if space.is_empty() {
            self.base.clone()
        } else {
            self.base.join(space)
        }
    }

    fn page_path(&self, space: &str, name: &str) -> PathBuf {
        self.space_dir(space).join("page").join(format!("{name}.gmi"))
    }

    fn keep_dir(&self, space: &str, name: &str) -> PathBuf {
        self.space_dir(space).join("keep").join(name)
    }

    fn file_path(&self, space: &str, name: &str) -> PathBuf {
        self.space_dir(space).join("file").join(name)
    }

    fn meta_path(&self, space: &str, name: &str) -> PathBuf {
        self.space_dir(space).join("meta").join(name)
    }

    fn index_path(&self, space: &str) -> PathBuf {
        self.space_dir(space).join("index")
    }

    fn log_path(&self, space: &str) -> PathBuf {
        self.space_dir(space).join("changes.log")
    }

    fn write_lock(&self, space: &str, name: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((space.to_string(), name.to_string()))
            .or_default()
            .clone()
    }

    fn log_lock(&self, space: &str) -> Arc<Mutex<()>> {
        self.log_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(space.to_string())
            .or_default()
            .clone()
    }

    /// Highest revision number sitting in the keep area, 0 if none.
    fn keep_max(&self, space: &str, name: &str) -> u64 {
        let Ok(entries) = fs::read_dir(self.keep_dir(space, name)) else {
            return 0;
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let file_name = e.file_name();
                let stem = file_name.to_str()?.strip_suffix(".gmi")?;
                stem.parse::<u64>().ok()
            })
            .max()
            .unwrap_or(0)
    }

    /// Newest revision the change log records for a page.
    ///
    /// The log is authoritative for numbering: a deletion consumes a
    /// revision whose content never reaches the keep area, so the keep
    /// scan alone would hand that number out twice.
    fn last_logged_revision(&self, space: &str, name: &str) -> u64 {
        let Ok(content) = fs::read_to_string(self.log_path(space)) else {
            return 0;
        };
        content
            .lines()
            .filter_map(parse_entry)
            .filter(|e| e.name == name && e.revision > 0)
            .map(|e| e.revision)
            .max()
            .unwrap_or(0)
    }

    /// Revision the page is currently at, 0 if it was never written.
    fn current_revision(&self, space: &str, name: &str) -> u64 {
        let keep_max = self.keep_max(space, name);
        let primary = self.page_path(space, name).is_file();
        let from_files = if primary || keep_max > 0 {
            keep_max + 1
        } else {
            0
        };
        from_files.max(self.last_logged_revision(space, name))
    }

    fn append_change(&self, space: &str, name: &str, revision: u64, code: &str) -> Result<()> {
        let lock = self.log_lock(space);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let line = format!(
            "{}{sep}{}{sep}{}{sep}{}\n",
            Utc::now().timestamp(),
            name,
            revision,
            code,
            sep = FIELD_SEPARATOR,
        );
        let mut log = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.log_path(space))?;
        log.write_all(line.as_bytes())?;
        Ok(())
    }

    fn invalidate_index(&self, space: &str) {
        if let Err(e) = fs::remove_file(self.index_path(space)) {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to invalidate index: {e}");
            }
        }
    }
}

fn map_not_found(e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound
    } else {
        Error::Io(e)
    }
}

/// Write via a dot-prefixed temp file and rename within the directory, so
/// readers only ever observe complete files.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("no parent directory: {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("bad path: {}", path.display())))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn parse_entry(line: &str) -> Option<ChangeEntry> {
    let mut fields = line.split(FIELD_SEPARATOR);
    let timestamp = fields.next()?.parse().ok()?;
    let name = fields.next()?.to_string();
    let revision = fields.next()?.parse().ok()?;
    let code = fields.next()?.to_string();
    if fields.next().is_some() {
        return None;
    }
    Some(ChangeEntry {
        timestamp,
        name,
        revision,
        code,
    })
}

impl Store for FsStore {
    fn read_page(&self, space: &str, name: &str) -> Result<Page> {
        validate_name(name)?;
        let text = fs::read_to_string(self.page_path(space, name)).map_err(map_not_found)?;
        Ok(Page {
            text,
            revision: self.current_revision(space, name),
        })
    }

    fn read_page_revision(&self, space: &str, name: &str, revision: u64) -> Result<String> {
        validate_name(name)?;
        let keep = self.keep_dir(space, name).join(format!("{revision}.gmi"));
        match fs::read_to_string(&keep) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let primary = self.page_path(space, name);
                if primary.is_file() && self.current_revision(space, name) == revision {
                    fs::read_to_string(primary).map_err(map_not_found)
                } else {
                    Err(Error::NotFound)
                }
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_page(&self, space: &str, name: &str, text: &str, code: &str) -> Result<u64> {
        validate_name(name)?;
        let lock = self.write_lock(space, name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.current_revision(space, name);
        let primary = self.page_path(space, name);
        if current >= 1 && primary.is_file() {
            let old = fs::read(&primary)?;
            let keep = self.keep_dir(space, name).join(format!("{current}.gmi"));
            write_atomic(&keep, &old)?;
        }

        if text.is_empty() {
            match fs::remove_file(&primary) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        } else {
            write_atomic(&primary, text.as_bytes())?;
        }

        let revision = current + 1;
        if let Err(e) = self.append_change(space, name, revision, code) {
            warn!("page committed but change log append failed: {e}");
        }
        self.invalidate_index(space);
        Ok(revision)
    }

    fn read_file(&self, space: &str, name: &str) -> Result<(Vec<u8>, String)> {
        validate_name(name)?;
        let data = fs::read(self.file_path(space, name)).map_err(map_not_found)?;
        let meta = fs::read_to_string(self.meta_path(space, name)).map_err(map_not_found)?;
        let mime = meta
            .strip_prefix("content-type:")
            .map_or("application/octet-stream", str::trim)
            .to_string();
        Ok((data, mime))
    }

    fn write_file(
        &self,
        space: &str,
        name: &str,
        data: &[u8],
        mime: &str,
        code: &str,
    ) -> Result<()> {
        validate_name(name)?;
        let lock = self.write_lock(space, name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let meta_path = self.meta_path(space, name);
        let had_meta = meta_path.is_file();
        write_atomic(&meta_path, format!("content-type: {mime}\n").as_bytes())?;
        if let Err(e) = write_atomic(&self.file_path(space, name), data) {
            if !had_meta {
                let _ = fs::remove_file(&meta_path);
            }
            return Err(e);
        }

        if let Err(e) = self.append_change(space, name, 0, code) {
            warn!("file committed but change log append failed: {e}");
        }
        Ok(())
    }

    fn list_pages(&self, space: &str) -> Result<Vec<String>> {
        let index_path = self.index_path(space);
        match fs::read_to_string(&index_path) {
            Ok(content) => Ok(content.lines().map(String::from).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut names = Vec::new();
                match fs::read_dir(self.space_dir(space).join("page")) {
                    Ok(entries) => {
                        for entry in entries {
                            let entry = entry?;
                            let file_name = entry.file_name();
                            if let Some(stem) =
                                file_name.to_str().and_then(|n| n.strip_suffix(".gmi"))
                            {
                                names.push(stem.to_string());
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
                names.sort();
                let mut body = names.join("\n");
                if !body.is_empty() {
                    body.push('\n');
                }
                if let Err(e) = write_atomic(&index_path, body.as_bytes()) {
                    warn!("failed to cache page index: {e}");
                }
                Ok(names)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn list_revisions(&self, space: &str, name: &str) -> Result<Vec<u64>> {
        validate_name(name)?;
        let mut revisions: Vec<u64> = match fs::read_dir(self.keep_dir(space, name)) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let file_name = e.file_name();
                    let stem = file_name.to_str()?.strip_suffix(".gmi")?;
                    stem.parse().ok()
                })
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        if self.page_path(space, name).is_file() {
            let current = self.current_revision(space, name);
            if !revisions.contains(&current) {
                revisions.push(current);
            }
        }
        if revisions.is_empty() {
            return Err(Error::NotFound);
        }
        revisions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(revisions)
    }

    fn read_changes(&self, space: &str, limit: usize, offset: usize) -> Result<Vec<ChangeEntry>> {
        let content = match fs::read_to_string(self.log_path(space)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(content
            .lines()
            .filter_map(parse_entry)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn test_write_and_read_page() {
        let (_tmp, store) = store();
        let rev = store.write_page("", "Welcome", "hello world\n", "0123").unwrap();
        assert_eq!(rev, 1);

        let page = store.read_page("", "Welcome").unwrap();
        assert_eq!(page.text, "hello world\n");
        assert_eq!(page.revision, 1);
    }

    #[test]
    fn test_revisions_are_consecutive() {
        let (_tmp, store) = store();
        for i in 1..=4u64 {
            let rev = store
                .write_page("", "Page", &format!("v{i}\n"), "0000")
                .unwrap();
            assert_eq!(rev, i);
        }
        for i in 1..=4u64 {
            assert_eq!(store.read_page_revision("", "Page", i).unwrap(), format!("v{i}\n"));
        }
        assert!(store.read_page_revision("", "Page", 5).is_err());
    }

    #[test]
    fn test_empty_write_deletes_but_keeps_history() {
        let (_tmp, store) = store();
        store.write_page("", "Doomed", "content\n", "0000").unwrap();
        let rev = store.write_page("", "Doomed", "", "0000").unwrap();
        assert_eq!(rev, 2);

        assert!(matches!(store.read_page("", "Doomed"), Err(Error::NotFound)));
        assert_eq!(store.read_page_revision("", "Doomed", 1).unwrap(), "content\n");
    }

    #[test]
    fn test_revision_numbering_survives_deletion() {
        let (_tmp, store) = store();
        store.write_page("", "Phoenix", "first\n", "0000").unwrap();
        store.write_page("", "Phoenix", "", "0000").unwrap();
        let rev = store.write_page("", "Phoenix", "reborn\n", "0000").unwrap();
        assert_eq!(rev, 3);
        assert_eq!(store.read_page("", "Phoenix").unwrap().revision, 3);
    }

    #[test]
    fn test_file_roundtrip() {
        let (_tmp, store) = store();
        let data = vec![0xffu8, 0xd8, 0xff, 0xe0];
        store
            .write_file("", "jupiter.jpg", &data, "image/jpeg", "0000")
            .unwrap();
        let (bytes, mime) = store.read_file("", "jupiter.jpg").unwrap();
        assert_eq!(bytes, data);
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn test_file_overwrite_last_writer_wins() {
        let (_tmp, store) = store();
        store.write_file("", "f", b"one", "text/plain", "0000").unwrap();
        store.write_file("", "f", b"two", "text/csv", "0000").unwrap();
        let (bytes, mime) = store.read_file("", "f").unwrap();
        assert_eq!(bytes, b"two");
        assert_eq!(mime, "text/csv");
    }

    #[test]
    fn test_list_pages_and_index_cache() {
        let (tmp, store) = store();
        store.write_page("", "Beta", "b\n", "0000").unwrap();
        store.write_page("", "Alpha", "a\n", "0000").unwrap();

        assert_eq!(store.list_pages("").unwrap(), vec!["Alpha", "Beta"]);
        let cached = fs::read_to_string(tmp.path().join("index")).unwrap();
        assert_eq!(cached, "Alpha\nBeta\n");

        // Regeneration after invalidation is idempotent.
        fs::remove_file(tmp.path().join("index")).unwrap();
        assert_eq!(store.list_pages("").unwrap(), vec!["Alpha", "Beta"]);
        assert_eq!(fs::read_to_string(tmp.path().join("index")).unwrap(), cached);
    }

    #[test]
    fn test_index_invalidated_by_write() {
        let (tmp, store) = store();
        store.write_page("", "One", "1\n", "0000").unwrap();
        store.list_pages("").unwrap();
        assert!(tmp.path().join("index").is_file());

        store.write_page("", "Two", "2\n", "0000").unwrap();
        assert!(!tmp.path().join("index").is_file());
        assert_eq!(store.list_pages("").unwrap(), vec!["One", "Two"]);
    }

    #[test]
    fn test_changes_newest_first() {
        let (_tmp, store) = store();
        store.write_page("", "A", "1\n", "0001").unwrap();
        store.write_page("", "B", "1\n", "0002").unwrap();
        store.write_file("", "f.bin", b"x", "application/octet-stream", "0003").unwrap();

        let changes = store.read_changes("", 10, 0).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].name, "f.bin");
        assert!(changes[0].is_file());
        assert_eq!(changes[1].name, "B");
        assert_eq!(changes[1].revision, 1);
        assert_eq!(changes[2].name, "A");

        let paged = store.read_changes("", 1, 1).unwrap();
        assert_eq!(paged[0].name, "B");
    }

    #[test]
    fn test_changes_tolerate_partial_tail() {
        let (tmp, store) = store();
        store.write_page("", "A", "1\n", "0001").unwrap();
        let log_path = tmp.path().join("changes.log");
        let mut log = OpenOptions::new().append(true).open(&log_path).unwrap();
        log.write_all(b"1700000000\x1ftruncated").unwrap();

        let changes = store.read_changes("", 10, 0).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "A");
    }

    #[test]
    fn test_spaces_are_isolated() {
        let (_tmp, store) = store();
        store.write_page("", "Root", "r\n", "0000").unwrap();
        store.write_page("docs", "Doc", "d\n", "0000").unwrap();

        assert_eq!(store.list_pages("").unwrap(), vec!["Root"]);
        assert_eq!(store.list_pages("docs").unwrap(), vec!["Doc"]);
        assert!(store.read_page("docs", "Root").is_err());
    }

    #[test]
    fn test_names_with_spaces_roundtrip() {
        let (_tmp, store) = store();
        let name = "2024-01-15 Journal";
        store.write_page("", name, "today\n", "0000").unwrap();
        assert_eq!(store.read_page("", name).unwrap().text, "today\n");
        assert_eq!(store.list_pages("").unwrap(), vec![name]);
        assert_eq!(store.read_changes("", 1, 0).unwrap()[0].name, name);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (_tmp, store) = store();
        assert!(store.write_page("", "../escape", "x", "0000").is_err());
        assert!(store.write_page("", ".hidden", "x", "0000").is_err());
        assert!(store.read_page("", "a/b").is_err());
    }
}
