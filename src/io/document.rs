use std::fs;
use std::path::{Path, PathBuf};

use crate::io::recovery::{self, RescueKind};

/// Error type for document access
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("line {pos} is out of range (document has {len} lines)")]
    OutOfRange { pos: usize, len: usize },
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A line-addressable text buffer.
///
/// `insert` refuses positions past the end; inserting at exactly `len()`
/// must go through `append`.
pub trait Document {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn line(&self, pos: usize) -> Option<&str>;

    fn set_line(&mut self, pos: usize, text: String) -> Result<(), DocumentError>;

    fn insert(&mut self, pos: usize, text: String) -> Result<(), DocumentError>;

    fn append(&mut self, text: String);

    fn remove(&mut self, pos: usize) -> Result<String, DocumentError>;

    /// Push pending changes to wherever the document lives
    fn flush(&mut self) -> Result<(), DocumentError>;
}

/// In-memory document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
    trailing_newline: bool,
    dirty: bool,
}

impl LineBuffer {
    pub fn from_text(text: &str) -> Self {
        LineBuffer {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
            dirty: false,
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LineBuffer {
            lines: lines.into_iter().map(Into::into).collect(),
            trailing_newline: true,
            dirty: false,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Whether anything changed since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn check(&self, pos: usize, limit: usize) -> Result<(), DocumentError> {
        if pos < limit {
            Ok(())
        } else {
            Err(DocumentError::OutOfRange {
                pos,
                len: self.lines.len(),
            })
        }
    }
}

impl Document for LineBuffer {
    fn len(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, pos: usize) -> Option<&str> {
        self.lines.get(pos).map(String::as_str)
    }

    fn set_line(&mut self, pos: usize, text: String) -> Result<(), DocumentError> {
        self.check(pos, self.lines.len())?;
        if self.lines[pos] != text {
            self.lines[pos] = text;
            self.dirty = true;
        }
        Ok(())
    }

    fn insert(&mut self, pos: usize, text: String) -> Result<(), DocumentError> {
        self.check(pos, self.lines.len())?;
        self.lines.insert(pos, text);
        self.dirty = true;
        Ok(())
    }

    fn append(&mut self, text: String) {
        self.lines.push(text);
        self.dirty = true;
    }

    fn remove(&mut self, pos: usize) -> Result<String, DocumentError> {
        self.check(pos, self.lines.len())?;
        self.dirty = true;
        Ok(self.lines.remove(pos))
    }

    fn flush(&mut self) -> Result<(), DocumentError> {
        self.dirty = false;
        Ok(())
    }
}

/// A document backed by a file on disk, written atomically on flush.
///
/// If the write fails the unsaved text goes to the recovery log next to the
/// file before the error is returned.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
    buffer: LineBuffer,
}

impl FileDocument {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let text = fs::read_to_string(path).map_err(|e| DocumentError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(FileDocument {
            path: path.to_path_buf(),
            buffer: LineBuffer::from_text(&text),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }
}

impl Document for FileDocument {
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn line(&self, pos: usize) -> Option<&str> {
        self.buffer.line(pos)
    }

    fn set_line(&mut self, pos: usize, text: String) -> Result<(), DocumentError> {
        self.buffer.set_line(pos, text)
    }

    fn insert(&mut self, pos: usize, text: String) -> Result<(), DocumentError> {
        self.buffer.insert(pos, text)
    }

    fn append(&mut self, text: String) {
        self.buffer.append(text)
    }

    fn remove(&mut self, pos: usize) -> Result<String, DocumentError> {
        self.buffer.remove(pos)
    }

    fn flush(&mut self) -> Result<(), DocumentError> {
        if !self.buffer.is_dirty() {
            return Ok(());
        }
        let content = self.buffer.to_text();
        if let Err(e) = recovery::write_or_rescue(&self.path, &content, RescueKind::Document) {
            return Err(DocumentError::WriteError {
                path: self.path.clone(),
                source: e,
            });
        }
        tracing::debug!(path = %self.path.display(), "document flushed");
        self.buffer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_past_end_is_rejected() {
        let mut doc = LineBuffer::from_text("a\nb\n");
        assert!(doc.insert(3, "x".into()).is_err());
        doc.insert(2, "c".into()).unwrap();
        doc.append("d".into());
        assert_eq!(doc.to_text(), "a\nb\nc\nd\n");
    }

    #[test]
    fn test_set_same_text_stays_clean() {
        let mut doc = LineBuffer::from_text("a\nb");
        doc.set_line(0, "a".into()).unwrap();
        assert!(!doc.is_dirty());
        doc.set_line(0, "z".into()).unwrap();
        assert!(doc.is_dirty());
        assert_eq!(doc.to_text(), "z\nb");
    }

    #[test]
    fn test_remove_returns_line() {
        let mut doc = LineBuffer::from_lines(["a", "b", "c"]);
        assert_eq!(doc.remove(1).unwrap(), "b");
        assert_eq!(doc.lines(), &["a".to_string(), "c".to_string()]);
        assert!(doc.remove(5).is_err());
    }

    #[test]
    fn test_file_document_flushes_atomically() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.wiki");
        fs::write(&path, "== Inbox ==\n* [ ] one\n").unwrap();

        let mut doc = FileDocument::open(&path).unwrap();
        doc.append("* [ ] two".into());
        doc.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "== Inbox ==\n* [ ] one\n* [ ] two\n"
        );
    }

    #[test]
    fn test_failed_flush_goes_to_recovery_log() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.wiki");
        fs::write(&path, "* [ ] one\n").unwrap();
        let mut doc = FileDocument::open(&path).unwrap();
        doc.append("* [ ] unsaved".into());

        // Replace the file with a directory so the rename fails
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(doc.flush(), Err(DocumentError::WriteError { .. })));
        let rescued = recovery::read_rescued(&path);
        assert_eq!(rescued.len(), 1);
        assert_eq!(rescued[0].kind, RescueKind::Document);
        assert!(rescued[0].text.contains("* [ ] unsaved"));
    }
}
