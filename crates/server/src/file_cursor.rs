//! Byte cursor for incremental session-file reads.
//!
//! The indexer keeps one cursor per watched file so that a re-index can
//! also report *which* lines were appended since the last look, feeding
//! the `session_content_update` stream. Only complete lines (terminated
//! by `\n`) are ever returned — the external writer may be mid-append,
//! so a dangling tail waits for the next read. Truncation resets the
//! cursor to the start.

use std::path::PathBuf;
use tokio::io::{self, AsyncReadExt, AsyncSeekExt};

pub struct FileCursor {
    /// Byte offset of the first unread byte.
    position: u64,
    path: PathBuf,
}

impl FileCursor {
    /// Cursor at the start of the file: the first read returns the whole
    /// (complete-line) content. Used for files that appear after startup,
    /// where everything is new.
    pub fn new(path: PathBuf) -> Self {
        Self { position: 0, path }
    }

    /// Cursor at the current end of the file. Used when seeding cursors
    /// during the initial scan so historical content is not re-announced.
    pub async fn new_at_end(path: PathBuf) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            position: metadata.len(),
            path,
        })
    }

    /// Read all complete lines appended since the last read and advance
    /// the cursor past them.
    pub async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let file_len = file.metadata().await?.len();

        // The file shrank underneath us: start over.
        if file_len < self.position {
            self.position = 0;
        }
        if file_len == self.position {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.position)).await?;
        let mut buf = Vec::with_capacity((file_len - self.position) as usize);
        file.read_to_end(&mut buf).await?;

        // Everything up to the last newline is complete; the rest waits.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.position += complete.len() as u64;

        Ok(complete
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect())
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn append(path: &std::path::Path, content: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        write!(f, "{}", content).unwrap();
    }

    #[tokio::test]
    async fn returns_only_appended_lines() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        append(&path, "line1\nline2\n");

        let mut cursor = FileCursor::new(path.clone());
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["line1", "line2"]);
        assert!(cursor.read_new_lines().await.unwrap().is_empty());

        append(&path, "line3\n");
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["line3"]);
    }

    #[tokio::test]
    async fn incomplete_tail_waits_for_newline() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        append(&path, "done\npartial");

        let mut cursor = FileCursor::new(path.clone());
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["done"]);
        assert_eq!(cursor.position(), 5);

        append(&path, " now complete\n");
        assert_eq!(
            cursor.read_new_lines().await.unwrap(),
            vec!["partial now complete"]
        );
    }

    #[tokio::test]
    async fn truncation_resets_to_start() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        append(&path, "old-one\nold-two\n");

        let mut cursor = FileCursor::new(path.clone());
        assert_eq!(cursor.read_new_lines().await.unwrap().len(), 2);

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["new"]);
        assert_eq!(cursor.position(), 4);
    }

    #[tokio::test]
    async fn new_at_end_skips_history() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        append(&path, "history1\nhistory2\n");

        let mut cursor = FileCursor::new_at_end(path.clone()).await.unwrap();
        assert!(cursor.read_new_lines().await.unwrap().is_empty());

        append(&path, "fresh\n");
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["fresh"]);
    }
}
