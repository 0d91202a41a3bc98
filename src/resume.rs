//! Batch resume state: the Pending Filename Queue and the Download Cursor
//!
//! The queue is an append-only text file with one filename per line. The
//! cursor counts how many queue entries have been processed and is rewritten
//! atomically after every advance, so a crash loses at most the entry that
//! was in flight.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::protocol_core::ensure_dir_exists;

pub const QUEUE_FILE: &str = "queue.txt";
pub const CURSOR_FILE: &str = "cursor.txt";

pub struct ResumeTracker {
    queue_path: PathBuf,
    cursor_path: PathBuf,
    queue: Vec<String>,
    cursor: usize,
}

impl ResumeTracker {
    /// Load queue and cursor from `state_dir`, creating the directory if needed.
    ///
    /// A cursor beyond the end of the queue is clamped to the queue length.
    pub fn open(state_dir: &Path) -> Result<Self> {
        ensure_dir_exists(state_dir)?;
        let queue_path = state_dir.join(QUEUE_FILE);
        let cursor_path = state_dir.join(CURSOR_FILE);
        let queue = read_queue(&queue_path)?;
        let stored = read_cursor(&cursor_path)?;
        let cursor = stored.min(queue.len());
        if cursor != stored {
            eprintln!(
                "warning: cursor {} exceeds queue length {}, clamping",
                stored,
                queue.len()
            );
        }
        Ok(Self {
            queue_path,
            cursor_path,
            queue,
            cursor,
        })
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Entries not yet processed
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    /// The next unprocessed entry, if any
    pub fn next_pending(&self) -> Option<(usize, &str)> {
        self.queue
            .get(self.cursor)
            .map(|name| (self.cursor, name.as_str()))
    }

    /// Append names to the queue file and the in-memory queue.
    ///
    /// Blank names are ignored. Returns the number of names appended.
    pub fn append<S: AsRef<str>>(&mut self, names: &[S]) -> Result<usize> {
        let names: Vec<&str> = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(0);
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)
            .with_context(|| format!("open queue {}", self.queue_path.display()))?;
        for name in &names {
            writeln!(f, "{name}")?;
        }
        f.sync_all().context("sync queue")?;
        self.queue.extend(names.iter().map(|n| n.to_string()));
        Ok(names.len())
    }

    /// Mark the entry at the cursor processed and persist the new cursor
    pub fn advance(&mut self) -> Result<usize> {
        if self.cursor >= self.queue.len() {
            bail!("cursor {} already at end of queue", self.cursor);
        }
        let next = self.cursor + 1;
        write_cursor(&self.cursor_path, next)?;
        self.cursor = next;
        Ok(next)
    }
}

fn read_queue(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open queue {}", path.display()))?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        names.push(name.to_string());
    }
    Ok(names)
}

fn read_cursor(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read cursor {}", path.display()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .with_context(|| format!("cursor file {} holds {:?}, not a count", path.display(), text))
}

fn write_cursor(path: &Path, value: usize) -> Result<()> {
    let dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    // atomic write
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    write!(tmp, "{value}")?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("persist cursor {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_state() {
        let dir = TempDir::new().unwrap();
        let tracker = ResumeTracker::open(&dir.path().join("state")).unwrap();
        assert_eq!(tracker.cursor(), 0);
        assert!(tracker.is_empty());
        assert!(tracker.next_pending().is_none());
    }

    #[test]
    fn test_append_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ResumeTracker::open(dir.path()).unwrap();
        assert_eq!(tracker.append(&["a.bin", "  ", "b.bin"]).unwrap(), 2);
        assert_eq!(tracker.append(&["c.bin"]).unwrap(), 1);

        let text = fs::read_to_string(dir.path().join(QUEUE_FILE)).unwrap();
        assert_eq!(text, "a.bin\nb.bin\nc.bin\n");

        let reloaded = ResumeTracker::open(dir.path()).unwrap();
        assert_eq!(reloaded.queue(), ["a.bin", "b.bin", "c.bin"]);
    }

    #[test]
    fn test_advance_persists_each_step() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ResumeTracker::open(dir.path()).unwrap();
        tracker.append(&["a.bin", "b.bin"]).unwrap();

        assert_eq!(tracker.advance().unwrap(), 1);
        assert_eq!(fs::read_to_string(dir.path().join(CURSOR_FILE)).unwrap(), "1");
        assert_eq!(tracker.next_pending(), Some((1, "b.bin")));

        assert_eq!(tracker.advance().unwrap(), 2);
        assert!(tracker.advance().is_err());
        assert_eq!(ResumeTracker::open(dir.path()).unwrap().cursor(), 2);
    }

    #[test]
    fn test_resume_skips_processed_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(QUEUE_FILE), "a.bin\nb.bin\nc.bin\n").unwrap();
        fs::write(dir.path().join(CURSOR_FILE), "2").unwrap();

        let tracker = ResumeTracker::open(dir.path()).unwrap();
        assert_eq!(tracker.cursor(), 2);
        assert_eq!(tracker.remaining(), 1);
        assert_eq!(tracker.next_pending(), Some((2, "c.bin")));
    }

    #[test]
    fn test_cursor_clamped_to_queue_length() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(QUEUE_FILE), "a.bin\n").unwrap();
        fs::write(dir.path().join(CURSOR_FILE), "9\n").unwrap();
        let tracker = ResumeTracker::open(dir.path()).unwrap();
        assert_eq!(tracker.cursor(), 1);
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn test_garbage_cursor_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURSOR_FILE), "-3").unwrap();
        assert!(ResumeTracker::open(dir.path()).is_err());
    }
}
