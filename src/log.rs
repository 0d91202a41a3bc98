use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = ".pullcat_history.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Completed,
    NotFound,
    SizeMismatch,
    Interrupted,
    Failed,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub server: String,
    pub name: String,
    pub destination: PathBuf,
    pub status: HistoryStatus,
    pub declared_bytes: Option<u64>,
    pub received_bytes: u64,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn now(server: &str, name: &str, destination: &Path, status: HistoryStatus) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            server: server.to_string(),
            name: name.to_string(),
            destination: destination.to_path_buf(),
            status,
            declared_bytes: None,
            received_bytes: 0,
            error: None,
        }
    }
}

/// Append-only record of every download attempt, kept next to the downloads
pub struct DownloadHistory {
    path: PathBuf,
}

impl DownloadHistory {
    pub fn new(output_root: &Path) -> Self {
        DownloadHistory {
            path: output_root.join(HISTORY_FILE),
        }
    }

    pub fn add_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open download history")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).context("Failed to open download history for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: HistoryEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_round_trip() {
        let dir = TempDir::new().unwrap();
        let history = DownloadHistory::new(dir.path());
        assert!(history.read().unwrap().is_empty());

        let mut entry = HistoryEntry::now("127.0.0.1:65432", "a.bin", &dir.path().join("a.bin"), HistoryStatus::Completed);
        entry.declared_bytes = Some(10);
        entry.received_bytes = 10;
        history.add_entry(&entry).unwrap();
        history
            .add_entry(&HistoryEntry::now("127.0.0.1:65432", "zzz", &dir.path().join("zzz"), HistoryStatus::NotFound))
            .unwrap();

        let entries = history.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, HistoryStatus::Completed);
        assert_eq!(entries[0].declared_bytes, Some(10));
        assert_eq!(entries[1].name, "zzz");
    }
}
