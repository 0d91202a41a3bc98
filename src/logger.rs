use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Event sink shared by the daemon and the client
pub trait Logger: Send + Sync {
    fn connected(&self, _peer: &str) {}
    fn listed(&self, _entries: usize, _payload_bytes: usize) {}
    fn sent(&self, _name: &str, _bytes: u64) {}
    fn received(&self, _name: &str, _dst: &Path, _bytes: u64) {}
    fn not_found(&self, _name: &str) {}
    fn error(&self, _context: &str, _name: &str, _msg: &str) {}
    fn closed(&self, _peer: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn connected(&self, peer: &str) {
        self.line(&format!("CONNECT peer={peer}"));
    }
    fn listed(&self, entries: usize, payload_bytes: usize) {
        self.line(&format!("LIST entries={entries} bytes={payload_bytes}"));
    }
    fn sent(&self, name: &str, bytes: u64) {
        self.line(&format!("SEND name={name} bytes={bytes}"));
    }
    fn received(&self, name: &str, dst: &Path, bytes: u64) {
        self.line(&format!(
            "RECV name={} dst={} bytes={}",
            name,
            dst.display(),
            bytes
        ));
    }
    fn not_found(&self, name: &str) {
        self.line(&format!("NOTFOUND name={name}"));
    }
    fn error(&self, context: &str, name: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} name={name} msg={msg}"));
    }
    fn closed(&self, peer: &str) {
        self.line(&format!("CLOSE peer={peer}"));
    }
}

/// Pick the logger once; `NoopLogger` when no log file is configured or it cannot be opened
pub fn from_option(path: Option<&Path>) -> Arc<dyn Logger> {
    match path {
        Some(p) => match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {}", p.display(), e);
                Arc::new(NoopLogger)
            }
        },
        None => Arc::new(NoopLogger),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_logger_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("pullcat.log");
        let logger = TextLogger::new(&path).unwrap();
        logger.connected("127.0.0.1:5000");
        logger.sent("a.bin", 10);
        logger.not_found("zzz");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("CONNECT peer=127.0.0.1:5000"));
        assert!(lines[1].ends_with("SEND name=a.bin bytes=10"));
        assert!(lines[2].starts_with('['));
    }
}
