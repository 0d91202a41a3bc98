//! TOML configuration shared by `pullcat` and `pullcatd`
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags are applied on top (see `cli.rs`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::default_files;
use crate::protocol::{CHUNK_SIZE, DEFAULT_HOST, DEFAULT_PORT};

/// How the client decides what to download after each listing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One file per listing, named at the prompt
    #[default]
    Interactive,
    /// Names accumulate in a persisted queue, processed every batch interval
    Batch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// host:port of the daemon
    pub server: String,
    pub output_dir: PathBuf,
    /// Where the batch queue and cursor live
    pub state_dir: PathBuf,
    pub mode: Mode,
    pub batch_interval_secs: u64,
    pub chunk_size: usize,
    /// Stop a batch at a catalog miss instead of skipping past it
    pub retry_misses: bool,
    /// Extra connect attempts after the first one fails
    pub connect_retries: u32,
    pub connect_backoff_ms: u64,
    /// Pause before re-listing after an undecodable catalog
    pub decode_backoff_ms: u64,
    pub progress: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            output_dir: PathBuf::from("output"),
            state_dir: PathBuf::from(".pullcat"),
            mode: Mode::Interactive,
            batch_interval_secs: 20,
            chunk_size: CHUNK_SIZE,
            retry_misses: false,
            connect_retries: 0,
            connect_backoff_ms: 500,
            decode_backoff_ms: 0,
            progress: true,
            log_file: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Storage root the catalog is scanned against
    pub root: PathBuf,
    /// Names offered in the catalog
    pub files: Vec<String>,
    pub chunk_size: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            root: PathBuf::from("."),
            files: default_files(),
            chunk_size: CHUNK_SIZE,
            log_file: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("Pullcat");
        }
    }
    // Unix-like default
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("pullcat");
    }
    PathBuf::from(".pullcat")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("pullcat.toml")
}

/// Load `explicit` (which must exist) or the default config path (which may not)
pub fn load(explicit: Option<&Path>) -> Result<ConfigFile> {
    match explicit {
        Some(p) => parse_file(p),
        None => {
            let p = default_config_path();
            if p.exists() {
                parse_file(&p)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

fn parse_file(path: &Path) -> Result<ConfigFile> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = ConfigFile::default();
        assert_eq!(cfg.client.server, "127.0.0.1:65432");
        assert_eq!(cfg.client.batch_interval_secs, 20);
        assert_eq!(cfg.client.chunk_size, 4096);
        assert_eq!(cfg.client.mode, Mode::Interactive);
        assert_eq!(cfg.server.files.len(), 5);
        assert!(!cfg.client.retry_misses);
        assert_eq!(cfg.client.connect_retries, 0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pullcat.toml");
        std::fs::write(
            &path,
            r#"
[client]
mode = "batch"
batch_interval_secs = 5

[server]
files = ["a.bin", "b.bin"]
"#,
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.client.mode, Mode::Batch);
        assert_eq!(cfg.client.batch_interval_secs, 5);
        assert_eq!(cfg.client.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.server.files, ["a.bin", "b.bin"]);
        assert_eq!(cfg.server.chunk_size, 4096);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pullcat.toml");
        std::fs::write(&path, "[client]\nmode = \"turbo\"\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
