//! Shared CLI helpers and small reusable Clap fragments
//!
//! Flags are all optional; whatever is given overrides the config file.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{ClientConfig, Mode, ServerConfig};

/// Daemon options for pullcatd
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "pullcatd - serve a flat file catalog over TCP")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long)]
    pub bind: Option<String>,

    /// Storage root the catalog is served from
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// File offered in the catalog (repeatable; replaces the configured list)
    #[arg(long = "file", action = ArgAction::Append)]
    pub files: Vec<String>,

    /// Transfer chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Config file (default: ~/.config/pullcat/pullcat.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append timestamped events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl DaemonOpts {
    pub fn apply(&self, mut cfg: ServerConfig) -> ServerConfig {
        if let Some(ref bind) = self.bind {
            cfg.bind = bind.clone();
        }
        if let Some(ref root) = self.root {
            cfg.root = root.clone();
        }
        if !self.files.is_empty() {
            cfg.files = self.files.clone();
        }
        if let Some(n) = self.chunk_size {
            cfg.chunk_size = n;
        }
        if self.log_file.is_some() {
            cfg.log_file = self.log_file.clone();
        }
        cfg
    }
}

/// Client options for pullcat
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "pullcat - list and fetch files from a pullcatd daemon")]
pub struct ClientOpts {
    /// Daemon address (host:port)
    #[arg(long)]
    pub server: Option<String>,

    /// Directory completed downloads are written to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding the batch queue and cursor
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Operating mode
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Seconds between batch runs
    #[arg(long)]
    pub batch_interval: Option<u64>,

    /// Transfer chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Keep catalog misses in the batch queue instead of skipping them
    #[arg(long)]
    pub retry_misses: bool,

    /// Extra connection attempts before giving up
    #[arg(long)]
    pub connect_retries: Option<u32>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: ~/.config/pullcat/pullcat.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append timestamped events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl ClientOpts {
    pub fn apply(&self, mut cfg: ClientConfig) -> ClientConfig {
        if let Some(ref server) = self.server {
            cfg.server = server.clone();
        }
        if let Some(ref output) = self.output {
            cfg.output_dir = output.clone();
        }
        if let Some(ref state) = self.state_dir {
            cfg.state_dir = state.clone();
        }
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if let Some(secs) = self.batch_interval {
            cfg.batch_interval_secs = secs;
        }
        if let Some(n) = self.chunk_size {
            cfg.chunk_size = n;
        }
        if self.retry_misses {
            cfg.retry_misses = true;
        }
        if let Some(n) = self.connect_retries {
            cfg.connect_retries = n;
        }
        if self.quiet {
            cfg.progress = false;
        }
        if self.log_file.is_some() {
            cfg.log_file = self.log_file.clone();
        }
        cfg
    }
}
