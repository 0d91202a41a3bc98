//! Client session: list the remote catalog and fetch files from it
//!
//! A session owns one connection for its whole lifetime and drives it with
//! strictly alternating request/response exchanges. Two operating modes share
//! the same loop:
//!
//! - interactive: one file named at the prompt per listing
//! - batch: names accumulate in a persisted queue; every batch interval the
//!   entries past the resume cursor are fetched and the cursor advances

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::config::{ClientConfig, Mode};
use crate::error::SessionError;
use crate::log::{DownloadHistory, HistoryEntry, HistoryStatus};
use crate::logger::Logger;
use crate::progress::{TransferProgress, Verdict};
use crate::protocol::{reply, timeouts::BATCH_POLL_MS, HEADER_LEN, LIST};
use crate::protocol_core::{
    decode_catalog, decode_header, ensure_dir_exists, error_reply_for, format_size,
    read_catalog_payload, read_full, sanitize_name,
};
use crate::resume::ResumeTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64 },
    NotFound,
    SizeMismatch { expected: u64, received: u64 },
    Interrupted { received: u64 },
    IoError(String),
}

impl DownloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadOutcome::Completed { .. })
    }

    /// The failure this outcome represents, if any
    pub fn error(&self, name: &str) -> Option<SessionError> {
        match self {
            DownloadOutcome::Completed { .. } => None,
            DownloadOutcome::NotFound => Some(SessionError::NotFound(name.to_string())),
            DownloadOutcome::SizeMismatch { expected, received } => {
                Some(SessionError::SizeMismatch {
                    name: name.to_string(),
                    expected: *expected,
                    received: *received,
                })
            }
            DownloadOutcome::Interrupted { .. } => {
                Some(SessionError::Interrupted(name.to_string()))
            }
            DownloadOutcome::IoError(msg) => Some(SessionError::Io(io::Error::other(msg.clone()))),
        }
    }

    fn history_status(&self) -> HistoryStatus {
        match self {
            DownloadOutcome::Completed { .. } => HistoryStatus::Completed,
            DownloadOutcome::NotFound => HistoryStatus::NotFound,
            DownloadOutcome::SizeMismatch { .. } => HistoryStatus::SizeMismatch,
            DownloadOutcome::Interrupted { .. } => HistoryStatus::Interrupted,
            DownloadOutcome::IoError(_) => HistoryStatus::Failed,
        }
    }
}

/// The person (or script) at the other end of the session
pub trait Operator {
    fn show_catalog(&mut self, catalog: &Catalog);
    /// Ask for one line of input; `None` once input is exhausted
    fn prompt(&mut self, message: &str) -> Result<Option<String>>;
}

/// Operator on stdin/stdout
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn show_catalog(&mut self, catalog: &Catalog) {
        if catalog.is_empty() {
            println!("No files available on the server.");
            return;
        }
        println!("Available files:");
        for (name, size) in catalog {
            println!("  {} - {} bytes ({})", name, size, format_size(*size));
        }
    }

    fn prompt(&mut self, message: &str) -> Result<Option<String>> {
        print!("{message}");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Why the body receive loop stopped
enum Stop {
    Done,
    Eof,
    Cancelled,
}

enum BodyError {
    Socket(io::Error),
    Local(io::Error),
}

pub struct Session<S = TcpStream> {
    stream: S,
    config: ClientConfig,
    cancel: CancelToken,
    logger: Arc<dyn Logger>,
    history: DownloadHistory,
    downloaded: HashSet<String>,
    last_batch: Option<Instant>,
    // Set once the connection can no longer be trusted to be in sync
    broken: bool,
}

impl Session<TcpStream> {
    /// Connect to the configured server.
    ///
    /// Makes `1 + connect_retries` attempts with linear backoff; failure is
    /// returned as `SessionError::Connect`.
    pub fn connect(
        config: ClientConfig,
        cancel: CancelToken,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let addr = config.server.clone();
        let mut attempt = 0u32;
        let stream = loop {
            match TcpStream::connect(&addr) {
                Ok(s) => break s,
                Err(e) if attempt < config.connect_retries && cancel.is_running() => {
                    attempt += 1;
                    eprintln!(
                        "connect {} failed ({}), retry {}/{}",
                        addr, e, attempt, config.connect_retries
                    );
                    std::thread::sleep(Duration::from_millis(
                        config.connect_backoff_ms * u64::from(attempt),
                    ));
                }
                Err(source) => return Err(SessionError::Connect { addr, source }.into()),
            }
        };
        let _ = stream.set_nodelay(true);
        logger.connected(&addr);
        Session::new(stream, config, cancel, logger)
    }
}

impl<S: Read + Write> Session<S> {
    /// Wrap an established connection; creates the output directory
    pub fn new(
        stream: S,
        config: ClientConfig,
        cancel: CancelToken,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        ensure_dir_exists(&config.output_dir)?;
        let history = DownloadHistory::new(&config.output_dir);
        Ok(Self {
            stream,
            config,
            cancel,
            logger,
            history,
            downloaded: HashSet::new(),
            last_batch: None,
            broken: false,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn downloaded(&self) -> &HashSet<String> {
        &self.downloaded
    }

    /// Main loop; returns when the operator exits, input ends or the token is cancelled
    pub fn run(&mut self, operator: &mut dyn Operator) -> Result<()> {
        let mut tracker = match self.config.mode {
            Mode::Interactive => None,
            Mode::Batch => {
                let t = ResumeTracker::open(&self.config.state_dir)?;
                println!(
                    "Resuming batch queue: {} entries, {} pending",
                    t.len(),
                    t.remaining()
                );
                Some(t)
            }
        };

        while self.cancel.is_running() {
            if self.broken {
                bail!("connection to {} lost", self.config.server);
            }
            let Some(catalog) = self.list_or_skip()? else {
                continue;
            };
            operator.show_catalog(&catalog);
            let keep_going = match tracker.as_mut() {
                None => self.interactive_step(operator, &catalog)?,
                Some(t) => self.batch_step(operator, t, catalog)?,
            };
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    /// One LIST exchange. Send/receive failures are fatal; a payload that
    /// does not decode comes back as `SessionError::ProtocolDecode`.
    pub fn request_catalog(&mut self) -> Result<Catalog> {
        let exchange = (|| -> Result<Vec<u8>> {
            self.stream.write_all(LIST.as_bytes()).context("send LIST")?;
            self.stream.flush()?;
            read_catalog_payload(&mut self.stream)
        })();
        let payload = match exchange {
            Ok(p) => p,
            Err(e) => {
                self.broken = true;
                return Err(e.context("requesting file list"));
            }
        };
        Ok(decode_catalog(&payload)?)
    }

    /// LIST, but an undecodable catalog is reported and yields `None`
    fn list_or_skip(&mut self) -> Result<Option<Catalog>> {
        match self.request_catalog() {
            Ok(c) => Ok(Some(c)),
            Err(e)
                if matches!(
                    e.downcast_ref::<SessionError>(),
                    Some(SessionError::ProtocolDecode(_))
                ) =>
            {
                eprintln!("{e}");
                self.logger.error("list", LIST, &e.to_string());
                if self.config.decode_backoff_ms > 0 {
                    std::thread::sleep(Duration::from_millis(self.config.decode_backoff_ms));
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn interactive_step(&mut self, operator: &mut dyn Operator, catalog: &Catalog) -> Result<bool> {
        let Some(line) = operator
            .prompt("Enter the name of the file you want to download (or 'exit' to quit): ")?
        else {
            println!("Exiting client.");
            return Ok(false);
        };
        let name = line.trim();
        if name.eq_ignore_ascii_case("exit") || self.cancel.is_cancelled() {
            println!("Exiting client.");
            return Ok(false);
        }
        if name.is_empty() {
            return Ok(true);
        }
        if catalog.contains_key(name) {
            self.download(name);
        } else {
            println!("File does not exist on the server. Try again!");
        }
        Ok(true)
    }

    fn batch_step(
        &mut self,
        operator: &mut dyn Operator,
        tracker: &mut ResumeTracker,
        catalog: Catalog,
    ) -> Result<bool> {
        let line = operator.prompt(
            "Add file names to the queue (comma separated, blank to continue, 'exit' to quit): ",
        )?;
        let keep_going = match line {
            None => false,
            Some(ref l) if l.trim().eq_ignore_ascii_case("exit") => {
                println!("Exiting client.");
                return Ok(false);
            }
            Some(l) => {
                let names: Vec<&str> = l.split(',').collect();
                let added = tracker.append(names.as_slice())?;
                if added > 0 {
                    println!("Queued {added} file(s); {} pending", tracker.remaining());
                }
                true
            }
        };

        let catalog = if self.wait_for_batch() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            // the listing may be stale after waiting
            match self.list_or_skip()? {
                Some(c) => c,
                None => return Ok(keep_going),
            }
        } else {
            catalog
        };
        self.process_batch(tracker, &catalog)?;
        Ok(keep_going)
    }

    /// Sleep until the batch interval since the last batch has passed.
    ///
    /// Returns whether any waiting happened.
    fn wait_for_batch(&self) -> bool {
        let Some(last) = self.last_batch else {
            return false;
        };
        let interval = Duration::from_secs(self.config.batch_interval_secs);
        let mut waited = false;
        while self.cancel.is_running() {
            let elapsed = last.elapsed();
            if elapsed >= interval {
                break;
            }
            if !waited {
                println!(
                    "Next batch in {:.0}s...",
                    (interval - elapsed).as_secs_f64()
                );
            }
            waited = true;
            std::thread::sleep((interval - elapsed).min(Duration::from_millis(BATCH_POLL_MS)));
        }
        waited
    }

    /// Process every queue entry at or past the cursor.
    ///
    /// An entry is done once its outcome is final: fetched, failed, absent
    /// from the catalog or already fetched this session. Each done entry
    /// advances the cursor by exactly one. An interrupted transfer or a lost
    /// connection stops the batch without advancing, as does a catalog miss
    /// when `retry_misses` is set.
    pub fn process_batch(&mut self, tracker: &mut ResumeTracker, catalog: &Catalog) -> Result<usize> {
        self.last_batch = Some(Instant::now());
        let mut processed = 0;
        while let Some((idx, name)) = tracker.next_pending() {
            if self.cancel.is_cancelled() || self.broken {
                break;
            }
            let name = name.to_string();
            let done = if self.downloaded.contains(&name) {
                println!("[{idx}] {name} already downloaded, skipping");
                true
            } else if !catalog.contains_key(&name) {
                println!("[{idx}] {name} does not exist on the server");
                self.logger.not_found(&name);
                !self.config.retry_misses
            } else {
                let outcome = self.download(&name);
                !matches!(outcome, DownloadOutcome::Interrupted { .. }) && !self.broken
            };
            if !done {
                break;
            }
            tracker.advance()?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Request one file and store it under the output directory.
    ///
    /// Only `Completed` leaves a file behind. The name is reduced to its base
    /// name before it is sent or used as a local path.
    pub fn download(&mut self, requested: &str) -> DownloadOutcome {
        let Some(name) = sanitize_name(requested).map(str::to_string) else {
            println!("Invalid file name: {requested:?}");
            return DownloadOutcome::NotFound;
        };
        let dest = self.config.output_dir.join(&name);
        println!("Requesting {name}...");
        let (outcome, declared) = self.fetch(&name, &dest);

        match outcome.error(&name) {
            None => {
                self.downloaded.insert(name.clone());
                self.logger.received(&name, &dest, declared.unwrap_or(0));
                println!("Finished downloading {name}.");
            }
            Some(err) => {
                if matches!(outcome, DownloadOutcome::Interrupted { .. }) {
                    println!("\nDownload interrupted. Cleaning up...");
                }
                println!("Error: {err}");
                self.logger.error("download", &name, &err.to_string());
            }
        }

        let mut entry = HistoryEntry::now(&self.config.server, &name, &dest, outcome.history_status());
        entry.declared_bytes = declared;
        entry.received_bytes = match &outcome {
            DownloadOutcome::Completed { bytes } => *bytes,
            DownloadOutcome::SizeMismatch { received, .. }
            | DownloadOutcome::Interrupted { received } => *received,
            _ => 0,
        };
        entry.error = outcome.error(&name).map(|e| e.to_string());
        if let Err(e) = self.history.add_entry(&entry) {
            eprintln!("warning: cannot record download history: {e:#}");
        }
        outcome
    }

    fn fetch(&mut self, name: &str, dest: &Path) -> (DownloadOutcome, Option<u64>) {
        if let Err(e) = self
            .stream
            .write_all(name.as_bytes())
            .and_then(|_| self.stream.flush())
        {
            self.broken = true;
            return (DownloadOutcome::IoError(format!("send request: {e}")), None);
        }

        let mut header = [0u8; HEADER_LEN];
        match read_full(&mut self.stream, &mut header) {
            Ok(HEADER_LEN) => {}
            Ok(_) => {
                self.broken = true;
                return (
                    DownloadOutcome::IoError("failed to receive file size".to_string()),
                    None,
                );
            }
            Err(e) => {
                self.broken = true;
                return (DownloadOutcome::IoError(format!("{e:#}")), None);
            }
        }
        if let Some(payload) = error_reply_for(&header) {
            let mut rest = vec![0u8; payload.len() - HEADER_LEN];
            if !matches!(read_full(&mut self.stream, &mut rest), Ok(n) if n == rest.len()) {
                self.broken = true;
            }
            let outcome = if payload == reply::NOT_FOUND {
                DownloadOutcome::NotFound
            } else {
                DownloadOutcome::IoError(String::from_utf8_lossy(payload).into_owned())
            };
            return (outcome, None);
        }

        let declared = decode_header(&header);
        let mut file = match File::create(dest) {
            Ok(f) => f,
            Err(e) => {
                // the body is already on its way; keep the stream in sync
                self.drain(declared);
                return (
                    DownloadOutcome::IoError(format!("create {}: {}", dest.display(), e)),
                    Some(declared),
                );
            }
        };
        println!("Downloading {} ({})...", name, format_size(declared));

        let mut progress = TransferProgress::new(name, declared, self.config.progress);
        let stop = receive_body(
            &mut self.stream,
            &mut file,
            &mut progress,
            &self.cancel,
            self.config.chunk_size.max(1),
        );
        let received = progress.received();
        let flushed = file.sync_all();
        drop(file);
        let verdict = progress.finish();

        let outcome = match stop {
            Ok(Stop::Cancelled) => {
                self.broken = true;
                DownloadOutcome::Interrupted { received }
            }
            Ok(Stop::Eof) => {
                self.broken = true;
                DownloadOutcome::SizeMismatch {
                    expected: declared,
                    received,
                }
            }
            // Done means every declared byte arrived; a short body is Eof
            Ok(Stop::Done) => match flushed {
                Err(e) => DownloadOutcome::IoError(format!("write {}: {}", dest.display(), e)),
                Ok(()) => {
                    debug_assert_eq!(verdict, Verdict::Verified);
                    DownloadOutcome::Completed { bytes: received }
                }
            },
            Err(BodyError::Socket(e)) => {
                self.broken = true;
                DownloadOutcome::IoError(format!("receive {name}: {e}"))
            }
            Err(BodyError::Local(e)) => {
                self.drain(declared - received);
                DownloadOutcome::IoError(format!("write {}: {}", dest.display(), e))
            }
        };

        if !outcome.is_completed() {
            if let Err(e) = std::fs::remove_file(dest) {
                if e.kind() != ErrorKind::NotFound {
                    eprintln!("warning: cannot remove partial file {}: {}", dest.display(), e);
                }
            }
        }
        (outcome, Some(declared))
    }

    /// Read and discard bytes still owed by the server
    fn drain(&mut self, mut remaining: u64) {
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            match self.stream.read(&mut buf[..want]) {
                Ok(0) => {
                    self.broken = true;
                    return;
                }
                Ok(n) => remaining -= n as u64,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => {
                    self.broken = true;
                    return;
                }
            }
        }
    }
}

/// Copy the file body into `file`, never reading past the declared size.
///
/// The cancellation token is checked before every chunk.
fn receive_body(
    stream: &mut impl Read,
    file: &mut File,
    progress: &mut TransferProgress,
    cancel: &CancelToken,
    chunk_size: usize,
) -> Result<Stop, BodyError> {
    let mut buf = vec![0u8; chunk_size];
    while !progress.is_complete() {
        if cancel.is_cancelled() {
            return Ok(Stop::Cancelled);
        }
        let owed = progress.declared() - progress.received();
        let want = owed.min(buf.len() as u64) as usize;
        let n = match stream.read(&mut buf[..want]) {
            Ok(0) => return Ok(Stop::Eof),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BodyError::Socket(e)),
        };
        file.write_all(&buf[..n]).map_err(BodyError::Local)?;
        progress.record(n);
    }
    Ok(Stop::Done)
}
