//! Transfer responder: the daemon half of the protocol
//!
//! One connection is serviced to completion before the next is accepted.
//! Within a connection every request gets exactly one response:
//!
//! - `LIST` → length-prefixed JSON catalog
//! - anything else → a filename; 8-byte big-endian size followed by the
//!   file bytes, or a fixed error payload

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use crate::catalog::CatalogProvider;
use crate::config::ServerConfig;
use crate::logger::Logger;
use crate::protocol::{reply, CHUNK_SIZE, LIST};
use crate::protocol_core::{encode_header, write_catalog};

#[derive(Debug, PartialEq, Eq)]
pub enum Request<'a> {
    List,
    File(&'a str),
}

impl<'a> Request<'a> {
    pub fn parse(token: &'a str) -> Self {
        let token = token.trim();
        if token == LIST {
            Request::List
        } else {
            Request::File(token)
        }
    }
}

/// What a file request turned into
#[derive(Debug, PartialEq, Eq)]
pub enum FileReply {
    Sent { name: String, bytes: u64 },
    NotFound,
    Unreadable,
}

pub struct Responder {
    provider: CatalogProvider,
    chunk_size: usize,
    logger: Arc<dyn Logger>,
}

impl Responder {
    pub fn new(provider: CatalogProvider, chunk_size: usize, logger: Arc<dyn Logger>) -> Self {
        Self {
            provider,
            chunk_size: chunk_size.max(1),
            logger,
        }
    }

    /// Serve requests until the peer closes the connection.
    ///
    /// An `Err` means the connection is no longer usable and must be dropped.
    pub fn handle_conn<S: Read + Write>(&self, stream: &mut S) -> Result<()> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("read request"),
            };
            let token = String::from_utf8_lossy(&buf[..n]);
            match Request::parse(&token) {
                Request::List => self.send_catalog(stream)?,
                Request::File(requested) => {
                    match self.send_file(stream, requested)? {
                        FileReply::Sent { name, bytes } => {
                            eprintln!("sent {name} ({bytes} bytes)");
                            self.logger.sent(&name, bytes);
                        }
                        FileReply::NotFound => {
                            eprintln!("requested file not found: {requested}");
                            self.logger.not_found(requested);
                        }
                        FileReply::Unreadable => {}
                    }
                }
            }
        }
    }

    fn send_catalog<W: Write>(&self, stream: &mut W) -> Result<()> {
        let catalog = self.provider.build();
        let sent = write_catalog(stream, &catalog)?;
        eprintln!("sent file list ({} entries, {} bytes)", catalog.len(), sent);
        self.logger.listed(catalog.len(), sent);
        Ok(())
    }

    /// Stream one file, or answer with a fixed error payload.
    ///
    /// The header is written only after the file has been opened and sized.
    /// A read failure after that point cannot be signalled in-band, so it is
    /// returned as an error and the connection gets dropped.
    pub fn send_file<W: Write>(&self, stream: &mut W, requested: &str) -> Result<FileReply> {
        let Some((name, path)) = self.provider.resolve(requested) else {
            stream.write_all(reply::NOT_FOUND)?;
            return Ok(FileReply::NotFound);
        };
        let opened = File::open(&path).and_then(|f| {
            let len = f.metadata()?.len();
            Ok((f, len))
        });
        let (mut file, size) = match opened {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                stream.write_all(reply::NOT_FOUND)?;
                return Ok(FileReply::NotFound);
            }
            Err(e) => {
                eprintln!("failed to read file {}: {}", path.display(), e);
                self.logger.error("open", &name, &e.to_string());
                stream.write_all(reply::SEND_FAILED)?;
                return Ok(FileReply::Unreadable);
            }
        };

        stream.write_all(&encode_header(size))?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent = 0u64;
        while sent < size {
            let want = (size - sent).min(buf.len() as u64) as usize;
            let n = match file.read(&mut buf[..want]) {
                Ok(0) => anyhow::bail!(
                    "{} shrank during transfer ({} of {} bytes sent)",
                    path.display(),
                    sent,
                    size
                ),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.logger.error("read", &name, &e.to_string());
                    return Err(e).with_context(|| format!("read {}", path.display()));
                }
            };
            stream.write_all(&buf[..n])?;
            sent += n as u64;
        }
        stream.flush()?;
        Ok(FileReply::Sent { name, bytes: sent })
    }
}

/// Bind and serve forever
pub fn serve(cfg: &ServerConfig, logger: Arc<dyn Logger>) -> Result<()> {
    let listener = TcpListener::bind(&cfg.bind).with_context(|| format!("bind {}", cfg.bind))?;
    let provider = CatalogProvider::new(&cfg.root, cfg.files.clone());
    eprintln!(
        "pullcatd listening on {} root={}",
        cfg.bind,
        provider.root().display()
    );
    serve_listener(listener, &Responder::new(provider, cfg.chunk_size, logger))
}

/// Accept loop over an already bound listener; one connection at a time
pub fn serve_listener(listener: TcpListener, responder: &Responder) -> Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(mut stream) => serve_conn(&mut stream, responder),
            Err(e) => {
                eprintln!("accept error: {}", e);
            }
        }
    }
    Ok(())
}

fn serve_conn(stream: &mut TcpStream, responder: &Responder) {
    let _ = stream.set_nodelay(true);
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    eprintln!("connected by {}", peer);
    responder.logger.connected(&peer);
    if let Err(e) = responder.handle_conn(stream) {
        eprintln!(
            "connection error during handling (possible client disconnect): {:#}",
            e
        );
        responder.logger.error("conn", &peer, &format!("{e:#}"));
    }
    eprintln!("connection closed for {}", peer);
    responder.logger.closed(&peer);
}
