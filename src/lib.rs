//! Pullcat Library
//!
//! Catalog listing and resumable file fetching over a plain TCP connection

pub mod cancel;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod logger;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod resume;
pub mod server;
