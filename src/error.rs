//! Session error taxonomy

use std::io;
use thiserror::Error;

/// Failures a client session can run into.
///
/// Only `Connect` and control-connection `Io` failures end a session; the
/// others are reported and the session carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode the file list: {0}")]
    ProtocolDecode(String),

    #[error("{0} does not exist on the server")]
    NotFound(String),

    #[error("file size mismatch for {name}: expected {expected} bytes, received {received}")]
    SizeMismatch {
        name: String,
        expected: u64,
        received: u64,
    },

    #[error("download of {0} interrupted")]
    Interrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
