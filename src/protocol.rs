//! Shared protocol constants for the pullcat wire format

/// Request token asking the daemon for its catalog
pub const LIST: &str = "LIST";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 65432;

// Fixed transfer buffer; also the maximum size of a single request token
pub const CHUNK_SIZE: usize = 4096;

// Width of the big-endian size prefix in front of file bytes and catalog payloads
pub const HEADER_LEN: usize = 8;

// Upper bound for a catalog payload; a flat catalog of names never gets close
pub const MAX_CATALOG_SIZE: u64 = 16 * 1024 * 1024;

// Fixed error payloads, sent raw in place of a header
pub mod reply {
    pub const NOT_FOUND: &[u8] = b"File not found";
    pub const SEND_FAILED: &[u8] = b"Failed to send file";
}

pub mod timeouts {
    // Sleep slice while waiting for the next batch, bounds cancellation latency (ms)
    pub const BATCH_POLL_MS: u64 = 200;

    // Progress bar redraw interval (ms)
    pub const PROGRESS_TICK_MS: u64 = 100;
}
