//! Shared protocol logic for both the daemon and the client
//!
//! Header encoding, catalog framing and filename sanitizing live here so the
//! two halves cannot drift apart.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::Path;

use crate::catalog::Catalog;
use crate::error::SessionError;
use crate::protocol::{reply, HEADER_LEN, MAX_CATALOG_SIZE};

/// Reduce a requested name to its final path component.
///
/// Both `/` and `\` count as separators regardless of platform, so
/// `../secret` and `..\secret` both become `secret`. Returns `None` for names
/// that are empty after stripping, refer to a directory (`.`/`..`) or contain
/// a NUL byte.
pub fn sanitize_name(requested: &str) -> Option<&str> {
    let trimmed = requested.trim();
    let base = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base)
}

/// Build the 8-byte Transfer Header
pub fn encode_header(size: u64) -> [u8; HEADER_LEN] {
    size.to_be_bytes()
}

pub fn decode_header(header: &[u8; HEADER_LEN]) -> u64 {
    u64::from_be_bytes(*header)
}

/// If `header` is the start of one of the fixed error replies, return the full reply.
pub fn error_reply_for(header: &[u8; HEADER_LEN]) -> Option<&'static [u8]> {
    [reply::NOT_FOUND, reply::SEND_FAILED]
        .into_iter()
        .find(|r| r.starts_with(header))
}

/// Read as many bytes as the peer sends up to `buf.len()`, stopping early only at EOF.
///
/// Returns the number of bytes filled.
pub fn read_full(stream: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read from peer"),
        }
    }
    Ok(filled)
}

/// Serialize a catalog as a length-prefixed JSON object and send it in one write
pub fn write_catalog(stream: &mut impl Write, catalog: &Catalog) -> Result<usize> {
    let body = serde_json::to_vec(catalog).context("serialize catalog")?;
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&encode_header(body.len() as u64));
    frame.extend_from_slice(&body);
    stream.write_all(&frame).context("send catalog")?;
    stream.flush()?;
    Ok(frame.len())
}

/// Read one length-prefixed catalog payload off the wire without decoding it.
///
/// Any failure here leaves the connection unusable.
pub fn read_catalog_payload(stream: &mut impl Read) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(stream, &mut header)?;
    if got < HEADER_LEN {
        bail!("connection closed while waiting for catalog ({got} of {HEADER_LEN} header bytes)");
    }
    let len = decode_header(&header);
    if len > MAX_CATALOG_SIZE {
        bail!("catalog payload too large: {len} bytes (max: {MAX_CATALOG_SIZE})");
    }
    let mut body = vec![0u8; len as usize];
    let got = read_full(stream, &mut body)?;
    if got < body.len() {
        bail!("connection closed mid-catalog ({got} of {len} bytes)");
    }
    Ok(body)
}

pub fn decode_catalog(payload: &[u8]) -> Result<Catalog, SessionError> {
    serde_json::from_slice(payload).map_err(|e| SessionError::ProtocolDecode(e.to_string()))
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("create directory {}", path.display()))?;
    }
    Ok(())
}

/// Human-readable size, binary units
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} bytes")
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else {
        format!("{:.2} GB", b / (KB * KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_name("../secret"), Some("secret"));
        assert_eq!(sanitize_name("a/b/../../etc/passwd"), Some("passwd"));
        assert_eq!(sanitize_name("..\\..\\boot.ini"), Some("boot.ini"));
        assert_eq!(sanitize_name("/abs/File1.zip"), Some("File1.zip"));
        assert_eq!(sanitize_name("  File2.zip\n"), Some("File2.zip"));
    }

    #[test]
    fn test_sanitize_rejects_non_files() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("dir/"), None);
        assert_eq!(sanitize_name(".."), None);
        assert_eq!(sanitize_name("x/."), None);
        assert_eq!(sanitize_name("bad\0name"), None);
    }

    #[test]
    fn test_header_is_big_endian() {
        assert_eq!(encode_header(10), [0, 0, 0, 0, 0, 0, 0, 0x0A]);
        assert_eq!(encode_header(2048), [0, 0, 0, 0, 0, 0, 0x08, 0]);
        assert_eq!(decode_header(&[0, 0, 0, 0, 0, 0, 0x08, 0]), 2048);
    }

    #[test]
    fn test_error_reply_detection() {
        let mut h = [0u8; HEADER_LEN];
        h.copy_from_slice(&reply::NOT_FOUND[..HEADER_LEN]);
        assert_eq!(error_reply_for(&h), Some(reply::NOT_FOUND));
        h.copy_from_slice(&reply::SEND_FAILED[..HEADER_LEN]);
        assert_eq!(error_reply_for(&h), Some(reply::SEND_FAILED));
        assert_eq!(error_reply_for(&encode_header(4096)), None);
    }

    #[test]
    fn test_catalog_framing() {
        let mut catalog = Catalog::new();
        catalog.insert("a.bin".to_string(), 10);
        catalog.insert("b.bin".to_string(), 2048);

        let mut wire = Vec::new();
        let sent = write_catalog(&mut wire, &catalog).unwrap();
        assert_eq!(sent, wire.len());
        assert_eq!(decode_header(wire[..8].try_into().unwrap()) as usize, wire.len() - 8);

        let payload = read_catalog_payload(&mut Cursor::new(wire)).unwrap();
        assert_eq!(std::str::from_utf8(&payload).unwrap(), r#"{"a.bin":10,"b.bin":2048}"#);
        assert_eq!(decode_catalog(&payload).unwrap(), catalog);
    }

    #[test]
    fn test_truncated_catalog_is_an_error() {
        let mut wire = encode_header(100).to_vec();
        wire.extend_from_slice(b"{\"a\":");
        assert!(read_catalog_payload(&mut Cursor::new(wire)).is_err());
        assert!(read_catalog_payload(&mut Cursor::new(vec![0u8; 3])).is_err());
    }

    #[test]
    fn test_oversized_catalog_rejected() {
        let wire = encode_header(MAX_CATALOG_SIZE + 1).to_vec();
        assert!(read_catalog_payload(&mut Cursor::new(wire)).is_err());
    }

    #[test]
    fn test_malformed_catalog_is_decode_error() {
        let err = decode_catalog(b"{\"a.bin\": \"ten\"}").unwrap_err();
        assert!(matches!(err, SessionError::ProtocolDecode(_)));
        assert!(decode_catalog(b"not json").is_err());
    }

    #[test]
    fn test_ensure_dir_exists() {
        let temp_dir = TempDir::new().unwrap();
        let new_dir = temp_dir.path().join("output").join("nested");

        assert!(!new_dir.exists());
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());

        // Should be idempotent
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.50 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
    }
}
