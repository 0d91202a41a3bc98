//! Server-side catalog of downloadable files
//!
//! The catalog is a flat mapping of file name to exact byte size, rebuilt from
//! the storage root on every request. Nothing is cached between requests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::protocol_core::sanitize_name;

/// File name to size in bytes
pub type Catalog = BTreeMap<String, u64>;

/// Names served when neither the command line nor the config file lists any
pub const DEFAULT_FILES: &[&str] = &[
    "File1.zip",
    "File2.zip",
    "File3.zip",
    "File4.zip",
    "File5.zip",
];

pub fn default_files() -> Vec<String> {
    DEFAULT_FILES.iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug)]
pub struct CatalogProvider {
    root: PathBuf,
    names: Vec<String>,
}

impl CatalogProvider {
    /// Names containing directory components are reduced to their base name.
    pub fn new(root: impl Into<PathBuf>, names: Vec<String>) -> Self {
        let names = names
            .iter()
            .filter_map(|n| sanitize_name(n))
            .map(str::to_string)
            .collect();
        Self {
            root: root.into(),
            names,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Scan the configured names against the storage root.
    ///
    /// Missing entries are left out with a warning; an empty catalog is a
    /// valid result.
    pub fn build(&self) -> Catalog {
        let mut catalog = Catalog::new();
        for name in &self.names {
            let path = self.root.join(name);
            match std::fs::metadata(&path) {
                Ok(md) if md.is_file() => {
                    catalog.insert(name.clone(), md.len());
                }
                Ok(_) => eprintln!("warning: {} is not a regular file, skipping", path.display()),
                Err(_) => eprintln!(
                    "warning: file {} not found in {}",
                    name,
                    self.root.display()
                ),
            }
        }
        catalog
    }

    /// Resolve a requested name to a backing path.
    ///
    /// The name is sanitized first; only current catalog members resolve.
    pub fn resolve(&self, requested: &str) -> Option<(String, PathBuf)> {
        let name = sanitize_name(requested)?;
        if !self.build().contains_key(name) {
            return None;
        }
        Some((name.to_string(), self.root.join(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn provider_with(files: &[(&str, usize)], names: &[&str]) -> (TempDir, CatalogProvider) {
        let dir = TempDir::new().unwrap();
        for (name, size) in files {
            fs::write(dir.path().join(name), vec![7u8; *size]).unwrap();
        }
        let names = names.iter().map(|s| s.to_string()).collect();
        let provider = CatalogProvider::new(dir.path(), names);
        (dir, provider)
    }

    #[test]
    fn test_build_reports_exact_sizes() {
        let (_dir, provider) = provider_with(&[("a.bin", 10), ("b.bin", 2048)], &["a.bin", "b.bin"]);
        let catalog = provider.build();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog["a.bin"], 10);
        assert_eq!(catalog["b.bin"], 2048);
    }

    #[test]
    fn test_missing_files_are_omitted() {
        let (_dir, provider) = provider_with(&[("a.bin", 3)], &["a.bin", "gone.bin"]);
        let catalog = provider.build();
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains_key("gone.bin"));
    }

    #[test]
    fn test_unlisted_files_are_not_served() {
        let (_dir, provider) = provider_with(&[("a.bin", 3), ("extra.bin", 5)], &["a.bin"]);
        assert!(!provider.build().contains_key("extra.bin"));
        assert!(provider.resolve("extra.bin").is_none());
    }

    #[test]
    fn test_directories_are_not_files() {
        let (dir, provider) = provider_with(&[], &["sub"]);
        fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(provider.build().is_empty());
    }

    #[test]
    fn test_catalog_is_rebuilt_each_time() {
        let (dir, provider) = provider_with(&[("a.bin", 3)], &["a.bin", "b.bin"]);
        assert_eq!(provider.build().len(), 1);
        fs::write(dir.path().join("b.bin"), b"hello").unwrap();
        assert_eq!(provider.build()["b.bin"], 5);
        fs::remove_file(dir.path().join("a.bin")).unwrap();
        assert!(!provider.build().contains_key("a.bin"));
    }

    #[test]
    fn test_resolve_sanitizes_traversal() {
        let (dir, provider) = provider_with(&[("secret", 4)], &["secret"]);
        let (name, path) = provider.resolve("../secret").unwrap();
        assert_eq!(name, "secret");
        assert_eq!(path, dir.path().join("secret"));
        assert!(provider.resolve("../../nope").is_none());
    }

    #[test]
    fn test_configured_names_are_sanitized() {
        let provider = CatalogProvider::new("/srv", vec!["../x.zip".into(), "..".into()]);
        assert_eq!(provider.names(), ["x.zip".to_string()]);
    }
}
