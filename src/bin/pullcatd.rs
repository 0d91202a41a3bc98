use anyhow::{Context, Result};
use clap::Parser;

use pullcat::cli::DaemonOpts;
use pullcat::{config, logger, server};

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    let mut cfg = opts.apply(config::load(opts.config.as_deref())?.server);

    // Validate root directory exists and is a directory
    if !cfg.root.exists() {
        anyhow::bail!("Error: Root directory does not exist: {}", cfg.root.display());
    }
    if !cfg.root.is_dir() {
        anyhow::bail!("Error: Root path is not a directory: {}", cfg.root.display());
    }

    // Canonicalize the path for better logging
    cfg.root = std::fs::canonicalize(&cfg.root)
        .with_context(|| format!("Failed to canonicalize root path: {}", cfg.root.display()))?;

    println!("Starting pullcat daemon:");
    println!("  Root: {}", cfg.root.display());
    println!("  Bind: {}", cfg.bind);
    println!("  Files: {}", cfg.files.join(", "));

    if cfg.bind.starts_with("0.0.0.0") {
        eprintln!("⚠️  WARNING: Binding to 0.0.0.0 exposes the catalog to all network interfaces");
        eprintln!("   This protocol is UNENCRYPTED and UNAUTHENTICATED");
        eprintln!("   Only use on trusted networks (LAN)");
        eprintln!();
    }

    let logger = logger::from_option(cfg.log_file.as_deref());
    server::serve(&cfg, logger)
}
