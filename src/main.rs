//! pullcat - list a remote catalog and fetch files from it
//!
//! Connects once to a pullcatd daemon, shows its catalog and downloads files
//! either one at a time at the prompt or from a persisted batch queue that
//! survives restarts.

use anyhow::Result;
use clap::Parser;

use pullcat::cancel::CancelToken;
use pullcat::cli::ClientOpts;
use pullcat::client::{ConsoleOperator, Session};
use pullcat::config::{self, Mode};
use pullcat::error::SessionError;
use pullcat::logger;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();
    let cfg = opts.apply(config::load(opts.config.as_deref())?.client);

    let cancel = CancelToken::new();
    cancel.install_ctrlc_handler()?;
    let logger = logger::from_option(cfg.log_file.as_deref());

    println!("Connecting {}... ", cfg.server);
    let mode = cfg.mode;
    let mut session = match Session::connect(cfg, cancel, logger) {
        Ok(s) => s,
        Err(e) => {
            if let Some(SessionError::Connect { .. }) = e.downcast_ref::<SessionError>() {
                eprintln!("Failed to connect to server: {e}");
                std::process::exit(1);
            }
            return Err(e);
        }
    };
    println!(
        "Output directory is located at: {}",
        std::fs::canonicalize(&session.config().output_dir)
            .unwrap_or_else(|_| session.config().output_dir.clone())
            .display()
    );
    if mode == Mode::Batch {
        println!(
            "Batch mode: queue in {}, processed every {}s",
            session.config().state_dir.display(),
            session.config().batch_interval_secs
        );
    }

    session.run(&mut ConsoleOperator)?;
    println!(
        "Downloaded {} file(s) this session.",
        session.downloaded().len()
    );
    Ok(())
}
