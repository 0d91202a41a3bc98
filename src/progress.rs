//! Download progress and byte-count verification
//!
//! A single overwriting status line per download, driven by the declared
//! size from the Transfer Header.

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::protocol::timeouts::PROGRESS_TICK_MS;
use crate::protocol_core::format_size;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Mismatch { expected: u64, received: u64 },
}

pub struct TransferProgress {
    bar: ProgressBar,
    declared: u64,
    received: u64,
}

impl TransferProgress {
    pub fn new(name: &str, declared: u64, visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(declared),
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {msg} [{bar:30.green}] {percent:>3}% {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(format!("{} ({})", name, format_size(declared)));
        if visible {
            bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
        }
        Self {
            bar,
            declared,
            received: 0,
        }
    }

    /// Count a received chunk and redraw
    pub fn record(&mut self, n: usize) {
        self.received += n as u64;
        self.bar.set_position(self.received);
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.declared
    }

    /// received / declared * 100; an empty file is complete from the start
    pub fn percent(&self) -> f64 {
        if self.declared == 0 {
            return 100.0;
        }
        self.received as f64 / self.declared as f64 * 100.0
    }

    /// Close the status line and compare the byte count against the header
    pub fn finish(self) -> Verdict {
        if self.received == self.declared {
            self.bar.finish_with_message(format!(
                "{} ({})",
                "Finished".with(Color::Green).bold(),
                format_size(self.received)
            ));
            Verdict::Verified
        } else {
            self.bar.abandon_with_message(format!(
                "{} {:.2}%",
                "Incomplete".with(Color::Red).bold(),
                self.percent()
            ));
            Verdict::Mismatch {
                expected: self.declared,
                received: self.received,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_tracks_chunks() {
        let mut p = TransferProgress::new("b.bin", 2048, false);
        assert_eq!(p.percent(), 0.0);
        p.record(512);
        assert_eq!(p.percent(), 25.0);
        p.record(1536);
        assert_eq!(p.percent(), 100.0);
        assert!(p.is_complete());
        assert_eq!(p.finish(), Verdict::Verified);
    }

    #[test]
    fn test_short_transfer_is_mismatch() {
        let mut p = TransferProgress::new("a.bin", 10, false);
        p.record(7);
        assert!(!p.is_complete());
        assert_eq!(
            p.finish(),
            Verdict::Mismatch {
                expected: 10,
                received: 7
            }
        );
    }

    #[test]
    fn test_empty_file() {
        let p = TransferProgress::new("empty", 0, false);
        assert_eq!(p.percent(), 100.0);
        assert!(p.is_complete());
        assert_eq!(p.finish(), Verdict::Verified);
    }
}
