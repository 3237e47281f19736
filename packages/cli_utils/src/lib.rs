#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the taxi demand toolchain.
//!
//! Provides `indicatif`-backed download bars behind the
//! [`DownloadProgress`] trait, plus [`init_logger`] which sets up
//! `indicatif-log-bridge` so that `log::info!` and friends are suspended
//! while progress bars redraw.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use taxi_demand_artifacts::download::DownloadProgress;

pub use indicatif::MultiProgress;

/// One `indicatif` bar per artifact download.
///
/// Starts as a spinner and becomes a byte bar when the server reports a
/// content length.
pub struct IndicatifDownloadProgress {
    multi: MultiProgress,
    current: Mutex<Option<ProgressBar>>,
}

impl IndicatifDownloadProgress {
    /// Creates a reporter whose bars are added to `multi`.
    #[must_use]
    pub const fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            current: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.current.lock() {
            if let Some(bar) = slot.as_ref() {
                f(bar);
            }
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl DownloadProgress for IndicatifDownloadProgress {
    fn start(&self, name: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => {
                let bar = self.multi.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(
                        "  {msg} {wide_bar:.cyan/dim} {bytes}/{total_bytes} [{eta}]",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
                );
                bar
            }
            None => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg} {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(name.to_string());

        if let Ok(mut slot) = self.current.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn advance(&self, bytes: u64) {
        self.with_bar(|bar| bar.inc(bytes));
    }

    fn finish(&self, name: &str) {
        if let Some(bar) = self.take_bar() {
            bar.finish_with_message(format!("{name} done"));
        }
    }

    fn abandon(&self, _name: &str) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set, e.g. in tests

    log::set_max_level(level);

    multi
}
