//! Progress indicators for long-running steps.
//!
//! Progress output is suppressed when `PPPACKAGE_NO_PROGRESS` is set or after
//! [`disable_progress`] (the CLI calls it for `--no-progress` and `--quiet`),
//! so scripts and tests see clean output.

use crate::constants::NO_PROGRESS_ENV;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Hides every progress bar created from now on.
pub fn disable_progress() {
    DISABLED.store(true, Ordering::Relaxed);
}

fn is_progress_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed) || std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A progress bar with consistent styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A bar counting to `len`.
    pub fn new(len: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            if let Ok(style) = IndicatifStyle::default_bar()
                .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("━╸━"));
            }
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// A spinner for steps of unknown length.
    pub fn new_spinner() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            if let Ok(style) =
                IndicatifStyle::default_spinner().template("{prefix:.bold} {spinner:.cyan} {msg}")
            {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// Sets the label shown before the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Sets the trailing message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Advances by `delta`.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Removes the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}
