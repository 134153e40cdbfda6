//! Progress reporting for long per-feature loops.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})";

/// A styled progress bar. Drawing is suppressed when stderr is not a terminal.
pub fn progress_bar(len: usize, message: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    let pb = ProgressBar::new(len as u64);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
