//! Spinner output for research runs using indicatif.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::services::{ProgressCallback, ProgressEvent};

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a spinner for indeterminate operations
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_CHARS);
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with an error message (red X)
    fn finish_error(&self, message: impl Into<String>);

    /// Finish with a warning message (yellow !)
    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("✓").green(), message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("✗").red(), message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("!").yellow(), message.into()));
    }
}

/// Renders orchestrator progress events on a spinner.
#[derive(Clone)]
pub struct ResearchProgress {
    spinner: ProgressBar,
}

impl ResearchProgress {
    pub fn new() -> Self {
        let spinner = create_spinner();
        spinner.set_message("Preparing research run");
        Self { spinner }
    }

    /// Progress that draws nothing, for `--json` output.
    pub fn hidden() -> Self {
        let spinner = ProgressBar::hidden();
        spinner.set_draw_target(ProgressDrawTarget::hidden());
        Self { spinner }
    }

    pub fn spinner(&self) -> &ProgressBar {
        &self.spinner
    }

    pub fn callback(&self) -> ProgressCallback {
        let spinner = self.spinner.clone();
        Arc::new(move |event: &ProgressEvent| {
            if let ProgressEvent::Decision(text) = event {
                spinner.println(format!("{} {text}", style("→").cyan()));
            }
            spinner.set_message(event.to_string());
        })
    }
}

impl Default for ResearchProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spinner() {
        let spinner = create_spinner();
        spinner.set_message("Loading");
        assert_eq!(spinner.message(), "Loading");
        spinner.finish_success("Done");
    }

    #[test]
    fn test_callback_updates_message() {
        let progress = ResearchProgress::hidden();
        let callback = progress.callback();
        callback(&ProgressEvent::Round {
            round: 2,
            max_rounds: 8,
        });
        assert_eq!(progress.spinner().message(), ProgressEvent::Round { round: 2, max_rounds: 8 }.to_string());
    }
}
