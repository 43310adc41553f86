//! Interactive skip/retry prompt for failing external analysis tools.

use console::{style, Term};
use indicatif::ProgressBar;

use crate::domain::models::ToolName;
use crate::domain::ports::{ExternalToolError, FailureDecision, FailureResolver};

/// Asks on the terminal whether a failing external tool should be retried.
///
/// Without an attended terminal every failure is skipped.
pub struct ConsoleResolver {
    term: Term,
    spinner: Option<ProgressBar>,
}

impl ConsoleResolver {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            spinner: None,
        }
    }

    /// Suspend `spinner` while the question is shown.
    pub fn with_spinner(mut self, spinner: ProgressBar) -> Self {
        self.spinner = Some(spinner);
        self
    }

    fn ask(&self, tool: ToolName, error: &ExternalToolError) -> FailureDecision {
        if !self.term.is_term() {
            return FailureDecision::Skip;
        }
        let question = format!(
            "{} {} failed: {error}\n  [r]etry or [s]kip for the rest of this run? ",
            style("?").yellow().bold(),
            tool.as_str()
        );
        if self.term.write_str(&question).is_err() {
            return FailureDecision::Skip;
        }
        let answer = self.term.read_line().unwrap_or_default();
        parse_answer(&answer)
    }
}

impl Default for ConsoleResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_answer(answer: &str) -> FailureDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" | "y" | "yes" => FailureDecision::Retry,
        _ => FailureDecision::Skip,
    }
}

impl FailureResolver for ConsoleResolver {
    fn resolve(&self, tool: ToolName, error: &ExternalToolError) -> FailureDecision {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| self.ask(tool, error)),
            None => self.ask(tool, error),
        }
    }
}
