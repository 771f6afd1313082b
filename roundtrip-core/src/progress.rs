//! Progress reporting for a verification run.
//!
//! The CLI uses `IndicatifReporter` for a live case counter on stderr.
//! Library callers can use `NoopReporter` or provide their own implementation.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::harness::{CaseOutcome, CaseStatus};

/// Receives case lifecycle events from the harness, in case order.
pub trait ProgressReporter: Send + Sync {
    /// A run with `total` declared cases is starting.
    fn run_started(&self, total: usize);

    /// Case at `position` (1-based) moved to Running.
    fn case_started(&self, position: usize, name: &str);

    /// Case reached a terminal status.
    fn case_finished(&self, outcome: &CaseOutcome);

    /// The run stopped, normally or not.
    fn run_finished(&self);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn run_started(&self, _total: usize) {}
    fn case_started(&self, _position: usize, _name: &str) {}
    fn case_finished(&self, _outcome: &CaseOutcome) {}
    fn run_finished(&self) {}
}

/// Reporter backed by an `indicatif` progress bar for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// A reporter that tracks state but never draws.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(None, target),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn run_started(&self, total: usize) {
        self.failed.store(0, Ordering::Relaxed);
        self.bar.set_length(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:24.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.reset();
    }

    fn case_started(&self, position: usize, name: &str) {
        self.bar.set_message(format!("#{position} {name}"));
    }

    fn case_finished(&self, outcome: &CaseOutcome) {
        let mark = if outcome.status == CaseStatus::Passed {
            "PASS"
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            "FAIL"
        };
        self.bar.println(format!(
            "{mark} {} ({} ms)",
            outcome.name,
            outcome.elapsed.as_millis()
        ));
        self.bar.inc(1);
    }

    fn run_finished(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn outcome(status: CaseStatus) -> CaseOutcome {
        CaseOutcome {
            position: 1,
            name: "Connectivity".into(),
            description: "store answers".into(),
            status,
            elapsed: Duration::from_millis(3),
            detail: String::new(),
            failure: None,
        }
    }

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.run_started(6);
        reporter.case_started(1, "Connectivity");
        reporter.case_finished(&outcome(CaseStatus::Passed));
        reporter.run_finished();
    }

    #[test]
    fn indicatif_reporter_counts_failures() {
        let reporter = IndicatifReporter::hidden();
        reporter.run_started(2);
        reporter.case_finished(&outcome(CaseStatus::Passed));
        reporter.case_finished(&outcome(CaseStatus::Failed));
        reporter.run_finished();
        assert_eq!(reporter.failed(), 1);
    }
}
