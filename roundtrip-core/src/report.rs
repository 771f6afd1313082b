// Markdown report rendering and atomic report writes.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use crate::error::ReportError;
use crate::harness::{CaseStatus, RunOutcome};

/// Run metadata shown in the report header.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub endpoint: String,
    pub namespace: String,
    pub embedder: String,
    pub dimensions: usize,
}

/// Render outcomes in case order, followed by the summary trailer.
///
/// The final line is always `X/N tests passed | total <ms> ms`, where N counts
/// declared cases whether or not they ran.
pub fn render_report(run: &RunOutcome, ctx: &ReportContext) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("## Round-trip Test Results\n\n");
    let _ = writeln!(out, "**Run:** {}  ", run.run_id);
    let _ = writeln!(out, "**Started:** {}  ", run.started_at.to_rfc3339());
    let _ = writeln!(out, "**Store:** {}  ", ctx.endpoint);
    let _ = writeln!(out, "**Namespace:** {}  ", ctx.namespace);
    let _ = writeln!(out, "**Embedder:** {} ({} dims)  ", ctx.embedder, ctx.dimensions);

    let failed = run.declared - run.passed();
    if run.aborted.is_some() {
        out.push_str("**Status:** run aborted\n");
    } else if failed == 0 {
        out.push_str("**Status:** all tests passed\n");
    } else {
        let _ = writeln!(out, "**Status:** {failed} test(s) failed");
    }

    out.push_str("\n| # | Test | Status | Duration (ms) | Details |\n");
    out.push_str("|---|------|--------|---------------|---------|\n");
    for o in &run.outcomes {
        let details = match o.status {
            CaseStatus::Failed => o.failure.as_deref().unwrap_or("failed"),
            _ => o.detail.as_str(),
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            o.position,
            cell(&o.name),
            o.status.as_str(),
            o.elapsed.as_millis(),
            cell(details)
        );
    }

    if let Some(abort) = &run.aborted {
        let _ = write!(out, "\n**Aborted:** {}\n", cell(&abort.to_string()));
    }

    let _ = write!(
        out,
        "\n{}/{} tests passed | total {} ms\n",
        run.passed(),
        run.declared,
        run.elapsed.as_millis()
    );
    out
}

/// Keep a value inside its table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Extract `(passed, total)` from the trailer of a rendered report.
pub fn parse_summary(report: &str) -> Option<(usize, usize)> {
    report.lines().rev().find_map(|line| {
        let (counts, _) = line.split_once(" tests passed")?;
        let (passed, total) = counts.trim().split_once('/')?;
        Some((passed.parse().ok()?, total.parse().ok()?))
    })
}

/// Write `content` to `path` atomically: temp file in the same directory, then rename.
pub fn write_report(path: &Path, content: &str) -> Result<(), ReportError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| ReportError::Persist {
        path: path.display().to_string(),
        message: e.error.to_string(),
    })?;
    Ok(())
}
