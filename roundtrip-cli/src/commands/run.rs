use anyhow::Context;
use clap::Args;
use tracing::{error, info};

use roundtrip_core::embed::create_embedder;
use roundtrip_core::error::{CaseError, HarnessError};
use roundtrip_core::harness::Harness;
use roundtrip_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use roundtrip_core::report::{ReportContext, render_report, write_report};
use roundtrip_core::store;

use super::Settings;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: Settings,

    /// Write the report without echoing it to stdout
    #[arg(long)]
    pub no_print: bool,
}

pub async fn run(args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    let config = args.settings.resolve()?;
    config.validate().map_err(HarnessError::from)?;

    let catalog = super::load_catalog(&config)?;
    let embedder = create_embedder(&config.embedding)?;
    let store = store::connect(&config.store)?;

    let context = ReportContext {
        endpoint: store.endpoint(),
        namespace: store.namespace().to_string(),
        embedder: embedder.name().to_string(),
        dimensions: config.embedding.dimensions,
    };
    let report_path = config.report.path.clone();

    let reporter: Box<dyn ProgressReporter> = if quiet {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    };

    let harness = Harness::new(config, catalog);
    let outcome = harness
        .run(store.as_ref(), embedder.as_ref(), reporter.as_ref())
        .await?;

    let rendered = render_report(&outcome, &context);
    if !quiet && !args.no_print {
        print!("{rendered}");
    }
    if let Err(e) = write_report(&report_path, &rendered) {
        // Without the report file or the echo, the outcomes would be lost.
        if quiet || args.no_print {
            for case in &outcome.outcomes {
                error!(
                    case = %case.name,
                    status = case.status.as_str(),
                    failure = case.failure.as_deref().unwrap_or(""),
                    "Unreported case outcome"
                );
            }
        }
        return Err(HarnessError::from(e)).with_context(|| {
            format!(
                "Cannot write report to {} ({}/{} tests passed)",
                report_path.display(),
                outcome.passed(),
                outcome.declared
            )
        });
    }
    info!(path = %report_path.display(), "Report written");

    if let Some(abort) = outcome.aborted {
        return Err(HarnessError::Ingestion(abort.cause).into());
    }
    if !outcome.all_passed() {
        return Err(HarnessError::Case(CaseError::Unsuccessful {
            passed: outcome.passed(),
            total: outcome.declared,
        })
        .into());
    }
    Ok(())
}
