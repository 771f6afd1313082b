use clap::Parser;

use roundtrip_core::error::{HarnessError, StoreErrorKind};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "roundtrip",
    version,
    about = "Verify that a hybrid vector+graph store round-trips a typed knowledge graph"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code from its typed cause.
///
/// Exit codes:
///   0: every case passed
///   1: one or more cases failed, or any unclassified error
///   2: configuration error
///   3: store unreachable
///   4: store rejected the credentials
///   5: ingestion failed
///   6: report could not be written
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let Some(cause) = err
        .chain()
        .find_map(|e| e.downcast_ref::<HarnessError>())
    else {
        return 1;
    };

    match cause {
        HarnessError::Config(_) | HarnessError::Fixture(_) => 2,
        HarnessError::Store(e) => match e.kind() {
            StoreErrorKind::Connectivity => 3,
            StoreErrorKind::Auth => 4,
            StoreErrorKind::Statement => 1,
        },
        HarnessError::Ingestion(_) => 5,
        HarnessError::Report(_) => 6,
        HarnessError::Case(_) | HarnessError::Embed(_) => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.quiet)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
