//! framecap command-line driver.
//!
//! Renders a synthetic animation, records it through a capture session and
//! writes the resulting artifacts to a directory.

mod args;
mod commands;
mod sink;

pub use args::Cli;
pub use commands::{record, RecordOptions, Summary};
pub use sink::DirectorySink;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "framecap={level},framecap_cli={level},framecap_engine=debug,framecap_capture={level},framecap_encoder={level}"
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse arguments, record and print the summary.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    info!("framecap starting");

    let config = cli.load_config()?;
    let summary = record(config, &cli.record_options())?;
    println!("{summary}");
    Ok(())
}
