//! `fdo` CLI entry point.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let metrics_handle = if cli.metrics {
        fdo::metrics::init();
        fdo::metrics::CliRecorder::new().install()
    } else {
        None
    };

    let default_level = if cli.silent {
        "fdo=error"
    } else if cli.verbose {
        "fdo=debug"
    } else {
        "fdo=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()))
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let exit_code = commands::run_command(&cli);

    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    std::process::exit(exit_code);
}
