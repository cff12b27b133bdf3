mod cli;
mod config;
mod manifest;
mod outputs;
mod pipeline;
mod routing;
mod runner;
mod staging;
mod util;
mod workflow;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log to stderr so stdout stays clean for `--json` output.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "asset_pipeline=debug"
    } else {
        "asset_pipeline=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let args = cli::RootArgs::parse();
    init_tracing(args.command.verbose());

    let result = match &args.command {
        cli::Command::Run(args) => workflow::run_run(args),
        cli::Command::Route(args) => workflow::run_route(args),
        cli::Command::Validate(args) => workflow::run_validate(args),
        cli::Command::Status(args) => workflow::run_status(args),
        cli::Command::Init(args) => workflow::run_init(args),
    };
    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(workflow::EXIT_FATAL)
        }
    }
}
