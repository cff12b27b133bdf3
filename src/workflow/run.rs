//! `run`: the full pipeline.
use crate::cli::RunArgs;
use crate::config::load_config;
use crate::pipeline::{run_pipeline, PipelineOptions};
use crate::routing::RouteOverrides;
use anyhow::Result;

pub fn run_run(args: &RunArgs) -> Result<u8> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(secs) = args.step_timeout {
        config.config.step_timeout_secs = Some(secs);
    }
    match &config.path {
        Some(path) => tracing::debug!(config = %path.display(), "using pipeline config"),
        None => tracing::debug!("using built-in pipeline config"),
    }

    let options = PipelineOptions {
        input: args.input.clone(),
        output_root: args.output_root.clone(),
        skip_scene: args.skip_scene,
        skip_geometry: args.skip_geometry,
        skip_package: args.skip_package,
        overrides: RouteOverrides {
            asset_type: args.asset_type.forced(),
            backend: args.backend.forced(),
        },
        roi_hint: args.roi_hint.clone(),
        disable_skin_rejection: args.disable_skin_rejection,
        argv: std::env::args_os()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
    };
    let outcome = run_pipeline(&options, &config)?;

    let summary = &outcome.summary;
    println!(
        "session {}: {} asset(s), {} succeeded, {} failed",
        outcome.session_id, summary.total, summary.success, summary.failed
    );
    println!("manifest: {}", outcome.manifest_path.display());
    Ok(outcome.exit_code())
}
