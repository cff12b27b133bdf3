//! CLI argument parsing for the asset pipeline.
//!
//! The CLI stays thin: it parses and validates flags, then hands typed values
//! to the workflow commands.
use crate::routing::{AssetType, Backend};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_ROOT: &str = "outputs/pipeline_demo";

#[derive(Parser, Debug)]
#[command(
    name = "asset-pipeline",
    version,
    about = "Photo-to-3D asset pipeline orchestrator",
    after_help = "Commands:\n  run --input <img>                     Run scene steps, harvesting and per-asset generation\n  route --signals <json>                Print the routing decision for a signal bag\n  validate --asset-type <t> --dir <d>   Check an asset directory's required artifacts\n  status --manifest <path>              Summarize a (possibly running) session manifest\n  init --config <path>                  Write the default pipeline config\n\nExamples:\n  asset-pipeline init --config pipeline.json\n  asset-pipeline run --input shots/shot_010.png --config pipeline.json\n  asset-pipeline run --input shot.png --skip-scene --asset-type prop --backend trellis\n  asset-pipeline route --signals '{\"has_mask\":true,\"num_instances\":3}'\n  asset-pipeline status --manifest outputs/pipeline_demo/shot_010/manifest.json --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Route(RouteArgs),
    Validate(ValidateArgs),
    Status(StatusArgs),
    Init(InitArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Run(args) => args.verbose,
            _ => false,
        }
    }
}

/// Asset type override; `auto` classifies from signals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum AssetTypeArg {
    Auto,
    Scene,
    Prop,
    Human,
}

impl AssetTypeArg {
    pub fn forced(self) -> Option<AssetType> {
        match self {
            AssetTypeArg::Auto => None,
            AssetTypeArg::Scene => Some(AssetType::Scene),
            AssetTypeArg::Prop => Some(AssetType::Prop),
            AssetTypeArg::Human => Some(AssetType::Human),
        }
    }
}

/// Backend override; `auto` selects from the asset type and signals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Auto,
    Trellis,
    #[value(name = "sam3d_objects")]
    Sam3dObjects,
    #[value(name = "sam3d_body")]
    Sam3dBody,
}

impl BackendArg {
    pub fn forced(self) -> Option<Backend> {
        match self {
            BackendArg::Auto => None,
            BackendArg::Trellis => Some(Backend::Trellis),
            BackendArg::Sam3dObjects => Some(Backend::Sam3dObjects),
            BackendArg::Sam3dBody => Some(Backend::Sam3dBody),
        }
    }
}

/// Accept `x,y,w,h` as four non-negative integers; returns the normalized form.
pub fn parse_roi_hint(raw: &str) -> Result<String, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!(
            "expected x,y,w,h (4 comma-separated values), got {} value(s)",
            parts.len()
        ));
    }
    let mut values = Vec::with_capacity(4);
    for part in parts {
        let value: u32 = part
            .parse()
            .map_err(|_| format!("'{part}' is not a non-negative integer"))?;
        values.push(value.to_string());
    }
    Ok(values.join(","))
}

#[derive(Parser, Debug)]
#[command(about = "Run the full pipeline for one input image")]
pub struct RunArgs {
    /// Input photograph
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Root directory; the session writes to <root>/<input stem>/
    #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,

    /// Pipeline config (defaults to $ASSET_PIPELINE_CONFIG, then built-in defaults)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Skip scene generation (and geometry)
    #[arg(long)]
    pub skip_scene: bool,

    /// Skip geometry reconstruction
    #[arg(long)]
    pub skip_geometry: bool,

    /// Force the asset type of every harvested item
    #[arg(long, value_enum, default_value = "auto")]
    pub asset_type: AssetTypeArg,

    /// Force the generation backend of every harvested item
    #[arg(long, value_enum, default_value = "auto")]
    pub backend: BackendArg,

    /// Region of interest for harvesting, as x,y,w,h
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_roi_hint)]
    pub roi_hint: Option<String>,

    /// Disable the harvester's skin-color rejection
    #[arg(long)]
    pub disable_skin_rejection: bool,

    /// Skip the packaging step for generated assets
    #[arg(long)]
    pub skip_package: bool,

    /// Deadline in seconds for steps without their own timeout in the config
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub step_timeout: Option<u64>,

    /// Log at debug level
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print the routing decision for a signal bag as JSON")]
pub struct RouteArgs {
    /// Signal bag as a JSON object
    #[arg(long, value_name = "JSON")]
    pub signals: String,

    #[arg(long, value_enum, default_value = "auto")]
    pub asset_type: AssetTypeArg,

    #[arg(long, value_enum, default_value = "auto")]
    pub backend: BackendArg,
}

#[derive(Parser, Debug)]
#[command(about = "Check that an asset directory holds its required artifacts")]
pub struct ValidateArgs {
    /// Asset type whose requirements apply (scene, prop, human; others pass)
    #[arg(long, value_name = "TYPE")]
    pub asset_type: String,

    /// Asset output directory
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize a session manifest")]
pub struct StatusArgs {
    /// Path to manifest.json
    #[arg(long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Write the default pipeline config")]
pub struct InitArgs {
    /// Destination for the config file
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_hint_accepts_four_non_negative_integers() {
        assert_eq!(parse_roi_hint("10, 20,300,400").as_deref(), Ok("10,20,300,400"));
        assert!(parse_roi_hint("10,20,300").is_err());
        assert!(parse_roi_hint("10,-20,300,400").is_err());
        assert!(parse_roi_hint("a,b,c,d").is_err());
    }

    #[test]
    fn run_flags_parse_into_overrides() {
        let args = RootArgs::try_parse_from([
            "asset-pipeline",
            "run",
            "--input",
            "shot.png",
            "--asset-type",
            "prop",
            "--backend",
            "sam3d_objects",
            "--roi-hint",
            "1,2,3,4",
            "--step-timeout",
            "60",
        ])
        .expect("parse");
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.asset_type.forced(), Some(AssetType::Prop));
        assert_eq!(run.backend.forced(), Some(Backend::Sam3dObjects));
        assert_eq!(run.roi_hint.as_deref(), Some("1,2,3,4"));
        assert_eq!(run.step_timeout, Some(60));
        assert_eq!(run.output_root, PathBuf::from(DEFAULT_OUTPUT_ROOT));
    }

    #[test]
    fn zero_timeout_and_unknown_backend_are_rejected() {
        assert!(RootArgs::try_parse_from([
            "asset-pipeline",
            "run",
            "--input",
            "a.png",
            "--step-timeout",
            "0"
        ])
        .is_err());
        assert!(RootArgs::try_parse_from([
            "asset-pipeline",
            "run",
            "--input",
            "a.png",
            "--backend",
            "ml_sharp"
        ])
        .is_err());
    }
}
