//! Pipeline orchestration.
//!
//! Runs the fixed scene-level steps, then every harvested asset through
//! route, generate, validate, package and import-check. One child process runs
//! at a time. An asset's failure is recorded and the loop moves on; only
//! session setup and manifest I/O abort the run.
mod assets;
mod dcc;
mod harvest;
mod history;
mod lighting;
mod paths;
mod scene;

use crate::config::{LoadedConfig, StepKey};
use crate::manifest::{build_session, Manifest, ManifestSummary, RunParameters, SessionSource};
use crate::routing::RouteOverrides;
use crate::runner::{LogTarget, RunResult, StepCommand, StepRunner};
use anyhow::{anyhow, Context, Result};
use history::{append_step_history, StepHistoryEntry};
use paths::SessionPaths;
use std::fs;
use std::path::PathBuf;

/// Everything `run` was asked to do.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub skip_scene: bool,
    pub skip_geometry: bool,
    pub skip_package: bool,
    pub overrides: RouteOverrides,
    /// Validated `x,y,w,h`, forwarded to harvesting as given.
    pub roi_hint: Option<String>,
    pub disable_skin_rejection: bool,
    /// Process argv, recorded as the reproduce command.
    pub argv: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub session_id: String,
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub summary: ManifestSummary,
}

impl PipelineOutcome {
    /// `0` when every recorded asset succeeded, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.summary.failed > 0 || self.summary.processing > 0 {
            1
        } else {
            0
        }
    }
}

/// One launched step and what came of it.
struct StepRun {
    command: StepCommand,
    result: RunResult,
}

/// Handles shared by every stage of one invocation.
struct Session<'a> {
    options: &'a PipelineOptions,
    config: &'a LoadedConfig,
    paths: SessionPaths,
    input: PathBuf,
    runner: StepRunner,
    manifest: Manifest,
    parameters: RunParameters,
}

/// Run the whole pipeline for one input image.
///
/// A missing input is an error before any manifest exists. After that the
/// returned outcome reflects per-asset results and `Err` means the session
/// itself could not continue (manifest or log writes failed).
pub fn run_pipeline(options: &PipelineOptions, config: &LoadedConfig) -> Result<PipelineOutcome> {
    if !options.input.is_file() {
        return Err(anyhow!(
            "input file not found: {}",
            options.input.display()
        ));
    }
    let input = std::path::absolute(&options.input)
        .with_context(|| format!("resolve input {}", options.input.display()))?;
    let session_id = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| anyhow!("cannot derive a session id from {}", input.display()))?
        .to_string();

    let paths = SessionPaths::new(options.output_root.join(&session_id));
    fs::create_dir_all(paths.root())
        .with_context(|| format!("create output dir {}", paths.root().display()))?;
    tracing::info!(
        session_id = %session_id,
        output_dir = %paths.root().display(),
        "starting pipeline"
    );

    let data = build_session(&SessionSource {
        session_id: &session_id,
        input: &input,
        output_root: paths.root(),
        argv: &options.argv,
    })?;
    let manifest = Manifest::create(paths.manifest_path(), data)?;
    let parameters = RunParameters {
        input: input.clone(),
        output_root: options.output_root.clone(),
        config_path: config.path.clone(),
        skip_scene: options.skip_scene,
        skip_geometry: options.skip_geometry,
        skip_package: options.skip_package,
        forced_asset_type: options.overrides.asset_type,
        forced_backend: options.overrides.backend,
        roi_hint: options.roi_hint.clone(),
        disable_skin_rejection: options.disable_skin_rejection,
        step_timeout_secs: config.config.step_timeout_secs,
    };

    let mut session = Session {
        options,
        config,
        paths,
        input,
        runner: StepRunner::new(config.default_timeout()),
        manifest,
        parameters,
    };
    session.run()?;

    let summary = session.manifest.summary();
    tracing::info!(
        total = summary.total,
        success = summary.success,
        failed = summary.failed,
        "pipeline complete"
    );
    Ok(PipelineOutcome {
        session_id,
        output_dir: session.paths.root().to_path_buf(),
        manifest_path: session.manifest.path().to_path_buf(),
        summary,
    })
}

impl Session<'_> {
    fn run(&mut self) -> Result<()> {
        let scene_run = self.generate_scene()?;
        self.reconstruct_geometry()?;
        self.estimate_lighting()?;
        self.record_scene(scene_run.as_ref())?;

        let items = self.harvest()?;
        tracing::info!(count = items.len(), "processing harvested assets");
        for item in &items {
            self.process_asset(item)?;
        }

        self.generate_report()
    }

    /// Build and launch a configured step, appending it to the step history.
    ///
    /// `Ok(None)` means the step is not configured at all.
    fn run_step(
        &self,
        key: StepKey,
        name: &str,
        args: Vec<String>,
        logs: Option<&LogTarget>,
    ) -> Result<Option<StepRun>> {
        let Some(command) = self
            .config
            .step_command(key, name, key.as_str(), args)?
        else {
            tracing::warn!(step = %key, "step not configured, skipping");
            return Ok(None);
        };
        let result = self.execute(&command, logs)?;
        Ok(Some(StepRun { command, result }))
    }

    fn execute(&self, command: &StepCommand, logs: Option<&LogTarget>) -> Result<RunResult> {
        let result = self.runner.run(command, logs);
        if !result.executable_missing {
            let asset_id = logs.map(|target| target.asset_id.as_str());
            let entry = StepHistoryEntry::from_result(command, asset_id, &result)?;
            append_step_history(&self.paths.step_history_path(), &entry)?;
        }
        Ok(result)
    }

    fn asset_logs(&self, asset_id: &str) -> LogTarget {
        LogTarget::new(self.paths.logs_dir(), asset_id)
    }
}

fn path_arg(path: &std::path::Path) -> String {
    path.display().to_string()
}
