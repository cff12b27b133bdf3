//! Per-asset processing and failure recording.
use super::dcc::{self, DCC_ANNOTATION_KEY};
use super::harvest::HarvestItem;
use super::{path_arg, Session};
use crate::config::StepKey;
use crate::manifest::{ErrorKind, ParameterSnapshot};
use crate::outputs::{primary_artifact, validate_outputs};
use crate::routing::{route, AssetType, Backend};
use crate::runner::{RunResult, StepCommand};
use crate::staging::write_atomic_text;
use crate::util::{tail_string, truncate_string};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound for `error.message` in the manifest; full detail lives in `error.log`.
const MAX_ERROR_MESSAGE_BYTES: usize = 2048;
/// How much of the failing step's stderr is copied into `error.log`.
const STDERR_TAIL_BYTES: usize = 4096;

enum Packaging {
    Skipped,
    Done(RunResult),
    Failed(RunResult),
}

/// Backend argv convention: the human backend takes `--image/--output_dir`.
fn backend_args(backend: Backend, input: &Path, output_dir: &Path) -> Vec<String> {
    let (input_flag, output_flag) = match backend {
        Backend::Sam3dBody => ("--image", "--output_dir"),
        _ => ("--input", "--output"),
    };
    vec![
        input_flag.to_string(),
        path_arg(input),
        output_flag.to_string(),
        path_arg(output_dir),
    ]
}

impl Session<'_> {
    /// Route, generate, validate, package and import-check one harvested item.
    ///
    /// Asset-level failures end up in the manifest and return `Ok`; `Err`
    /// only surfaces when the manifest or log files cannot be written.
    pub(super) fn process_asset(&mut self, item: &HarvestItem) -> Result<()> {
        let asset_id = item.id.as_str();
        let decision = route(&item.signals, self.options.overrides);
        tracing::info!(
            asset_id,
            asset_type = %decision.asset_type,
            backend = %decision.backend,
            "routed asset"
        );
        if decision.signals_incomplete {
            tracing::warn!(asset_id, "routing signals incomplete, using general backend");
        }

        let asset_dir = self.paths.asset_dir(asset_id);
        fs::create_dir_all(&asset_dir)
            .with_context(|| format!("create asset dir {}", asset_dir.display()))?;
        let command = self.config.step_command(
            StepKey::for_backend(decision.backend),
            &format!("{} ({asset_id})", decision.backend),
            decision.backend.as_str(),
            backend_args(decision.backend, &item.path, &asset_dir),
        )?;
        let snapshot = ParameterSnapshot {
            run: self.parameters.clone(),
            routing: Some(decision),
            command: command.as_ref().map(StepCommand::argv).unwrap_or_default(),
        };
        self.manifest.record_asset_start(
            asset_id,
            decision.asset_type,
            decision.backend,
            item.signals.clone(),
            snapshot,
        )?;

        let Some(command) = command else {
            let message = format!("no step configured for backend {}", decision.backend);
            return record_failure(
                self,
                asset_id,
                decision.asset_type,
                &asset_dir,
                ErrorKind::BackendExecutionError,
                &message,
                None,
            );
        };

        let logs = self.asset_logs(asset_id);
        let result = self.execute(&command, Some(&logs))?;
        let mut run_logs = result.log_paths();
        self.manifest.append_run_logs(asset_id, &run_logs)?;
        if !result.success {
            let message = format!("{} {}", decision.backend, result.failure_summary());
            return record_failure(
                self,
                asset_id,
                decision.asset_type,
                &asset_dir,
                ErrorKind::BackendExecutionError,
                &message,
                Some(&result),
            );
        }

        let check = validate_outputs(decision.asset_type.as_str(), &asset_dir);
        if !check.ok {
            let message = format!("missing required outputs: {}", check.missing.join(", "));
            return record_failure(
                self,
                asset_id,
                decision.asset_type,
                &asset_dir,
                ErrorKind::OutputValidationError,
                &message,
                None,
            );
        }

        match self.package(asset_id, decision.asset_type, &asset_dir)? {
            Packaging::Skipped => {}
            Packaging::Done(result) => run_logs.extend(result.log_paths()),
            Packaging::Failed(result) => {
                self.manifest.append_run_logs(asset_id, &result.log_paths())?;
                let message = format!("packaging {}", result.failure_summary());
                return record_failure(
                    self,
                    asset_id,
                    decision.asset_type,
                    &asset_dir,
                    ErrorKind::PackagingError,
                    &message,
                    Some(&result),
                );
            }
        }

        let outputs = validate_outputs(decision.asset_type.as_str(), &asset_dir).found;
        run_logs.extend(self.check_dcc_import(asset_id, &outputs)?);
        self.manifest
            .record_asset_success(asset_id, outputs, run_logs)?;
        tracing::info!(asset_id, "asset complete");
        Ok(())
    }

    fn package(&self, asset_id: &str, asset_type: AssetType, asset_dir: &Path) -> Result<Packaging> {
        if self.options.skip_package {
            return Ok(Packaging::Skipped);
        }
        let Some(primary) = primary_artifact(asset_type.as_str(), asset_dir) else {
            tracing::warn!(asset_id, "no primary artifact to package");
            return Ok(Packaging::Skipped);
        };
        let args = vec![
            "--input".to_string(),
            path_arg(&primary),
            "--id".to_string(),
            asset_id.to_string(),
            "--output".to_string(),
            path_arg(asset_dir),
        ];
        let logs = self.asset_logs(asset_id);
        let run = self.run_step(
            StepKey::Package,
            &format!("packaging ({asset_id})"),
            args,
            Some(&logs),
        )?;
        Ok(match run {
            None => Packaging::Skipped,
            Some(run) if run.result.executable_missing => Packaging::Skipped,
            Some(run) if run.result.success => Packaging::Done(run.result),
            Some(run) => Packaging::Failed(run.result),
        })
    }

    /// Run the configured import check and annotate the asset; returns the logs it produced.
    fn check_dcc_import(&mut self, asset_id: &str, outputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let Some(dcc_config) = self.config.config.dcc.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(mesh) = dcc::find_mesh(outputs) else {
            tracing::debug!(asset_id, "no mesh output, skipping import check");
            return Ok(Vec::new());
        };
        let Some(blender) = dcc::resolve_blender(dcc_config) else {
            return Ok(Vec::new());
        };
        let command = dcc::import_command(
            blender,
            &self.config.resolve_path(&dcc_config.script),
            mesh,
            asset_id,
            dcc_config.timeout_secs,
        );
        let logs = self.asset_logs(asset_id);
        let result = self.execute(&command, Some(&logs))?;
        if result.executable_missing {
            return Ok(Vec::new());
        }
        let report = dcc::import_report(&result);
        if !dcc::import_ok(&report) {
            tracing::warn!(asset_id, report = %report, "dcc import check failed");
        }
        self.manifest
            .record_annotation(asset_id, DCC_ANNOTATION_KEY, report)?;
        Ok(result.log_paths())
    }
}

/// Write `error.log` into the asset directory and mark the asset failed,
/// keeping whatever partial outputs exist.
pub(super) fn record_failure(
    session: &mut Session<'_>,
    asset_id: &str,
    asset_type: AssetType,
    asset_dir: &Path,
    kind: ErrorKind,
    message: &str,
    result: Option<&RunResult>,
) -> Result<()> {
    let message = truncate_string(message, MAX_ERROR_MESSAGE_BYTES);
    let error_log = asset_dir.join("error.log");
    write_atomic_text(&error_log, &error_log_text(kind, &message, result))?;
    tracing::error!(asset_id, kind = %kind, message = %message, "asset failed");
    let partial = validate_outputs(asset_type.as_str(), asset_dir).found;
    session
        .manifest
        .record_asset_failure(asset_id, kind, &message, Some(&error_log), partial)
}

fn error_log_text(kind: ErrorKind, message: &str, result: Option<&RunResult>) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "type: {kind}");
    let _ = writeln!(text, "message: {message}");
    let Some(result) = result else {
        return text;
    };
    let _ = writeln!(text, "exit_code: {}", result.exit_code);
    let _ = writeln!(text, "timed_out: {}", result.timed_out);
    let _ = writeln!(text, "duration_s: {:.3}", result.duration_s);
    for path in result.log_paths() {
        let _ = writeln!(text, "log: {}", path.display());
    }
    if let Some(stderr) = result
        .stderr_log
        .as_deref()
        .and_then(|path| fs::read_to_string(path).ok())
    {
        let _ = writeln!(text, "--- stderr (tail) ---");
        text.push_str(tail_string(&stderr, STDERR_TAIL_BYTES));
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}
