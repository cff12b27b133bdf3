//! Scene-level stages: scene generation, geometry, lighting, the scene
//! record, harvesting and the final report.
//!
//! These steps run once per session. Their output passes through to the
//! parent's streams; a missing script skips the stage with a warning.
use super::assets::record_failure;
use super::harvest::{load_harvest_manifest, HarvestItem};
use super::lighting::{ensure_probe, write_default_probe};
use super::{path_arg, Session, StepRun};
use crate::config::StepKey;
use crate::manifest::{ErrorKind, ParameterSnapshot};
use crate::outputs::validate_outputs;
use crate::routing::{AssetType, Backend, SignalBag};
use crate::staging::collect_files_recursive;
use anyhow::Result;
use std::path::PathBuf;

/// Manifest id of the scene asset.
pub const SCENE_ASSET_ID: &str = "scene";

impl Session<'_> {
    pub(super) fn generate_scene(&self) -> Result<Option<StepRun>> {
        if self.options.skip_scene {
            tracing::info!("skipping scene generation");
            return Ok(None);
        }
        let args = vec![
            "--input-path".to_string(),
            path_arg(&self.input),
            "--output-path".to_string(),
            path_arg(&self.paths.scene_dir()),
        ];
        let run = self.run_step(StepKey::SceneGen, "scene generation", args, None)?;
        Ok(run.filter(|run| !run.result.executable_missing))
    }

    pub(super) fn reconstruct_geometry(&self) -> Result<()> {
        if self.options.skip_scene || self.options.skip_geometry {
            tracing::info!("skipping geometry reconstruction");
            return Ok(());
        }
        let args = vec![
            "--input".to_string(),
            path_arg(&self.input),
            "--output".to_string(),
            path_arg(&self.paths.geometry_dir()),
        ];
        self.run_step(StepKey::Geometry, "geometry reconstruction", args, None)?;
        Ok(())
    }

    /// Estimate lighting from the scene point cloud, falling back to the default probe.
    pub(super) fn estimate_lighting(&self) -> Result<()> {
        let probe_path = self.paths.lighting_probe_path();
        let Some(point_cloud) = self.find_scene_point_cloud()? else {
            tracing::warn!("no scene point cloud found for lighting, using default");
            write_default_probe(&probe_path)?;
            return Ok(());
        };
        let args = vec![
            "--input".to_string(),
            path_arg(&point_cloud),
            "--output".to_string(),
            path_arg(&probe_path),
        ];
        self.run_step(StepKey::Lighting, "lighting estimation", args, None)?;
        ensure_probe(&probe_path)?;
        Ok(())
    }

    fn find_scene_point_cloud(&self) -> Result<Option<PathBuf>> {
        let files = collect_files_recursive(&self.paths.scene_dir())?;
        Ok(files
            .into_iter()
            .find(|path| path.extension().is_some_and(|ext| ext == "ply")))
    }

    /// Track the scene as an asset like any other.
    ///
    /// Nothing is recorded when scene generation did not run and left no
    /// output directory behind.
    pub(super) fn record_scene(&mut self, scene_run: Option<&StepRun>) -> Result<()> {
        let scene_dir = self.paths.scene_dir();
        if scene_run.is_none() && !scene_dir.is_dir() {
            tracing::debug!("no scene output to record");
            return Ok(());
        }
        let snapshot = ParameterSnapshot {
            run: self.parameters.clone(),
            routing: None,
            command: scene_run.map(|run| run.command.argv()).unwrap_or_default(),
        };
        self.manifest.record_asset_start(
            SCENE_ASSET_ID,
            AssetType::Scene,
            Backend::MlSharp,
            SignalBag::new(),
            snapshot,
        )?;

        if let Some(run) = scene_run.filter(|run| !run.result.success) {
            let message = format!("scene generation {}", run.result.failure_summary());
            record_failure(
                self,
                SCENE_ASSET_ID,
                AssetType::Scene,
                &scene_dir,
                ErrorKind::BackendExecutionError,
                &message,
                Some(&run.result),
            )?;
            return Ok(());
        }

        let check = validate_outputs(AssetType::Scene.as_str(), &scene_dir);
        if !check.ok {
            let message = format!("missing required outputs: {}", check.missing.join(", "));
            record_failure(
                self,
                SCENE_ASSET_ID,
                AssetType::Scene,
                &scene_dir,
                ErrorKind::OutputValidationError,
                &message,
                None,
            )?;
            return Ok(());
        }
        self.manifest
            .record_asset_success(SCENE_ASSET_ID, check.found, Vec::new())
    }

    /// Run harvesting and load the items it emitted, in file order.
    pub(super) fn harvest(&self) -> Result<Vec<HarvestItem>> {
        let mut args = vec![
            "--input".to_string(),
            path_arg(&self.input),
            "--output_dir".to_string(),
            path_arg(&self.paths.props_dir()),
            "--lighting_probe".to_string(),
            path_arg(&self.paths.lighting_probe_path()),
        ];
        if let Some(roi_hint) = &self.options.roi_hint {
            args.push("--roi_hint".to_string());
            args.push(roi_hint.clone());
        }
        if self.options.disable_skin_rejection {
            args.push("--disable_skin_rejection".to_string());
        }
        self.run_step(StepKey::Harvest, "asset harvesting", args, None)?;

        let manifest_path = self.paths.harvest_manifest_path();
        if !manifest_path.is_file() {
            tracing::warn!(
                path = %manifest_path.display(),
                "no harvest manifest found, skipping asset generation"
            );
            return Ok(Vec::new());
        }
        load_harvest_manifest(&manifest_path)
    }

    /// Hand the finished manifest to the report renderer; failures are warnings.
    pub(super) fn generate_report(&self) -> Result<()> {
        let args = vec![
            "--output_root".to_string(),
            path_arg(self.paths.root()),
            "--input_image".to_string(),
            path_arg(&self.input),
            "--manifest".to_string(),
            path_arg(self.manifest.path()),
        ];
        if let Some(run) = self.run_step(StepKey::Report, "report generation", args, None)? {
            if run.result.success {
                tracing::info!(report = %self.paths.report_path().display(), "report written");
            } else if !run.result.executable_missing {
                tracing::warn!(
                    reason = %run.result.failure_summary(),
                    "report generation failed"
                );
            }
        }
        Ok(())
    }
}
