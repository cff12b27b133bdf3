//! Session manifest and asset lifecycle.
//!
//! The manifest is an append-only provenance log: one session header plus one
//! record per asset. Records move `processing -> success | failed` through
//! the `record_*` operations below and are never removed. Every mutation ends
//! by rewriting the whole file atomically, so the on-disk manifest matches
//! memory as soon as a call returns and a killed run leaves a readable record.
mod provenance;
mod types;

pub use provenance::{build_session, SessionSource};
pub use types::*;

use crate::routing::{AssetType, Backend, SignalBag};
use crate::staging::{read_json, write_atomic_json};
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    data: ManifestData,
}

impl Manifest {
    /// Start a new manifest for a session and write it immediately.
    pub fn create(path: PathBuf, data: ManifestData) -> Result<Self> {
        let manifest = Self { path, data };
        manifest.save()?;
        Ok(manifest)
    }

    /// Load an existing manifest (for status and reports; may be mid-run).
    pub fn load(path: &Path) -> Result<Self> {
        let data: ManifestData = read_json(path).context("load manifest")?;
        if data.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported manifest schema_version {} in {}",
                data.schema_version,
                path.display()
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn data(&self) -> &ManifestData {
        &self.data
    }

    pub fn session_id(&self) -> &str {
        &self.data.session_id
    }

    pub fn assets(&self) -> &[AssetRecord] {
        &self.data.assets
    }

    #[cfg(test)]
    pub fn asset(&self, asset_id: &str) -> Option<&AssetRecord> {
        self.data
            .assets
            .iter()
            .find(|asset| asset.asset_id == asset_id)
    }

    /// Begin (or restart) processing an asset.
    ///
    /// Starting an id that already exists replaces that record in place,
    /// keeping its position. Reprocessing a logical asset therefore never
    /// grows the list; this is the only way a terminal record re-enters
    /// `processing`.
    pub fn record_asset_start(
        &mut self,
        asset_id: &str,
        asset_type: AssetType,
        backend: Backend,
        signals: SignalBag,
        parameters_snapshot: ParameterSnapshot,
    ) -> Result<()> {
        let record = AssetRecord {
            asset_id: asset_id.to_string(),
            asset_type,
            backend_selected: backend,
            status: AssetStatus::Processing,
            signals,
            parameters_snapshot,
            outputs: Vec::new(),
            error: None,
            run_log_paths: Vec::new(),
            annotations: Default::default(),
            started_at_epoch_ms: now_epoch_ms()? as u64,
            finished_at_epoch_ms: None,
        };
        match self.position(asset_id) {
            Some(index) => {
                tracing::debug!(asset_id, "restarting existing asset record");
                self.data.assets[index] = record;
            }
            None => self.data.assets.push(record),
        }
        self.save()
    }

    /// Merge log paths into an asset's log list, skipping duplicates.
    pub fn append_run_logs(&mut self, asset_id: &str, paths: &[PathBuf]) -> Result<()> {
        let asset = self.asset_mut(asset_id, "appending logs")?;
        merge_paths(&mut asset.run_log_paths, paths);
        self.save()
    }

    pub fn record_asset_success(
        &mut self,
        asset_id: &str,
        outputs: Vec<PathBuf>,
        run_log_paths: Vec<PathBuf>,
    ) -> Result<()> {
        let finished = now_epoch_ms()? as u64;
        let asset = self.processing_asset_mut(asset_id, "marking success")?;
        asset.status = AssetStatus::Success;
        asset.outputs = dedup_paths(outputs);
        asset.error = None;
        asset.run_log_paths = dedup_paths(run_log_paths);
        asset.finished_at_epoch_ms = Some(finished);
        self.save()
    }

    /// Mark an asset failed, keeping whatever partial outputs exist.
    pub fn record_asset_failure(
        &mut self,
        asset_id: &str,
        kind: ErrorKind,
        message: &str,
        log_path: Option<&Path>,
        outputs: Vec<PathBuf>,
    ) -> Result<()> {
        let finished = now_epoch_ms()? as u64;
        let asset = self.processing_asset_mut(asset_id, "marking failure")?;
        asset.status = AssetStatus::Failed;
        asset.outputs = dedup_paths(outputs);
        asset.error = Some(AssetError {
            kind,
            message: message.to_string(),
            log_path: log_path.map(Path::to_path_buf),
        });
        if let Some(log_path) = log_path {
            merge_paths(&mut asset.run_log_paths, &[log_path.to_path_buf()]);
        }
        asset.finished_at_epoch_ms = Some(finished);
        self.save()
    }

    /// Attach an audit-only value to an asset without touching its lifecycle.
    pub fn record_annotation(&mut self, asset_id: &str, key: &str, value: Value) -> Result<()> {
        let asset = self.asset_mut(asset_id, "annotating")?;
        asset.annotations.insert(key.to_string(), value);
        self.save()
    }

    pub fn summary(&self) -> ManifestSummary {
        let mut summary = ManifestSummary {
            total: self.data.assets.len(),
            ..Default::default()
        };
        for asset in &self.data.assets {
            match asset.status {
                AssetStatus::Processing => summary.processing += 1,
                AssetStatus::Success => summary.success += 1,
                AssetStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Rewrite the manifest file from memory (temp file + rename).
    pub fn save(&self) -> Result<()> {
        write_atomic_json(&self.path, &self.data)
            .with_context(|| format!("save manifest {}", self.path.display()))
    }

    fn position(&self, asset_id: &str) -> Option<usize> {
        self.data
            .assets
            .iter()
            .position(|asset| asset.asset_id == asset_id)
    }

    fn asset_mut(&mut self, asset_id: &str, action: &str) -> Result<&mut AssetRecord> {
        self.data
            .assets
            .iter_mut()
            .find(|asset| asset.asset_id == asset_id)
            .ok_or_else(|| anyhow!("asset '{asset_id}' not found when {action}"))
    }

    fn processing_asset_mut(&mut self, asset_id: &str, action: &str) -> Result<&mut AssetRecord> {
        let asset = self.asset_mut(asset_id, action)?;
        if asset.status.is_terminal() {
            return Err(anyhow!(
                "asset '{asset_id}' is already {} when {action}; record a new start first",
                asset.status
            ));
        }
        Ok(asset)
    }
}

fn merge_paths(existing: &mut Vec<PathBuf>, paths: &[PathBuf]) {
    for path in paths {
        if !path.as_os_str().is_empty() && !existing.contains(path) {
            existing.push(path.clone());
        }
    }
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(paths.len());
    merge_paths(&mut out, &paths);
    out
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
