//! Serialized shape of `manifest.json`.
//!
//! Field names are the on-disk contract read by the report renderer and any
//! external poller, so renames here are schema changes.
use crate::routing::{AssetType, Backend, RoutingDecision, SignalBag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Current schema version for `manifest.json`.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestData {
    pub schema_version: u32,
    pub session_id: String,
    pub inputs: InputsRecord,
    pub versions: VersionsRecord,
    pub reproduce: ReproduceRecord,
    pub output_root: PathBuf,
    pub created_at_epoch_ms: u64,
    pub assets: Vec<AssetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsRecord {
    pub files: Vec<PathBuf>,
    /// Input path (as recorded in `files`) to SHA-256 hex digest.
    pub sha256_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionsRecord {
    /// Git commit of the working tree, or the tool version when unavailable.
    pub pipeline_commit: String,
    pub tool_version: String,
    pub runtime: RuntimeInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub os: String,
    pub arch: String,
    pub family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproduceRecord {
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Processing,
    Success,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Processing => "processing",
            AssetStatus::Success => "success",
            AssetStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AssetStatus::Processing)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classes recorded as `error.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    BackendExecutionError,
    OutputValidationError,
    PackagingError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendExecutionError => "BackendExecutionError",
            ErrorKind::OutputValidationError => "OutputValidationError",
            ErrorKind::PackagingError => "PackagingError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub asset_type: AssetType,
    pub backend_selected: Backend,
    pub status: AssetStatus,
    pub signals: SignalBag,
    pub parameters_snapshot: ParameterSnapshot,
    pub outputs: Vec<PathBuf>,
    pub error: Option<AssetError>,
    pub run_log_paths: Vec<PathBuf>,
    /// Audit-only extras (e.g. DCC import statistics); never read for control flow.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
    pub started_at_epoch_ms: u64,
    #[serde(default)]
    pub finished_at_epoch_ms: Option<u64>,
}

/// Everything in effect when an asset was processed, frozen for reruns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub run: RunParameters,
    #[serde(default)]
    pub routing: Option<RoutingDecision>,
    /// Backend argv as spawned.
    #[serde(default)]
    pub command: Vec<String>,
}

/// CLI and config values for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub skip_scene: bool,
    pub skip_geometry: bool,
    pub skip_package: bool,
    pub forced_asset_type: Option<AssetType>,
    pub forced_backend: Option<Backend>,
    pub roi_hint: Option<String>,
    pub disable_skin_rejection: bool,
    pub step_timeout_secs: Option<u64>,
}

/// Per-status counts used by `status` and the exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub total: usize,
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
}
