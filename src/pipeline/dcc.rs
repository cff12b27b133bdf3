//! Best-effort DCC import check.
//!
//! Opens a generated mesh in headless Blender through a configured import
//! script and records what the script reports. The outcome is audit data
//! only; it never changes an asset's status.
use crate::config::DccConfig;
use crate::runner::{RunResult, StepCommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Annotation key the import report is stored under.
pub const DCC_ANNOTATION_KEY: &str = "dcc_import";
pub const DCC_STEP_ID: &str = "dcc_import";

const MESH_NAMES: [&str; 2] = ["mesh.glb", "mesh.obj"];

/// First importable mesh among an asset's outputs.
pub fn find_mesh(outputs: &[PathBuf]) -> Option<&Path> {
    MESH_NAMES.iter().find_map(|name| {
        outputs
            .iter()
            .find(|path| path.file_name().is_some_and(|file| file == *name))
            .map(PathBuf::as_path)
    })
}

/// Locate the Blender binary; `None` (with a warning) when it is not installed.
pub fn resolve_blender(dcc: &DccConfig) -> Option<PathBuf> {
    match which::which(&dcc.blender) {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!(blender = %dcc.blender, error = %err, "blender not found, skipping import check");
            None
        }
    }
}

/// `<blender> -b -P <script> -- <mesh>`
pub fn import_command(
    blender: PathBuf,
    script: &Path,
    mesh: &Path,
    asset_id: &str,
    timeout_secs: Option<u64>,
) -> StepCommand {
    StepCommand {
        name: format!("dcc import check ({asset_id})"),
        step_id: DCC_STEP_ID.to_string(),
        interpreter: Vec::new(),
        target: blender,
        args: vec![
            "-b".to_string(),
            "-P".to_string(),
            script.display().to_string(),
            "--".to_string(),
            mesh.display().to_string(),
        ],
        env: BTreeMap::new(),
        timeout: timeout_secs.map(Duration::from_secs),
    }
}

/// Last line of `stdout` that parses as a JSON object.
pub fn parse_last_json_line(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| {
            serde_json::from_str::<Value>(line)
                .ok()
                .filter(Value::is_object)
        })
}

/// Build the annotation value from a finished import run.
pub fn import_report(result: &RunResult) -> Value {
    let stdout = result
        .stdout_log
        .as_deref()
        .and_then(|path| fs::read_to_string(path).ok())
        .unwrap_or_default();
    match parse_last_json_line(&stdout) {
        Some(report) => report,
        None => json!({
            "import_ok": false,
            "error": format!("no JSON report on stdout ({})", result.failure_summary()),
        }),
    }
}

/// Whether the report says the import worked.
pub fn import_ok(report: &Value) -> bool {
    report.get("import_ok").and_then(Value::as_bool) == Some(true)
}
