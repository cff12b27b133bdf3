//! Append-only step history.
//!
//! One JSON line per launched step, in launch order. The manifest records
//! where each asset ended up; this records how long every step took to get
//! it there.
use crate::runner::{RunResult, StepCommand};
use crate::util::now_epoch_ms;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepHistoryEntry {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_s: f64,
    pub epoch_ms: u128,
}

impl StepHistoryEntry {
    pub fn from_result(
        command: &StepCommand,
        asset_id: Option<&str>,
        result: &RunResult,
    ) -> Result<Self> {
        Ok(Self {
            step: command.step_id.clone(),
            asset_id: asset_id.map(str::to_string),
            success: result.success,
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            duration_s: result.duration_s,
            epoch_ms: now_epoch_ms()?,
        })
    }
}

/// Append a history entry as JSONL.
pub fn append_step_history(path: &Path, entry: &StepHistoryEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create logs dir")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut line = serde_json::to_string(entry).context("serialize step history entry")?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
