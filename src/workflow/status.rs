//! `status`: summarize a session manifest.
//!
//! Reads only the manifest, so it is safe to run while a pipeline is still
//! writing it.
use super::EXIT_OK;
use crate::cli::StatusArgs;
use crate::manifest::{AssetStatus, ErrorKind, Manifest, ManifestSummary};
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub session_id: String,
    pub manifest: PathBuf,
    pub summary: ManifestSummary,
    pub assets: Vec<AssetLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetLine {
    pub asset_id: String,
    pub asset_type: String,
    pub backend: String,
    pub status: AssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<PathBuf>,
}

pub fn run_status(args: &StatusArgs) -> Result<u8> {
    let manifest = Manifest::load(&args.manifest)?;
    let report = status_report(&manifest);
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status")?;
        println!("{text}");
    } else {
        print!("{}", render_status(&report));
    }
    Ok(EXIT_OK)
}

pub fn status_report(manifest: &Manifest) -> StatusReport {
    let assets = manifest
        .assets()
        .iter()
        .map(|asset| AssetLine {
            asset_id: asset.asset_id.clone(),
            asset_type: asset.asset_type.to_string(),
            backend: asset.backend_selected.to_string(),
            status: asset.status,
            error_type: asset.error.as_ref().map(|error| error.kind),
            error_message: asset.error.as_ref().map(|error| error.message.clone()),
            error_log: asset.error.as_ref().and_then(|error| error.log_path.clone()),
        })
        .collect();
    StatusReport {
        session_id: manifest.session_id().to_string(),
        manifest: manifest.path().to_path_buf(),
        summary: manifest.summary(),
        assets,
    }
}

/// Human-readable summary; log paths are shown relative to the session directory.
pub fn render_status(report: &StatusReport) -> String {
    let base = report.manifest.parent().filter(|dir| !dir.as_os_str().is_empty());
    let summary = &report.summary;
    let mut out = format!(
        "session {}: {} asset(s): {} success, {} failed, {} processing\n",
        report.session_id, summary.total, summary.success, summary.failed, summary.processing
    );
    for asset in &report.assets {
        out.push_str(&format!(
            "  {:<24} {:<6} {:<14} {}\n",
            asset.asset_id, asset.asset_type, asset.backend, asset.status
        ));
        if let Some(kind) = asset.error_type {
            let message = asset.error_message.as_deref().unwrap_or_default();
            out.push_str(&format!("      {kind}: {message}\n"));
        }
        if let Some(log) = &asset.error_log {
            out.push_str(&format!("      log: {}\n", display_path(log, base)));
        }
    }
    out
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
