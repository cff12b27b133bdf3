//! Reproducibility metadata captured once per session.
use super::types::{
    InputsRecord, ManifestData, ReproduceRecord, RuntimeInfo, VersionsRecord,
    MANIFEST_SCHEMA_VERSION,
};
use crate::util::{format_command_line, now_epoch_ms, sha256_file};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// What the session header is built from.
pub struct SessionSource<'a> {
    pub session_id: &'a str,
    pub input: &'a Path,
    pub output_root: &'a Path,
    /// Full process argv, argv[0] included.
    pub argv: &'a [String],
}

pub fn build_session(source: &SessionSource<'_>) -> Result<ManifestData> {
    let input_key = source.input.display().to_string();
    let mut sha256_map = BTreeMap::new();
    match sha256_file(source.input) {
        Ok(digest) => {
            sha256_map.insert(input_key, digest);
        }
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "could not hash input"),
    }

    let command = match source.argv.split_first() {
        Some((program, rest)) => format_command_line(program, rest),
        None => String::new(),
    };

    Ok(ManifestData {
        schema_version: MANIFEST_SCHEMA_VERSION,
        session_id: source.session_id.to_string(),
        inputs: InputsRecord {
            files: vec![source.input.to_path_buf()],
            sha256_map,
        },
        versions: VersionsRecord {
            pipeline_commit: pipeline_commit(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            runtime: runtime_info(),
        },
        reproduce: ReproduceRecord { command },
        output_root: PathBuf::from(source.output_root),
        created_at_epoch_ms: now_epoch_ms()? as u64,
        assets: Vec::new(),
    })
}

fn pipeline_commit() -> String {
    git_head().unwrap_or_else(|| format!("v{}", env!("CARGO_PKG_VERSION")))
}

fn git_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!commit.is_empty()).then_some(commit)
}

fn runtime_info() -> RuntimeInfo {
    RuntimeInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        family: std::env::consts::FAMILY.to_string(),
    }
}
