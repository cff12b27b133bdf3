//! Typed paths into a session output directory.
//!
//! Every file the orchestrator reads or writes under `<output_root>/<session_id>/`
//! is named here so the pipeline, the tests and external readers agree on one
//! layout.
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `manifest.json` path.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Return the `scene_visual/` directory written by scene generation.
    pub fn scene_dir(&self) -> PathBuf {
        self.root.join("scene_visual")
    }

    /// Return the `dust3r/` directory written by geometry reconstruction.
    pub fn geometry_dir(&self) -> PathBuf {
        self.root.join("dust3r")
    }

    /// Return the `lighting_probe.json` path.
    pub fn lighting_probe_path(&self) -> PathBuf {
        self.root.join("lighting_probe.json")
    }

    /// Return the `props/` directory populated by harvesting.
    pub fn props_dir(&self) -> PathBuf {
        self.root.join("props")
    }

    /// Return the `props/harvest_manifest.json` path.
    pub fn harvest_manifest_path(&self) -> PathBuf {
        self.props_dir().join("harvest_manifest.json")
    }

    /// Return the `assets/` directory holding one directory per generated asset.
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_dir(&self, asset_id: &str) -> PathBuf {
        self.assets_dir().join(asset_id)
    }

    /// Return the `logs/` directory used as the runner's log root.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Return the `logs/steps.jsonl` step history path.
    pub fn step_history_path(&self) -> PathBuf {
        self.logs_dir().join("steps.jsonl")
    }

    /// Return the `report.html` path the report step is expected to write.
    pub fn report_path(&self) -> PathBuf {
        self.root.join("report.html")
    }
}
