//! Minimum artifact sets per asset type.
//!
//! A backend's exit code says it finished; this says it produced something
//! usable. Every candidate file found is reported, pass or fail, so a failed
//! asset still points at whatever partial output exists.
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One requirement: any of the listed file names satisfies it.
type Requirement = &'static [&'static str];

const HUMAN_REQUIREMENTS: &[Requirement] =
    &[&["mesh.obj", "mesh.glb"], &["params.json"], &["preview.png"]];
const PROP_REQUIREMENTS: &[Requirement] = &[&["mesh.glb", "splat.ply"], &["preview.png"]];
const SCENE_REQUIREMENTS: &[Requirement] = &[
    &["scene.ply"],
    &["view_left.png"],
    &["view_center.png"],
    &["view_right.png"],
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputCheck {
    pub ok: bool,
    /// Unsatisfied requirements; alternatives are joined with `|`.
    pub missing: Vec<String>,
    pub found: Vec<PathBuf>,
}

/// Requirement table for an asset type tag; unknown tags have none.
pub fn required_artifacts(asset_type: &str) -> &'static [Requirement] {
    match asset_type {
        "human" => HUMAN_REQUIREMENTS,
        "prop" => PROP_REQUIREMENTS,
        "scene" => SCENE_REQUIREMENTS,
        _ => &[],
    }
}

pub fn validate_outputs(asset_type: &str, asset_dir: &Path) -> OutputCheck {
    let mut missing = Vec::new();
    let mut found = Vec::new();
    for requirement in required_artifacts(asset_type) {
        let present: Vec<PathBuf> = requirement
            .iter()
            .map(|name| asset_dir.join(name))
            .filter(|path| path.is_file())
            .collect();
        if present.is_empty() {
            missing.push(requirement.join("|"));
        }
        found.extend(present);
    }
    OutputCheck {
        ok: missing.is_empty(),
        missing,
        found,
    }
}

/// First mesh or splat that exists, preferring meshes.
pub fn primary_artifact(asset_type: &str, asset_dir: &Path) -> Option<PathBuf> {
    required_artifacts(asset_type)
        .first()?
        .iter()
        .map(|name| asset_dir.join(name))
        .find(|path| path.is_file())
}
