//! Harvest manifest reader.
//!
//! The harvester writes a JSON array of crops with their routing signals.
//! Fields beyond `id`, `path` and `signals` are ignored.
use super::scene::SCENE_ASSET_ID;
use crate::routing::SignalBag;
use crate::staging::read_json;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarvestItem {
    pub id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub signals: SignalBag,
}

/// Load harvested items in file order; relative crop paths resolve against the manifest's directory.
pub fn load_harvest_manifest(path: &Path) -> Result<Vec<HarvestItem>> {
    let mut items: Vec<HarvestItem> = read_json(path).context("load harvest manifest")?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut seen = BTreeSet::new();
    for (index, item) in items.iter_mut().enumerate() {
        check_asset_id(&item.id)
            .with_context(|| format!("harvest item {index} in {}", path.display()))?;
        if item.path.is_relative() {
            item.path = base.join(&item.path);
        }
        if !seen.insert(item.id.clone()) {
            tracing::warn!(
                asset_id = %item.id,
                "duplicate harvest id; the later item replaces the earlier record"
            );
        }
    }
    Ok(items)
}

/// Ids name directories under the session, so each must be one plain path
/// component, and `scene` belongs to the scene record.
fn check_asset_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(anyhow!("empty id"));
    }
    if id == SCENE_ASSET_ID {
        return Err(anyhow!("id {id:?} is reserved for the scene asset"));
    }
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == id => Ok(()),
        _ => Err(anyhow!("id {id:?} is not a single file name")),
    }
}
