//! Lighting probe handling.
//!
//! Harvesting relights crops with the probe, so a probe must always exist
//! after the lighting stage, estimated or not.
use crate::staging::{read_json, write_atomic_json};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightingProbe {
    pub ambient_light: AmbientLight,
    /// Estimator-specific fields, kept as written.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Write the neutral default probe to `path`.
pub fn write_default_probe(path: &Path) -> Result<LightingProbe> {
    let probe = LightingProbe::default();
    write_atomic_json(path, &probe)?;
    Ok(probe)
}

/// Read the probe at `path`, replacing a missing or malformed one with the default.
pub fn ensure_probe(path: &Path) -> Result<LightingProbe> {
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "no lighting probe produced, using default");
        return write_default_probe(path);
    }
    match read_json::<LightingProbe>(path) {
        Ok(probe) => {
            let light = probe.ambient_light;
            tracing::info!(r = light.r, g = light.g, b = light.b, "lighting probe loaded");
            Ok(probe)
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "malformed lighting probe, using default"
            );
            write_default_probe(path)
        }
    }
}
