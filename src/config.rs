//! Pipeline configuration.
//!
//! The config maps each external step to the interpreter, script and
//! environment that run it. It is loaded once per invocation and passed
//! down explicitly; nothing reads it from global state.
use crate::routing::Backend;
use crate::runner::StepCommand;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current schema version for the pipeline config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV_VAR: &str = "ASSET_PIPELINE_CONFIG";

/// External steps the orchestrator knows how to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    SceneGen,
    Geometry,
    Lighting,
    Harvest,
    Trellis,
    Sam3dObjects,
    Sam3dBody,
    Package,
    Report,
}

impl StepKey {
    #[cfg(test)]
    pub const ALL: [StepKey; 9] = [
        StepKey::SceneGen,
        StepKey::Geometry,
        StepKey::Lighting,
        StepKey::Harvest,
        StepKey::Trellis,
        StepKey::Sam3dObjects,
        StepKey::Sam3dBody,
        StepKey::Package,
        StepKey::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKey::SceneGen => "scene_gen",
            StepKey::Geometry => "geometry",
            StepKey::Lighting => "lighting",
            StepKey::Harvest => "harvest",
            StepKey::Trellis => "trellis",
            StepKey::Sam3dObjects => "sam3d_objects",
            StepKey::Sam3dBody => "sam3d_body",
            StepKey::Package => "package",
            StepKey::Report => "report",
        }
    }

    /// Step that runs a generation backend.
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::MlSharp => StepKey::SceneGen,
            Backend::Trellis => StepKey::Trellis,
            Backend::Sam3dObjects => StepKey::Sam3dObjects,
            Backend::Sam3dBody => StepKey::Sam3dBody,
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Interpreter command line (shell-word split); omit to execute `script` directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub script: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Blender-based import check; absent means the check is not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DccConfig {
    pub blender: String,
    pub script: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub schema_version: u32,
    /// Deadline applied to steps without their own `timeout_secs`.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    pub steps: BTreeMap<StepKey, StepConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcc: Option<DccConfig>,
}

/// A validated config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    /// `None` when built-in defaults are in use.
    pub path: Option<PathBuf>,
    /// Relative script paths resolve against this directory.
    pub base_dir: PathBuf,
}

fn conda_python(env_name: &str) -> Option<String> {
    Some(format!("conda run --no-capture-output -n {env_name} python"))
}

fn step(program: Option<String>, script: &str, env: &[(&str, &str)]) -> StepConfig {
    StepConfig {
        program,
        script: PathBuf::from(script),
        env: env
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        timeout_secs: None,
    }
}

/// Built-in defaults: one conda environment per GPU backend, scripts laid
/// out under `src/steps/` relative to the working directory.
pub fn default_config() -> PipelineConfig {
    let base = Some("python3".to_string());
    let mut steps = BTreeMap::new();
    steps.insert(
        StepKey::SceneGen,
        step(
            conda_python("sharp"),
            "src/steps/scene_gen/run_sharp.py",
            &[("PYTHONPATH", "modules/ml-sharp/src")],
        ),
    );
    steps.insert(
        StepKey::Geometry,
        step(
            conda_python("dust3r"),
            "src/steps/geometry/run_dust3r_tiled.py",
            &[("PYTHONPATH", "modules/dust3r")],
        ),
    );
    steps.insert(
        StepKey::Lighting,
        step(base.clone(), "src/steps/lighting/estimate_lighting.py", &[]),
    );
    steps.insert(
        StepKey::Harvest,
        step(base.clone(), "src/steps/assets/harvest_hero_assets.py", &[]),
    );
    steps.insert(
        StepKey::Trellis,
        step(
            conda_python("trellis"),
            "src/steps/assets/run_trellis_local.py",
            &[("PYTHONPATH", "modules/TRELLIS"), ("ATTN_BACKEND", "naive")],
        ),
    );
    steps.insert(
        StepKey::Sam3dObjects,
        step(
            conda_python("sam3d-objects"),
            "src/steps/assets/run_sam3d_objects_local.py",
            &[("PYTHONPATH", "modules/sam-3d-objects")],
        ),
    );
    steps.insert(
        StepKey::Sam3dBody,
        step(
            conda_python("sam3d-body"),
            "src/steps/assets/run_sam3d_body_local.py",
            &[("PYTHONPATH", "modules/sam-3d-body")],
        ),
    );
    steps.insert(
        StepKey::Package,
        step(base.clone(), "src/steps/export/package_asset_gbt.py", &[]),
    );
    steps.insert(
        StepKey::Report,
        step(base, "src/steps/report/generate_report.py", &[]),
    );
    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        step_timeout_secs: None,
        steps,
        dcc: None,
    }
}

/// Resolve and load the config: explicit path > `ASSET_PIPELINE_CONFIG` > defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let from_env = std::env::var_os(CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => load_config_file(&path),
        None => {
            let base_dir = std::env::current_dir().context("resolve working directory")?;
            let config = default_config();
            validate_config(&config)?;
            Ok(LoadedConfig {
                config,
                path: None,
                base_dir,
            })
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<LoadedConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    let path = std::path::absolute(path)
        .with_context(|| format!("resolve config path {}", path.display()))?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig {
        config,
        path: Some(path),
        base_dir,
    })
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    crate::staging::write_atomic_json(path, config)
}

/// Validate schema version, step entries and timeouts.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.step_timeout_secs == Some(0) {
        return Err(anyhow!("step_timeout_secs must be positive"));
    }
    for (key, step) in &config.steps {
        if step.script.as_os_str().is_empty() {
            return Err(anyhow!("steps.{key}.script must be non-empty"));
        }
        if step.timeout_secs == Some(0) {
            return Err(anyhow!("steps.{key}.timeout_secs must be positive"));
        }
        if let Some(program) = &step.program {
            let words = shell_words::split(program)
                .with_context(|| format!("parse steps.{key}.program: {program}"))?;
            if words.is_empty() {
                return Err(anyhow!("steps.{key}.program must be non-empty when set"));
            }
        }
        for name in step.env.keys() {
            if name.is_empty() || name.contains('=') {
                return Err(anyhow!("steps.{key}.env has invalid variable name {name:?}"));
            }
        }
    }
    if let Some(dcc) = &config.dcc {
        if dcc.blender.trim().is_empty() {
            return Err(anyhow!("dcc.blender must be non-empty"));
        }
        if dcc.script.as_os_str().is_empty() {
            return Err(anyhow!("dcc.script must be non-empty"));
        }
        if dcc.timeout_secs == Some(0) {
            return Err(anyhow!("dcc.timeout_secs must be positive"));
        }
    }
    Ok(())
}

impl LoadedConfig {
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Default deadline for steps that have none of their own.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.config.step_timeout_secs.map(Duration::from_secs)
    }

    /// Build the command for a configured step; `None` when the step is not configured.
    pub fn step_command(
        &self,
        key: StepKey,
        name: &str,
        step_id: &str,
        args: Vec<String>,
    ) -> Result<Option<StepCommand>> {
        let Some(step) = self.config.steps.get(&key) else {
            return Ok(None);
        };
        let interpreter = match &step.program {
            Some(program) => shell_words::split(program)
                .with_context(|| format!("parse steps.{key}.program: {program}"))?,
            None => Vec::new(),
        };
        Ok(Some(StepCommand {
            name: name.to_string(),
            step_id: step_id.to_string(),
            interpreter,
            target: self.resolve_path(&step.script),
            args,
            env: step.env.clone(),
            timeout: step.timeout_secs.map(Duration::from_secs),
        }))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
