//! Shared test infrastructure for integration tests.
//!
//! A `PipelineFixture` owns a temp directory holding an input image, stub
//! step scripts (run through `sh`) and a pipeline config pointing at them.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Harvest stub: records its argv, then emits three crops whose signals route
/// to trellis, sam3d_objects and sam3d_body respectively.
pub const HARVEST_THREE_ITEMS: &str = r#"
out=""
args="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf '%s\n' "$args" > "$out/harvest_args.txt"
for id in prop_01 prop_02 person_01; do printf 'png' > "$out/$id.png"; done
cat > "$out/harvest_manifest.json" <<'JSON'
[
  {"id": "prop_01", "path": "prop_01.png",
   "signals": {"has_mask": false, "num_instances": 1, "area_ratio": 0.9, "bg_score": "low"}},
  {"id": "prop_02", "path": "prop_02.png",
   "signals": {"has_mask": true, "num_instances": 3, "area_ratio": 0.2, "bg_score": "high"}},
  {"id": "person_01", "path": "person_01.png",
   "signals": {"has_person": true}}
]
JSON
"#;

/// Scene generation stub writing the point cloud and the three views.
pub const SCENE_GEN_OK: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-path) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf 'ply' > "$out/scene.ply"
for view in left center right; do printf 'png' > "$out/view_$view.png"; done
"#;

/// Scene generation stub that exits cleanly but only writes the point cloud.
pub const SCENE_GEN_NO_VIEWS: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-path) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf 'ply' > "$out/scene.ply"
"#;

/// Records its argv next to the stub script and does nothing else.
pub const RECORD_ARGS: &str = r#"
printf '%s\n' "$*" > "$(dirname "$0")/$(basename "$0" .sh)_args.txt"
"#;

/// Lighting stub: records its argv and writes a dimmed probe with an extra field.
pub const LIGHTING_OK: &str = r#"
printf '%s\n' "$*" > "$(dirname "$0")/lighting_args.txt"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat > "$out" <<'JSON'
{"ambient_light": {"r": 0.25, "g": 0.5, "b": 0.75}, "sh_coeffs": [0.1, 0.2]}
JSON
"#;

/// Prop backend stub that writes a complete prop artifact set.
pub const PROP_BACKEND_OK: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf 'glb' > "$out/mesh.glb"
printf 'png' > "$out/preview.png"
echo "generated $out"
"#;

/// Backend stub that crashes after printing to stderr.
pub const BACKEND_CRASH: &str = r#"
echo "loading weights"
echo "CUDA out of memory" >&2
exit 1
"#;

/// Human backend stub using the `--image/--output_dir` convention.
pub const HUMAN_BACKEND_OK: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
printf 'obj' > "$out/mesh.obj"
printf '{}' > "$out/params.json"
printf 'png' > "$out/preview.png"
"#;

pub struct PipelineFixture {
    pub temp_dir: TempDir,
    steps: serde_json::Map<String, Value>,
}

impl Default for PipelineFixture {
    fn default() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("stubs")).expect("create stubs dir");
        std::fs::write(temp_dir.path().join("shot_010.png"), b"not really a png")
            .expect("write input");
        Self {
            temp_dir,
            steps: serde_json::Map::new(),
        }
    }
}

impl PipelineFixture {
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn input(&self) -> PathBuf {
        self.root().join("shot_010.png")
    }

    pub fn output_root(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_root().join("shot_010")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.session_dir().join("manifest.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("pipeline.json")
    }

    /// Write `body` as `stubs/<name>.sh` and configure `step` to run it with `sh`.
    pub fn stub_step(&mut self, step: &str, name: &str, body: &str) -> &mut Self {
        let rel = format!("stubs/{name}.sh");
        std::fs::write(self.root().join(&rel), body).expect("write stub");
        self.steps
            .insert(step.to_string(), json!({"program": "sh", "script": rel}));
        self
    }

    /// Configure `step` with a script that does not exist.
    pub fn missing_step(&mut self, step: &str) -> &mut Self {
        self.steps.insert(
            step.to_string(),
            json!({"program": "sh", "script": format!("stubs/{step}_missing.sh")}),
        );
        self
    }

    pub fn write_config(&self) {
        let config = json!({
            "schema_version": 1,
            "steps": Value::Object(self.steps.clone()),
        });
        std::fs::write(
            self.config_path(),
            serde_json::to_vec_pretty(&config).expect("serialize config"),
        )
        .expect("write config");
    }

    /// Run `asset-pipeline run --skip-scene` against this fixture.
    pub fn run(&self, extra: &[&str]) -> Output {
        let mut args = vec!["--skip-scene"];
        args.extend_from_slice(extra);
        self.run_with_scene(&args)
    }

    /// Run `asset-pipeline run` including the scene stages.
    pub fn run_with_scene(&self, extra: &[&str]) -> Output {
        self.write_config();
        let mut cmd = pipeline_command();
        cmd.arg("run")
            .arg("--input")
            .arg(self.input())
            .arg("--output-root")
            .arg(self.output_root())
            .arg("--config")
            .arg(self.config_path())
            .args(extra);
        cmd.output().expect("run asset-pipeline")
    }

    /// Argv recorded by a stub as `stubs/<name>_args.txt`, if it ran.
    pub fn recorded_args(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root().join(format!("stubs/{name}_args.txt"))).ok()
    }

    pub fn manifest(&self) -> Value {
        let text = std::fs::read_to_string(self.manifest_path()).expect("read manifest");
        serde_json::from_str(&text).expect("parse manifest")
    }
}

/// The built binary with a config-free environment.
pub fn pipeline_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_asset-pipeline"));
    cmd.env_remove("ASSET_PIPELINE_CONFIG")
        .env("RUST_LOG", "asset_pipeline=debug");
    cmd
}

/// Find an asset record by id.
pub fn asset<'a>(manifest: &'a Value, asset_id: &str) -> &'a Value {
    manifest["assets"]
        .as_array()
        .and_then(|assets| assets.iter().find(|asset| asset["asset_id"] == asset_id))
        .unwrap_or_else(|| panic!("asset {asset_id} not in manifest"))
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
