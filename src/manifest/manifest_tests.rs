use super::*;
use crate::routing::{route, RouteOverrides};
use serde_json::json;

fn run_parameters(root: &Path) -> RunParameters {
    RunParameters {
        input: root.join("shot_010.png"),
        output_root: root.to_path_buf(),
        config_path: None,
        skip_scene: true,
        skip_geometry: false,
        skip_package: false,
        forced_asset_type: None,
        forced_backend: None,
        roi_hint: Some("10,20,300,400".to_string()),
        disable_skin_rejection: false,
        step_timeout_secs: Some(3600),
    }
}

fn snapshot(root: &Path, signals: &SignalBag) -> ParameterSnapshot {
    ParameterSnapshot {
        run: run_parameters(root),
        routing: Some(route(signals, RouteOverrides::default())),
        command: vec!["python3".to_string(), "run_trellis.py".to_string()],
    }
}

fn new_manifest(root: &Path) -> Manifest {
    let input = root.join("shot_010.png");
    std::fs::write(&input, b"pixels").expect("write input");
    let argv = vec!["asset-pipeline".to_string(), "run".to_string()];
    let data = build_session(&SessionSource {
        session_id: "shot_010",
        input: &input,
        output_root: root,
        argv: &argv,
    })
    .expect("build session");
    Manifest::create(root.join("manifest.json"), data).expect("create manifest")
}

fn start_prop(manifest: &mut Manifest, root: &Path, asset_id: &str) {
    let signals = SignalBag::new()
        .with("has_mask", true)
        .with("num_instances", 2)
        .with("area_ratio", 0.3)
        .with("bg_score", "low");
    let snapshot = snapshot(root, &signals);
    manifest
        .record_asset_start(
            asset_id,
            AssetType::Prop,
            Backend::Sam3dObjects,
            signals,
            snapshot,
        )
        .expect("record start");
}

fn on_disk(manifest: &Manifest) -> ManifestData {
    read_json(manifest.path()).expect("read manifest from disk")
}

#[test]
fn create_persists_session_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = new_manifest(dir.path());

    let data = on_disk(&manifest);
    assert_eq!(data.session_id, "shot_010");
    assert_eq!(data.schema_version, MANIFEST_SCHEMA_VERSION);
    assert_eq!(data.inputs.files, vec![dir.path().join("shot_010.png")]);
    assert_eq!(
        data.inputs.sha256_map.values().next().map(String::as_str),
        Some(crate::util::sha256_hex(b"pixels").as_str())
    );
    assert_eq!(data.reproduce.command, "asset-pipeline run");
    assert!(data.assets.is_empty());
}

#[test]
fn every_mutation_is_visible_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());

    start_prop(&mut manifest, dir.path(), "prop_a");
    assert_eq!(on_disk(&manifest).assets[0].status, AssetStatus::Processing);

    let log = dir.path().join("logs/prop_a/generate.stdout.log");
    manifest
        .append_run_logs("prop_a", &[log.clone(), log.clone()])
        .expect("append logs");
    assert_eq!(on_disk(&manifest).assets[0].run_log_paths, vec![log.clone()]);

    let mesh = dir.path().join("assets/prop_a/mesh.glb");
    manifest
        .record_asset_success("prop_a", vec![mesh.clone()], vec![log.clone()])
        .expect("record success");
    let data = on_disk(&manifest);
    assert_eq!(data.assets[0].status, AssetStatus::Success);
    assert_eq!(data.assets[0].outputs, vec![mesh]);
    assert!(data.assets[0].error.is_none());
    assert!(data.assets[0].finished_at_epoch_ms.is_some());
    assert_eq!(&data, manifest.data());
}

#[test]
fn restarting_an_id_overwrites_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());

    start_prop(&mut manifest, dir.path(), "prop_a");
    start_prop(&mut manifest, dir.path(), "prop_b");
    manifest
        .record_asset_failure(
            "prop_a",
            ErrorKind::BackendExecutionError,
            "exited with code 1",
            None,
            Vec::new(),
        )
        .expect("record failure");

    start_prop(&mut manifest, dir.path(), "prop_a");

    let ids: Vec<&str> = manifest
        .assets()
        .iter()
        .map(|asset| asset.asset_id.as_str())
        .collect();
    assert_eq!(ids, vec!["prop_a", "prop_b"]);
    let restarted = manifest.asset("prop_a").expect("prop_a");
    assert_eq!(restarted.status, AssetStatus::Processing);
    assert!(restarted.error.is_none());
}

#[test]
fn failure_keeps_partial_outputs_and_appends_log_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());
    start_prop(&mut manifest, dir.path(), "prop_a");

    let error_log = dir.path().join("assets/prop_a/error.log");
    manifest
        .append_run_logs("prop_a", std::slice::from_ref(&error_log))
        .expect("append logs");
    let preview = dir.path().join("assets/prop_a/preview.png");
    manifest
        .record_asset_failure(
            "prop_a",
            ErrorKind::OutputValidationError,
            "missing required outputs: mesh.glb|splat.ply",
            Some(&error_log),
            vec![preview.clone()],
        )
        .expect("record failure");

    let asset = &on_disk(&manifest).assets[0];
    assert_eq!(asset.status, AssetStatus::Failed);
    assert_eq!(asset.outputs, vec![preview]);
    assert_eq!(asset.run_log_paths, vec![error_log.clone()]);
    let error = asset.error.as_ref().expect("error recorded");
    assert_eq!(error.kind, ErrorKind::OutputValidationError);
    assert_eq!(error.log_path.as_deref(), Some(error_log.as_path()));
}

#[test]
fn error_kind_serializes_as_type_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());
    start_prop(&mut manifest, dir.path(), "prop_a");
    manifest
        .record_asset_failure(
            "prop_a",
            ErrorKind::PackagingError,
            "package step exited with code 2",
            None,
            Vec::new(),
        )
        .expect("record failure");

    let raw: Value = read_json(manifest.path()).expect("raw manifest");
    assert_eq!(raw["assets"][0]["error"]["type"], json!("PackagingError"));
    assert_eq!(raw["assets"][0]["status"], json!("failed"));
    assert_eq!(raw["assets"][0]["backend_selected"], json!("sam3d_objects"));
    assert_eq!(raw["assets"][0]["signals"]["bg_score"], json!("low"));
}

#[test]
fn unknown_ids_fail_loudly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());

    let err = manifest
        .append_run_logs("ghost", &[PathBuf::from("x.log")])
        .expect_err("unknown asset");
    assert!(err.to_string().contains("ghost"));
    assert!(manifest
        .record_asset_success("ghost", Vec::new(), Vec::new())
        .is_err());
    assert!(manifest
        .record_annotation("ghost", "dcc_import", json!({}))
        .is_err());
}

#[test]
fn terminal_states_do_not_move_without_a_new_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());
    start_prop(&mut manifest, dir.path(), "prop_a");
    manifest
        .record_asset_failure(
            "prop_a",
            ErrorKind::BackendExecutionError,
            "exited with code 1",
            None,
            Vec::new(),
        )
        .expect("record failure");

    assert!(manifest
        .record_asset_success("prop_a", Vec::new(), Vec::new())
        .is_err());
    assert_eq!(
        manifest.asset("prop_a").expect("prop_a").status,
        AssetStatus::Failed
    );
}

#[test]
fn round_trip_preserves_every_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manifest = new_manifest(dir.path());
    start_prop(&mut manifest, dir.path(), "prop_a");
    start_prop(&mut manifest, dir.path(), "prop_b");
    start_prop(&mut manifest, dir.path(), "prop_c");
    manifest
        .record_annotation(
            "prop_a",
            "dcc_import",
            json!({"import_ok": true, "stats": {"vertices": 12}}),
        )
        .expect("annotate");
    manifest
        .record_asset_success("prop_a", vec![PathBuf::from("mesh.glb")], Vec::new())
        .expect("success");
    manifest
        .record_asset_failure(
            "prop_b",
            ErrorKind::BackendExecutionError,
            "timed out after 3600.0s",
            Some(Path::new("error.log")),
            Vec::new(),
        )
        .expect("failure");

    let loaded = Manifest::load(manifest.path()).expect("load");

    assert_eq!(loaded.data(), manifest.data());
    assert_eq!(
        loaded.summary(),
        ManifestSummary {
            total: 3,
            processing: 1,
            success: 1,
            failed: 1,
        }
    );
}

#[test]
fn load_rejects_unknown_schema_versions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = new_manifest(dir.path());
    let mut data = manifest.data().clone();
    data.schema_version = MANIFEST_SCHEMA_VERSION + 1;
    write_atomic_json(manifest.path(), &data).expect("rewrite");

    assert!(Manifest::load(manifest.path()).is_err());
}
