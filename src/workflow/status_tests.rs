use super::{render_status, status_report};
use crate::manifest::{
    build_session, AssetStatus, ErrorKind, Manifest, ParameterSnapshot, RunParameters,
    SessionSource,
};
use crate::routing::{AssetType, Backend, SignalBag};
use std::path::Path;

fn manifest_with_two_assets(root: &Path) -> Manifest {
    let input = root.join("shot_020.png");
    std::fs::write(&input, b"pixels").expect("write input");
    let argv = vec!["asset-pipeline".to_string()];
    let data = build_session(&SessionSource {
        session_id: "shot_020",
        input: &input,
        output_root: root,
        argv: &argv,
    })
    .expect("session");
    let mut manifest = Manifest::create(root.join("manifest.json"), data).expect("create");
    let snapshot = ParameterSnapshot {
        run: RunParameters {
            input,
            output_root: root.to_path_buf(),
            config_path: None,
            skip_scene: true,
            skip_geometry: true,
            skip_package: true,
            forced_asset_type: None,
            forced_backend: None,
            roi_hint: None,
            disable_skin_rejection: false,
            step_timeout_secs: None,
        },
        routing: None,
        command: Vec::new(),
    };
    for id in ["prop_01", "person_01"] {
        manifest
            .record_asset_start(
                id,
                AssetType::Prop,
                Backend::Trellis,
                SignalBag::new(),
                snapshot.clone(),
            )
            .expect("start");
    }
    manifest
        .record_asset_success("prop_01", Vec::new(), Vec::new())
        .expect("success");
    manifest
        .record_asset_failure(
            "person_01",
            ErrorKind::BackendExecutionError,
            "trellis exited with code 1",
            Some(&root.join("assets/person_01/error.log")),
            Vec::new(),
        )
        .expect("failure");
    manifest
}

#[test]
fn report_lists_failures_with_kind_and_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = manifest_with_two_assets(dir.path());

    let report = status_report(&manifest);

    assert_eq!(report.session_id, "shot_020");
    assert_eq!(report.summary.success, 1);
    assert_eq!(report.summary.failed, 1);
    let failed = &report.assets[1];
    assert_eq!(failed.status, AssetStatus::Failed);
    assert_eq!(failed.error_type, Some(ErrorKind::BackendExecutionError));
    assert_eq!(
        failed.error_log.as_deref(),
        Some(dir.path().join("assets/person_01/error.log").as_path())
    );
    assert!(report.assets[0].error_type.is_none());
}

#[test]
fn rendered_status_shows_logs_relative_to_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = manifest_with_two_assets(dir.path());

    let text = render_status(&status_report(&manifest));

    assert!(text.starts_with("session shot_020: 2 asset(s): 1 success, 1 failed, 0 processing\n"));
    assert!(text.contains("BackendExecutionError: trellis exited with code 1"));
    assert!(text.contains("log: assets/person_01/error.log"));
}
