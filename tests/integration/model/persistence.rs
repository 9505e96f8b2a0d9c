//! Study files across save, load, legacy upgrade and recovery.

use asterstudy::core::OperationError;
use asterstudy::persist::{self, PersistError};
use asterstudy::{FileAttr, Services, StageMode, Validity, Value};

use crate::fixtures::{kw, mesh_and_model};

#[test]
fn reloaded_study_keeps_freezing_and_identity_rules() {
    let mut s = mesh_and_model();
    s.history
        .attach_file(s.stage, 20, "mesh.med", Some(FileAttr::In), false)
        .unwrap();
    let run = s.history.create_run_case(&[0], Some("baseline")).unwrap();
    let last = s.history.nodes().next_id();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.ajs");
    persist::save(&s.history, &path).unwrap();
    let mut loaded = persist::load(&path, Services::builtin().unwrap()).unwrap();

    assert_eq!(loaded.case(run).unwrap().name(), "baseline");
    assert!(loaded.is_shared(s.stage));
    assert_eq!(
        loaded.set_active(s.mesh, false),
        Err(OperationError::SharedStage { stage: s.stage })
    );
    assert_eq!(loaded.check_case(run).unwrap(), Validity::NOTHING);

    let current = loaded.current_case();
    let solve = loaded.create_stage(current, "solve").unwrap();
    assert!(solve.get() >= last);
    let young = loaded.add_variable(solve, "young", Value::Float(2.1e11)).unwrap();
    assert!(loaded.depends_on(young, s.stage));
}

#[test]
fn legacy_study_is_upgraded_on_save() {
    let legacy = r#"{
        "aster": "14.4",
        "history": {
            "cases": [{"uid": 3, "name": "CurrentCase", "stages": [5]}],
            "stages": [{
                "uid": 5,
                "name": "mesh",
                "text": "mesh = LIRE_MAILLAGE(UNITE=20)\n\nmodel = AFFE_MODELE(MAILLAGE=mesh, AFFE=_F(TOUT='OUI', PHENOMENE='MECANIQUE', MODELISATION='3D'))\n"
            }]
        }
    }"#;
    let mut history = persist::from_json(legacy, Services::builtin().unwrap()).unwrap();
    let stage = history.stage_at(history.current_case(), 0).unwrap();
    assert_eq!(history.stage(stage).unwrap().mode(), StageMode::Graphical);
    let mesh = history.command_by_name(stage, "mesh").unwrap();
    let model = history.command_by_name(stage, "model").unwrap();
    assert!(history.depends_on(model, mesh));

    history
        .init_command(mesh, kw(&[("UNITE", Value::Int(21))]))
        .unwrap();
    let upgraded = persist::to_json(&history).unwrap();
    let document: serde_json::Value = serde_json::from_str(&upgraded).unwrap();
    assert_eq!(document["format_version"], persist::FORMAT_VERSION);
    assert_eq!(document["aster"], "14.4");

    let again = persist::from_json(&upgraded, Services::builtin().unwrap()).unwrap();
    assert!(again.stage_text(stage, false).unwrap().contains("UNITE=21"));
    assert_eq!(persist::to_json(&again).unwrap(), upgraded);
}

#[test]
fn old_solver_studies_load_through_the_legacy_layout() {
    let stamped = r#"{
        "format_version": 1,
        "aster": "12.8",
        "history": {
            "cases": [
                {"uid": 1, "name": "RunCase_1", "stages": [5]},
                {"uid": 3, "name": "CurrentCase", "stages": [5]}
            ],
            "stages": [{"uid": 5, "name": "mesh", "text": "mesh = LIRE_MAILLAGE(UNITE=20)\n"}]
        }
    }"#;
    let history = persist::from_json(stamped, Services::builtin().unwrap()).unwrap();
    let stage = history.stage_at(history.current_case(), 0).unwrap();
    assert_eq!(history.stage(stage).unwrap().mode(), StageMode::Graphical);
    assert!(history.is_shared(stage));

    let saved = persist::to_json(&history).unwrap();
    let document: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(document["aster"], "12.8");
    assert!(document["history"]["root"].is_number());
    let again = persist::from_json(&saved, Services::builtin().unwrap()).unwrap();
    assert_eq!(persist::to_json(&again).unwrap(), saved);
}

#[test]
fn recovery_restores_attachments_from_a_snapshot_file() {
    let mut source = mesh_and_model();
    source
        .history
        .attach_file(source.stage, 20, "mesh.med", Some(FileAttr::In), true)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("backup.ajs");
    persist::save(&source.history, &snapshot).unwrap();

    let mut damaged = mesh_and_model();
    let report =
        persist::recover_files_from_path(&mut damaged.history, &snapshot).unwrap();
    assert_eq!(report.matched, vec![(damaged.stage, source.stage)]);
    assert_eq!(report.files, 1);
    assert!(report.unmatched.is_empty());
    let info = &damaged.history.stage(damaged.stage).unwrap().files()[&20];
    assert!(info.embedded);
    assert_eq!(info.attr, Some(FileAttr::In));

    let err = persist::recover_files_from_path(&mut damaged.history, &dir.path().join("absent"))
        .unwrap_err();
    assert!(matches!(err, PersistError::Read { .. }));
}
