//! End-to-end runs of the `astudy` binary against a temporary study.

use std::path::Path;

use predicates::prelude::*;
use serde_json::Value as Json;

use crate::fixtures::astudy;

fn json(dir: &Path, args: &[&str]) -> Json {
    let output = astudy(dir)
        .args(args)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

/// `init`, then stage `mesh` holding `mesh` and `model`. Returns their ids.
fn mesh_study(dir: &Path) -> (u64, u64) {
    astudy(dir)
        .args(["init", "--aster-version", "16.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized study"));
    astudy(dir).args(["stage", "add", "mesh"]).assert().success();
    let mesh = json(
        dir,
        &["cmd", "add", "mesh", "LIRE_MAILLAGE", "--name", "mesh", "-k", "UNITE=20"],
    );
    let model = json(
        dir,
        &[
            "cmd",
            "add",
            "0",
            "AFFE_MODELE",
            "--name",
            "model",
            "-k",
            "MAILLAGE=mesh, AFFE=_F(TOUT='OUI', PHENOMENE='MECANIQUE', MODELISATION='3D')",
        ],
    );
    assert_eq!(mesh["result"], "created");
    assert_eq!(mesh["kind"], "command");
    (
        mesh["id"].as_u64().expect("mesh id"),
        model["id"].as_u64().expect("model id"),
    )
}

#[test]
fn build_and_inspect_a_study() {
    let dir = tempfile::tempdir().unwrap();
    let (mesh, model) = mesh_study(dir.path());

    let status = json(dir.path(), &["status"]);
    assert_eq!(status["result"], "status");
    assert_eq!(status["aster_version"], "16.4");
    assert_eq!(status["current"]["stages"][0]["name"], "mesh");
    assert_eq!(status["current"]["stages"][0]["items"], 2);
    assert_eq!(status["validity"], serde_json::json!([]));

    astudy(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
    astudy(dir.path())
        .args(["text", "mesh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mesh = LIRE_MAILLAGE(UNITE=20)"));

    let depends = json(dir.path(), &["depends", &format!("#{model}"), &mesh.to_string()]);
    assert_eq!(depends["depends"], true);

    let shown = json(dir.path(), &["show", "mesh"]);
    assert_eq!(shown["commands"][1]["result_type"], "modele_sdaster");
    assert_eq!(shown["handles"][0]["handle"], 20);
    assert_eq!(shown["handles"][0]["filename"], Json::Null);
}

#[test]
fn run_cases_freeze_and_fork() {
    let dir = tempfile::tempdir().unwrap();
    let (mesh, _) = mesh_study(dir.path());

    let run = json(dir.path(), &["run", "create", "--reuse", "0"]);
    assert_eq!(run["kind"], "case");
    assert_eq!(run["name"], "RunCase_1");

    let out = dir.path().join("exports");
    let exec = json(
        dir.path(),
        &["run", "exec", "RunCase_1", "--out", out.to_str().unwrap()],
    );
    assert_eq!(exec["state"], "Success");
    let exported = std::fs::read_to_string(out.join("RunCase_1").join("00_mesh.comm")).unwrap();
    assert!(exported.contains("LIRE_MAILLAGE"));

    astudy(dir.path())
        .args(["cmd", "disable", &mesh.to_string(), "--no-fork"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("shared"));

    astudy(dir.path())
        .args(["cmd", "disable", &mesh.to_string()])
        .assert()
        .success();
    let cases = json(dir.path(), &["cases"]);
    let listed = cases["cases"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    let current = listed.iter().find(|c| c["kind"] == "current").unwrap();
    let frozen = listed.iter().find(|c| c["kind"] == "run").unwrap();
    assert_ne!(current["stages"][0]["id"], frozen["stages"][0]["id"]);
    assert_eq!(current["stages"][0]["shared"], false);

    astudy(dir.path())
        .args(["text", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#~ mesh = LIRE_MAILLAGE"));
}

#[test]
fn refusals_exit_nonzero_and_leave_the_study_alone() {
    let dir = tempfile::tempdir().unwrap();
    mesh_study(dir.path());
    let study = dir.path().join("study.ajs");
    let before = std::fs::read_to_string(&study).unwrap();

    astudy(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    astudy(dir.path())
        .args(["show", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no stage `nowhere`"));
    astudy(dir.path())
        .args(["cmd", "add", "mesh", "AFFE_MODELE", "-k", "MAILLAGE=ghost"])
        .assert()
        .failure();
    astudy(dir.path())
        .args(["run", "create", "--reuse", "1"])
        .assert()
        .failure();

    assert_eq!(std::fs::read_to_string(&study).unwrap(), before);
}

#[test]
fn missing_study_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    astudy(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("study.ajs"));
}
