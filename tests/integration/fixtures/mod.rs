//! Shared builders for integration tests.

#![allow(dead_code)]

use std::path::Path;

use asterstudy::{History, Keywords, NodeId, Services, Value};

pub fn history() -> History {
    History::new(Services::builtin().expect("builtin catalog"))
}

pub fn kw(items: &[(&str, Value)]) -> Keywords {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A current case with one stage `mesh`:
/// `mesh = LIRE_MAILLAGE(UNITE=20)` and
/// `model = AFFE_MODELE(MAILLAGE=mesh, AFFE=_F(...))`.
pub struct MeshModel {
    pub history: History,
    pub stage: NodeId,
    pub mesh: NodeId,
    pub model: NodeId,
}

pub fn mesh_and_model() -> MeshModel {
    let mut history = history();
    let case = history.current_case();
    let stage = history.create_stage(case, "mesh").expect("create stage");
    let mesh = history
        .add_command(stage, "LIRE_MAILLAGE", Some("mesh"))
        .expect("add mesh");
    history
        .init_command(mesh, kw(&[("UNITE", Value::Int(20))]))
        .expect("init mesh");
    let model = history
        .add_command(stage, "AFFE_MODELE", Some("model"))
        .expect("add model");
    history
        .init_command(
            model,
            kw(&[
                ("MAILLAGE", Value::Ref(mesh)),
                (
                    "AFFE",
                    Value::block([
                        ("TOUT", Value::text("OUI")),
                        ("PHENOMENE", Value::text("MECANIQUE")),
                        ("MODELISATION", Value::text("3D")),
                    ]),
                ),
            ]),
        )
        .expect("init model");
    MeshModel {
        history,
        stage,
        mesh,
        model,
    }
}

/// `astudy` binary isolated from the user's config, data and log settings.
pub fn astudy(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("astudy");
    cmd.current_dir(dir);
    cmd.env("ASTERSTUDY_CONFIG_DIR", dir.join("config"));
    cmd.env("ASTERSTUDY_DATA_DIR", dir.join("data"));
    cmd.env_remove("ASTERSTUDY_LOG");
    cmd.env_remove("ASTERSTUDY_ASTER_VERSION");
    cmd.env_remove("ASTERSTUDY_UNDO_LIMIT");
    cmd
}
