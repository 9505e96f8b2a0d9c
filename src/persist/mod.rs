//! Study files: JSON save/load and file-attachment recovery.

mod format;
mod recover;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{History, RecoveryError, Services};

pub use format::{FORMAT_VERSION, STRUCTURED_ASTER_MAJOR};
pub use recover::{RecoveryReport, recover_files, recover_files_from_path};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed study document: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode study: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] RecoveryError),
}

/// Pretty JSON document of the whole history.
pub fn to_json(history: &History) -> Result<String, PersistError> {
    let document = format::encode(history);
    serde_json::to_string_pretty(&document).map_err(PersistError::Encode)
}

/// Parse a study document, current or legacy.
pub fn from_json(text: &str, services: Services) -> Result<History, PersistError> {
    let document: format::StudyDocument = serde_json::from_str(text).map_err(PersistError::Decode)?;
    Ok(format::decode(&document, services)?)
}

/// Write the study atomically: a temp file in the target directory is
/// renamed over `path`.
pub fn save(history: &History, path: &Path) -> Result<(), PersistError> {
    let json = to_json(history)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let write_err = |source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(json.as_bytes()).map_err(write_err)?;
    temp.write_all(b"\n").map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    tracing::info!(
        path = %path.display(),
        cases = history.cases().count(),
        nodes = history.nodes().len(),
        "study saved"
    );
    Ok(())
}

pub fn load(path: &Path, services: Services) -> Result<History, PersistError> {
    let text = fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let history = from_json(&text, services)?;
    tracing::info!(
        path = %path.display(),
        cases = history.cases().count(),
        nodes = history.nodes().len(),
        "study loaded"
    );
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::fixtures::*;
    use crate::core::{FileAttr, StageMode, Validity, Value};

    #[test]
    fn save_and_load_keep_structure() {
        let (mut history, first, mesh, model) = mesh_and_model();
        let case = history.current_case();
        history.set_aster_version("16.4");
        history.set_comment(mesh, Some("read the mesh")).unwrap();
        history
            .attach_file(first, 20, "mesh.med", Some(FileAttr::In), false)
            .unwrap();
        let solve = history.create_stage(case, "solve").unwrap();
        let x = history.add_variable(solve, "x", Value::Float(1.5)).unwrap();
        let run = history.create_run_case(&[0], Some("first run")).unwrap();
        history
            .text2stage(case, "this is not ( valid", "broken")
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.ajs");
        save(&history, &path).unwrap();
        let loaded = load(&path, Services::builtin().unwrap()).unwrap();

        assert_eq!(loaded.aster_version(), "16.4");
        assert_eq!(loaded.current_case(), case);
        assert_eq!(loaded.case(run).unwrap().name(), "first run");
        assert_eq!(loaded.case(run).unwrap().stages()[0], first);
        assert!(loaded.depends_on(model, mesh));
        assert!(loaded.is_shared(first));
        assert_eq!(loaded.command(x).unwrap().value(), Some(&Value::Float(1.5)));
        assert_eq!(
            loaded.comment(loaded.command(mesh).unwrap().comment().unwrap()).unwrap().content(),
            "read the mesh"
        );
        let broken = loaded.stage_at(case, 2).unwrap();
        assert_eq!(loaded.stage(broken).unwrap().mode(), StageMode::Text);
        assert_eq!(loaded.stage(first).unwrap().files()[&20].attr, Some(FileAttr::In));
        assert_eq!(loaded.check_stage(first).unwrap(), Validity::NOTHING);
        assert_eq!(loaded.nodes().next_id(), history.nodes().next_id());
        assert_eq!(to_json(&loaded).unwrap(), to_json(&history).unwrap());
    }

    #[test]
    fn tampered_edges_are_rejected() {
        let (history, _, mesh, model) = mesh_and_model();
        let json = to_json(&history).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let edges = value["history"]["edges"].as_array_mut().unwrap();
        edges.retain(|edge| edge != &serde_json::json!([model.get(), mesh.get()]));
        let err = from_json(&value.to_string(), Services::builtin().unwrap()).unwrap_err();
        assert!(matches!(err, PersistError::Invalid(_)));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let json = r#"{
            "format_version": 1,
            "aster": "16.4",
            "history": {
                "next_uid": 3, "root": 0, "current": 1,
                "cases": [{"uid": 1, "name": "CurrentCase", "kind": "current", "stages": [7]}],
                "stages": []
            }
        }"#;
        let err = from_json(json, Services::builtin().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unknown stage #7"), "{err}");
    }

    #[test]
    fn legacy_documents_convert_stage_text() {
        let json = r#"{
            "aster": "14.4",
            "history": {
                "cases": [
                    {"uid": 1, "name": "RunCase_1", "stages": [10]},
                    {"uid": 2, "name": "CurrentCase", "stages": [10, 11]}
                ],
                "stages": [
                    {"uid": 10, "name": "mesh", "text": "mesh = LIRE_MAILLAGE(UNITE=20)\n",
                     "files": [{"handle": 20, "filename": "mesh.med", "attr": 1}]},
                    {"uid": 11, "name": "broken", "text": "oops = (\n"}
                ]
            }
        }"#;
        let history = from_json(json, Services::builtin().unwrap()).unwrap();
        assert_eq!(history.current_case(), crate::core::NodeId::new(2));
        let mesh_stage = crate::core::NodeId::new(10);
        assert_eq!(history.stage(mesh_stage).unwrap().mode(), StageMode::Graphical);
        assert!(history.command_by_name(mesh_stage, "mesh").is_ok());
        assert_eq!(
            history.stage(crate::core::NodeId::new(11)).unwrap().mode(),
            StageMode::Text
        );
        assert_eq!(
            history.stage(mesh_stage).unwrap().files()[&20].attr,
            Some(FileAttr::In)
        );
        assert!(history.is_shared(mesh_stage));
        assert!(history.nodes().next_id() > 11);
    }

    #[test]
    fn old_solver_marker_selects_the_legacy_layout() {
        let document = |aster: &str| {
            format!(
                r#"{{
                    "format_version": 1,
                    "aster": "{aster}",
                    "history": {{
                        "cases": [{{"uid": 2, "name": "CurrentCase", "stages": [4]}}],
                        "stages": [{{"uid": 4, "name": "mesh", "text": "mesh = LIRE_MAILLAGE(UNITE=20)\n"}}]
                    }}
                }}"#
            )
        };
        let history = from_json(&document("13.6"), Services::builtin().unwrap()).unwrap();
        assert_eq!(history.current_case(), crate::core::NodeId::new(2));
        assert_eq!(history.aster_version(), "13.6");
        let stage = crate::core::NodeId::new(4);
        assert_eq!(history.stage(stage).unwrap().mode(), StageMode::Graphical);
        assert!(history.command_by_name(stage, "mesh").is_ok());

        for aster in ["14.4", "stable"] {
            let err = from_json(&document(aster), Services::builtin().unwrap()).unwrap_err();
            assert!(err.to_string().contains("missing history root"), "{aster}: {err}");
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.ajs"), Services::builtin().unwrap()).unwrap_err();
        assert!(matches!(err, PersistError::Read { .. }));
    }
}
