//! Re-apply file attachments from a recovered snapshot.
//!
//! Stages are matched by command text: every stage of the damaged history
//! whose text equals the text of a recovered stage receives that stage's
//! files. The snapshot is fully decoded and matched before anything is
//! applied.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use super::{PersistError, format};
use crate::core::{ChangeKind, FileInfo, History, NodeId};

/// What a recovery pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// `(stage, recovered stage)` pairs that received files.
    pub matched: Vec<(NodeId, NodeId)>,
    /// File entries written.
    pub files: usize,
    /// Names of recovered stages with files but no match.
    pub unmatched: Vec<String>,
}

pub fn recover_files(history: &mut History, snapshot: &str) -> Result<RecoveryReport, PersistError> {
    let document: format::StudyDocument =
        serde_json::from_str(snapshot).map_err(PersistError::Decode)?;
    let recovered = format::decode(&document, history.services().clone())?;

    let mut texts: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for stage in history.stages.keys() {
        if let Ok(text) = history.stage_text(*stage, false) {
            texts.entry(text).or_default().push(*stage);
        }
    }

    let mut report = RecoveryReport::default();
    let mut plan: Vec<(NodeId, BTreeMap<u32, FileInfo>)> = Vec::new();
    for (id, stage) in &recovered.stages {
        if stage.files().is_empty() {
            continue;
        }
        let targets = recovered
            .stage_text(*id, false)
            .ok()
            .and_then(|text| texts.get(&text));
        match targets {
            Some(targets) => {
                for target in targets {
                    report.matched.push((*target, *id));
                    report.files += stage.files().len();
                    plan.push((*target, stage.files().clone()));
                }
            }
            None => report.unmatched.push(stage.name().to_string()),
        }
    }

    for (target, files) in plan {
        if let Some(stage) = history.stages.get_mut(&target) {
            stage.files.extend(files);
            history.emit(target, ChangeKind::Modified);
        }
    }
    tracing::info!(
        matched = report.matched.len(),
        files = report.files,
        unmatched = report.unmatched.len(),
        "file attachments recovered"
    );
    Ok(report)
}

pub fn recover_files_from_path(history: &mut History, path: &Path) -> Result<RecoveryReport, PersistError> {
    let snapshot = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    recover_files(history, &snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::fixtures::*;
    use crate::core::FileAttr;
    use crate::persist::to_json;

    #[test]
    fn files_follow_matching_text() {
        let (mut source, first, _, _) = mesh_and_model();
        source
            .attach_file(first, 20, "mesh.med", Some(FileAttr::In), false)
            .unwrap();
        let case = source.current_case();
        let other = source.text2stage(case, "DEBUT()\n", "other").unwrap();
        source
            .attach_file(other, 80, "result.rmed", Some(FileAttr::Out), false)
            .unwrap();
        let snapshot = to_json(&source).unwrap();

        let (mut damaged, stage, _, _) = mesh_and_model();
        let report = recover_files(&mut damaged, &snapshot).unwrap();
        assert_eq!(report.matched, vec![(stage, first)]);
        assert_eq!(report.files, 1);
        assert_eq!(report.unmatched, vec!["other".to_string()]);
        let info = &damaged.stage(stage).unwrap().files()[&20];
        assert_eq!(info.attr, Some(FileAttr::In));
    }

    #[test]
    fn malformed_snapshot_changes_nothing() {
        let (mut damaged, stage, _, _) = mesh_and_model();
        let err = recover_files(&mut damaged, r#"{"history": {"cases": []}}"#).unwrap_err();
        assert!(matches!(err, PersistError::Decode(_)));
        let err = recover_files(
            &mut damaged,
            r#"{"history": {"cases": [], "stages": []}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PersistError::Invalid(_)));
        assert!(damaged.stage(stage).unwrap().files().is_empty());
    }
}
