use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Engine, RunOutcome, RunRequest, Submission};
use crate::core::{RunMessage, RunState, Severity};

/// Writes `<dir>/<case>/<index>_<stage>.comm` for every stage of the request
/// and returns the written paths in stage order.
pub fn export_request(request: &RunRequest, dir: &Path) -> io::Result<Vec<PathBuf>> {
    let case_dir = dir.join(sanitize(&request.case_name));
    fs::create_dir_all(&case_dir)?;
    let mut written = Vec::with_capacity(request.stages.len());
    for (index, stage) in request.stages.iter().enumerate() {
        let path = case_dir.join(format!("{index:02}_{}.comm", sanitize(&stage.name)));
        fs::write(&path, &stage.text)?;
        written.push(path);
    }
    Ok(written)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Engine that only exports the command files of the case.
#[derive(Debug, Clone)]
pub struct ExportEngine {
    dir: PathBuf,
}

impl ExportEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Engine for ExportEngine {
    fn submit(&mut self, request: RunRequest) -> Submission {
        let outcome = match export_request(&request, &self.dir) {
            Ok(paths) => {
                tracing::info!(case = %request.case_name, files = paths.len(), "case exported");
                RunOutcome {
                    state: RunState::SUCCESS,
                    messages: paths
                        .iter()
                        .zip(&request.stages)
                        .map(|(path, stage)| RunMessage {
                            severity: Severity::Info,
                            stage: Some(stage.name.clone()),
                            text: format!("wrote {}", path.display()),
                        })
                        .collect(),
                    log: None,
                }
            }
            Err(err) => {
                tracing::warn!(case = %request.case_name, error = %err, "case export failed");
                RunOutcome {
                    state: RunState::ERROR,
                    messages: vec![RunMessage {
                        severity: Severity::Error,
                        stage: None,
                        text: format!("export to {} failed: {err}", self.dir.display()),
                    }],
                    log: None,
                }
            }
        };
        Submission::Finished(outcome)
    }
}
