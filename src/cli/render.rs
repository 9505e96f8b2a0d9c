//! Human renderer for CLI outputs.
//!
//! This module is pure formatting; handlers gather any extra data needed.

use std::fmt::Write as _;

use super::view::{CaseView, CheckView, Output, RunView, StageSummary, StageView, StatusView};
use crate::core::CaseKind;
use crate::persist::RecoveryReport;

pub(super) fn render_human(output: &Output) -> String {
    match output {
        Output::Initialized {
            path,
            aster_version,
        } => format!(
            "✓ Initialized study {} (aster {aster_version})",
            path.display()
        ),
        Output::Status(status) => render_status(status),
        Output::Check(check) => render_check(check),
        Output::Cases { cases } => render_cases(cases),
        Output::Stage(stage) => render_stage(stage),
        Output::Text { text, .. } => text.trim_end().to_string(),
        Output::Depends { a, b, depends } => {
            if *depends {
                format!("{a} depends on {b}")
            } else {
                format!("{a} does not depend on {b}")
            }
        }
        Output::Created { kind, id, name } => format!("✓ Created {kind} {id}: {name}"),
        Output::Updated { id, message } => format!("✓ Updated {id}: {message}"),
        Output::Removed { id } => format!("✓ Removed {id}"),
        Output::ResultType {
            command,
            result_type,
        } => match result_type {
            Some(result_type) => format!("{command}: {result_type}"),
            None => format!("{command}: no result"),
        },
        Output::Run(run) => render_run(run),
        Output::Recovered(report) => render_recovered(report),
    }
}

fn validity_suffix(labels: &[&str]) -> String {
    if labels.is_empty() {
        String::new()
    } else {
        format!("  [{}]", labels.join("; "))
    }
}

fn render_status(status: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Study: {}", status.path.display());
    let _ = writeln!(out, "  Aster version: {}", status.aster_version);
    let _ = writeln!(
        out,
        "  Current case: {} {} ({} stages)",
        status.current.id,
        status.current.name,
        status.current.stages.len()
    );
    let _ = writeln!(out, "  Run cases: {}", status.run_cases);
    let _ = writeln!(out, "  Nodes: {}", status.nodes);
    if status.validity.is_empty() {
        out.push_str("  Validity: ok");
    } else {
        let _ = write!(out, "  Validity: {}", status.validity.join("; "));
    }
    out
}

fn render_check(check: &CheckView) -> String {
    if check.problems.is_empty() {
        return format!("✓ {} {} is valid", check.case, check.name);
    }
    let mut out = format!(
        "✗ {} {}: {}\n",
        check.case,
        check.name,
        check.validity.join("; ")
    );
    for problem in &check.problems {
        let _ = writeln!(out, "  {} {}: {}", problem.node, problem.flag, problem.message);
    }
    out.trim_end().to_string()
}

fn render_cases(cases: &[CaseView]) -> String {
    let mut out = String::new();
    for case in cases {
        let marker = match case.kind {
            CaseKind::Current => "*",
            CaseKind::Run => " ",
        };
        let _ = write!(out, "{marker} {} {}", case.id, case.name);
        if let Some(state) = &case.run_state {
            let _ = write!(out, "  ({state})");
        }
        out.push('\n');
        for stage in &case.stages {
            let _ = writeln!(out, "    {}", stage_line(stage));
        }
    }
    out.trim_end().to_string()
}

fn stage_line(stage: &StageSummary) -> String {
    format!(
        "{}. {} {} [{}{}] {} item(s){}",
        stage.index,
        stage.id,
        stage.name,
        stage.mode,
        if stage.shared { ", shared" } else { "" },
        stage.items,
        validity_suffix(&stage.validity)
    )
}

fn render_stage(view: &StageView) -> String {
    let mut out = stage_line(&view.stage);
    out.push('\n');
    for command in &view.commands {
        let _ = write!(
            out,
            "  {}{} {} = {}",
            if command.active { "" } else { "#~ " },
            command.id,
            command.name,
            command.title
        );
        if let Some(result_type) = &command.result_type {
            let _ = write!(out, " -> {result_type}");
        }
        out.push_str(&validity_suffix(&command.validity));
        out.push('\n');
        if let Some(comment) = &command.comment {
            for line in comment.lines() {
                let _ = writeln!(out, "      # {line}");
            }
        }
    }
    if !view.handles.is_empty() {
        out.push_str("  Files:\n");
        for handle in &view.handles {
            let attr = handle
                .merged
                .map(|attr| attr.to_string())
                .unwrap_or_else(|| "-".to_string());
            let file = handle
                .filename
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unattached>".to_string());
            let _ = write!(out, "    unit {} ({attr}): {file}", handle.handle);
            if handle.filename.is_some() && !handle.exists {
                out.push_str("  (missing)");
            }
            if handle.embedded {
                out.push_str("  (embedded)");
            }
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

fn render_run(run: &RunView) -> String {
    let mut out = format!("{} {}: {}\n", run.case, run.name, run.state);
    for message in &run.messages {
        match &message.stage {
            Some(stage) => {
                let _ = writeln!(out, "  [{stage}] {}", message.text);
            }
            None => {
                let _ = writeln!(out, "  {}", message.text);
            }
        }
    }
    out.trim_end().to_string()
}

fn render_recovered(report: &RecoveryReport) -> String {
    let mut out = format!(
        "✓ Recovered {} file(s) into {} stage(s)\n",
        report.files,
        report.matched.len()
    );
    for name in &report.unmatched {
        let _ = writeln!(out, "  no match for {name}");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeId, NodeKind, StageMode};

    fn summary(shared: bool, validity: Vec<&'static str>) -> StageSummary {
        StageSummary {
            id: NodeId::new(2),
            index: 0,
            name: "mesh".to_string(),
            mode: StageMode::Graphical,
            shared,
            items: 2,
            validity,
        }
    }

    #[test]
    fn stage_lines_show_sharing_and_problems() {
        assert_eq!(
            stage_line(&summary(false, vec![])),
            "0. #2 mesh [graphical] 2 item(s)"
        );
        assert_eq!(
            stage_line(&summary(true, vec!["Syntax problem", "Broken dependencies"])),
            "0. #2 mesh [graphical, shared] 2 item(s)  [Syntax problem; Broken dependencies]"
        );
    }

    #[test]
    fn created_names_the_kind() {
        let out = render_human(&Output::Created {
            kind: NodeKind::Command,
            id: NodeId::new(5),
            name: "mesh".to_string(),
        });
        assert_eq!(out, "✓ Created command #5: mesh");
    }
}
