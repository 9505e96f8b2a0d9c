use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use super::super::view::Output;
use super::super::{Ctx, resolve_stage, stage_index};
use super::writable_stage;
use crate::core::{NodeKind, StageMode};
use crate::{Error, Result};

#[derive(Subcommand, Debug)]
pub enum StageCmd {
    /// Append an empty graphical stage.
    Add { name: String },
    /// Append a stage read from a command file.
    Import(ImportArgs),
    /// Remove a stage and every stage after it.
    #[command(alias = "remove")]
    Rm {
        /// Stage index, name or `#id`.
        stage: String,
    },
    Rename { stage: String, name: String },
    /// Switch a stage between text and graphical mode.
    Mode { stage: String, mode: Mode },
    /// Replace the text of a text-mode stage with the content of a file.
    Edit { stage: String, file: PathBuf },
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,
    /// Stage name (default: file stem).
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Text,
    Graphical,
}

pub(crate) fn handle(ctx: &Ctx, cmd: StageCmd) -> Result<()> {
    match cmd {
        StageCmd::Add { name } => ctx.edit(|history| {
            let id = history.create_stage(history.current_case(), &name)?;
            Ok(Output::Created {
                kind: NodeKind::Stage,
                id,
                name,
            })
        }),
        StageCmd::Import(args) => ctx.edit(|history| {
            let case = history.current_case();
            let id = match args.name {
                Some(name) => {
                    let text = read_source(&args.file)?;
                    history.text2stage(case, &text, &name)?
                }
                None => history.import_stage(case, &args.file)?,
            };
            let record = history.stage(id)?;
            if record.mode() == StageMode::Text {
                tracing::warn!(stage = %id, "imported stage kept in text mode");
            }
            Ok(Output::Created {
                kind: NodeKind::Stage,
                id,
                name: record.name().to_string(),
            })
        }),
        StageCmd::Rm { stage } => ctx.edit(|history| {
            let id = resolve_stage(history, &stage)?;
            let index = stage_index(history, id)?;
            history.remove_stage(history.current_case(), index)?;
            Ok(Output::Removed { id })
        }),
        StageCmd::Rename { stage, name } => ctx.edit(|history| {
            let id = resolve_stage(history, &stage)?;
            let id = writable_stage(ctx, history, id)?;
            history.rename_stage(id, &name)?;
            Ok(Output::Updated {
                id,
                message: format!("renamed to {name}"),
            })
        }),
        StageCmd::Mode { stage, mode } => ctx.edit(|history| {
            let id = resolve_stage(history, &stage)?;
            let id = writable_stage(ctx, history, id)?;
            match mode {
                Mode::Text => history.use_text_mode(id)?,
                Mode::Graphical => history.use_graphical_mode(id)?,
            }
            Ok(Output::Updated {
                id,
                message: format!("{} mode", history.stage(id)?.mode()),
            })
        }),
        StageCmd::Edit { stage, file } => ctx.edit(|history| {
            let text = read_source(&file)?;
            let id = resolve_stage(history, &stage)?;
            let id = writable_stage(ctx, history, id)?;
            history.set_stage_text(id, &text)?;
            Ok(Output::Updated {
                id,
                message: "text replaced".to_string(),
            })
        }),
    }
}

fn read_source(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|err| Error::Usage(format!("cannot read {}: {err}", path.display())))
}
