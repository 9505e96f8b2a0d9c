use clap::{Args, Subcommand};

use super::super::view::{self, Output};
use super::super::{Ctx, resolve_stage};
use super::{writable_command, writable_stage};
use crate::Result;
use crate::core::{ConversionLevel, History, NodeId};

#[derive(Subcommand, Debug)]
pub enum CmdCmd {
    /// Append a command to a stage.
    Add(AddArgs),
    /// Append `NAME = VALUE` to a stage.
    Var {
        stage: String,
        name: String,
        /// Value source, e.g. `3`, `'text'` or `[1, 2]`.
        value: String,
    },
    /// Replace the keywords of a command (or the value of a variable).
    Set {
        id: NodeId,
        /// `KW=value, ...` for commands, a value for variables.
        source: String,
    },
    #[command(alias = "remove")]
    Rm { id: NodeId },
    Rename { id: NodeId, name: String },
    Enable { id: NodeId },
    Disable { id: NodeId },
    /// Set, extend or clear the comment of a command.
    Comment(CommentArgs),
    /// Result type of a command.
    Type {
        id: NodeId,
        /// Fall back to the default type when under-specified.
        #[arg(long)]
        best_effort: bool,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Stage index, name or `#id`.
    pub stage: String,
    pub title: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Initial keywords as `KW=value, ...`.
    #[arg(long, short = 'k')]
    pub keywords: Option<String>,
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    pub id: NodeId,
    /// Comment text; omit to clear.
    pub text: Option<String>,
    /// Add the text as a new line instead of replacing.
    #[arg(long)]
    pub append: bool,
}

pub(crate) fn handle(ctx: &Ctx, cmd: CmdCmd) -> Result<()> {
    match cmd {
        CmdCmd::Add(args) => ctx.edit(|history| {
            let stage = resolve_stage(history, &args.stage)?;
            let stage = writable_stage(ctx, history, stage)?;
            let storage = match &args.keywords {
                Some(source) => Some(history.parse_keywords(stage, source)?),
                None => None,
            };
            let id = history.add_command(stage, &args.title, args.name.as_deref())?;
            if let Some(storage) = storage {
                history.init_command(id, storage)?;
            }
            created(history, id)
        }),
        CmdCmd::Var { stage, name, value } => ctx.edit(|history| {
            let stage = resolve_stage(history, &stage)?;
            let stage = writable_stage(ctx, history, stage)?;
            let value = history.parse_value(stage, &value)?;
            let id = history.add_variable(stage, &name, value)?;
            created(history, id)
        }),
        CmdCmd::Set { id, source } => ctx.edit(|history| {
            let id = writable_command(ctx, history, id)?;
            let stage = history.command(id)?.stage();
            if history.command(id)?.is_variable() {
                let value = history.parse_value(stage, &source)?;
                history.set_variable(id, value)?;
            } else {
                let storage = history.parse_keywords(stage, &source)?;
                history.init_command(id, storage)?;
            }
            updated(history, id, "keywords replaced")
        }),
        CmdCmd::Rm { id } => ctx.edit(|history| {
            let id = writable_command(ctx, history, id)?;
            history.remove_command(id)?;
            Ok(Output::Removed { id })
        }),
        CmdCmd::Rename { id, name } => ctx.edit(|history| {
            let id = writable_command(ctx, history, id)?;
            history.rename_command(id, &name)?;
            updated(history, id, &format!("renamed to {name}"))
        }),
        CmdCmd::Enable { id } => set_active(ctx, id, true),
        CmdCmd::Disable { id } => set_active(ctx, id, false),
        CmdCmd::Comment(args) => ctx.edit(|history| {
            let id = writable_command(ctx, history, args.id)?;
            match (args.text.as_deref(), args.append) {
                (Some(text), true) => history.append_comment_line(id, text)?,
                (text, _) => history.set_comment(id, text)?,
            }
            updated(history, id, "comment updated")
        }),
        CmdCmd::Type { id, best_effort } => ctx.read(|history| {
            let level = if best_effort {
                ConversionLevel::BestEffort
            } else {
                ConversionLevel::Strict
            };
            Ok(Output::ResultType {
                command: id,
                result_type: history.gettype(id, level)?,
            })
        }),
    }
}

fn set_active(ctx: &Ctx, id: NodeId, active: bool) -> Result<()> {
    ctx.edit(|history| {
        let id = writable_command(ctx, history, id)?;
        history.set_active(id, active)?;
        updated(history, id, if active { "enabled" } else { "disabled" })
    })
}

fn created(history: &History, id: NodeId) -> Result<Output> {
    let command = history.command(id)?;
    Ok(Output::Created {
        kind: command.kind(),
        id,
        name: command.name().to_string(),
    })
}

fn updated(history: &History, id: NodeId, message: &str) -> Result<Output> {
    let command = view::command_view(history, id)?;
    let mut message = message.to_string();
    if !command.validity.is_empty() {
        message.push_str(&format!(" ({})", command.validity.join("; ")));
    }
    Ok(Output::Updated { id, message })
}
