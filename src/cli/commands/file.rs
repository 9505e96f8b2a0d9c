use std::path::PathBuf;

use clap::{Args, Subcommand};

use super::super::view::Output;
use super::super::{Ctx, resolve_stage};
use super::writable_stage;
use crate::core::FileAttr;
use crate::{Error, Result};

#[derive(Subcommand, Debug)]
pub enum FileCmd {
    /// Attach a file to a logical unit of a stage.
    Attach(AttachArgs),
    /// Remove the file attached to a unit.
    Detach { stage: String, handle: u32 },
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Stage index, name or `#id`.
    pub stage: String,
    pub handle: u32,
    pub path: PathBuf,
    /// Declared direction: in, out or inout.
    #[arg(long, value_parser = parse_attr)]
    pub attr: Option<FileAttr>,
    /// The file is stored inside the study.
    #[arg(long)]
    pub embedded: bool,
}

fn parse_attr(raw: &str) -> std::result::Result<FileAttr, String> {
    FileAttr::parse(raw).ok_or_else(|| format!("unknown file attribute `{raw}` (in, out, inout)"))
}

pub(crate) fn handle(ctx: &Ctx, cmd: FileCmd) -> Result<()> {
    match cmd {
        FileCmd::Attach(args) => ctx.edit(|history| {
            let stage = resolve_stage(history, &args.stage)?;
            let stage = writable_stage(ctx, history, stage)?;
            history.attach_file(stage, args.handle, args.path.clone(), args.attr, args.embedded)?;
            Ok(Output::Updated {
                id: stage,
                message: format!("unit {} -> {}", args.handle, args.path.display()),
            })
        }),
        FileCmd::Detach { stage, handle } => ctx.edit(|history| {
            let stage = resolve_stage(history, &stage)?;
            let stage = writable_stage(ctx, history, stage)?;
            match history.detach_file(stage, handle)? {
                Some(_) => Ok(Output::Updated {
                    id: stage,
                    message: format!("unit {handle} detached"),
                }),
                None => Err(Error::Usage(format!("no file attached to unit {handle}"))),
            }
        }),
    }
}
