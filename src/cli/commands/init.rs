use clap::Args;

use super::super::view::Output;
use super::super::{Ctx, print_ok};
use crate::core::{History, Services};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Solver version recorded in the study (default: `study.aster_version`).
    #[arg(long, value_name = "VERSION")]
    pub aster_version: Option<String>,
    /// Overwrite an existing study file.
    #[arg(long)]
    pub force: bool,
}

pub(crate) fn handle(ctx: &Ctx, args: InitArgs) -> Result<()> {
    if ctx.study.exists() && !args.force {
        return Err(Error::Usage(format!(
            "{} already exists (use --force to overwrite)",
            ctx.study.display()
        )));
    }
    let mut history = History::new(Services::builtin()?);
    let version = args
        .aster_version
        .unwrap_or_else(|| ctx.config.study.aster_version.clone());
    history.set_aster_version(version.clone());
    ctx.save(&history)?;
    print_ok(
        &Output::Initialized {
            path: ctx.study.clone(),
            aster_version: version,
        },
        ctx.json,
    )
}
