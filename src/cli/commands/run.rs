use std::path::PathBuf;

use clap::{Args, Subcommand};

use super::super::view::{self, Output};
use super::super::{Ctx, resolve_case};
use crate::Result;
use crate::core::NodeKind;
use crate::engine::{ExportEngine, Submission};
use crate::paths;

#[derive(Subcommand, Debug)]
pub enum RunCmd {
    /// Snapshot the current case into a new run case.
    Create(CreateArgs),
    /// Hand a run case to the export engine.
    Exec(ExecArgs),
    /// Delete a run case.
    #[command(alias = "remove")]
    Rm { case: String },
    /// Make the current case share every stage of a run case.
    Checkout { case: String },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Stage indices shared with the current case; must be `0,1,..,k`.
    #[arg(long, value_delimiter = ',')]
    pub reuse: Vec<usize>,
    /// Case name (default: `RunCase_<n>`).
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Case name or `#id`.
    pub case: String,
    /// Export directory (default: the data directory's `runs/`).
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

pub(crate) fn handle(ctx: &Ctx, cmd: RunCmd) -> Result<()> {
    match cmd {
        RunCmd::Create(args) => ctx.edit(|history| {
            let id = history.create_run_case(&args.reuse, args.name.as_deref())?;
            Ok(Output::Created {
                kind: NodeKind::Case,
                id,
                name: history.case(id)?.name().to_string(),
            })
        }),
        RunCmd::Exec(args) => ctx.edit(|history| {
            let case = resolve_case(history, &args.case)?;
            let mut engine = ExportEngine::new(args.out.unwrap_or_else(paths::runs_dir));
            if let Submission::Pending = history.run_case(case, &mut engine)? {
                tracing::info!(case = %case, "run pending");
            }
            Ok(Output::Run(view::run_view(history, case)?))
        }),
        RunCmd::Rm { case } => ctx.edit(|history| {
            let id = resolve_case(history, &case)?;
            history.remove_run_case(id)?;
            Ok(Output::Removed { id })
        }),
        RunCmd::Checkout { case } => ctx.edit(|history| {
            let id = resolve_case(history, &case)?;
            history.checkout_run_case(id)?;
            Ok(Output::Updated {
                id: history.current_case(),
                message: format!("checked out {case}"),
            })
        }),
    }
}
