//! CLI surface for asterstudy.
//!
//! Every invocation loads one study file, applies a single operation and
//! saves the study back atomically. Read-only commands never write.

use std::ffi::OsString;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, builder::BoolishValueParser};

use crate::config::Config;
use crate::core::{CopyOnWrite, History, NodeId, Services};
use crate::{Error, Result, persist};

mod commands;
mod render;
mod view;

use commands::{cmd::CmdCmd, file::FileCmd, run::RunCmd, stage::StageCmd};
use view::Output;

// =============================================================================
// Entry + global options
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "astudy",
    version,
    about = "Edit, check and run AsterStudy studies",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(
        long,
        global = true,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub json: bool,

    /// Study file (default: `study.file_name` from config, in the current directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub study: Option<PathBuf>,

    /// Refuse edits to stages shared with a run case instead of forking them.
    #[arg(
        long,
        global = true,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub no_fork: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty study file.
    Init(commands::init::InitArgs),

    /// Summary of the study and its current case.
    Status,

    /// Validity of a case and every problem found in it.
    Check {
        /// Case name or `#id` (default: the current case).
        #[arg(long)]
        case: Option<String>,
    },

    /// List every case with its stages.
    #[command(alias = "ls")]
    Cases,

    /// Commands and file handles of a stage of the current case.
    Show {
        /// Stage index, name or `#id`.
        stage: String,
    },

    /// Command text of a stage.
    Text {
        /// Stage index, name or `#id`.
        stage: String,
        /// Order commands so dependencies come first.
        #[arg(long)]
        sort: bool,
    },

    /// Whether node A depends on node B.
    Depends { a: NodeId, b: NodeId },

    /// Re-apply file attachments from a recovered study file.
    Recover { snapshot: PathBuf },

    /// Add, remove and convert stages.
    #[command(subcommand)]
    Stage(StageCmd),

    /// Edit commands and variables.
    #[command(subcommand)]
    Cmd(CmdCmd),

    /// Attach files to stage handles.
    #[command(subcommand)]
    File(FileCmd),

    /// Run cases: create, execute, remove, check out.
    #[command(subcommand)]
    Run(RunCmd),
}

impl Cli {
    /// Directory holding the study file, where the project config lives.
    pub fn study_dir(&self) -> PathBuf {
        match self.study.as_deref().and_then(Path::parent) {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Parse CLI args with flag normalization.
pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let raw: Vec<OsString> = args.into_iter().map(|t| t.into()).collect();
    Cli::parse_from(normalize_args(raw))
}

/// Run the CLI (used by bin).
pub fn run(cli: Cli, config: Config) -> Result<()> {
    let study = cli
        .study
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.study.file_name));
    let ctx = Ctx {
        study,
        json: cli.json,
        policy: if cli.no_fork {
            CopyOnWrite::Refuse
        } else {
            CopyOnWrite::Fork
        },
        config,
    };

    match cli.command {
        Commands::Init(args) => commands::init::handle(&ctx, args),
        Commands::Status => commands::inspect::status(&ctx),
        Commands::Check { case } => commands::inspect::check(&ctx, case.as_deref()),
        Commands::Cases => commands::inspect::cases(&ctx),
        Commands::Show { stage } => commands::inspect::show(&ctx, &stage),
        Commands::Text { stage, sort } => commands::inspect::text(&ctx, &stage, sort),
        Commands::Depends { a, b } => commands::inspect::depends(&ctx, a, b),
        Commands::Recover { snapshot } => commands::recover::handle(&ctx, &snapshot),
        Commands::Stage(cmd) => commands::stage::handle(&ctx, cmd),
        Commands::Cmd(cmd) => commands::cmd::handle(&ctx, cmd),
        Commands::File(cmd) => commands::file::handle(&ctx, cmd),
        Commands::Run(cmd) => commands::run::handle(&ctx, cmd),
    }
}

// =============================================================================
// Handler context
// =============================================================================

struct Ctx {
    study: PathBuf,
    json: bool,
    policy: CopyOnWrite,
    config: Config,
}

impl Ctx {
    fn open(&self) -> Result<History> {
        Ok(persist::load(&self.study, Services::builtin()?)?)
    }

    fn save(&self, history: &History) -> Result<()> {
        Ok(persist::save(history, &self.study)?)
    }

    /// Load, apply `op`, save, print.
    fn edit<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut History) -> Result<Output>,
    {
        let mut history = self.open()?;
        let output = op(&mut history)?;
        self.save(&history)?;
        print_ok(&output, self.json)
    }

    /// Load, inspect, print. The study file is left untouched.
    fn read<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&History) -> Result<Output>,
    {
        let history = self.open()?;
        let output = op(&history)?;
        print_ok(&output, self.json)
    }
}

// =============================================================================
// Argument resolution
// =============================================================================

/// A stage of the current case by index, name or `#id`.
fn resolve_stage(history: &History, raw: &str) -> Result<NodeId> {
    let current = history.current_case();
    if raw.starts_with('#') {
        let id: NodeId = raw
            .parse()
            .map_err(|_| Error::Usage(format!("invalid node id `{raw}`")))?;
        history.stage(id)?;
        return Ok(id);
    }
    if let Ok(index) = raw.parse::<usize>() {
        return Ok(history.stage_at(current, index)?);
    }
    history
        .stage_by_name(current, raw)
        .ok_or_else(|| Error::Usage(format!("no stage `{raw}` in the current case")))
}

/// Index of a stage in the current case.
fn stage_index(history: &History, stage: NodeId) -> Result<usize> {
    history
        .case(history.current_case())?
        .stage_index(stage)
        .ok_or_else(|| Error::Usage(format!("stage {stage} is not part of the current case")))
}

/// A case by name or `#id`.
fn resolve_case(history: &History, raw: &str) -> Result<NodeId> {
    if raw.starts_with('#') {
        let id: NodeId = raw
            .parse()
            .map_err(|_| Error::Usage(format!("invalid node id `{raw}`")))?;
        history.case(id)?;
        return Ok(id);
    }
    history
        .case_by_name(raw)
        .ok_or_else(|| Error::Usage(format!("no case named `{raw}`")))
}

// =============================================================================
// Output
// =============================================================================

fn print_ok(output: &Output, json: bool) -> Result<()> {
    let s = if json {
        serde_json::to_string_pretty(output).map_err(|err| Error::Output(err.into()))?
    } else {
        render::render_human(output)
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{s}")
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(Error::Output(e));
    }
    Ok(())
}

/// Lowercase long flags and accept `_` for `-`.
fn normalize_args(mut raw: Vec<OsString>) -> Vec<OsString> {
    if raw.is_empty() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len());
    out.push(raw.remove(0)); // program name

    for arg in raw {
        let s = arg.to_string_lossy();
        if s.starts_with("--") && s.len() > 2 {
            let mut pieces = s.splitn(2, '=');
            let flag = pieces.next().unwrap_or("").to_lowercase().replace('_', "-");
            match pieces.next() {
                Some(v) => out.push(OsString::from(format!("{flag}={v}"))),
                None => out.push(OsString::from(flag)),
            }
        } else {
            out.push(arg);
        }
    }
    out
}
