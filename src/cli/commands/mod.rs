use super::Ctx;
use crate::Result;
use crate::core::{History, NodeId};

pub(super) mod cmd;
pub(super) mod file;
pub(super) mod init;
pub(super) mod inspect;
pub(super) mod recover;
pub(super) mod run;
pub(super) mod stage;

/// The stage, forked out of any run case sharing it when the policy allows.
/// Stages outside the current case come back as is; the edit itself refuses.
fn writable_stage(ctx: &Ctx, history: &mut History, stage: NodeId) -> Result<NodeId> {
    let Some(index) = history.case(history.current_case())?.stage_index(stage) else {
        return Ok(stage);
    };
    let writable = history.writable_stage(history.current_case(), index, ctx.policy)?;
    if writable != stage {
        tracing::info!(from = %stage, to = %writable, "shared stage forked for editing");
    }
    Ok(writable)
}

/// The command at the same position in the writable copy of its stage.
fn writable_command(ctx: &Ctx, history: &mut History, id: NodeId) -> Result<NodeId> {
    let stage = history.command(id)?.stage();
    let position = history
        .stage(stage)?
        .items()
        .iter()
        .position(|item| *item == id);
    let writable = writable_stage(ctx, history, stage)?;
    match position {
        Some(position) if writable != stage => Ok(history.command_at(writable, position)?),
        _ => Ok(id),
    }
}
