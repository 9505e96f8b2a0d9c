//! Read-only views: status, check, cases, show, text, depends.

use super::super::view::{self, Output};
use super::super::{Ctx, resolve_case, resolve_stage, stage_index};
use crate::Result;
use crate::core::NodeId;

pub(crate) fn status(ctx: &Ctx) -> Result<()> {
    ctx.read(|history| Ok(Output::Status(view::status_view(history, ctx.study.clone())?)))
}

pub(crate) fn check(ctx: &Ctx, case: Option<&str>) -> Result<()> {
    ctx.read(|history| {
        let case = match case {
            Some(raw) => resolve_case(history, raw)?,
            None => history.current_case(),
        };
        Ok(Output::Check(view::check_view(history, case)?))
    })
}

pub(crate) fn cases(ctx: &Ctx) -> Result<()> {
    ctx.read(|history| {
        let cases = history
            .cases()
            .map(|case| view::case_view(history, case.id()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Output::Cases { cases })
    })
}

pub(crate) fn show(ctx: &Ctx, stage: &str) -> Result<()> {
    ctx.read(|history| {
        let stage = resolve_stage(history, stage)?;
        // Stages reached by `#id` may belong to a run case only.
        let index = stage_index(history, stage).unwrap_or(0);
        Ok(Output::Stage(view::stage_view(history, stage, index)?))
    })
}

pub(crate) fn text(ctx: &Ctx, stage: &str, sort: bool) -> Result<()> {
    let sort = sort || ctx.config.study.sort_on_export;
    ctx.read(|history| {
        let stage = resolve_stage(history, stage)?;
        Ok(Output::Text {
            stage,
            text: history.stage_text(stage, sort)?,
        })
    })
}

pub(crate) fn depends(ctx: &Ctx, a: NodeId, b: NodeId) -> Result<()> {
    ctx.read(|history| {
        for id in [a, b] {
            if !history.nodes().contains(id) {
                return Err(crate::core::OperationError::UnknownNode { id }.into());
            }
        }
        Ok(Output::Depends {
            a,
            b,
            depends: history.depends_on(a, b),
        })
    })
}
