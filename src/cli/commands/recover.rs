use std::path::Path;

use super::super::Ctx;
use super::super::view::Output;
use crate::Result;
use crate::persist;

pub(crate) fn handle(ctx: &Ctx, snapshot: &Path) -> Result<()> {
    ctx.edit(|history| {
        let report = persist::recover_files_from_path(history, snapshot)?;
        for name in &report.unmatched {
            tracing::warn!(stage = %name, "recovered stage has no match");
        }
        Ok(Output::Recovered(report))
    })
}
