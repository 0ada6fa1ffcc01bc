//! Sequential per-target rendering of one analyzed statement.

use shard_core::{
    error::ShardingError,
    route::{RouteResult, RouteTarget},
};

use crate::ast::{Restore, RestoreCtx, RestoreFlags, SelectStmt};

/// Renders the decorated statement once per physical target, mutating the
/// shared route cell between passes (set-index, render, repeat). Each pass
/// writes into an independent buffer, so the texts can later be dispatched
/// concurrently even though rendering itself is sequential. The route is
/// returned to the unset state afterwards.
pub fn render_targets(
    stmt: &SelectStmt,
    route: &RouteResult,
    targets: &[RouteTarget],
) -> Result<Vec<String>, ShardingError> {
    render_targets_with_flags(stmt, route, targets, RestoreFlags::default())
}

pub fn render_targets_with_flags(
    stmt: &SelectStmt,
    route: &RouteResult,
    targets: &[RouteTarget],
    flags: RestoreFlags,
) -> Result<Vec<String>, ShardingError> {
    let mut rendered = Vec::with_capacity(targets.len());
    for target in targets {
        route.set_target(*target);
        let mut ctx = RestoreCtx::new(flags);
        // The route must not stay pinned to a stale target on failure.
        if let Err(err) = stmt.restore(&mut ctx) {
            route.clear();
            return Err(err);
        }
        rendered.push(ctx.finish());
    }
    route.clear();
    Ok(rendered)
}
