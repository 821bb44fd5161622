//! Push out deadlines that are already lost or about to be

use anyhow::Result;

use super::{StrategyContext, StrategyOutput};
use crate::types::{ActionPayload, RecommendationCandidate, RecommendationType, TaskState};

pub const MIN_DELAY_DAYS: i64 = 3;
pub const OVERDUE_BUFFER_DAYS: i64 = 2;
pub const BLOCKED_DELAY_DAYS: i64 = 3;
/// Blocked tasks due this many days out (or sooner) get a delay
pub const BLOCKED_HORIZON_DAYS: i64 = 2;

/// Days to delay `task` by, or `None` when no delay is warranted
pub fn proposed_delay(task: &TaskState, now: chrono::DateTime<chrono::Utc>) -> Option<(i64, String)> {
    if task.is_done() {
        return None;
    }

    if !task.is_blocked() {
        let days = task.days_overdue(now)?;
        let delay = MIN_DELAY_DAYS.max(days + OVERDUE_BUFFER_DAYS);
        return Some((delay, format!("{} day(s) overdue with nothing blocking it", days)));
    }

    match task.days_until_due(now) {
        Some(d) if d <= BLOCKED_HORIZON_DAYS => Some((
            BLOCKED_DELAY_DAYS,
            format!(
                "blocked by {} incomplete task(s) and due in {} day(s)",
                task.blocking_dependencies, d
            ),
        )),
        _ => None,
    }
}

pub fn generate(ctx: &StrategyContext) -> Result<StrategyOutput> {
    let mut out = StrategyOutput::default();
    let now = ctx.snapshot.cycle_at;

    for task in ctx.snapshot.open_tasks() {
        let Some((days, reason)) = proposed_delay(task, now) else {
            continue;
        };

        let candidate = RecommendationCandidate::new(
            RecommendationType::Delay,
            format!("Delay \"{}\" by {} day(s)", task.title, days),
            format!("Move the due date of {} out by {} day(s) to reflect a realistic finish.", task.id, days),
            reason,
            ActionPayload::Delay {
                task_id: task.id.clone(),
                days,
            },
        );
        out.push(candidate);
    }

    Ok(out)
}
