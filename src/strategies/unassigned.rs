//! Find owners for urgent work nobody holds

use anyhow::Result;

use super::reassign::best_target;
use super::{StrategyContext, StrategyOutput};
use crate::types::{ActionPayload, RecommendationCandidate, RecommendationType};

pub fn generate(ctx: &StrategyContext) -> Result<StrategyOutput> {
    let mut out = StrategyOutput::default();

    let orphans = ctx
        .snapshot
        .open_tasks()
        .filter(|t| t.assignee_id.is_none() && t.priority.is_urgent());

    for task in orphans {
        let Some(target) = best_target(ctx, task, None) else {
            tracing::debug!("No member has room for unassigned task {}", task.id);
            continue;
        };

        let risk = ctx
            .analysis
            .risk_for(&task.id)
            .map(|r| format!(" (risk {:.0}, {:?})", r.score, r.level))
            .unwrap_or_default();

        out.push(
            RecommendationCandidate::new(
                RecommendationType::AssignUnassigned,
                format!("Assign \"{}\" to {}", task.title, target.member.display_name()),
                format!(
                    "{} has {:.0}h available and {:.0}% skill fit.",
                    target.member.display_name(),
                    target.member.available_hours,
                    target.fit * 100.0
                ),
                format!("{:?}-priority task {} has no owner{}", task.priority, task.id, risk),
                ActionPayload::AssignUnassigned {
                    task_id: task.id.clone(),
                    to_member_id: target.member.id.clone(),
                },
            )
            .with_match(target.score, Some(target.fit)),
        );
    }

    Ok(out)
}
