//! Unstick tasks waiting in review

use anyhow::Result;

use super::{StrategyContext, StrategyOutput};
use crate::types::{ActionPayload, RecommendationCandidate, RecommendationType, TaskStatus};

const FIT_WEIGHT: f64 = 50.0;
const HEADROOM_WEIGHT: f64 = 50.0;

/// 50·fit + 50·(1 − utilization), utilization as a fraction in [0, 1]
pub fn reviewer_score(fit: f64, utilization_percent: f64) -> f64 {
    let headroom = 1.0 - (utilization_percent / 100.0).clamp(0.0, 1.0);
    FIT_WEIGHT * fit + HEADROOM_WEIGHT * headroom
}

pub fn generate(ctx: &StrategyContext) -> Result<StrategyOutput> {
    let mut out = StrategyOutput::default();

    for task in ctx.snapshot.tasks.iter().filter(|t| t.status == TaskStatus::InReview) {
        let assignee = task.assignee_id.as_deref();
        let mut best: Option<(&crate::types::TeamMemberState, f64, f64)> = None;

        for member in &ctx.snapshot.members {
            if Some(member.id.as_str()) == assignee || member.capacity_hours <= 0.0 {
                continue;
            }
            let fit = ctx.matcher.fit(task, member);
            let score = reviewer_score(fit, member.utilization());
            if score > 0.0 && best.map_or(true, |(_, s, _)| score > s) {
                best = Some((member, score, fit));
            }
        }

        let Some((reviewer, score, fit)) = best else {
            continue;
        };

        out.push(
            RecommendationCandidate::new(
                RecommendationType::AddReviewer,
                format!("Add {} as reviewer on \"{}\"", reviewer.display_name(), task.title),
                format!(
                    "{} has {:.0}% skill fit and is {:.0}% utilized.",
                    reviewer.display_name(),
                    fit * 100.0,
                    reviewer.utilization()
                ),
                format!("{} is waiting in review", task.id),
                ActionPayload::AddReviewer {
                    task_id: task.id.clone(),
                    reviewer_id: reviewer.id.clone(),
                },
            )
            .with_match(score, Some(fit)),
        );
    }

    Ok(out)
}
