//! Move work off overloaded or burning-out members

use anyhow::Result;

use super::{StrategyContext, StrategyOutput};
use crate::config::ResourceConfig;
use crate::types::{ActionPayload, RecommendationCandidate, RecommendationType, TaskState, TeamMemberState};

/// Targets scoring at or below this are not worth proposing
pub const MIN_REASSIGN_SCORE: f64 = 45.0;

const FIT_WEIGHT: f64 = 40.0;
const SPARE_WEIGHT: f64 = 25.0;
const FRESHNESS_WEIGHT: f64 = 15.0;
const VELOCITY_WEIGHT: f64 = 5.0;
const MAX_SCORED_VELOCITY: f64 = 2.0;

/// A member picked to take on a task
#[derive(Debug, Clone, Copy)]
pub struct TargetMatch<'a> {
    pub member: &'a TeamMemberState,
    pub score: f64,
    pub fit: f64,
}

/// 40·fit + 25·spare + 15·(1 − burnout/100) + 5·velocity
pub fn assignment_score(fit: f64, member: &TeamMemberState) -> f64 {
    let freshness = 1.0 - (member.burnout_risk / 100.0).clamp(0.0, 1.0);
    let velocity = if member.velocity.is_finite() {
        member.velocity.clamp(0.0, MAX_SCORED_VELOCITY)
    } else {
        0.0
    };
    FIT_WEIGHT * fit
        + SPARE_WEIGHT * member.spare_ratio()
        + FRESHNESS_WEIGHT * freshness
        + VELOCITY_WEIGHT * velocity
}

/// Overloaded, burning out, or consistently working long weeks
pub fn needs_relief(member: &TeamMemberState, config: &ResourceConfig) -> bool {
    member.utilization() > 100.0
        || member.burnout_risk >= config.burnout_threshold
        || (config.overwork_hours_weekly > 0.0 && member.avg_weekly_hours > config.overwork_hours_weekly)
}

/// Has room for more work without becoming a relief case itself
pub fn has_spare_capacity(member: &TeamMemberState, config: &ResourceConfig) -> bool {
    member.available_hours > 0.0
        && member.capacity_hours > 0.0
        && member.utilization() < 100.0
        && member.burnout_risk < config.burnout_threshold
}

/// Highest-scoring member with spare capacity, skipping `exclude`.
/// Ties go to whoever appears first in the snapshot.
pub fn best_target<'a>(
    ctx: &StrategyContext<'a>,
    task: &TaskState,
    exclude: Option<&str>,
) -> Option<TargetMatch<'a>> {
    let mut best: Option<TargetMatch<'a>> = None;

    for member in &ctx.snapshot.members {
        if Some(member.id.as_str()) == exclude || !has_spare_capacity(member, ctx.config) {
            continue;
        }
        let fit = ctx.matcher.fit(task, member);
        let score = assignment_score(fit, member);
        if !score.is_finite() {
            continue;
        }
        if best.map_or(true, |b| score > b.score) {
            best = Some(TargetMatch { member, score, fit });
        }
    }

    best
}

pub fn generate(ctx: &StrategyContext) -> Result<StrategyOutput> {
    let mut out = StrategyOutput::default();

    for source in ctx.snapshot.members.iter().filter(|m| needs_relief(m, ctx.config)) {
        let held = ctx
            .snapshot
            .open_tasks()
            .filter(|t| t.assignee_id.as_deref() == Some(source.id.as_str()));

        for task in held {
            let Some(target) = best_target(ctx, task, Some(&source.id)) else {
                continue;
            };
            if target.score <= MIN_REASSIGN_SCORE {
                continue;
            }

            let reason = relief_reason(source, ctx.config);
            let candidate = RecommendationCandidate::new(
                RecommendationType::Reassign,
                format!("Reassign \"{}\" to {}", task.title, target.member.display_name()),
                format!(
                    "Move {} from {} ({:.0}% utilized) to {} ({:.0}% utilized, skill fit {:.0}%).",
                    task.id,
                    source.display_name(),
                    source.utilization(),
                    target.member.display_name(),
                    target.member.utilization(),
                    target.fit * 100.0
                ),
                reason,
                ActionPayload::Reassign {
                    task_id: task.id.clone(),
                    from_member_id: source.id.clone(),
                    to_member_id: target.member.id.clone(),
                },
            )
            .with_match(target.score, Some(target.fit));

            out.push(candidate);
        }
    }

    Ok(out)
}

fn relief_reason(member: &TeamMemberState, config: &ResourceConfig) -> String {
    let mut parts = Vec::new();
    let u = member.utilization();
    if u > 100.0 {
        parts.push(format!("{} is at {:.0}% of capacity", member.display_name(), u));
    }
    if member.burnout_risk >= config.burnout_threshold {
        parts.push(format!("burnout risk {:.0}", member.burnout_risk));
    }
    if config.overwork_hours_weekly > 0.0 && member.avg_weekly_hours > config.overwork_hours_weekly {
        parts.push(format!(
            "averaging {:.0}h/week for {} week(s)",
            member.avg_weekly_hours, member.consecutive_overtime_weeks
        ));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::skills::SkillMatcher;
    use crate::types::{Priority, TaskStatus};

    fn run(snap: &crate::types::PlanningSnapshot) -> StrategyOutput {
        let analysis = analysis(snap);
        let matcher = SkillMatcher::default();
        let ctx = StrategyContext {
            snapshot: snap,
            config: &snap.config,
            matcher: &matcher,
            analysis: &analysis,
        };
        generate(&ctx).unwrap()
    }

    #[test]
    fn test_overloaded_member_hands_off_to_skilled_idle_member() {
        // A at 175% with burnout 82, B at 10% with matching skills
        let snap = snapshot(
            vec![
                member("a", 40.0, 70.0, 82.0, &["devops"]),
                member("b", 40.0, 4.0, 10.0, &["devops"]),
            ],
            vec![task("t1", "Fix Docker build pipeline", TaskStatus::InProgress, Priority::High, Some("a"))],
        );
        let out = run(&snap);

        let moved: Vec<_> = out
            .candidates
            .iter()
            .filter(|c| match &c.action {
                ActionPayload::Reassign {
                    from_member_id,
                    to_member_id,
                    ..
                } => from_member_id == "a" && to_member_id == "b",
                _ => false,
            })
            .collect();
        assert!(!moved.is_empty());
        assert!(moved[0].skill_fit.unwrap() > 0.0);
        assert!(moved[0].match_score > MIN_REASSIGN_SCORE);
    }

    #[test]
    fn test_never_targets_current_assignee() {
        let snap = snapshot(
            vec![
                member("a", 40.0, 60.0, 90.0, &["backend"]),
                member("b", 40.0, 10.0, 0.0, &[]),
                member("c", 40.0, 0.0, 0.0, &["backend"]),
            ],
            vec![
                task("t1", "API rate limiting", TaskStatus::Todo, Priority::Medium, Some("a")),
                task("t2", "Webhook retries", TaskStatus::InProgress, Priority::Low, Some("a")),
            ],
        );
        for c in run(&snap).candidates {
            if let ActionPayload::Reassign { task_id, to_member_id, .. } = &c.action {
                let task = snap.task(task_id).unwrap();
                assert_ne!(task.assignee_id.as_deref(), Some(to_member_id.as_str()));
            }
        }
    }

    #[test]
    fn test_one_candidate_per_task_best_target_wins() {
        let snap = snapshot(
            vec![
                member("a", 40.0, 60.0, 0.0, &[]),
                member("b", 40.0, 30.0, 0.0, &[]),
                member("c", 40.0, 0.0, 0.0, &["security"]),
            ],
            vec![task("t1", "OAuth token refresh", TaskStatus::Todo, Priority::High, Some("a"))],
        );
        let out = run(&snap);
        assert_eq!(out.candidates.len(), 1);
        match &out.candidates[0].action {
            ActionPayload::Reassign { to_member_id, .. } => assert_eq!(to_member_id, "c"),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_floor_blocks_weak_targets() {
        // Only target: nearly full, burnt out below threshold, no skills, slow
        let mut weak = member("b", 40.0, 39.0, 69.0, &[]);
        weak.velocity = 0.0;
        let snap = snapshot(
            vec![member("a", 40.0, 60.0, 0.0, &[]), weak],
            vec![task("t1", "Postgres index tuning", TaskStatus::Todo, Priority::Low, Some("a"))],
        );
        // fit 0, spare 0.025, freshness 0.31 -> well under the floor
        assert!(run(&snap).candidates.is_empty());
    }

    #[test]
    fn test_done_tasks_and_healthy_members_ignored() {
        let snap = snapshot(
            vec![member("a", 40.0, 60.0, 0.0, &[]), member("b", 40.0, 0.0, 0.0, &[])],
            vec![
                task("t1", "Release", TaskStatus::Done, Priority::High, Some("a")),
                task("t2", "Release", TaskStatus::Todo, Priority::High, Some("b")),
            ],
        );
        assert!(run(&snap).candidates.is_empty());
    }

    #[test]
    fn test_member_without_skills_does_not_error() {
        let snap = snapshot(
            vec![member("a", 0.0, 0.0, 95.0, &[]), member("b", 40.0, 0.0, 0.0, &[])],
            vec![task("t1", "Untitled", TaskStatus::Todo, Priority::Low, Some("a"))],
        );
        let out = run(&snap);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].skill_fit, Some(1.0));
    }
}
