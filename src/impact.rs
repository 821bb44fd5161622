//! Impact Estimation
//!
//! Closed-form projections per recommendation type, driven by the same
//! member and task fields the strategies looked at. Every delta is clamped
//! so that a single extreme input cannot dominate the ranking.

use crate::analyzer::Analysis;
use crate::config::ResourceConfig;
use crate::skills::SkillMatcher;
use crate::types::{
    ActionPayload, ImpactEstimate, PlanningSnapshot, Priority, RecommendationCandidate, TaskState,
    TeamMemberState,
};

pub const DELIVERY_BOUND: f64 = 25.0;
pub const COST_BOUND: f64 = 50.0;
pub const BURNOUT_BOUND: f64 = 20.0;
pub const ON_TIME_MAX: f64 = 25.0;

/// Extra delivery credit for giving an orphaned task an owner
pub const CRITICAL_URGENCY_BONUS: f64 = 18.0;
pub const HIGH_URGENCY_BONUS: f64 = 12.0;

pub struct ImpactEstimator<'a> {
    snapshot: &'a PlanningSnapshot,
    analysis: &'a Analysis,
    matcher: &'a SkillMatcher,
}

impl<'a> ImpactEstimator<'a> {
    pub fn new(snapshot: &'a PlanningSnapshot, analysis: &'a Analysis, matcher: &'a SkillMatcher) -> Self {
        Self {
            snapshot,
            analysis,
            matcher,
        }
    }

    /// Fill in `impact` and `base_score` on every candidate
    pub fn annotate(&self, candidates: &mut [RecommendationCandidate], config: &ResourceConfig) {
        for candidate in candidates.iter_mut() {
            candidate.impact = self.estimate(candidate);
            candidate.base_score = base_score(&candidate.impact, config);
        }
    }

    /// Unknown tasks or members contribute nothing rather than failing
    pub fn estimate(&self, candidate: &RecommendationCandidate) -> ImpactEstimate {
        let raw = match &candidate.action {
            ActionPayload::Reassign {
                task_id,
                from_member_id,
                to_member_id,
            } => self.reassign(candidate, task_id, from_member_id, to_member_id),
            ActionPayload::Delay { task_id, days } => self.delay(task_id, *days),
            ActionPayload::Rebalance {
                overloaded_member_id,
                underloaded_member_id,
                spread,
            } => self.rebalance(overloaded_member_id, underloaded_member_id, *spread),
            ActionPayload::AddReviewer { task_id, reviewer_id } => {
                self.add_reviewer(candidate, task_id, reviewer_id)
            }
            ActionPayload::AssignUnassigned { task_id, to_member_id } => {
                self.assign_unassigned(candidate, task_id, to_member_id)
            }
        };
        raw.map(clamp_estimate).unwrap_or_default()
    }

    fn reassign(
        &self,
        candidate: &RecommendationCandidate,
        task_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> Option<ImpactEstimate> {
        let task = self.snapshot.task(task_id)?;
        let from = self.snapshot.member(from_id)?;
        let to = self.snapshot.member(to_id)?;
        let fit = self.fit_of(candidate, task, to);

        let util_gap = ((from.utilization() - to.utilization()) / 100.0).clamp(-2.0, 2.0);
        let velocity_gap = (finite(to.velocity) - finite(from.velocity)).clamp(-2.0, 2.0);

        let delivery = 4.0 + 8.0 * fit + 6.0 * util_gap + 5.0 * velocity_gap
            + priority_weight(task.priority)
            - 6.0 * (1.0 - fit);
        let ramp_up = 10.0 * (1.0 - fit);
        let cost = rate_change_percent(from.hourly_rate, to.hourly_rate) + ramp_up;
        let burnout = -(from.burnout_risk / 100.0) * 12.0
            - f64::from(from.consecutive_overtime_weeks.min(4))
            + (to.utilization() / 100.0).min(1.0) * 4.0;

        Some(ImpactEstimate {
            delivery_delta: delivery,
            cost_delta: cost,
            burnout_delta: burnout,
            on_time_bonus: self.task_risk(task_id) / 4.0,
        })
    }

    fn delay(&self, task_id: &str, days: i64) -> Option<ImpactEstimate> {
        let task = self.snapshot.task(task_id)?;
        let days = days.max(0) as f64;
        let assignee_burnout = task
            .assignee_id
            .as_deref()
            .and_then(|id| self.snapshot.member(id))
            .map(|m| m.burnout_risk)
            .unwrap_or(0.0);

        Some(ImpactEstimate {
            delivery_delta: 3.0 - 0.75 * days,
            cost_delta: 0.8 * days,
            burnout_delta: -(2.0 + assignee_burnout / 100.0 * 6.0),
            on_time_bonus: self.task_risk(task_id) / 8.0,
        })
    }

    fn rebalance(&self, most_id: &str, least_id: &str, spread: f64) -> Option<ImpactEstimate> {
        let most = self.snapshot.member(most_id)?;
        let least = self.snapshot.member(least_id)?;
        let spread = finite(spread).max(0.0);

        let held: Vec<f64> = self
            .snapshot
            .open_tasks()
            .filter(|t| t.assignee_id.as_deref() == Some(most_id))
            .map(|t| self.task_risk(&t.id))
            .collect();
        let mean_risk = if held.is_empty() {
            0.0
        } else {
            held.iter().sum::<f64>() / held.len() as f64
        };

        Some(ImpactEstimate {
            delivery_delta: (spread / 8.0).min(12.0),
            cost_delta: 0.3 * rate_change_percent(most.hourly_rate, least.hourly_rate),
            burnout_delta: -(spread / 10.0 + most.burnout_risk / 10.0),
            on_time_bonus: mean_risk / 4.0,
        })
    }

    fn add_reviewer(
        &self,
        candidate: &RecommendationCandidate,
        task_id: &str,
        reviewer_id: &str,
    ) -> Option<ImpactEstimate> {
        let task = self.snapshot.task(task_id)?;
        let reviewer = self.snapshot.member(reviewer_id)?;
        let fit = self.fit_of(candidate, task, reviewer);
        let author_burnout = task
            .assignee_id
            .as_deref()
            .and_then(|id| self.snapshot.member(id))
            .map(|m| m.burnout_risk)
            .unwrap_or(0.0);

        Some(ImpactEstimate {
            delivery_delta: 3.0 + 6.0 * fit + priority_weight(task.priority),
            cost_delta: 2.0 + 3.0 * (1.0 - fit),
            burnout_delta: (reviewer.utilization() / 100.0).min(2.0) * 3.0 - author_burnout / 100.0 * 2.0,
            on_time_bonus: self.task_risk(task_id) / 4.0,
        })
    }

    fn assign_unassigned(
        &self,
        candidate: &RecommendationCandidate,
        task_id: &str,
        to_id: &str,
    ) -> Option<ImpactEstimate> {
        let task = self.snapshot.task(task_id)?;
        let to = self.snapshot.member(to_id)?;
        let fit = self.fit_of(candidate, task, to);

        let urgency = match task.priority {
            Priority::Critical => CRITICAL_URGENCY_BONUS,
            Priority::High => HIGH_URGENCY_BONUS,
            _ => 0.0,
        };

        let rates: Vec<f64> = self
            .snapshot
            .members
            .iter()
            .map(|m| m.hourly_rate)
            .filter(|r| r.is_finite() && *r > 0.0)
            .collect();
        let avg_rate = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };

        Some(ImpactEstimate {
            delivery_delta: urgency + 5.0 * fit,
            cost_delta: 0.5 * rate_change_percent(avg_rate, to.hourly_rate),
            burnout_delta: (to.utilization() / 100.0).min(1.0) * 4.0 + to.burnout_risk / 100.0 * 3.0,
            on_time_bonus: self.task_risk(task_id) / 4.0,
        })
    }

    fn fit_of(&self, candidate: &RecommendationCandidate, task: &TaskState, member: &TeamMemberState) -> f64 {
        candidate
            .skill_fit
            .unwrap_or_else(|| self.matcher.fit(task, member))
            .clamp(0.0, 1.0)
    }

    fn task_risk(&self, task_id: &str) -> f64 {
        self.analysis.risk_for(task_id).map(|r| r.score).unwrap_or(0.0)
    }
}

/// Weighted scalarization; weights are expected to be normalized already
pub fn base_score(impact: &ImpactEstimate, config: &ResourceConfig) -> f64 {
    config.delivery_slippage_weight * impact.delivery_delta
        - config.cost_overrun_weight * impact.cost_delta
        - config.overwork_weight * impact.burnout_delta
        + config.on_time_bonus_weight * impact.on_time_bonus
}

fn clamp_estimate(e: ImpactEstimate) -> ImpactEstimate {
    ImpactEstimate {
        delivery_delta: finite(e.delivery_delta).clamp(-DELIVERY_BOUND, DELIVERY_BOUND),
        cost_delta: finite(e.cost_delta).clamp(-COST_BOUND, COST_BOUND),
        burnout_delta: finite(e.burnout_delta).clamp(-BURNOUT_BOUND, BURNOUT_BOUND),
        on_time_bonus: finite(e.on_time_bonus).clamp(0.0, ON_TIME_MAX),
    }
}

fn priority_weight(priority: Priority) -> f64 {
    match priority {
        Priority::Critical => 4.0,
        Priority::High => 2.0,
        Priority::Medium => 1.0,
        Priority::Low => 0.0,
    }
}

/// Percentage change going from `from_rate` to `to_rate`; 0 when unknown
fn rate_change_percent(from_rate: f64, to_rate: f64) -> f64 {
    if from_rate > 0.0 && from_rate.is_finite() && to_rate.is_finite() {
        (to_rate - from_rate) / from_rate * 100.0
    } else {
        0.0
    }
}

fn finite(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::fixtures::*;
    use crate::types::{RecommendationType, TaskStatus};
    use chrono::Duration;

    fn candidate(kind: RecommendationType, action: ActionPayload, fit: Option<f64>) -> RecommendationCandidate {
        RecommendationCandidate::new(kind, String::new(), String::new(), String::new(), action)
            .with_match(0.0, fit)
    }

    #[test]
    fn test_base_score_weighting() {
        let impact = ImpactEstimate {
            delivery_delta: 10.0,
            cost_delta: 5.0,
            burnout_delta: -4.0,
            on_time_bonus: 20.0,
        };
        let score = base_score(&impact, &ResourceConfig::default());
        // 0.4*10 - 0.2*5 + 0.25*4 + 0.15*20
        assert!((score - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_urgency_bonus_follows_priority() {
        let snap = snapshot(
            vec![member("a", 40.0, 60.0, 50.0, &[]), member("b", 40.0, 10.0, 0.0, &[])],
            vec![task("t1", "Hotfix", TaskStatus::Todo, Priority::Critical, None)],
        );
        let base = analysis(&snap);
        let matcher = SkillMatcher::default();
        let estimator = ImpactEstimator::new(&snap, &base, &matcher);

        let assign = estimator.estimate(&candidate(
            RecommendationType::AssignUnassigned,
            ActionPayload::AssignUnassigned {
                task_id: "t1".to_string(),
                to_member_id: "b".to_string(),
            },
            Some(1.0),
        ));
        let high = {
            let mut s = snap.clone();
            s.tasks[0].priority = Priority::High;
            let a = analysis(&s);
            ImpactEstimator::new(&s, &a, &matcher).estimate(&candidate(
                RecommendationType::AssignUnassigned,
                ActionPayload::AssignUnassigned {
                    task_id: "t1".to_string(),
                    to_member_id: "b".to_string(),
                },
                Some(1.0),
            ))
        };
        assert!((assign.delivery_delta - 23.0).abs() < 1e-9);
        assert!((high.delivery_delta - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_deltas_are_bounded() {
        let mut from = member("a", 10.0, 200.0, 100.0, &[]);
        from.hourly_rate = 1.0;
        from.velocity = 0.0;
        from.consecutive_overtime_weeks = 20;
        let mut to = member("b", 40.0, 0.0, 0.0, &[]);
        to.hourly_rate = 1000.0;
        to.velocity = 50.0;
        let mut t = task("t1", "Hotfix", TaskStatus::Todo, Priority::Critical, Some("a"));
        t.due_date = Some(now() - Duration::days(30));
        let snap = snapshot(vec![from, to], vec![t]);
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let estimator = ImpactEstimator::new(&snap, &analysis, &matcher);

        let actions = vec![
            ActionPayload::Reassign {
                task_id: "t1".to_string(),
                from_member_id: "a".to_string(),
                to_member_id: "b".to_string(),
            },
            ActionPayload::Delay {
                task_id: "t1".to_string(),
                days: 400,
            },
            ActionPayload::Rebalance {
                overloaded_member_id: "a".to_string(),
                underloaded_member_id: "b".to_string(),
                spread: 2000.0,
            },
            ActionPayload::AddReviewer {
                task_id: "t1".to_string(),
                reviewer_id: "a".to_string(),
            },
        ];
        for action in actions {
            let e = estimator.estimate(&candidate(RecommendationType::Reassign, action, None));
            assert!(e.delivery_delta.abs() <= DELIVERY_BOUND);
            assert!(e.cost_delta.abs() <= COST_BOUND);
            assert!(e.burnout_delta.abs() <= BURNOUT_BOUND);
            assert!((0.0..=ON_TIME_MAX).contains(&e.on_time_bonus));
        }
    }

    #[test]
    fn test_missing_member_yields_zero_impact() {
        let snap = snapshot(vec![], vec![task("t1", "Hotfix", TaskStatus::Todo, Priority::High, None)]);
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let estimator = ImpactEstimator::new(&snap, &analysis, &matcher);
        let e = estimator.estimate(&candidate(
            RecommendationType::AssignUnassigned,
            ActionPayload::AssignUnassigned {
                task_id: "t1".to_string(),
                to_member_id: "ghost".to_string(),
            },
            None,
        ));
        assert_eq!(e, ImpactEstimate::default());
    }

    #[test]
    fn test_relieving_burnout_lowers_burnout_delta() {
        let snap = snapshot(
            vec![member("a", 40.0, 70.0, 90.0, &[]), member("b", 40.0, 4.0, 0.0, &[])],
            vec![task("t1", "Hotfix", TaskStatus::InProgress, Priority::Medium, Some("a"))],
        );
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let mut candidates = vec![candidate(
            RecommendationType::Reassign,
            ActionPayload::Reassign {
                task_id: "t1".to_string(),
                from_member_id: "a".to_string(),
                to_member_id: "b".to_string(),
            },
            Some(1.0),
        )];
        ImpactEstimator::new(&snap, &analysis, &matcher).annotate(&mut candidates, &snap.config);
        assert!(candidates[0].impact.burnout_delta < 0.0);
        assert!(candidates[0].impact.delivery_delta > 0.0);
        assert!(candidates[0].base_score > 0.0);
    }
}
