//! Candidate generation
//!
//! Five independent strategies share one signature:
//! `fn(&StrategyContext) -> anyhow::Result<StrategyOutput>`.
//! The driver runs every registered strategy, isolates failures (errors and
//! panics alike), and concatenates what survives. No cap is applied here;
//! truncation happens in the ranker.

pub mod delay;
pub mod reassign;
pub mod rebalance;
pub mod reviewer;
pub mod unassigned;

use anyhow::Result;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::analyzer::Analysis;
use crate::config::ResourceConfig;
use crate::skills::SkillMatcher;
use crate::types::{CycleWarning, PlanningSnapshot, RecommendationCandidate, RecommendationType};

/// Read-only view every strategy works from
pub struct StrategyContext<'a> {
    pub snapshot: &'a PlanningSnapshot,
    /// Normalized copy of `snapshot.config`
    pub config: &'a ResourceConfig,
    pub matcher: &'a SkillMatcher,
    pub analysis: &'a Analysis,
}

#[derive(Debug, Default)]
pub struct StrategyOutput {
    pub candidates: Vec<RecommendationCandidate>,
    pub warnings: Vec<CycleWarning>,
}

impl StrategyOutput {
    pub fn push(&mut self, candidate: RecommendationCandidate) {
        self.candidates.push(candidate);
    }
}

pub type StrategyFn = fn(&StrategyContext) -> Result<StrategyOutput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Reassignment,
    Delay,
    Rebalance,
    ReviewerAssignment,
    UnassignedCritical,
}

impl Strategy {
    /// Registration order; also the order candidates are concatenated in
    pub const ALL: [Strategy; 5] = [
        Strategy::Reassignment,
        Strategy::Delay,
        Strategy::Rebalance,
        Strategy::ReviewerAssignment,
        Strategy::UnassignedCritical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Reassignment => "reassignment",
            Strategy::Delay => "delay",
            Strategy::Rebalance => "rebalance",
            Strategy::ReviewerAssignment => "reviewer_assignment",
            Strategy::UnassignedCritical => "unassigned_critical",
        }
    }

    pub fn kind(&self) -> RecommendationType {
        match self {
            Strategy::Reassignment => RecommendationType::Reassign,
            Strategy::Delay => RecommendationType::Delay,
            Strategy::Rebalance => RecommendationType::Rebalance,
            Strategy::ReviewerAssignment => RecommendationType::AddReviewer,
            Strategy::UnassignedCritical => RecommendationType::AssignUnassigned,
        }
    }

    pub fn runner(&self) -> StrategyFn {
        match self {
            Strategy::Reassignment => reassign::generate,
            Strategy::Delay => delay::generate,
            Strategy::Rebalance => rebalance::generate,
            Strategy::ReviewerAssignment => reviewer::generate,
            Strategy::UnassignedCritical => unassigned::generate,
        }
    }
}

/// Run `strategies` in order. A strategy that errors or panics contributes
/// nothing and leaves a warning; the others still run. Candidates touching a
/// task whose assignee is not on the team are dropped.
pub fn generate_all(ctx: &StrategyContext, strategies: &[Strategy]) -> StrategyOutput {
    let runners: Vec<(&'static str, StrategyFn)> =
        strategies.iter().map(|s| (s.name(), s.runner())).collect();
    run_strategies(ctx, &runners)
}

fn run_strategies(ctx: &StrategyContext, runners: &[(&'static str, StrategyFn)]) -> StrategyOutput {
    let mut out = StrategyOutput {
        candidates: Vec::new(),
        warnings: unknown_assignees(ctx.snapshot),
    };

    let orphaned: HashSet<String> = out
        .warnings
        .iter()
        .filter_map(|w| match w {
            CycleWarning::UnknownAssignee { task_id, .. } => Some(task_id.clone()),
            _ => None,
        })
        .collect();

    for (name, runner) in runners {
        let result = panic::catch_unwind(AssertUnwindSafe(|| runner(ctx)));

        let error = match result {
            Ok(Ok(produced)) => {
                tracing::debug!("Strategy {} produced {} candidate(s)", name, produced.candidates.len());
                out.candidates.extend(produced.candidates.into_iter().filter(|c| {
                    let skip = c.action.task_id().is_some_and(|id| orphaned.contains(id));
                    if skip {
                        tracing::debug!("Dropping {} candidate for orphaned task", c.kind);
                    }
                    !skip
                }));
                out.warnings.extend(produced.warnings);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "strategy panicked".to_string()),
        };

        tracing::warn!("Strategy {} failed: {}", name, error);
        out.warnings.push(CycleWarning::StrategyFailed {
            strategy: name.to_string(),
            error,
        });
    }

    out
}

fn unknown_assignees(snapshot: &PlanningSnapshot) -> Vec<CycleWarning> {
    snapshot
        .open_tasks()
        .filter_map(|task| {
            let assignee = task.assignee_id.as_deref()?;
            if snapshot.member(assignee).is_some() {
                return None;
            }
            tracing::warn!("Task {} is assigned to unknown member {}", task.id, assignee);
            Some(CycleWarning::UnknownAssignee {
                task_id: task.id.clone(),
                assignee_id: assignee.to_string(),
            })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::types::{Priority, TaskStatus};

    fn broken(_ctx: &StrategyContext) -> Result<StrategyOutput> {
        anyhow::bail!("no data")
    }

    fn panicky(_ctx: &StrategyContext) -> Result<StrategyOutput> {
        panic!("index out of range")
    }

    #[test]
    fn test_generate_all_reports_unknown_assignee() {
        let snap = snapshot(
            vec![member("a", 40.0, 10.0, 0.0, &[])],
            vec![task("t1", "Docs", TaskStatus::Todo, Priority::Low, Some("ghost"))],
        );
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let ctx = StrategyContext {
            snapshot: &snap,
            config: &snap.config,
            matcher: &matcher,
            analysis: &analysis,
        };
        let out = generate_all(&ctx, &Strategy::ALL);
        assert!(out.warnings.contains(&CycleWarning::UnknownAssignee {
            task_id: "t1".to_string(),
            assignee_id: "ghost".to_string(),
        }));
    }

    #[test]
    fn test_orphaned_tasks_yield_no_candidates() {
        let mut overdue = task("t1", "Fix login", TaskStatus::InProgress, Priority::High, Some("ghost"));
        overdue.due_date = Some(now() - chrono::Duration::days(4));
        let review = task("t2", "Review schema", TaskStatus::InReview, Priority::High, Some("ghost"));
        let healthy = task("t3", "Review docs", TaskStatus::InReview, Priority::High, Some("a"));
        let snap = snapshot(
            vec![member("a", 40.0, 10.0, 0.0, &[]), member("b", 40.0, 5.0, 0.0, &[])],
            vec![overdue, review, healthy],
        );
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let ctx = StrategyContext {
            snapshot: &snap,
            config: &snap.config,
            matcher: &matcher,
            analysis: &analysis,
        };

        let out = generate_all(&ctx, &Strategy::ALL);
        let touched: Vec<_> = out.candidates.iter().filter_map(|c| c.action.task_id()).collect();
        assert!(!touched.contains(&"t1"));
        assert!(!touched.contains(&"t2"));
        assert!(touched.contains(&"t3"));
        let orphan_warnings = out
            .warnings
            .iter()
            .filter(|w| matches!(w, CycleWarning::UnknownAssignee { .. }))
            .count();
        assert_eq!(orphan_warnings, 2);
    }

    #[test]
    fn test_failed_strategy_does_not_block_others() {
        let snap = snapshot(
            vec![member("a", 40.0, 80.0, 85.0, &[]), member("b", 40.0, 4.0, 0.0, &[])],
            vec![task("t1", "Write release notes", TaskStatus::InProgress, Priority::Medium, Some("a"))],
        );
        let analysis = analysis(&snap);
        let matcher = SkillMatcher::default();
        let ctx = StrategyContext {
            snapshot: &snap,
            config: &snap.config,
            matcher: &matcher,
            analysis: &analysis,
        };

        let runners: Vec<(&'static str, StrategyFn)> = vec![
            ("broken", broken as StrategyFn),
            ("panicky", panicky as StrategyFn),
            ("reassignment", reassign::generate as StrategyFn),
            ("rebalance", rebalance::generate as StrategyFn),
        ];
        let out = run_strategies(&ctx, &runners);

        let failed: Vec<_> = out
            .warnings
            .iter()
            .filter_map(|w| match w {
                CycleWarning::StrategyFailed { strategy, .. } => Some(strategy.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["broken", "panicky"]);
        assert!(out.candidates.iter().any(|c| c.kind == RecommendationType::Reassign));
        assert!(out.candidates.iter().any(|c| c.kind == RecommendationType::Rebalance));
    }

    #[test]
    fn test_strategy_kinds_are_distinct() {
        let kinds: std::collections::HashSet<_> = Strategy::ALL.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds.len(), RecommendationType::ALL.len());
    }
}
