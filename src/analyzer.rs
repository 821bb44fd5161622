//! Delivery Confidence & Task Risk
//!
//! Confidence starts at 100 and every signal in the snapshot pushes it up
//! or down. Per-task risk is the additive counterpart: each factor adds a
//! bounded amount and the total is clamped to [0, 100].

use serde::{Deserialize, Serialize};

use crate::types::{PlanningSnapshot, Priority, RiskLevel, TaskRisk, TaskStatus, TeamMemberState};

const OVERDUE_FRACTION_WEIGHT: f64 = 30.0;
const OVERDUE_COUNT_PENALTY: f64 = 3.0;
const UNASSIGNED_URGENT_PENALTY: f64 = 7.0;
const OVERLOAD_MEMBER_CAP: f64 = 15.0;
const SPRINT_PRESSURE_CAP: f64 = 20.0;
const BLOCKED_PENALTY: f64 = 3.0;
const COMPLETION_BONUS: f64 = 15.0;
const REVIEW_STALL_PENALTY: f64 = 1.5;
const BALANCE_SWING: f64 = 5.0;
const BALANCE_LOW_SPREAD: f64 = 15.0;
const BALANCE_HIGH_SPREAD: f64 = 40.0;

/// Signed contributions that made up a confidence score
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub overdue: f64,
    pub unassigned_urgent: f64,
    pub overload: f64,
    pub burnout: f64,
    pub sprint_pressure: f64,
    pub blocked: f64,
    pub completion: f64,
    pub review_stall: f64,
    pub balance: f64,
}

impl ConfidenceBreakdown {
    pub fn total(&self) -> f64 {
        self.overdue
            + self.unassigned_urgent
            + self.overload
            + self.burnout
            + self.sprint_pressure
            + self.blocked
            + self.completion
            + self.review_stall
            + self.balance
    }
}

/// Result of analyzing one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub confidence: u8,
    pub breakdown: ConfidenceBreakdown,
    pub risks: Vec<TaskRisk>,
}

impl Analysis {
    pub fn risk_for(&self, task_id: &str) -> Option<&TaskRisk> {
        self.risks.iter().find(|r| r.task_id == task_id)
    }
}

pub fn analyze(snapshot: &PlanningSnapshot) -> Analysis {
    let breakdown = confidence_breakdown(snapshot);
    let confidence = (100.0 + breakdown.total()).clamp(0.0, 100.0).round() as u8;
    let risks = snapshot
        .open_tasks()
        .map(|task| task_risk(snapshot, task))
        .collect();

    Analysis {
        confidence,
        breakdown,
        risks,
    }
}

pub fn confidence_breakdown(snapshot: &PlanningSnapshot) -> ConfidenceBreakdown {
    let now = snapshot.cycle_at;
    let total = snapshot.tasks.len();
    let mut b = ConfidenceBreakdown::default();

    if total > 0 {
        let overdue = snapshot
            .tasks
            .iter()
            .filter(|t| t.days_overdue(now).is_some())
            .count();
        b.overdue = -(OVERDUE_FRACTION_WEIGHT * overdue as f64 / total as f64)
            - OVERDUE_COUNT_PENALTY * overdue as f64;

        let done = snapshot.tasks.iter().filter(|t| t.is_done()).count();
        b.completion = COMPLETION_BONUS * done as f64 / total as f64;
    }

    let unassigned_urgent = snapshot
        .open_tasks()
        .filter(|t| t.assignee_id.is_none() && t.priority.is_urgent())
        .count();
    b.unassigned_urgent = -UNASSIGNED_URGENT_PENALTY * unassigned_urgent as f64;

    b.overload = -snapshot.members.iter().map(overload_penalty).sum::<f64>();
    b.burnout = -snapshot.members.iter().map(burnout_penalty).sum::<f64>();
    b.sprint_pressure = -sprint_pressure_penalty(snapshot);

    let blocked = snapshot.tasks.iter().filter(|t| t.is_blocked()).count();
    b.blocked = -BLOCKED_PENALTY * blocked as f64;

    let in_review = snapshot
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InReview)
        .count();
    b.review_stall = -REVIEW_STALL_PENALTY * in_review as f64;

    b.balance = balance_adjustment(&snapshot.members);
    b
}

/// Zero at or below 100% utilization
pub fn overload_penalty(member: &TeamMemberState) -> f64 {
    let u = member.utilization();
    if u > 100.0 {
        (2.0 + (u - 100.0) / 20.0 * 3.0).min(OVERLOAD_MEMBER_CAP)
    } else {
        0.0
    }
}

/// Only the highest matching tier applies
pub fn burnout_penalty(member: &TeamMemberState) -> f64 {
    let b = member.burnout_risk;
    if b > 80.0 {
        4.0
    } else if b > 60.0 {
        2.0
    } else if b > 40.0 {
        1.0
    } else {
        0.0
    }
}

fn sprint_pressure_penalty(snapshot: &PlanningSnapshot) -> f64 {
    let demand: f64 = snapshot.open_tasks().map(|t| t.effort_hours()).sum();
    if demand <= 0.0 {
        return 0.0;
    }

    let velocity = if snapshot.members.is_empty() {
        1.0
    } else {
        snapshot
            .members
            .iter()
            .map(|m| m.velocity.max(0.0))
            .sum::<f64>()
            / snapshot.members.len() as f64
    };
    let available: f64 = snapshot
        .members
        .iter()
        .map(|m| m.available_hours.max(0.0))
        .sum();
    let supply = available * velocity;

    if supply >= demand {
        0.0
    } else {
        (SPRINT_PRESSURE_CAP * (1.0 - supply / demand)).clamp(0.0, SPRINT_PRESSURE_CAP)
    }
}

/// Population standard deviation of utilization percentages
pub fn utilization_spread(members: &[TeamMemberState]) -> Option<f64> {
    let utils: Vec<f64> = members
        .iter()
        .filter(|m| m.capacity_hours > 0.0)
        .map(|m| m.utilization())
        .collect();
    if utils.len() < 2 {
        return None;
    }
    let n = utils.len() as f64;
    let mean = utils.iter().sum::<f64>() / n;
    let variance = utils.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

fn balance_adjustment(members: &[TeamMemberState]) -> f64 {
    match utilization_spread(members) {
        None => 0.0,
        Some(sd) if sd <= BALANCE_LOW_SPREAD => BALANCE_SWING,
        Some(sd) if sd >= BALANCE_HIGH_SPREAD => -BALANCE_SWING,
        Some(sd) => {
            let t = (sd - BALANCE_LOW_SPREAD) / (BALANCE_HIGH_SPREAD - BALANCE_LOW_SPREAD);
            BALANCE_SWING - t * 2.0 * BALANCE_SWING
        }
    }
}

fn task_risk(snapshot: &PlanningSnapshot, task: &crate::types::TaskState) -> TaskRisk {
    let now = snapshot.cycle_at;
    let mut score = 0.0;
    let mut factors = Vec::new();

    if let Some(days) = task.days_overdue(now) {
        score += 25.0 + (2.0 * days as f64).min(15.0);
        factors.push(format!("overdue by {} day(s)", days));
    } else if matches!(task.days_until_due(now), Some(d) if d <= 2) {
        score += 10.0;
        factors.push("due within 2 days".to_string());
    }

    match task.assignee_id.as_deref() {
        None => {
            score += 20.0;
            factors.push("unassigned".to_string());
        }
        Some(id) => {
            // Unknown assignees contribute nothing here; the generator reports them
            if let Some(member) = snapshot.member(id) {
                let u = member.utilization();
                if u > 100.0 {
                    score += (5.0 + (u - 100.0) / 10.0).min(20.0);
                    factors.push(format!("assignee at {:.0}% utilization", u));
                }
                let burnout = match member.burnout_risk {
                    b if b > 80.0 => 15.0,
                    b if b > 60.0 => 10.0,
                    b if b > 40.0 => 5.0,
                    _ => 0.0,
                };
                if burnout > 0.0 {
                    score += burnout;
                    factors.push(format!("assignee burnout {:.0}", member.burnout_risk));
                }
            }
        }
    }

    score += match task.priority {
        Priority::Critical => 15.0,
        Priority::High => 10.0,
        Priority::Medium => 5.0,
        Priority::Low => 0.0,
    };

    if task.blocking_dependencies > 0 {
        score += (5.0 * task.blocking_dependencies as f64).min(15.0);
        factors.push(format!("blocked by {} task(s)", task.blocking_dependencies));
    }

    let score = score.clamp(0.0, 100.0);
    TaskRisk {
        task_id: task.id.clone(),
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}
