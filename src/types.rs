//! Core types for the resource advisor
//!
//! Everything here is plain data:
//! - The planning snapshot handed in by the persistence layer
//! - Candidates and ranked recommendations handed back out
//! - Decisions and outcomes fed into the learning loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::ResourceConfig;

/// Effort assumed for a task that carries no estimate
pub const DEFAULT_ESTIMATED_HOURS: f64 = 8.0;

/// A team member as seen at the start of a planning cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberState {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub capacity_hours: f64,
    pub allocated_hours: f64,
    pub available_hours: f64,
    #[serde(default)]
    pub hourly_rate: f64,
    /// 1.0 = baseline throughput
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// 0-100
    #[serde(default)]
    pub burnout_risk: f64,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub avg_weekly_hours: f64,
    #[serde(default)]
    pub consecutive_overtime_weeks: u32,
}

fn default_velocity() -> f64 {
    1.0
}

impl TeamMemberState {
    /// Utilization as a percentage of capacity (0 when capacity is unknown)
    pub fn utilization(&self) -> f64 {
        if self.capacity_hours > 0.0 && self.allocated_hours.is_finite() {
            (self.allocated_hours / self.capacity_hours * 100.0).max(0.0)
        } else {
            0.0
        }
    }

    /// Fraction of capacity still free, in [0, 1]
    pub fn spare_ratio(&self) -> f64 {
        if self.capacity_hours > 0.0 {
            (self.available_hours / self.capacity_hours).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    Done,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

/// A task as seen at the start of a planning cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Incomplete prerequisite tasks
    #[serde(default)]
    pub blocking_dependencies: u32,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_blocked(&self) -> bool {
        self.blocking_dependencies > 0 && !self.is_done()
    }

    pub fn effort_hours(&self) -> f64 {
        match self.estimated_hours {
            Some(h) if h.is_finite() && h >= 0.0 => h,
            _ => DEFAULT_ESTIMATED_HOURS,
        }
    }

    /// Whole days past the due date at `now`; `None` when not overdue.
    /// Completed tasks are never overdue.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_done() {
            return None;
        }
        let due = self.due_date?;
        let days = (now.date_naive() - due.date_naive()).num_days();
        (days > 0).then_some(days)
    }

    /// Whole days until the due date (negative when overdue)
    pub fn days_until_due(&self, now: DateTime<Utc>) -> Option<i64> {
        self.due_date
            .map(|due| (due.date_naive() - now.date_naive()).num_days())
    }
}

/// Immutable input for one planning cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningSnapshot {
    pub members: Vec<TeamMemberState>,
    pub tasks: Vec<TaskState>,
    #[serde(default)]
    pub config: ResourceConfig,
    pub cycle_at: DateTime<Utc>,
}

impl PlanningSnapshot {
    pub fn member(&self, id: &str) -> Option<&TeamMemberState> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&TaskState> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn open_tasks(&self) -> impl Iterator<Item = &TaskState> {
        self.tasks.iter().filter(|t| !t.is_done())
    }
}

/// The five kinds of recommendation. One bandit arm exists per kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationType {
    Reassign,
    Delay,
    Rebalance,
    AddReviewer,
    AssignUnassigned,
}

impl RecommendationType {
    pub const ALL: [RecommendationType; 5] = [
        RecommendationType::Reassign,
        RecommendationType::Delay,
        RecommendationType::Rebalance,
        RecommendationType::AddReviewer,
        RecommendationType::AssignUnassigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Reassign => "REASSIGN",
            RecommendationType::Delay => "DELAY",
            RecommendationType::Rebalance => "REBALANCE",
            RecommendationType::AddReviewer => "ADD_REVIEWER",
            RecommendationType::AssignUnassigned => "ASSIGN_UNASSIGNED",
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown recommendation type: {}", s))
    }
}

/// What a recommendation asks someone to do
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionPayload {
    Reassign {
        task_id: String,
        from_member_id: String,
        to_member_id: String,
    },
    Delay {
        task_id: String,
        days: i64,
    },
    Rebalance {
        overloaded_member_id: String,
        underloaded_member_id: String,
        spread: f64,
    },
    AddReviewer {
        task_id: String,
        reviewer_id: String,
    },
    AssignUnassigned {
        task_id: String,
        to_member_id: String,
    },
}

impl ActionPayload {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ActionPayload::Reassign { task_id, .. }
            | ActionPayload::Delay { task_id, .. }
            | ActionPayload::AddReviewer { task_id, .. }
            | ActionPayload::AssignUnassigned { task_id, .. } => Some(task_id),
            ActionPayload::Rebalance { .. } => None,
        }
    }
}

/// Projected effect of acting on a candidate.
/// Positive delivery is good, positive cost and burnout are bad.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEstimate {
    pub delivery_delta: f64,
    /// Percentage
    pub cost_delta: f64,
    pub burnout_delta: f64,
    pub on_time_bonus: f64,
}

/// An unranked proposal emitted by a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationCandidate {
    pub kind: RecommendationType,
    pub title: String,
    pub description: String,
    pub reason: String,
    pub action: ActionPayload,
    /// Strategy-internal match quality (fit/capacity score); informational
    #[serde(default)]
    pub match_score: f64,
    /// Skill fit between the task and the proposed member, when relevant
    #[serde(default)]
    pub skill_fit: Option<f64>,
    /// Scalarized impact, filled in by the impact estimator
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub impact: ImpactEstimate,
}

impl RecommendationCandidate {
    pub fn new(
        kind: RecommendationType,
        title: String,
        description: String,
        reason: String,
        action: ActionPayload,
    ) -> Self {
        Self {
            kind,
            title,
            description,
            reason,
            action,
            match_score: 0.0,
            skill_fit: None,
            base_score: 0.0,
            impact: ImpactEstimate::default(),
        }
    }

    pub fn with_match(mut self, score: f64, fit: Option<f64>) -> Self {
        self.match_score = score;
        self.skill_fit = fit;
        self
    }
}

/// A candidate that survived ranking and truncation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRecommendation {
    pub id: String,
    pub rank: usize,
    pub final_score: f64,
    /// The Thompson draw used; `None` when the exploration floor skipped it
    pub sampled_theta: Option<f64>,
    pub candidate: RecommendationCandidate,
}

/// Flat, primitive-only view of a recommendation for storage and display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub id: String,
    pub project: String,
    pub rank: usize,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub reason: String,
    pub action_json: String,
    pub base_score: f64,
    pub final_score: f64,
    pub delivery_delta: f64,
    pub cost_delta: f64,
    pub burnout_delta: f64,
}

impl RankedRecommendation {
    pub fn to_record(&self, project: &str) -> RecommendationRecord {
        RecommendationRecord {
            id: self.id.clone(),
            project: project.to_string(),
            rank: self.rank,
            kind: self.candidate.kind.as_str().to_string(),
            title: self.candidate.title.clone(),
            description: self.candidate.description.clone(),
            reason: self.candidate.reason.clone(),
            action_json: serde_json::to_string(&self.candidate.action).unwrap_or_default(),
            base_score: self.candidate.base_score,
            final_score: self.final_score,
            delivery_delta: self.candidate.impact.delivery_delta,
            cost_delta: self.candidate.impact.cost_delta,
            burnout_delta: self.candidate.impact.burnout_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 60.0 {
            RiskLevel::Critical
        } else if score >= 40.0 {
            RiskLevel::High
        } else if score >= 20.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRisk {
    pub task_id: String,
    pub score: f64,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accept,
    Reject,
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "ACCEPT",
            Verdict::Reject => "REJECT",
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" | "accepted" | "yes" => Ok(Verdict::Accept),
            "reject" | "rejected" | "no" => Ok(Verdict::Reject),
            other => Err(format!("unknown verdict: {}", other)),
        }
    }
}

/// A human verdict on a recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub recommendation_id: String,
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Real-world effect measured some time after acceptance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasuredDeltas {
    pub delivery_delta: f64,
    pub cost_delta: f64,
    pub burnout_delta: f64,
    pub on_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub recommendation_id: String,
    pub measured: MeasuredDeltas,
    pub measured_at: DateTime<Utc>,
}

/// What the engine remembers about a recommendation it handed out,
/// enough to route a later decision to the right arm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedRecommendation {
    pub id: String,
    pub project: String,
    pub kind: RecommendationType,
    pub cycle_id: String,
    pub predicted: ImpactEstimate,
    pub issued_at: DateTime<Utc>,
}

/// Non-fatal problems noticed during a cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum CycleWarning {
    WeightsNormalized { original_sum: f64 },
    WeightsReset { reason: String },
    TopKReset { requested: usize, used: usize },
    UnknownAssignee { task_id: String, assignee_id: String },
    StrategyFailed { strategy: String, error: String },
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleWarning::WeightsNormalized { original_sum } => {
                write!(f, "impact weights summed to {:.3}; normalized to 1.0", original_sum)
            }
            CycleWarning::WeightsReset { reason } => {
                write!(f, "impact weights invalid ({}); defaults used", reason)
            }
            CycleWarning::TopKReset { requested, used } => {
                write!(f, "topK {} is not usable; {} used", requested, used)
            }
            CycleWarning::UnknownAssignee { task_id, assignee_id } => {
                write!(f, "task {} references unknown member {}", task_id, assignee_id)
            }
            CycleWarning::StrategyFailed { strategy, error } => {
                write!(f, "strategy {} produced no candidates: {}", strategy, error)
            }
        }
    }
}

/// Everything a planning cycle hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub project: String,
    pub cycle_id: String,
    pub cycle_at: DateTime<Utc>,
    pub seed: u64,
    pub snapshot_hash: String,
    pub confidence: u8,
    pub risks: Vec<TaskRisk>,
    pub recommendations: Vec<RankedRecommendation>,
    pub candidates_considered: usize,
    pub warnings: Vec<CycleWarning>,
}
