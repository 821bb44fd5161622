//! Skill inference from free-text task titles
//!
//! The taxonomy is a versioned table of (substring, skill) pairs. Anything
//! that wants to infer skills differently implements `SkillInference`;
//! strategies only ever see the trait through `SkillMatcher`.

use std::collections::BTreeSet;

use crate::types::{TaskState, TeamMemberState};

pub const TAXONOMY_VERSION: u32 = 1;

/// Fit returned when a task has no inferable requirement
pub const NEUTRAL_FIT: f64 = 1.0;

/// Lowercase substring -> canonical skill tag
pub const SKILL_TAXONOMY: &[(&str, &str)] = &[
    // devops
    ("docker", "devops"),
    ("kubernetes", "devops"),
    ("k8s", "devops"),
    ("ci-cd", "devops"),
    ("ci/cd", "devops"),
    ("pipeline", "devops"),
    ("deploy", "devops"),
    ("terraform", "devops"),
    ("infrastructure", "devops"),
    ("helm", "devops"),
    // frontend
    ("frontend", "frontend"),
    ("front-end", "frontend"),
    ("react", "frontend"),
    ("vue", "frontend"),
    ("angular", "frontend"),
    ("css", "frontend"),
    ("html", "frontend"),
    ("user interface", "frontend"),
    ("ui component", "frontend"),
    ("landing page", "frontend"),
    // backend
    ("backend", "backend"),
    ("back-end", "backend"),
    ("api", "backend"),
    ("endpoint", "backend"),
    ("microservice", "backend"),
    ("graphql", "backend"),
    ("webhook", "backend"),
    // database
    ("database", "database"),
    ("sql", "database"),
    ("postgres", "database"),
    ("mysql", "database"),
    ("migration", "database"),
    ("schema", "database"),
    ("index", "database"),
    // testing
    ("test", "testing"),
    ("qa", "testing"),
    ("e2e", "testing"),
    ("regression", "testing"),
    ("coverage", "testing"),
    // security
    ("security", "security"),
    ("auth", "security"),
    ("oauth", "security"),
    ("encryption", "security"),
    ("vulnerability", "security"),
    ("permission", "security"),
    // mobile
    ("ios", "mobile"),
    ("android", "mobile"),
    ("mobile", "mobile"),
    ("react native", "mobile"),
    // design
    ("design", "design"),
    ("figma", "design"),
    ("mockup", "design"),
    ("wireframe", "design"),
    ("ux", "design"),
    // data
    ("machine learning", "data"),
    ("analytics", "data"),
    ("dashboard", "data"),
    ("etl", "data"),
    ("report", "data"),
    // docs
    ("documentation", "documentation"),
    ("docs", "documentation"),
    ("readme", "documentation"),
];

/// Maps a task to the skills it needs
pub trait SkillInference: Send + Sync {
    fn required_skills(&self, task: &TaskState) -> BTreeSet<String>;
}

/// Substring lookup over a static table
#[derive(Debug, Clone)]
pub struct KeywordTaxonomy {
    entries: &'static [(&'static str, &'static str)],
}

impl KeywordTaxonomy {
    pub fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }
}

impl Default for KeywordTaxonomy {
    fn default() -> Self {
        Self::new(SKILL_TAXONOMY)
    }
}

impl SkillInference for KeywordTaxonomy {
    fn required_skills(&self, task: &TaskState) -> BTreeSet<String> {
        let title = task.title.to_lowercase();
        self.entries
            .iter()
            .filter(|(keyword, _)| title.contains(keyword))
            .map(|(_, skill)| skill.to_string())
            .collect()
    }
}

pub struct SkillMatcher {
    inference: Box<dyn SkillInference>,
}

impl Default for SkillMatcher {
    fn default() -> Self {
        Self::new(Box::new(KeywordTaxonomy::default()))
    }
}

impl SkillMatcher {
    pub fn new(inference: Box<dyn SkillInference>) -> Self {
        Self { inference }
    }

    pub fn required_skills(&self, task: &TaskState) -> BTreeSet<String> {
        self.inference.required_skills(task)
    }

    /// Share of required skills the member has, or `NEUTRAL_FIT` when the
    /// task needs nothing in particular
    pub fn fit(&self, task: &TaskState, member: &TeamMemberState) -> f64 {
        let required = self.required_skills(task);
        if required.is_empty() {
            return NEUTRAL_FIT;
        }
        let matched = required.iter().filter(|s| member.has_skill(s)).count();
        matched as f64 / required.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, TaskStatus};

    fn task(title: &str) -> TaskState {
        TaskState {
            id: "t".to_string(),
            title: title.to_string(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            assignee_id: None,
            due_date: None,
            blocking_dependencies: 0,
            estimated_hours: None,
        }
    }

    fn member(skills: &[&str]) -> TeamMemberState {
        TeamMemberState {
            id: "m".to_string(),
            name: None,
            capacity_hours: 40.0,
            allocated_hours: 0.0,
            available_hours: 40.0,
            hourly_rate: 50.0,
            velocity: 1.0,
            burnout_risk: 0.0,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            avg_weekly_hours: 40.0,
            consecutive_overtime_weeks: 0,
        }
    }

    #[test]
    fn test_required_skills_union() {
        let matcher = SkillMatcher::default();
        let skills = matcher.required_skills(&task("Set up Docker CI-CD for the Postgres migration"));
        let expected: BTreeSet<String> = ["devops", "database"].iter().map(|s| s.to_string()).collect();
        assert_eq!(skills, expected);
    }

    #[test]
    fn test_unclassified_task_is_neutral() {
        let matcher = SkillMatcher::default();
        let t = task("Quarterly planning sync");
        assert!(matcher.required_skills(&t).is_empty());
        assert_eq!(matcher.fit(&t, &member(&[])), NEUTRAL_FIT);
    }

    #[test]
    fn test_partial_fit() {
        let matcher = SkillMatcher::default();
        let t = task("React dashboard for auth logs");
        // frontend, data, security
        assert!((matcher.fit(&t, &member(&["Frontend"])) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(matcher.fit(&t, &member(&["frontend", "data", "security"])), 1.0);
        assert_eq!(matcher.fit(&t, &member(&[])), 0.0);
    }

    struct FixedInference;

    impl SkillInference for FixedInference {
        fn required_skills(&self, _task: &TaskState) -> BTreeSet<String> {
            ["rust".to_string()].into_iter().collect()
        }
    }

    #[test]
    fn test_swappable_inference() {
        let matcher = SkillMatcher::new(Box::new(FixedInference));
        assert_eq!(matcher.fit(&task("anything"), &member(&["rust"])), 1.0);
        assert_eq!(matcher.fit(&task("anything"), &member(&["go"])), 0.0);
    }
}
