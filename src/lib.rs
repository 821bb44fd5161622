//! resource-advisor - Resource-Allocation Recommendations That Learn
//!
//! Looks at a team's current state (tasks, assignees, capacity, burnout
//! signals), scores delivery risk, proposes concrete actions and ranks them
//! with a Thompson-sampling bandit that learns from accept/reject feedback.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use resource_advisor::{CycleOptions, RecommendationEngine, SqliteArmStore, Verdict};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteArmStore::open(&db_path)?);
//! let engine = RecommendationEngine::new(store);
//!
//! // One planning cycle
//! let report = engine.run_cycle("apollo", &snapshot, CycleOptions::default())?;
//!
//! // Feed back the human verdict (THE LEARNING SIGNAL)
//! engine.record_decision(&report.recommendations[0].id, Verdict::Accept, None)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! PlanningSnapshot
//!       │
//!       ▼
//! analyzer ──► confidence, per-task risk
//!       │
//!       ▼
//! strategies (reassign, delay, rebalance, reviewer, unassigned)
//!       │        └── skills (keyword taxonomy → fit)
//!       ▼
//! impact ──► delivery / cost / burnout deltas, base score
//!       │
//!       ▼
//! bandit ──► θ̂ ~ Beta(α, β) per type, sort, top-K
//!       │
//!       ▼
//! human verdict ──► outcome::record_decision ──► store (α/β, CAS)
//! ```

pub mod analyzer;
pub mod bandit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod impact;
pub mod outcome;
pub mod skills;
pub mod store;
pub mod strategies;
pub mod types;

// Core types
pub use types::*;
pub use config::{EngineSettings, ResourceConfig};
pub use error::{AdvisorError, AdvisorResult};

// Engine
pub use engine::{CycleMode, CycleOptions, RecommendationEngine};

// Learning state
pub use bandit::{ArmStats, BanditArm};
pub use store::{ArmStore, MemoryArmStore, SqliteArmStore};
pub use db::init_db;

// Feedback loop
pub use outcome::{learning_stats, record_decision, record_outcome, LearningStats, TypeAttribution};

// Building blocks
pub use analyzer::{analyze, Analysis};
pub use skills::{SkillInference, SkillMatcher};
pub use strategies::Strategy;
