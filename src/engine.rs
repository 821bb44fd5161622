//! Recommendation engine
//!
//! One entry point per planning cycle and one per piece of feedback:
//!
//! ```rust,ignore
//! let engine = RecommendationEngine::new(Arc::new(SqliteArmStore::open(&db_path)?));
//!
//! let report = engine.run_cycle("apollo", &snapshot, CycleOptions::default())?;
//! // ... a human reviews report.recommendations ...
//! engine.record_decision(&report.recommendations[0].id, Verdict::Accept, None)?;
//! // ... weeks later ...
//! engine.record_outcome(&id, measured, Utc::now())?;
//! ```
//!
//! At most one cycle per project runs at a time; a second caller either
//! waits or is turned away, as it chooses.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use crate::analyzer;
use crate::bandit::{self, ArmStats, RankOptions};
use crate::config::EngineSettings;
use crate::error::{AdvisorError, AdvisorResult};
use crate::impact::ImpactEstimator;
use crate::outcome::{self, LearningStats};
use crate::skills::SkillMatcher;
use crate::store::{self, ArmStore};
use crate::strategies::{self, Strategy, StrategyContext};
use crate::types::{CycleReport, MeasuredDeltas, Outcome, PlanningSnapshot, Verdict};

/// What to do when a cycle for the same project is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleMode {
    #[default]
    Block,
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    pub mode: CycleMode,
    /// Thompson draw seed; random when `None`
    pub seed: Option<u64>,
}

#[derive(Default)]
struct CycleLocks {
    active: Mutex<HashSet<String>>,
    released: Condvar,
}

struct CycleGuard<'a> {
    locks: &'a CycleLocks,
    project: String,
}

impl CycleLocks {
    fn acquire(&self, project: &str, mode: CycleMode) -> AdvisorResult<CycleGuard<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| AdvisorError::Other(anyhow!("cycle lock poisoned")))?;

        while active.contains(project) {
            match mode {
                CycleMode::Reject => {
                    return Err(AdvisorError::CycleInProgress {
                        project: project.to_string(),
                    })
                }
                CycleMode::Block => {
                    tracing::debug!("Waiting for running cycle in {}", project);
                    active = self
                        .released
                        .wait(active)
                        .map_err(|_| AdvisorError::Other(anyhow!("cycle lock poisoned")))?;
                }
            }
        }

        active.insert(project.to_string());
        Ok(CycleGuard {
            locks: self,
            project: project.to_string(),
        })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.locks.active.lock() {
            active.remove(&self.project);
        }
        self.locks.released.notify_all();
    }
}

pub struct RecommendationEngine {
    store: Arc<dyn ArmStore>,
    settings: EngineSettings,
    matcher: SkillMatcher,
    strategies: Vec<Strategy>,
    locks: CycleLocks,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn ArmStore>) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    pub fn with_settings(store: Arc<dyn ArmStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings: settings.sanitized(),
            matcher: SkillMatcher::default(),
            strategies: Strategy::ALL.to_vec(),
            locks: CycleLocks::default(),
        }
    }

    /// Swap in a different skill inference
    pub fn with_matcher(mut self, matcher: SkillMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Run only the given strategies, in the given order
    pub fn with_strategies(mut self, strategies: &[Strategy]) -> Self {
        self.strategies = strategies.to_vec();
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ArmStore> {
        &self.store
    }

    /// Analyze, generate, estimate, rank. Issued recommendations are
    /// registered so later decisions can find their arm.
    pub fn run_cycle(
        &self,
        project: &str,
        snapshot: &PlanningSnapshot,
        options: CycleOptions,
    ) -> AdvisorResult<CycleReport> {
        validate(project, snapshot)?;
        let _guard = self.locks.acquire(project, options.mode)?;

        let (config, mut warnings) = snapshot.config.normalized();
        for w in &warnings {
            tracing::warn!("{}: {}", project, w);
        }

        let analysis = analyzer::analyze(snapshot);

        let ctx = StrategyContext {
            snapshot,
            config: &config,
            matcher: &self.matcher,
            analysis: &analysis,
        };
        let generated = strategies::generate_all(&ctx, &self.strategies);
        warnings.extend(generated.warnings);
        let mut candidates = generated.candidates;
        let candidates_considered = candidates.len();

        ImpactEstimator::new(snapshot, &analysis, &self.matcher).annotate(&mut candidates, &config);

        // Arms come into existence the first time their type is generated
        let kinds: BTreeSet<_> = candidates.iter().map(|c| c.kind).collect();
        let mut arms = HashMap::new();
        for kind in kinds {
            arms.insert(kind, self.store.ensure_arm(project, kind)?);
        }

        let seed = options.seed.unwrap_or_else(rand::random);
        let recommendations = bandit::rank(
            candidates,
            &arms,
            RankOptions {
                top_k: config.top_k,
                exploration_floor: self.settings.exploration_floor,
                seed,
            },
        );

        let cycle_id = uuid::Uuid::new_v4().to_string();
        let issued_at = Utc::now();
        let issued: Vec<_> = recommendations
            .iter()
            .map(|r| store::issued(&r.id, project, r.candidate.kind, &cycle_id, r.candidate.impact, issued_at))
            .collect();
        self.store.register_recommendations(&issued)?;

        tracing::info!(
            "Cycle {} for {}: confidence {}, {} candidate(s), {} recommended, {} warning(s)",
            cycle_id,
            project,
            analysis.confidence,
            candidates_considered,
            recommendations.len(),
            warnings.len()
        );

        Ok(CycleReport {
            project: project.to_string(),
            cycle_id,
            cycle_at: snapshot.cycle_at,
            seed,
            snapshot_hash: snapshot_hash(snapshot)?,
            confidence: analysis.confidence,
            risks: analysis.risks,
            recommendations,
            candidates_considered,
            warnings,
        })
    }

    pub fn record_decision(
        &self,
        recommendation_id: &str,
        verdict: Verdict,
        reason: Option<String>,
    ) -> AdvisorResult<()> {
        outcome::record_decision(
            self.store.as_ref(),
            recommendation_id,
            verdict,
            reason,
            self.settings.max_update_retries,
        )?;
        Ok(())
    }

    pub fn record_outcome(
        &self,
        recommendation_id: &str,
        measured: MeasuredDeltas,
        measured_at: DateTime<Utc>,
    ) -> AdvisorResult<Outcome> {
        outcome::record_outcome(self.store.as_ref(), recommendation_id, measured, measured_at)
    }

    pub fn arm_stats(&self, project: &str) -> AdvisorResult<Vec<ArmStats>> {
        Ok(self
            .store
            .list_arms(project)?
            .iter()
            .map(|arm| arm.stats())
            .collect())
    }

    pub fn learning_stats(&self, project: &str) -> AdvisorResult<LearningStats> {
        outcome::learning_stats(self.store.as_ref(), project)
    }

    /// Decay a project's arms by `factor`, or by the configured factor
    pub fn apply_decay(&self, project: &str, factor: Option<f64>) -> AdvisorResult<Vec<ArmStats>> {
        let factor = factor
            .or(self.settings.decay_factor)
            .ok_or_else(|| AdvisorError::Other(anyhow!("no decay factor given or configured")))?;
        let arms = outcome::apply_decay(
            self.store.as_ref(),
            project,
            factor,
            self.settings.max_update_retries,
        )?;
        Ok(arms.iter().map(|arm| arm.stats()).collect())
    }
}

/// SHA-256 of the snapshot's JSON form, hex encoded
pub fn snapshot_hash(snapshot: &PlanningSnapshot) -> AdvisorResult<String> {
    let bytes = serde_json::to_vec(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn validate(project: &str, snapshot: &PlanningSnapshot) -> AdvisorResult<()> {
    if project.trim().is_empty() {
        return Err(AdvisorError::InvalidSnapshot("project id is empty".to_string()));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = snapshot.members.iter().find(|m| !seen.insert(m.id.as_str())) {
        return Err(AdvisorError::InvalidSnapshot(format!("duplicate member id {}", dup.id)));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = snapshot.tasks.iter().find(|t| !seen.insert(t.id.as_str())) {
        return Err(AdvisorError::InvalidSnapshot(format!("duplicate task id {}", dup.id)));
    }

    Ok(())
}
