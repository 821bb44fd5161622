//! Feedback loop
//!
//! Closes the learning loop:
//! 1. A human verdict moves the arm of the recommendation's type
//!    (ACCEPT → α+1, REJECT → β+1) in one compare-and-swap with the
//!    decision record
//! 2. Measured outcomes are stored once, for attribution only; they never
//!    touch α/β
//! 3. Decay optionally pulls arms back toward the prior to follow drift

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::bandit::BanditArm;
use crate::error::{AdvisorError, AdvisorResult};
use crate::store::ArmStore;
use crate::types::{Decision, MeasuredDeltas, Outcome, RecommendationType, Verdict};

/// Apply a human verdict to the arm of the recommendation's type.
///
/// Retries the compare-and-swap up to `max_attempts` times when another
/// decision on the same arm lands in between, then gives up with
/// `UpdateConflict` and nothing written.
pub fn record_decision(
    store: &dyn ArmStore,
    recommendation_id: &str,
    verdict: Verdict,
    reason: Option<String>,
    max_attempts: u32,
) -> AdvisorResult<BanditArm> {
    let issued = store
        .lookup_recommendation(recommendation_id)?
        .ok_or_else(|| AdvisorError::UnknownRecommendation {
            id: recommendation_id.to_string(),
        })?;

    if store.decision_for(recommendation_id)?.is_some() {
        return Err(AdvisorError::DecisionAlreadyRecorded {
            id: recommendation_id.to_string(),
        });
    }

    let decision = Decision {
        recommendation_id: recommendation_id.to_string(),
        verdict,
        reason: reason.filter(|r| !r.trim().is_empty()),
        decided_at: Utc::now(),
    };

    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        // Arms are only created by generation
        let arm = store
            .load_arm(&issued.project, issued.kind)?
            .ok_or_else(|| AdvisorError::UnknownArm {
                project: issued.project.clone(),
                kind: issued.kind,
            })?;

        let next = arm.with_verdict(verdict, decision.decided_at);
        if store.compare_and_swap_decision(arm.version, &next, &decision)? {
            tracing::info!(
                "{} {} ({}): alpha={:.1} beta={:.1}",
                verdict.as_str(),
                recommendation_id,
                issued.kind,
                next.alpha,
                next.beta
            );
            return Ok(next);
        }

        tracing::debug!(
            "Arm {}/{} changed underneath decision {} (attempt {}/{})",
            issued.project,
            issued.kind,
            recommendation_id,
            attempt,
            attempts
        );
    }

    tracing::warn!(
        "Giving up on decision {} after {} conflicting attempts",
        recommendation_id,
        attempts
    );
    Err(AdvisorError::UpdateConflict {
        project: issued.project,
        kind: issued.kind,
        attempts,
    })
}

/// Store the measured effect of an accepted recommendation. Write-once.
pub fn record_outcome(
    store: &dyn ArmStore,
    recommendation_id: &str,
    measured: MeasuredDeltas,
    measured_at: DateTime<Utc>,
) -> AdvisorResult<Outcome> {
    if store.lookup_recommendation(recommendation_id)?.is_none() {
        return Err(AdvisorError::UnknownRecommendation {
            id: recommendation_id.to_string(),
        });
    }

    match store.decision_for(recommendation_id)? {
        Some(d) if d.verdict.is_accept() => {}
        _ => {
            return Err(AdvisorError::OutcomeWithoutAcceptance {
                id: recommendation_id.to_string(),
            })
        }
    }

    let outcome = Outcome {
        recommendation_id: recommendation_id.to_string(),
        measured,
        measured_at,
    };
    store.insert_outcome(&outcome)?;

    tracing::info!(
        "Outcome for {}: delivery {:+.1}, cost {:+.1}%, burnout {:+.1}, on time: {}",
        recommendation_id,
        measured.delivery_delta,
        measured.cost_delta,
        measured.burnout_delta,
        measured.on_time
    );
    Ok(outcome)
}

/// Pull every arm of `project` toward the prior by `factor` ∈ (0, 1].
/// Accept/reject counters keep their raw values.
pub fn apply_decay(
    store: &dyn ArmStore,
    project: &str,
    factor: f64,
    max_attempts: u32,
) -> AdvisorResult<Vec<BanditArm>> {
    if !(factor.is_finite() && factor > 0.0 && factor <= 1.0) {
        return Err(AdvisorError::Other(anyhow::anyhow!(
            "decay factor must be in (0, 1], got {}",
            factor
        )));
    }

    let attempts = max_attempts.max(1);
    let mut decayed = Vec::new();

    for arm in store.list_arms(project)? {
        let kind = arm.kind;
        let mut current = arm;
        let mut written = None;

        for _ in 0..attempts {
            let next = current.decayed(factor, Utc::now());
            if store.replace_arm(current.version, &next)? {
                written = Some(next);
                break;
            }
            current = store
                .load_arm(project, kind)?
                .ok_or_else(|| AdvisorError::UnknownArm {
                    project: project.to_string(),
                    kind,
                })?;
        }

        match written {
            Some(next) => decayed.push(next),
            None => {
                return Err(AdvisorError::UpdateConflict {
                    project: project.to_string(),
                    kind,
                    attempts,
                })
            }
        }
    }

    tracing::info!("Decayed {} arm(s) in {} by {}", decayed.len(), project, factor);
    Ok(decayed)
}

/// Predicted vs measured effect for one recommendation type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAttribution {
    pub kind: Option<RecommendationType>,
    pub outcomes: usize,
    pub predicted_delivery: f64,
    pub measured_delivery: f64,
    pub predicted_cost: f64,
    pub measured_cost: f64,
    pub predicted_burnout: f64,
    pub measured_burnout: f64,
    pub on_time_rate: f64,
}

/// Learning statistics summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub project: String,
    pub total_decisions: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub acceptance_rate: f64,
    /// Most frequent first
    pub rejection_reasons: Vec<(String, usize)>,
    pub attribution: Vec<TypeAttribution>,
}

pub fn learning_stats(store: &dyn ArmStore, project: &str) -> AdvisorResult<LearningStats> {
    let decisions = store.list_decisions(project)?;
    let total_decisions = decisions.len();
    let accepted = decisions.iter().filter(|(_, d)| d.verdict.is_accept()).count();
    let rejected = total_decisions - accepted;

    let mut reasons: HashMap<String, usize> = HashMap::new();
    for (_, d) in decisions.iter().filter(|(_, d)| !d.verdict.is_accept()) {
        let reason = d
            .reason
            .as_deref()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "(none given)".to_string());
        *reasons.entry(reason).or_default() += 1;
    }
    let mut rejection_reasons: Vec<_> = reasons.into_iter().collect();
    rejection_reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut by_kind: BTreeMap<RecommendationType, TypeAttribution> = BTreeMap::new();
    for (issued, outcome) in store.list_outcomes(project)? {
        let entry = by_kind.entry(issued.kind).or_default();
        entry.kind = Some(issued.kind);
        entry.outcomes += 1;
        entry.predicted_delivery += issued.predicted.delivery_delta;
        entry.measured_delivery += outcome.measured.delivery_delta;
        entry.predicted_cost += issued.predicted.cost_delta;
        entry.measured_cost += outcome.measured.cost_delta;
        entry.predicted_burnout += issued.predicted.burnout_delta;
        entry.measured_burnout += outcome.measured.burnout_delta;
        if outcome.measured.on_time {
            entry.on_time_rate += 1.0;
        }
    }

    let attribution = by_kind
        .into_values()
        .map(|mut a| {
            let n = a.outcomes as f64;
            a.predicted_delivery /= n;
            a.measured_delivery /= n;
            a.predicted_cost /= n;
            a.measured_cost /= n;
            a.predicted_burnout /= n;
            a.measured_burnout /= n;
            a.on_time_rate /= n;
            a
        })
        .collect();

    Ok(LearningStats {
        project: project.to_string(),
        total_decisions,
        accepted,
        rejected,
        acceptance_rate: if total_decisions > 0 {
            accepted as f64 / total_decisions as f64
        } else {
            0.0
        },
        rejection_reasons,
        attribution,
    })
}

/// Print learning statistics in a human-readable format
pub fn print_learning_stats(stats: &LearningStats) {
    println!("\nLEARNING STATUS: {}\n", stats.project);

    if stats.total_decisions == 0 {
        println!("No decisions recorded yet. Accept or reject a recommendation to start learning:");
        println!("   resource-advisor decide <recommendation-id> accept");
        return;
    }

    println!("DECISIONS:");
    println!("   Total: {}", stats.total_decisions);
    println!(
        "   Accepted: {} ({:.1}%)",
        stats.accepted,
        stats.acceptance_rate * 100.0
    );
    println!("   Rejected: {}", stats.rejected);
    println!();

    if !stats.rejection_reasons.is_empty() {
        println!("REJECTION REASONS:");
        for (reason, count) in &stats.rejection_reasons {
            println!("   {:>3}  {}", count, reason);
        }
        println!();
    }

    if !stats.attribution.is_empty() {
        println!("PREDICTED vs MEASURED:");
        for a in &stats.attribution {
            let kind = a.kind.map(|k| k.as_str()).unwrap_or("?");
            println!(
                "   {:<18} n={:<3} delivery {:+.1}/{:+.1}  cost {:+.1}/{:+.1}  burnout {:+.1}/{:+.1}  on-time {:.0}%",
                kind,
                a.outcomes,
                a.predicted_delivery,
                a.measured_delivery,
                a.predicted_cost,
                a.measured_cost,
                a.predicted_burnout,
                a.measured_burnout,
                a.on_time_rate * 100.0
            );
        }
        println!();
    }
}
