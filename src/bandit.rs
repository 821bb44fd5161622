//! Thompson Sampling over recommendation types
//!
//! One Beta(α, β) arm per (project, recommendation type), where α counts
//! acceptances and β rejections on top of a (2, 2) prior. Each cycle draws
//! a fresh θ̂ per candidate and blends it into the candidate's base score:
//!
//! `final = 0.8·base + 0.2·θ̂·base`
//!
//! Draws come from a seeded `Pcg64Mcg`, so the same seed, candidates and arm
//! state always produce the same order.

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};
use std::collections::HashMap;

use crate::types::{RankedRecommendation, RecommendationCandidate, RecommendationType, Verdict};

pub const PRIOR_ALPHA: f64 = 2.0;
pub const PRIOR_BETA: f64 = 2.0;

/// Share of the final score that stays fixed regardless of the draw
pub const BASE_SHARE: f64 = 0.8;
pub const SAMPLE_SHARE: f64 = 0.2;

/// Arms with fewer decisions than this are reported as cold
pub const COLD_THRESHOLD: u32 = 10;

/// Learned acceptance posterior for one recommendation type in one project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanditArm {
    pub project: String,
    pub kind: RecommendationType,
    pub alpha: f64,
    pub beta: f64,
    pub accepts: u32,
    pub rejects: u32,
    /// Bumped on every write; compare-and-swap key
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl BanditArm {
    /// Fresh arm at the prior
    pub fn new(project: &str, kind: RecommendationType, now: DateTime<Utc>) -> Self {
        Self {
            project: project.to_string(),
            kind,
            alpha: PRIOR_ALPHA,
            beta: PRIOR_BETA,
            accepts: 0,
            rejects: 0,
            version: 0,
            updated_at: now,
        }
    }

    /// Draw θ̂ ~ Beta(α, β) by inverse-CDF sampling
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        let u: f64 = rng.gen();
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.inverse_cdf(u).clamp(0.0, 1.0),
            Err(_) => self.mean(), // Fallback to mean if params invalid
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let n = self.alpha + self.beta;
        (self.alpha * self.beta) / (n.powi(2) * (n + 1.0))
    }

    /// 95% credible interval
    pub fn credible_interval_95(&self) -> (f64, f64) {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => (dist.inverse_cdf(0.025), dist.inverse_cdf(0.975)),
            Err(_) => (0.0, 1.0),
        }
    }

    pub fn decisions(&self) -> u32 {
        self.accepts + self.rejects
    }

    pub fn is_cold(&self, threshold: u32) -> bool {
        self.decisions() < threshold
    }

    /// The arm after one more human verdict
    pub fn with_verdict(&self, verdict: Verdict, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        match verdict {
            Verdict::Accept => {
                next.alpha += 1.0;
                next.accepts += 1;
            }
            Verdict::Reject => {
                next.beta += 1.0;
                next.rejects += 1;
            }
        }
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Pull (α, β) toward the prior. `factor` 1.0 keeps everything, values
    /// near 0 forget almost everything. Counters keep the raw history.
    pub fn decayed(&self, factor: f64, now: DateTime<Utc>) -> Self {
        let factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 1.0 };
        let mut next = self.clone();
        next.alpha = PRIOR_ALPHA + (self.alpha - PRIOR_ALPHA) * factor;
        next.beta = PRIOR_BETA + (self.beta - PRIOR_BETA) * factor;
        next.version += 1;
        next.updated_at = now;
        next
    }

    pub fn stats(&self) -> ArmStats {
        let (ci_lower, ci_upper) = self.credible_interval_95();
        ArmStats {
            kind: self.kind,
            alpha: self.alpha,
            beta: self.beta,
            accepts: self.accepts,
            rejects: self.rejects,
            mean: self.mean(),
            variance: self.variance(),
            ci_lower,
            ci_upper,
            is_cold: self.is_cold(COLD_THRESHOLD),
        }
    }
}

/// Statistics for a single arm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmStats {
    pub kind: RecommendationType,
    pub alpha: f64,
    pub beta: f64,
    pub accepts: u32,
    pub rejects: u32,
    pub mean: f64,
    pub variance: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub is_cold: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub top_k: usize,
    /// Probability that a candidate skips the draw and keeps its base score
    pub exploration_floor: f64,
    pub seed: u64,
}

/// Score, sort and truncate. Candidates whose type has no arm are sampled
/// from the prior.
pub fn rank(
    candidates: Vec<RecommendationCandidate>,
    arms: &HashMap<RecommendationType, BanditArm>,
    options: RankOptions,
) -> Vec<RankedRecommendation> {
    let mut rng = Pcg64Mcg::seed_from_u64(options.seed);
    let floor = options.exploration_floor.clamp(0.0, 1.0);

    let mut scored: Vec<(f64, Option<f64>, RecommendationCandidate)> = candidates
        .into_iter()
        .map(|candidate| {
            let base = candidate.base_score;
            if floor > 0.0 && rng.gen::<f64>() < floor {
                return (base, None, candidate);
            }
            let theta = match arms.get(&candidate.kind) {
                Some(arm) => arm.sample(&mut rng),
                None => BanditArm::new("", candidate.kind, Utc::now()).sample(&mut rng),
            };
            (blend(base, theta), Some(theta), candidate)
        })
        .collect();

    // Stable sort keeps insertion order among equal scores
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(options.top_k);

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (final_score, sampled_theta, candidate))| RankedRecommendation {
            id: uuid::Uuid::new_v4().to_string(),
            rank: i + 1,
            final_score,
            sampled_theta,
            candidate,
        })
        .collect()
}

pub fn blend(base: f64, theta: f64) -> f64 {
    BASE_SHARE * base + SAMPLE_SHARE * theta * base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionPayload;

    fn candidate(kind: RecommendationType, title: &str, base: f64) -> RecommendationCandidate {
        let mut c = RecommendationCandidate::new(
            kind,
            title.to_string(),
            String::new(),
            String::new(),
            ActionPayload::Delay {
                task_id: title.to_string(),
                days: 3,
            },
        );
        c.base_score = base;
        c
    }

    fn arms(entries: &[(RecommendationType, f64, f64)]) -> HashMap<RecommendationType, BanditArm> {
        entries
            .iter()
            .map(|(kind, a, b)| {
                let mut arm = BanditArm::new("p", *kind, Utc::now());
                arm.alpha = *a;
                arm.beta = *b;
                (*kind, arm)
            })
            .collect()
    }

    fn opts(top_k: usize, seed: u64) -> RankOptions {
        RankOptions {
            top_k,
            exploration_floor: 0.0,
            seed,
        }
    }

    #[test]
    fn test_arm_prior_and_updates() {
        let arm = BanditArm::new("p", RecommendationType::Delay, Utc::now());
        assert_eq!(arm.mean(), 0.5);

        let accepted = arm.with_verdict(Verdict::Accept, Utc::now());
        assert_eq!(accepted.alpha, 3.0);
        assert_eq!(accepted.beta, 2.0);
        assert_eq!(accepted.version, 1);

        let rejected = accepted.with_verdict(Verdict::Reject, Utc::now());
        assert_eq!(rejected.alpha, 3.0);
        assert_eq!(rejected.beta, 3.0);
        assert_eq!(rejected.accepts + rejected.rejects, 2);
        assert_eq!(
            f64::from(rejected.decisions()),
            (rejected.alpha - PRIOR_ALPHA) + (rejected.beta - PRIOR_BETA)
        );
    }

    #[test]
    fn test_credible_interval_narrows_with_data() {
        let fresh = BanditArm::new("p", RecommendationType::Reassign, Utc::now());
        let mut trained = fresh.clone();
        for _ in 0..40 {
            trained = trained.with_verdict(Verdict::Accept, Utc::now());
        }
        let (l1, u1) = fresh.credible_interval_95();
        let (l2, u2) = trained.credible_interval_95();
        assert!(u2 - l2 < u1 - l1);
        assert!(trained.stats().mean > 0.9);
        assert!(!trained.stats().is_cold);
        assert!(fresh.stats().is_cold);
    }

    #[test]
    fn test_decay_pulls_toward_prior() {
        let mut arm = BanditArm::new("p", RecommendationType::Rebalance, Utc::now());
        arm.alpha = 12.0;
        arm.beta = 4.0;
        let half = arm.decayed(0.5, Utc::now());
        assert_eq!(half.alpha, 7.0);
        assert_eq!(half.beta, 3.0);
        assert_eq!(half.version, arm.version + 1);

        let kept = arm.decayed(1.0, Utc::now());
        assert_eq!((kept.alpha, kept.beta), (12.0, 4.0));
    }

    #[test]
    fn test_samples_stay_in_unit_interval() {
        let arm = BanditArm::new("p", RecommendationType::AddReviewer, Utc::now());
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        for _ in 0..500 {
            let theta = arm.sample(&mut rng);
            assert!((0.0..=1.0).contains(&theta));
        }
    }

    #[test]
    fn test_rank_is_deterministic_for_seed() {
        let build = || {
            vec![
                candidate(RecommendationType::Reassign, "a", 10.0),
                candidate(RecommendationType::Delay, "b", 10.5),
                candidate(RecommendationType::AddReviewer, "c", 9.8),
                candidate(RecommendationType::Reassign, "d", 10.2),
            ]
        };
        let arms = arms(&[
            (RecommendationType::Reassign, 2.0, 2.0),
            (RecommendationType::Delay, 2.0, 9.0),
            (RecommendationType::AddReviewer, 9.0, 2.0),
        ]);

        let first: Vec<_> = rank(build(), &arms, opts(5, 42)).into_iter().map(|r| r.candidate.title).collect();
        let second: Vec<_> = rank(build(), &arms, opts(5, 42)).into_iter().map(|r| r.candidate.title).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_keep_insertion_order_and_truncate() {
        let candidates = vec![
            candidate(RecommendationType::Delay, "first", 0.0),
            candidate(RecommendationType::Delay, "second", 0.0),
            candidate(RecommendationType::Delay, "third", 0.0),
        ];
        let ranked = rank(candidates, &HashMap::new(), opts(2, 1));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].candidate.title, "first");
        assert_eq!(ranked[1].candidate.title, "second");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_final_score_blend_and_order() {
        let candidates = vec![
            candidate(RecommendationType::Delay, "low", 1.0),
            candidate(RecommendationType::Reassign, "high", 20.0),
        ];
        let ranked = rank(candidates, &HashMap::new(), opts(5, 3));
        assert_eq!(ranked[0].candidate.title, "high");
        let theta = ranked[0].sampled_theta.unwrap();
        assert!((ranked[0].final_score - blend(20.0, theta)).abs() < 1e-12);
        // θ̂ ∈ [0, 1] keeps a positive base within [0.8·base, base]
        assert!(ranked[0].final_score >= 16.0 && ranked[0].final_score <= 20.0);
    }

    #[test]
    fn test_exploration_floor_skips_draw() {
        let candidates = vec![candidate(RecommendationType::Delay, "x", 8.0)];
        let ranked = rank(
            candidates,
            &HashMap::new(),
            RankOptions {
                top_k: 5,
                exploration_floor: 1.0,
                seed: 9,
            },
        );
        assert_eq!(ranked[0].sampled_theta, None);
        assert_eq!(ranked[0].final_score, 8.0);
    }
}
