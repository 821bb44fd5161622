//! Team-wide workload rebalance, proposed at most once per cycle

use anyhow::Result;

use super::{StrategyContext, StrategyOutput};
use crate::types::{ActionPayload, RecommendationCandidate, RecommendationType, TeamMemberState};

/// Utilization spread (percentage points) that must be strictly exceeded
pub const REBALANCE_SPREAD_THRESHOLD: f64 = 40.0;

/// Most- and least-utilized members with a known capacity.
/// Ties go to whoever appears first.
pub fn extremes(members: &[TeamMemberState]) -> Option<(&TeamMemberState, &TeamMemberState)> {
    let mut rated = members.iter().filter(|m| m.capacity_hours > 0.0);
    let first = rated.next()?;
    let (mut most, mut least) = (first, first);
    let mut count = 1;

    for m in rated {
        count += 1;
        if m.utilization() > most.utilization() {
            most = m;
        }
        if m.utilization() < least.utilization() {
            least = m;
        }
    }

    (count >= 2).then_some((most, least))
}

pub fn generate(ctx: &StrategyContext) -> Result<StrategyOutput> {
    let mut out = StrategyOutput::default();

    let Some((most, least)) = extremes(&ctx.snapshot.members) else {
        return Ok(out);
    };
    let spread = most.utilization() - least.utilization();
    if spread <= REBALANCE_SPREAD_THRESHOLD {
        return Ok(out);
    }

    let mut reason = format!(
        "utilization spread of {:.0} points exceeds {:.0}",
        spread, REBALANCE_SPREAD_THRESHOLD
    );
    if least.utilization() < ctx.config.idle_threshold_percent {
        reason.push_str(&format!("; {} is below the idle threshold", least.display_name()));
    }

    out.push(RecommendationCandidate::new(
        RecommendationType::Rebalance,
        "Rebalance team workload".to_string(),
        format!(
            "Shift work from {} ({:.0}% utilized) toward {} ({:.0}% utilized).",
            most.display_name(),
            most.utilization(),
            least.display_name(),
            least.utilization()
        ),
        reason,
        ActionPayload::Rebalance {
            overloaded_member_id: most.id.clone(),
            underloaded_member_id: least.id.clone(),
            spread,
        },
    ));

    Ok(out)
}
