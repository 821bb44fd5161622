//! Keyed store for bandit arms and the recommendation ledger
//!
//! The engine never holds arm state itself; every read and write goes
//! through an [`ArmStore`]. Arm writes are compare-and-swap on the arm's
//! `version`, and a decision is only stored together with the arm update
//! it caused.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::bandit::BanditArm;
use crate::db;
use crate::error::{AdvisorError, AdvisorResult};
use crate::types::{
    CycleReport, Decision, ImpactEstimate, IssuedRecommendation, MeasuredDeltas, Outcome,
    RecommendationType, Verdict,
};

pub trait ArmStore: Send + Sync {
    /// Current arm, created at the prior if this type was never seen
    fn ensure_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<BanditArm>;

    fn load_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<Option<BanditArm>>;

    /// Write `next` and `decision` together iff the stored arm is still at
    /// `expected_version`. `Ok(false)` means someone else got there first.
    /// Fails with `DecisionAlreadyRecorded` if the recommendation already
    /// has a verdict.
    fn compare_and_swap_decision(
        &self,
        expected_version: u64,
        next: &BanditArm,
        decision: &Decision,
    ) -> AdvisorResult<bool>;

    /// Same as above without a decision
    fn replace_arm(&self, expected_version: u64, next: &BanditArm) -> AdvisorResult<bool>;

    /// Arms of a project, ordered by type
    fn list_arms(&self, project: &str) -> AdvisorResult<Vec<BanditArm>>;

    fn register_recommendations(&self, issued: &[IssuedRecommendation]) -> AdvisorResult<()>;

    fn lookup_recommendation(&self, id: &str) -> AdvisorResult<Option<IssuedRecommendation>>;

    fn decision_for(&self, id: &str) -> AdvisorResult<Option<Decision>>;

    /// Write-once; a second outcome fails with `OutcomeAlreadyRecorded`
    fn insert_outcome(&self, outcome: &Outcome) -> AdvisorResult<()>;

    fn list_outcomes(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Outcome)>>;

    fn list_decisions(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Decision)>>;
}

fn poisoned() -> AdvisorError {
    AdvisorError::Other(anyhow!("store lock poisoned"))
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Default)]
struct MemoryState {
    arms: HashMap<(String, RecommendationType), BanditArm>,
    recommendations: HashMap<String, IssuedRecommendation>,
    decisions: HashMap<String, Decision>,
    outcomes: HashMap<String, Outcome>,
}

/// Everything behind one mutex, so each call is atomic
#[derive(Default)]
pub struct MemoryArmStore {
    state: Mutex<MemoryState>,
}

impl MemoryArmStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AdvisorResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| poisoned())
    }
}

impl ArmStore for MemoryArmStore {
    fn ensure_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<BanditArm> {
        let mut state = self.lock()?;
        let arm = state
            .arms
            .entry((project.to_string(), kind))
            .or_insert_with(|| BanditArm::new(project, kind, Utc::now()));
        Ok(arm.clone())
    }

    fn load_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<Option<BanditArm>> {
        let state = self.lock()?;
        Ok(state.arms.get(&(project.to_string(), kind)).cloned())
    }

    fn compare_and_swap_decision(
        &self,
        expected_version: u64,
        next: &BanditArm,
        decision: &Decision,
    ) -> AdvisorResult<bool> {
        let mut state = self.lock()?;
        if state.decisions.contains_key(&decision.recommendation_id) {
            return Err(AdvisorError::DecisionAlreadyRecorded {
                id: decision.recommendation_id.clone(),
            });
        }

        let key = (next.project.clone(), next.kind);
        match state.arms.get(&key) {
            Some(current) if current.version == expected_version => {}
            Some(_) => return Ok(false),
            None => {
                return Err(AdvisorError::UnknownArm {
                    project: next.project.clone(),
                    kind: next.kind,
                })
            }
        }

        state.arms.insert(key, next.clone());
        state
            .decisions
            .insert(decision.recommendation_id.clone(), decision.clone());
        Ok(true)
    }

    fn replace_arm(&self, expected_version: u64, next: &BanditArm) -> AdvisorResult<bool> {
        let mut state = self.lock()?;
        let key = (next.project.clone(), next.kind);
        match state.arms.get(&key) {
            Some(current) if current.version == expected_version => {
                state.arms.insert(key, next.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AdvisorError::UnknownArm {
                project: next.project.clone(),
                kind: next.kind,
            }),
        }
    }

    fn list_arms(&self, project: &str) -> AdvisorResult<Vec<BanditArm>> {
        let state = self.lock()?;
        let mut arms: Vec<_> = state
            .arms
            .values()
            .filter(|a| a.project == project)
            .cloned()
            .collect();
        arms.sort_by_key(|a| a.kind);
        Ok(arms)
    }

    fn register_recommendations(&self, issued: &[IssuedRecommendation]) -> AdvisorResult<()> {
        let mut state = self.lock()?;
        for rec in issued {
            state.recommendations.insert(rec.id.clone(), rec.clone());
        }
        Ok(())
    }

    fn lookup_recommendation(&self, id: &str) -> AdvisorResult<Option<IssuedRecommendation>> {
        Ok(self.lock()?.recommendations.get(id).cloned())
    }

    fn decision_for(&self, id: &str) -> AdvisorResult<Option<Decision>> {
        Ok(self.lock()?.decisions.get(id).cloned())
    }

    fn insert_outcome(&self, outcome: &Outcome) -> AdvisorResult<()> {
        let mut state = self.lock()?;
        if state.outcomes.contains_key(&outcome.recommendation_id) {
            return Err(AdvisorError::OutcomeAlreadyRecorded {
                id: outcome.recommendation_id.clone(),
            });
        }
        state
            .outcomes
            .insert(outcome.recommendation_id.clone(), outcome.clone());
        Ok(())
    }

    fn list_outcomes(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Outcome)>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .outcomes
            .values()
            .filter_map(|o| {
                let rec = state.recommendations.get(&o.recommendation_id)?;
                (rec.project == project).then(|| (rec.clone(), o.clone()))
            })
            .collect();
        rows.sort_by(|a, b| a.1.measured_at.cmp(&b.1.measured_at));
        Ok(rows)
    }

    fn list_decisions(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Decision)>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .decisions
            .values()
            .filter_map(|d| {
                let rec = state.recommendations.get(&d.recommendation_id)?;
                (rec.project == project).then(|| (rec.clone(), d.clone()))
            })
            .collect();
        rows.sort_by(|a, b| a.1.decided_at.cmp(&b.1.decided_at));
        Ok(rows)
    }
}

// ============================================================================
// SQLITE
// ============================================================================

pub struct SqliteArmStore {
    conn: Mutex<Connection>,
}

const ARM_COLUMNS: &str = "project, kind, alpha, beta, accepts, rejects, version, updated_at";
const RECOMMENDATION_COLUMNS: &str = "r.id, r.project, r.kind, r.cycle_id, r.predicted_json, r.issued_at";

impl SqliteArmStore {
    pub fn open(path: &Path) -> AdvisorResult<Self> {
        Ok(Self::from_connection(db::init_db(path)?))
    }

    pub fn in_memory() -> AdvisorResult<Self> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    /// Wrap a connection that already has the schema
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Keep a finished cycle for later audit
    pub fn save_cycle(&self, report: &CycleReport) -> AdvisorResult<()> {
        let conn = self.lock()?;
        db::insert_cycle(&conn, report)?;
        Ok(())
    }

    pub fn recent_cycles(&self, project: &str, limit: usize) -> AdvisorResult<Vec<CycleReport>> {
        let conn = self.lock()?;
        Ok(db::recent_cycles(&conn, project, limit)?)
    }

    fn lock(&self) -> AdvisorResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }
}

fn parse_kind(idx: usize, raw: &str) -> rusqlite::Result<RecommendationType> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_verdict(idx: usize, raw: &str) -> rusqlite::Result<Verdict> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn arm_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BanditArm> {
    let kind: String = row.get(1)?;
    let version: i64 = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(BanditArm {
        project: row.get(0)?,
        kind: parse_kind(1, &kind)?,
        alpha: row.get(2)?,
        beta: row.get(3)?,
        accepts: row.get(4)?,
        rejects: row.get(5)?,
        version: version.max(0) as u64,
        updated_at: db::parse_timestamp(7, &updated_at)?,
    })
}

/// Reads columns 0..6 in `RECOMMENDATION_COLUMNS` order
fn recommendation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IssuedRecommendation> {
    let kind: String = row.get(2)?;
    let predicted_json: String = row.get(4)?;
    let issued_at: String = row.get(5)?;
    let predicted: ImpactEstimate = serde_json::from_str(&predicted_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(IssuedRecommendation {
        id: row.get(0)?,
        project: row.get(1)?,
        kind: parse_kind(2, &kind)?,
        cycle_id: row.get(3)?,
        predicted,
        issued_at: db::parse_timestamp(5, &issued_at)?,
    })
}

/// Reads columns starting at `offset`: recommendation_id, verdict, reason, decided_at
fn decision_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Decision> {
    let verdict: String = row.get(offset + 1)?;
    let decided_at: String = row.get(offset + 3)?;
    Ok(Decision {
        recommendation_id: row.get(offset)?,
        verdict: parse_verdict(offset + 1, &verdict)?,
        reason: row.get(offset + 2)?,
        decided_at: db::parse_timestamp(offset + 3, &decided_at)?,
    })
}

fn write_arm(conn: &Connection, expected_version: u64, next: &BanditArm) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE bandit_arms
         SET alpha = ?3, beta = ?4, accepts = ?5, rejects = ?6, version = ?7, updated_at = ?8
         WHERE project = ?1 AND kind = ?2 AND version = ?9",
        params![
            next.project,
            next.kind.as_str(),
            next.alpha,
            next.beta,
            next.accepts,
            next.rejects,
            next.version as i64,
            next.updated_at.to_rfc3339(),
            expected_version as i64,
        ],
    )
}

fn arm_exists(conn: &Connection, project: &str, kind: RecommendationType) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM bandit_arms WHERE project = ?1 AND kind = ?2",
        params![project, kind.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

impl ArmStore for SqliteArmStore {
    fn ensure_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<BanditArm> {
        let conn = self.lock()?;
        let fresh = BanditArm::new(project, kind, Utc::now());
        conn.execute(
            "INSERT INTO bandit_arms (project, kind, alpha, beta, accepts, rejects, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5)
             ON CONFLICT(project, kind) DO NOTHING",
            params![project, kind.as_str(), fresh.alpha, fresh.beta, fresh.updated_at.to_rfc3339()],
        )?;

        let arm = conn.query_row(
            &format!("SELECT {} FROM bandit_arms WHERE project = ?1 AND kind = ?2", ARM_COLUMNS),
            params![project, kind.as_str()],
            arm_from_row,
        )?;
        Ok(arm)
    }

    fn load_arm(&self, project: &str, kind: RecommendationType) -> AdvisorResult<Option<BanditArm>> {
        let conn = self.lock()?;
        let arm = conn
            .query_row(
                &format!("SELECT {} FROM bandit_arms WHERE project = ?1 AND kind = ?2", ARM_COLUMNS),
                params![project, kind.as_str()],
                arm_from_row,
            )
            .optional()?;
        Ok(arm)
    }

    fn compare_and_swap_decision(
        &self,
        expected_version: u64,
        next: &BanditArm,
        decision: &Decision,
    ) -> AdvisorResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let already: Option<()> = tx
            .query_row(
                "SELECT 1 FROM decisions WHERE recommendation_id = ?1",
                params![decision.recommendation_id],
                |_| Ok(()),
            )
            .optional()?;
        if already.is_some() {
            return Err(AdvisorError::DecisionAlreadyRecorded {
                id: decision.recommendation_id.clone(),
            });
        }

        if write_arm(&tx, expected_version, next)? == 0 {
            if !arm_exists(&tx, &next.project, next.kind)? {
                return Err(AdvisorError::UnknownArm {
                    project: next.project.clone(),
                    kind: next.kind,
                });
            }
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO decisions (recommendation_id, verdict, reason, decided_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                decision.recommendation_id,
                decision.verdict.as_str(),
                decision.reason,
                decision.decided_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn replace_arm(&self, expected_version: u64, next: &BanditArm) -> AdvisorResult<bool> {
        let conn = self.lock()?;
        if write_arm(&conn, expected_version, next)? == 1 {
            return Ok(true);
        }
        if !arm_exists(&conn, &next.project, next.kind)? {
            return Err(AdvisorError::UnknownArm {
                project: next.project.clone(),
                kind: next.kind,
            });
        }
        Ok(false)
    }

    fn list_arms(&self, project: &str) -> AdvisorResult<Vec<BanditArm>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bandit_arms WHERE project = ?1",
            ARM_COLUMNS
        ))?;
        let mut arms = stmt
            .query_map(params![project], arm_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        arms.sort_by_key(|a| a.kind);
        Ok(arms)
    }

    fn register_recommendations(&self, issued: &[IssuedRecommendation]) -> AdvisorResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recommendations (id, project, kind, cycle_id, predicted_json, issued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for rec in issued {
                stmt.execute(params![
                    rec.id,
                    rec.project,
                    rec.kind.as_str(),
                    rec.cycle_id,
                    serde_json::to_string(&rec.predicted)?,
                    rec.issued_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn lookup_recommendation(&self, id: &str) -> AdvisorResult<Option<IssuedRecommendation>> {
        let conn = self.lock()?;
        let rec = conn
            .query_row(
                &format!("SELECT {} FROM recommendations r WHERE r.id = ?1", RECOMMENDATION_COLUMNS),
                params![id],
                recommendation_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    fn decision_for(&self, id: &str) -> AdvisorResult<Option<Decision>> {
        let conn = self.lock()?;
        let decision = conn
            .query_row(
                "SELECT recommendation_id, verdict, reason, decided_at FROM decisions WHERE recommendation_id = ?1",
                params![id],
                |row| decision_from_row(row, 0),
            )
            .optional()?;
        Ok(decision)
    }

    fn insert_outcome(&self, outcome: &Outcome) -> AdvisorResult<()> {
        let conn = self.lock()?;
        let m = &outcome.measured;
        let inserted = conn.execute(
            "INSERT INTO outcomes (recommendation_id, delivery_delta, cost_delta, burnout_delta, on_time, measured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(recommendation_id) DO NOTHING",
            params![
                outcome.recommendation_id,
                m.delivery_delta,
                m.cost_delta,
                m.burnout_delta,
                m.on_time as i32,
                outcome.measured_at.to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Err(AdvisorError::OutcomeAlreadyRecorded {
                id: outcome.recommendation_id.clone(),
            });
        }
        Ok(())
    }

    fn list_outcomes(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Outcome)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, o.delivery_delta, o.cost_delta, o.burnout_delta, o.on_time, o.measured_at
             FROM outcomes o JOIN recommendations r ON r.id = o.recommendation_id
             WHERE r.project = ?1
             ORDER BY o.measured_at",
            RECOMMENDATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![project], |row| {
                let rec = recommendation_from_row(row)?;
                let measured_at: String = row.get(10)?;
                let on_time: i32 = row.get(9)?;
                let outcome = Outcome {
                    recommendation_id: rec.id.clone(),
                    measured: MeasuredDeltas {
                        delivery_delta: row.get(6)?,
                        cost_delta: row.get(7)?,
                        burnout_delta: row.get(8)?,
                        on_time: on_time != 0,
                    },
                    measured_at: db::parse_timestamp(10, &measured_at)?,
                };
                Ok((rec, outcome))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_decisions(&self, project: &str) -> AdvisorResult<Vec<(IssuedRecommendation, Decision)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, d.recommendation_id, d.verdict, d.reason, d.decided_at
             FROM decisions d JOIN recommendations r ON r.id = d.recommendation_id
             WHERE r.project = ?1
             ORDER BY d.decided_at",
            RECOMMENDATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![project], |row| {
                Ok((recommendation_from_row(row)?, decision_from_row(row, 6)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Timestamped issue record for the ledger
pub fn issued(
    id: &str,
    project: &str,
    kind: RecommendationType,
    cycle_id: &str,
    predicted: ImpactEstimate,
    issued_at: DateTime<Utc>,
) -> IssuedRecommendation {
    IssuedRecommendation {
        id: id.to_string(),
        project: project.to_string(),
        kind,
        cycle_id: cycle_id.to_string(),
        predicted,
        issued_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stores() -> Vec<(&'static str, Box<dyn ArmStore>)> {
        vec![
            ("memory", Box::new(MemoryArmStore::new())),
            ("sqlite", Box::new(SqliteArmStore::in_memory().unwrap())),
        ]
    }

    fn decision(id: &str, verdict: Verdict) -> Decision {
        Decision {
            recommendation_id: id.to_string(),
            verdict,
            reason: Some("capacity".to_string()),
            decided_at: Utc::now(),
        }
    }

    fn outcome(id: &str) -> Outcome {
        Outcome {
            recommendation_id: id.to_string(),
            measured: MeasuredDeltas {
                delivery_delta: 4.0,
                cost_delta: -1.5,
                burnout_delta: -3.0,
                on_time: true,
            },
            measured_at: Utc::now(),
        }
    }

    fn register(store: &dyn ArmStore, id: &str, project: &str, kind: RecommendationType) {
        let predicted = ImpactEstimate {
            delivery_delta: 6.0,
            ..Default::default()
        };
        store
            .register_recommendations(&[issued(id, project, kind, "cycle-1", predicted, Utc::now())])
            .unwrap();
    }

    #[test]
    fn test_ensure_arm_is_idempotent() {
        for (name, store) in stores() {
            let first = store.ensure_arm("p", RecommendationType::Delay).unwrap();
            assert_eq!((first.alpha, first.beta, first.version), (2.0, 2.0, 0), "{}", name);

            let next = first.with_verdict(Verdict::Accept, Utc::now());
            assert!(store.replace_arm(0, &next).unwrap(), "{}", name);

            let again = store.ensure_arm("p", RecommendationType::Delay).unwrap();
            assert_eq!(again.alpha, 3.0, "{}", name);
            assert!(store.load_arm("p", RecommendationType::Reassign).unwrap().is_none(), "{}", name);
        }
    }

    #[test]
    fn test_cas_rejects_stale_version() {
        for (name, store) in stores() {
            register(store.as_ref(), "r1", "p", RecommendationType::Reassign);
            register(store.as_ref(), "r2", "p", RecommendationType::Reassign);
            let arm = store.ensure_arm("p", RecommendationType::Reassign).unwrap();

            let a = arm.with_verdict(Verdict::Accept, Utc::now());
            let swapped = store
                .compare_and_swap_decision(arm.version, &a, &decision("r1", Verdict::Accept))
                .unwrap();
            assert!(swapped, "{}", name);

            // r2 computed from the same stale read
            let b = arm.with_verdict(Verdict::Reject, Utc::now());
            let swapped = store
                .compare_and_swap_decision(arm.version, &b, &decision("r2", Verdict::Reject))
                .unwrap();
            assert!(!swapped, "{}", name);
            assert!(store.decision_for("r2").unwrap().is_none(), "{}", name);

            let stored = store.load_arm("p", RecommendationType::Reassign).unwrap().unwrap();
            assert_eq!((stored.alpha, stored.beta), (3.0, 2.0), "{}", name);
        }
    }

    #[test]
    fn test_second_decision_on_same_recommendation_fails() {
        for (name, store) in stores() {
            register(store.as_ref(), "r1", "p", RecommendationType::Delay);
            let arm = store.ensure_arm("p", RecommendationType::Delay).unwrap();
            let next = arm.with_verdict(Verdict::Accept, Utc::now());
            store.compare_and_swap_decision(arm.version, &next, &decision("r1", Verdict::Accept)).unwrap();

            let again = next.with_verdict(Verdict::Accept, Utc::now());
            let err = store
                .compare_and_swap_decision(next.version, &again, &decision("r1", Verdict::Accept))
                .unwrap_err();
            assert!(matches!(err, AdvisorError::DecisionAlreadyRecorded { .. }), "{}", name);
        }
    }

    #[test]
    fn test_cas_without_arm_is_integrity_error() {
        for (name, store) in stores() {
            register(store.as_ref(), "r1", "p", RecommendationType::Rebalance);
            let phantom = BanditArm::new("p", RecommendationType::Rebalance, Utc::now());
            let next = phantom.with_verdict(Verdict::Accept, Utc::now());
            let err = store
                .compare_and_swap_decision(0, &next, &decision("r1", Verdict::Accept))
                .unwrap_err();
            assert!(matches!(err, AdvisorError::UnknownArm { .. }), "{}", name);
        }
    }

    #[test]
    fn test_outcome_write_once() {
        for (name, store) in stores() {
            register(store.as_ref(), "r1", "p", RecommendationType::AddReviewer);
            store.insert_outcome(&outcome("r1")).unwrap();
            let err = store.insert_outcome(&outcome("r1")).unwrap_err();
            assert!(matches!(err, AdvisorError::OutcomeAlreadyRecorded { .. }), "{}", name);

            let outcomes = store.list_outcomes("p").unwrap();
            assert_eq!(outcomes.len(), 1, "{}", name);
            assert_eq!(outcomes[0].0.predicted.delivery_delta, 6.0, "{}", name);
            assert!(outcomes[0].1.measured.on_time, "{}", name);
            assert!(store.list_outcomes("other").unwrap().is_empty(), "{}", name);
        }
    }

    #[test]
    fn test_ledger_roundtrip() {
        for (name, store) in stores() {
            register(store.as_ref(), "r1", "p", RecommendationType::AssignUnassigned);
            let rec = store.lookup_recommendation("r1").unwrap().unwrap();
            assert_eq!(rec.kind, RecommendationType::AssignUnassigned, "{}", name);
            assert_eq!(rec.cycle_id, "cycle-1", "{}", name);
            assert!(store.lookup_recommendation("nope").unwrap().is_none(), "{}", name);

            let arm = store.ensure_arm("p", RecommendationType::AssignUnassigned).unwrap();
            let next = arm.with_verdict(Verdict::Reject, Utc::now());
            store.compare_and_swap_decision(arm.version, &next, &decision("r1", Verdict::Reject)).unwrap();
            let decisions = store.list_decisions("p").unwrap();
            assert_eq!(decisions.len(), 1, "{}", name);
            assert_eq!(decisions[0].1.verdict, Verdict::Reject, "{}", name);
            assert_eq!(decisions[0].1.reason.as_deref(), Some("capacity"), "{}", name);
        }
    }

    #[test]
    fn test_file_store_sees_writes_from_other_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("advisor.db");
        let one = SqliteArmStore::open(&path).unwrap();
        let two = SqliteArmStore::open(&path).unwrap();

        let arm = one.ensure_arm("p", RecommendationType::Delay).unwrap();
        assert!(two.replace_arm(arm.version, &arm.decayed(1.0, Utc::now())).unwrap());

        // `one` still holds version 0
        assert!(!one.replace_arm(arm.version, &arm.with_verdict(Verdict::Accept, Utc::now())).unwrap());
        assert_eq!(one.list_arms("p").unwrap()[0].version, 1);
    }
}
