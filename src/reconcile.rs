use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::corrector::{self, Correction, ScoreLine, ScoreMismatch, SeasonMove};
use crate::db::FixtureView;
use crate::error::{ReconError, Result};
use crate::importer::{self, GoalInput, MinutePolicy, RejectedGoal};
use crate::locator::{self, FixtureQuery, LocateOutcome, LocateTier};
use crate::quality::{self, Classification, QualityReport};

const DEFAULT_SOURCE_LABEL: &str = "batch";

/// One externally verified match, as found in a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub home_team_text: String,
    pub away_team_text: String,
    pub season_year: i32,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<String>,
    pub score: String,
    #[serde(default)]
    pub goals: Vec<GoalInput>,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

fn default_source_label() -> String {
    DEFAULT_SOURCE_LABEL.to_string()
}

impl BatchRecord {
    pub fn label(&self) -> String {
        format!(
            "{} v {} ({})",
            self.home_team_text.trim(),
            self.away_team_text.trim(),
            self.date
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordStatus {
    Reconciled,
    Unmatched,
    Ambiguous { candidates: Vec<i64> },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordResult {
    pub label: String,
    pub matched: bool,
    pub fixture_id: Option<i64>,
    pub tier: Option<LocateTier>,
    pub correction_applied: bool,
    pub season_move: Option<SeasonMove>,
    pub score_mismatch: Option<ScoreMismatch>,
    pub imported_goal_count: usize,
    pub rejected_goal_count: usize,
    pub rejected_goals: Vec<RejectedGoal>,
    pub quality_report: Option<QualityReport>,
    pub status: RecordStatus,
    pub warnings: Vec<String>,
}

impl RecordResult {
    fn pending(record: &BatchRecord) -> Self {
        Self {
            label: record.label(),
            matched: false,
            fixture_id: None,
            tier: None,
            correction_applied: false,
            season_move: None,
            score_mismatch: None,
            imported_goal_count: 0,
            rejected_goal_count: 0,
            rejected_goals: Vec::new(),
            quality_report: None,
            status: RecordStatus::Unmatched,
            warnings: Vec::new(),
        }
    }

    pub fn classification(&self) -> Option<Classification> {
        self.quality_report.map(|r| r.classification)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub run_id: i64,
    pub records_total: usize,
    pub records_matched: usize,
    pub records_reconciled: usize,
    pub goals_imported: usize,
    pub goals_rejected: usize,
    pub perfect: usize,
    pub good: usize,
    pub poor: usize,
    pub errors: Vec<String>,
    pub results: Vec<RecordResult>,
}

/// A row of the `reconcile_runs` ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub records_total: i64,
    pub records_matched: i64,
    pub goals_imported: i64,
    pub goals_rejected: i64,
    pub errors: Vec<String>,
}

pub fn parse_batch(raw: &str) -> Result<Vec<BatchRecord>> {
    serde_json::from_str(raw).map_err(|err| ReconError::InvalidInput(format!("batch json: {err}")))
}

/// `HH:MM` or `HH:MM:SS`.
pub fn parse_kickoff(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

/// Locate, correct, import and validate one record.
///
/// Record-level failures come back as a [`RecordStatus`]; only a fatal store
/// error is returned as `Err`.
pub fn reconcile_record(
    conn: &mut Connection,
    record: &BatchRecord,
    policy: MinutePolicy,
) -> Result<RecordResult> {
    let mut result = RecordResult::pending(record);
    match run_record(conn, record, policy, &mut result) {
        Ok(()) => result.status = RecordStatus::Reconciled,
        Err(err) if err.is_fatal() => return Err(err),
        Err(ReconError::AmbiguousMatch { candidate_ids, .. }) if !result.matched => {
            result.status = RecordStatus::Ambiguous {
                candidates: candidate_ids,
            };
        }
        Err(ReconError::NotFound(_)) if !result.matched => {
            result.status = RecordStatus::Unmatched;
        }
        Err(err) => {
            result.status = RecordStatus::Failed {
                reason: err.to_string(),
            };
        }
    }

    info!(
        record = %result.label,
        fixture_id = ?result.fixture_id,
        status = ?result.status,
        imported = result.imported_goal_count,
        rejected = result.rejected_goal_count,
        classification = ?result.classification(),
        "record reconciled"
    );
    Ok(result)
}

fn run_record(
    conn: &mut Connection,
    record: &BatchRecord,
    policy: MinutePolicy,
    result: &mut RecordResult,
) -> Result<()> {
    let unparseable_score =
        || ReconError::InvalidInput(format!("unparseable score {:?}", record.score));
    let score = ScoreLine::parse(&record.score).ok_or_else(unparseable_score)?;
    let expected = score.total().ok_or_else(unparseable_score)?;
    let time = match record.time.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(
            parse_kickoff(raw)
                .ok_or_else(|| ReconError::InvalidInput(format!("unparseable time {raw:?}")))?,
        ),
        _ => None,
    };

    let (fixture, tier) = locate(conn, record, result)?;
    let fixture_id = fixture.fixture.id;
    result.matched = true;
    result.fixture_id = Some(fixture_id);
    result.tier = Some(tier);

    let correction = corrector::correct_fixture(
        conn,
        fixture_id,
        &Correction {
            date: record.date,
            time,
            score: Some(score),
            source: &record.source_label,
        },
    )?;
    result.correction_applied = correction.changed;
    result.season_move = correction.season_move;
    if let Some(mismatch) = correction.score_mismatch {
        result.warnings.push(format!(
            "score mismatch: verified {}-{}, stored {}",
            mismatch.authoritative.home,
            mismatch.authoritative.away,
            mismatch
                .persisted
                .map(|s| format!("{}-{}", s.home, s.away))
                .unwrap_or_else(|| "none".to_string())
        ));
        result.score_mismatch = Some(mismatch);
    }

    let imported = importer::import_goals(conn, fixture_id, &record.goals, policy)?;
    result.imported_goal_count = imported.imported;
    result.rejected_goal_count = imported.rejected.len();
    for rejected in &imported.rejected {
        result.warnings.push(format!(
            "goal rejected ({} {}'): {}",
            rejected.event.player_text, rejected.event.minute, rejected.reason
        ));
    }
    result.rejected_goals = imported.rejected;

    let report = quality::evaluate(conn, fixture_id, expected)?;
    if report.is_shortfall() {
        result.warnings.push(format!(
            "quality {}: {}/{} goals ({}%)",
            report.classification, report.actual_goals, report.expected_goals, report.accuracy_pct
        ));
    }
    result.quality_report = Some(report);
    Ok(())
}

/// Runs the locator with the record's season year, then once more with the
/// season implied by the date. A fixture already moved to its corrected season
/// is found again on rerun.
fn locate(
    conn: &Connection,
    record: &BatchRecord,
    result: &mut RecordResult,
) -> Result<(FixtureView, LocateTier)> {
    let mut query = FixtureQuery {
        home_text: &record.home_team_text,
        away_text: &record.away_team_text,
        season_year: record.season_year,
        date_hint: Some(record.date),
    };
    let mut outcome = locator::find_fixture(conn, &query)?;

    let implied = corrector::season_year_for(record.date);
    if outcome == LocateOutcome::NotFound && implied != record.season_year {
        query.season_year = implied;
        outcome = locator::find_fixture(conn, &query)?;
        if outcome.fixture().is_some() {
            result
                .warnings
                .push(format!("located in season {implied}, not {}", record.season_year));
        }
    }
    outcome.into_result(&result.label)
}

/// Reconciles every record in order, writing one `reconcile_runs` row.
///
/// A record that fails is reported and skipped. A fatal store error stops the
/// batch; fixtures committed before it stay committed.
pub fn reconcile_batch(
    conn: &mut Connection,
    records: &[BatchRecord],
    policy: MinutePolicy,
) -> Result<BatchSummary> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO reconcile_runs(
            started_at, finished_at, records_total, records_matched,
            goals_imported, goals_rejected, errors_json
         )
         VALUES (?1, NULL, ?2, 0, 0, 0, '[]')",
        params![started_at, records.len() as i64],
    )?;
    let run_id = conn.last_insert_rowid();

    let mut summary = BatchSummary {
        run_id,
        records_total: records.len(),
        records_matched: 0,
        records_reconciled: 0,
        goals_imported: 0,
        goals_rejected: 0,
        perfect: 0,
        good: 0,
        poor: 0,
        errors: Vec::new(),
        results: Vec::with_capacity(records.len()),
    };

    for record in records {
        let result = match reconcile_record(conn, record, policy) {
            Ok(result) => result,
            Err(err) => {
                error!(run_id, record = %record.label(), %err, "store lost, aborting batch");
                summary.errors.push(format!("{}: {err}", record.label()));
                finish_run(conn, &summary).ok();
                return Err(err);
            }
        };

        if result.matched {
            summary.records_matched += 1;
        }
        summary.goals_imported += result.imported_goal_count;
        summary.goals_rejected += result.rejected_goal_count;
        match result.classification() {
            Some(Classification::Perfect) => summary.perfect += 1,
            Some(Classification::Good) => summary.good += 1,
            Some(Classification::Poor) => summary.poor += 1,
            None => {}
        }
        match &result.status {
            RecordStatus::Reconciled => summary.records_reconciled += 1,
            RecordStatus::Unmatched => summary.errors.push(format!("{}: unmatched", result.label)),
            RecordStatus::Ambiguous { candidates } => summary
                .errors
                .push(format!("{}: ambiguous {candidates:?}", result.label)),
            RecordStatus::Failed { reason } => {
                warn!(record = %result.label, %reason, "record failed");
                summary.errors.push(format!("{}: {reason}", result.label));
            }
        }
        summary.results.push(result);
    }

    finish_run(conn, &summary)?;
    info!(
        run_id,
        total = summary.records_total,
        matched = summary.records_matched,
        imported = summary.goals_imported,
        rejected = summary.goals_rejected,
        "batch finished"
    );
    Ok(summary)
}

fn finish_run(conn: &Connection, summary: &BatchSummary) -> Result<()> {
    let finished_at = Utc::now().to_rfc3339();
    let errors_json = serde_json::to_string(&summary.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE reconcile_runs
         SET finished_at = ?1, records_matched = ?2, goals_imported = ?3,
             goals_rejected = ?4, errors_json = ?5
         WHERE run_id = ?6",
        params![
            finished_at,
            summary.records_matched as i64,
            summary.goals_imported as i64,
            summary.goals_rejected as i64,
            errors_json,
            summary.run_id
        ],
    )?;
    Ok(())
}

pub fn load_run(conn: &Connection, run_id: i64) -> Result<Option<RunRecord>> {
    let row = conn
        .query_row(
            "SELECT run_id, started_at, finished_at, records_total, records_matched,
                goals_imported, goals_rejected, errors_json
             FROM reconcile_runs
             WHERE run_id = ?1",
            params![run_id],
            |row| {
                Ok((
                    RunRecord {
                        run_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        records_total: row.get(3)?,
                        records_matched: row.get(4)?,
                        goals_imported: row.get(5)?,
                        goals_rejected: row.get(6)?,
                        errors: Vec::new(),
                    },
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(mut run, errors_json)| {
        run.errors = serde_json::from_str(&errors_json).unwrap_or_default();
        run
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kickoff_accepts_minutes_or_seconds() {
        assert_eq!(parse_kickoff("15:00"), NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(parse_kickoff(" 19:45:30 "), NaiveTime::from_hms_opt(19, 45, 30));
        assert_eq!(parse_kickoff("3pm"), None);
    }

    #[test]
    fn batch_record_defaults_optional_fields() {
        let records = parse_batch(
            r#"[{"homeTeamText":"Arsenal","awayTeamText":"Norwich City","seasonYear":1993,
                 "date":"1992-08-15","score":"2-4"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, None);
        assert!(records[0].goals.is_empty());
        assert_eq!(records[0].source_label, "batch");
        assert_eq!(records[0].label(), "Arsenal v Norwich City (1992-08-15)");
    }

    #[test]
    fn malformed_batch_is_invalid_input() {
        assert!(matches!(
            parse_batch(r#"{"records": 3}"#),
            Err(ReconError::InvalidInput(_))
        ));
    }

    #[test]
    fn record_status_serializes_with_kind_tag() {
        let json = serde_json::to_value(RecordStatus::Ambiguous {
            candidates: vec![3, 9],
        })
        .unwrap();
        assert_eq!(json["kind"], "ambiguous");
        assert_eq!(json["candidates"][1], 9);
    }
}
