use std::fmt;

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::db;
use crate::error::Result;

pub const GOOD_ACCURACY_PCT: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Perfect,
    Good,
    Poor,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Perfect => f.write_str("perfect"),
            Classification::Good => f.write_str("good"),
            Classification::Poor => f.write_str("poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub fixture_id: i64,
    pub expected_goals: u32,
    pub actual_goals: u32,
    pub home_goals_actual: u32,
    pub away_goals_actual: u32,
    pub accuracy_pct: u32,
    pub classification: Classification,
}

impl QualityReport {
    /// Anything short of a perfect rebuild. An expected outcome, not an error.
    pub fn is_shortfall(&self) -> bool {
        self.classification != Classification::Perfect
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalCounts {
    pub total: u32,
    pub home: u32,
    pub away: u32,
}

/// `round(actual / expected * 100)`, half away from zero; 0 when nothing was expected.
pub fn accuracy_pct(actual: u32, expected: u32) -> u32 {
    if expected == 0 {
        return 0;
    }
    let scaled = u64::from(actual) * 200 + u64::from(expected);
    u32::try_from(scaled / (2 * u64::from(expected))).unwrap_or(u32::MAX)
}

pub fn classify(
    counts: GoalCounts,
    expected: u32,
    official: Option<(u32, u32)>,
) -> (u32, Classification) {
    let pct = accuracy_pct(counts.total, expected);
    let perfect = counts.total == expected
        && official.is_some_and(|(home, away)| counts.home == home && counts.away == away);
    let class = if perfect {
        Classification::Perfect
    } else if pct >= GOOD_ACCURACY_PCT {
        Classification::Good
    } else {
        Classification::Poor
    };
    (pct, class)
}

pub fn evaluate(conn: &Connection, fixture_id: i64, expected_goals: u32) -> Result<QualityReport> {
    let fixture = db::load_fixture(conn, fixture_id)?;
    let (total, home, away) = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN team_id = ?2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN team_id = ?3 THEN 1 ELSE 0 END), 0)
         FROM goal_events
         WHERE fixture_id = ?1",
        params![fixture_id, fixture.home_team_id, fixture.away_team_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        },
    )?;
    let counts = GoalCounts {
        total: count_u32(total),
        home: count_u32(home),
        away: count_u32(away),
    };

    let official = match (fixture.home_score, fixture.away_score) {
        (Some(h), Some(a)) if h >= 0 && a >= 0 => Some((h as u32, a as u32)),
        _ => None,
    };
    let (accuracy_pct, classification) = classify(counts, expected_goals, official);

    Ok(QualityReport {
        fixture_id,
        expected_goals,
        actual_goals: counts.total,
        home_goals_actual: counts.home,
        away_goals_actual: counts.away,
        accuracy_pct,
        classification,
    })
}

fn count_u32(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}
