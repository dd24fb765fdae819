use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, Fixture};
use crate::error::{ReconError, Result};

/// Official full-time score as `home-away`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub home: i32,
    pub away: i32,
}

impl ScoreLine {
    /// Highest goal count accepted for one side.
    pub const MAX_SIDE_GOALS: i32 = 999;

    /// Accepts "2-4", "2 - 4", "2:4" and similar; the first two digit runs win.
    /// Any digit run past `MAX_SIDE_GOALS` makes the whole line unparseable.
    pub fn parse(raw: &str) -> Option<Self> {
        let nums = raw
            .split(|ch: char| !ch.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i32>()
                    .ok()
                    .filter(|n| *n <= Self::MAX_SIDE_GOALS)
            })
            .collect::<Option<Vec<_>>>()?;
        match nums.as_slice() {
            [home, away, ..] => Some(Self {
                home: *home,
                away: *away,
            }),
            _ => None,
        }
    }

    pub fn total(&self) -> Option<u32> {
        let home = u32::try_from(self.home).ok()?;
        let away = u32::try_from(self.away).ok()?;
        home.checked_add(away)
    }
}

#[derive(Debug, Clone)]
pub struct Correction<'a> {
    pub date: NaiveDate,
    /// Verified kickoff time. `None` keeps the stored time of day.
    pub time: Option<NaiveTime>,
    pub score: Option<ScoreLine>,
    pub source: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreMismatch {
    pub fixture_id: i64,
    pub authoritative: ScoreLine,
    pub persisted: Option<ScoreLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonMove {
    pub from_year: i32,
    pub to_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionOutcome {
    pub fixture: Fixture,
    pub changed: bool,
    pub timestamp_changed: bool,
    pub season_move: Option<SeasonMove>,
    pub score_mismatch: Option<ScoreMismatch>,
}

/// Seasons are named by the year they end in: August onwards belongs to next year's season.
pub fn season_year_for(date: NaiveDate) -> i32 {
    if date.month() >= 8 {
        date.year() + 1
    } else {
        date.year()
    }
}

pub fn correct_fixture(
    conn: &mut Connection,
    fixture_id: i64,
    correction: &Correction<'_>,
) -> Result<CorrectionOutcome> {
    let tx = conn.transaction()?;
    let current = db::load_fixture_view(&tx, fixture_id)?;
    let before = current.fixture.clone();

    let time = correction.time.unwrap_or_else(|| before.kickoff_time());
    let new_timestamp = correction.date.and_time(time);

    let target_year = season_year_for(correction.date);
    let (new_season_id, season_move) = if target_year == current.season_year {
        (before.season_id, None)
    } else {
        let season =
            db::season_by_year(&tx, target_year)?.ok_or(ReconError::SeasonMissing(target_year))?;
        (
            season.id,
            Some(SeasonMove {
                from_year: current.season_year,
                to_year: target_year,
            }),
        )
    };

    let timestamp_changed = new_timestamp != before.match_timestamp;
    let changed = timestamp_changed || new_season_id != before.season_id;
    if changed {
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE fixtures
             SET match_timestamp = ?1, season_id = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                db::format_timestamp(&new_timestamp),
                new_season_id,
                now,
                fixture_id
            ],
        )?;
        tx.execute(
            "INSERT INTO fixture_corrections(
                fixture_id, old_timestamp, new_timestamp, old_season_id, new_season_id,
                source, applied_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                fixture_id,
                db::format_timestamp(&before.match_timestamp),
                db::format_timestamp(&new_timestamp),
                before.season_id,
                new_season_id,
                correction.source,
                now
            ],
        )?;
    }
    tx.commit()?;

    if changed {
        info!(
            fixture_id,
            from = %before.match_timestamp,
            to = %new_timestamp,
            ?season_move,
            source = correction.source,
            "fixture corrected"
        );
    }

    let score_mismatch = correction
        .score
        .and_then(|authoritative| compare_score(&before, authoritative));
    if let Some(mismatch) = &score_mismatch {
        warn!(
            fixture_id,
            authoritative = ?mismatch.authoritative,
            persisted = ?mismatch.persisted,
            "score mismatch; stored score left unchanged"
        );
    }

    let fixture = Fixture {
        match_timestamp: new_timestamp,
        season_id: new_season_id,
        ..before
    };
    Ok(CorrectionOutcome {
        fixture,
        changed,
        timestamp_changed,
        season_move,
        score_mismatch,
    })
}

fn compare_score(fixture: &Fixture, authoritative: ScoreLine) -> Option<ScoreMismatch> {
    let persisted = match (fixture.home_score, fixture.away_score) {
        (Some(home), Some(away)) => Some(ScoreLine { home, away }),
        _ => None,
    };
    if persisted == Some(authoritative) {
        return None;
    }
    Some(ScoreMismatch {
        fixture_id: fixture.id,
        authoritative,
        persisted,
    })
}

pub fn count_corrections(conn: &Connection, fixture_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM fixture_corrections WHERE fixture_id = ?1",
        params![fixture_id],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn score_line_parses_common_separators() {
        assert_eq!(ScoreLine::parse("2-4"), Some(ScoreLine { home: 2, away: 4 }));
        assert_eq!(ScoreLine::parse("FT 0 : 0"), Some(ScoreLine { home: 0, away: 0 }));
        assert_eq!(ScoreLine::parse("3"), None);
        assert_eq!(ScoreLine::parse("ab"), None);
    }

    #[test]
    fn oversized_digit_runs_make_the_score_unparseable() {
        assert_eq!(ScoreLine::parse("2147483647-1"), None);
        assert_eq!(ScoreLine::parse("99999999999-2-1"), None);
        assert_eq!(ScoreLine::parse("1000-0"), None);
        assert_eq!(
            ScoreLine::parse("149-0"),
            Some(ScoreLine { home: 149, away: 0 })
        );
    }

    #[test]
    fn total_rejects_negative_sides() {
        assert_eq!(ScoreLine { home: 2, away: 4 }.total(), Some(6));
        assert_eq!(ScoreLine { home: -1, away: 4 }.total(), None);
        assert_eq!(
            ScoreLine {
                home: i32::MAX,
                away: i32::MAX
            }
            .total(),
            Some(u32::MAX - 1)
        );
    }

    #[test]
    fn season_rule_splits_at_august() {
        assert_eq!(season_year_for(ymd(1993, 7, 31)), 1993);
        assert_eq!(season_year_for(ymd(1992, 8, 1)), 1993);
        assert_eq!(season_year_for(ymd(1992, 12, 26)), 1993);
        assert_eq!(season_year_for(ymd(1993, 1, 1)), 1993);
    }

    #[test]
    fn matching_score_is_not_a_mismatch() {
        let fixture = Fixture {
            id: 7,
            season_id: 1,
            home_team_id: 1,
            away_team_id: 2,
            match_timestamp: ymd(1992, 8, 15).and_hms_opt(15, 0, 0).unwrap(),
            home_score: Some(2),
            away_score: Some(4),
        };
        assert_eq!(compare_score(&fixture, ScoreLine { home: 2, away: 4 }), None);

        let mismatch = compare_score(&fixture, ScoreLine { home: 4, away: 2 }).unwrap();
        assert_eq!(mismatch.persisted, Some(ScoreLine { home: 2, away: 4 }));

        let unscored = Fixture {
            home_score: None,
            away_score: None,
            ..fixture
        };
        let mismatch = compare_score(&unscored, ScoreLine { home: 0, away: 0 }).unwrap();
        assert_eq!(mismatch.persisted, None);
    }
}
