use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::{ReconError, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: i64,
    pub canonical_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Season {
    pub id: i64,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    pub id: i64,
    pub season_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub match_timestamp: NaiveDateTime,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl Fixture {
    pub fn kickoff_time(&self) -> NaiveTime {
        self.match_timestamp.time()
    }

    pub fn has_team(&self, team_id: i64) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }
}

/// A fixture joined with both canonical team names and its season year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureView {
    pub fixture: Fixture,
    pub home_name: String,
    pub away_name: String,
    pub season_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalEvent {
    pub id: i64,
    pub fixture_id: i64,
    pub player_id: i64,
    pub team_id: i64,
    pub minute: i32,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS team_aliases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            alias_text TEXT NOT NULL,
            alias_type TEXT NOT NULL,
            confidence_score INTEGER NOT NULL
                CHECK (confidence_score BETWEEN 0 AND 100),
            source TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_team_aliases_unique
            ON team_aliases(team_id, alias_text COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_team_aliases_text
            ON team_aliases(alias_text COLLATE NOCASE);

        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS fixtures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            home_team_id INTEGER NOT NULL REFERENCES teams(id),
            away_team_id INTEGER NOT NULL REFERENCES teams(id),
            match_timestamp TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            updated_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_season ON fixtures(season_id);
        CREATE INDEX IF NOT EXISTS idx_fixtures_timestamp ON fixtures(match_timestamp);

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_name ON players(name COLLATE NOCASE);

        CREATE TABLE IF NOT EXISTS goal_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id INTEGER NOT NULL REFERENCES fixtures(id),
            player_id INTEGER NOT NULL REFERENCES players(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            minute INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_goal_events_fixture ON goal_events(fixture_id);

        CREATE TABLE IF NOT EXISTS fixture_corrections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id INTEGER NOT NULL REFERENCES fixtures(id),
            old_timestamp TEXT NOT NULL,
            new_timestamp TEXT NOT NULL,
            old_season_id INTEGER NOT NULL,
            new_season_id INTEGER NOT NULL,
            source TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reconcile_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            records_total INTEGER NOT NULL,
            records_matched INTEGER NOT NULL,
            goals_imported INTEGER NOT NULL,
            goals_rejected INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad match_timestamp {raw:?}").into(),
        )
    })
}

pub(crate) const FIXTURE_VIEW_COLUMNS: &str = r#"
    f.id, f.season_id, f.home_team_id, f.away_team_id, f.match_timestamp,
    f.home_score, f.away_score, home.canonical_name, away.canonical_name, s.year
"#;

pub(crate) const FIXTURE_VIEW_JOINS: &str = r#"
    FROM fixtures f
    JOIN teams home ON home.id = f.home_team_id
    JOIN teams away ON away.id = f.away_team_id
    JOIN seasons s ON s.id = f.season_id
"#;

pub(crate) fn fixture_view_from_row(row: &Row<'_>) -> rusqlite::Result<FixtureView> {
    Ok(FixtureView {
        fixture: Fixture {
            id: row.get(0)?,
            season_id: row.get(1)?,
            home_team_id: row.get(2)?,
            away_team_id: row.get(3)?,
            match_timestamp: timestamp_column(row, 4)?,
            home_score: row.get(5)?,
            away_score: row.get(6)?,
        },
        home_name: row.get(7)?,
        away_name: row.get(8)?,
        season_year: row.get(9)?,
    })
}

pub fn load_fixture_view(conn: &Connection, fixture_id: i64) -> Result<FixtureView> {
    let sql = format!("SELECT {FIXTURE_VIEW_COLUMNS} {FIXTURE_VIEW_JOINS} WHERE f.id = ?1");
    conn.query_row(&sql, params![fixture_id], fixture_view_from_row)
        .optional()?
        .ok_or_else(|| ReconError::NotFound(format!("fixture {fixture_id}")))
}

pub fn load_fixture(conn: &Connection, fixture_id: i64) -> Result<Fixture> {
    Ok(load_fixture_view(conn, fixture_id)?.fixture)
}

/// Fixtures of a season, optionally restricted to one calendar date.
pub fn fixtures_in_season(
    conn: &Connection,
    season_year: i32,
    date: Option<NaiveDate>,
) -> Result<Vec<FixtureView>> {
    let date_text = date.map(|d| d.format(DATE_FORMAT).to_string());
    let sql = format!(
        "SELECT {FIXTURE_VIEW_COLUMNS} {FIXTURE_VIEW_JOINS}
         WHERE s.year = ?1 AND (?2 IS NULL OR date(f.match_timestamp) = ?2)
         ORDER BY f.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![season_year, date_text], fixture_view_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn season_by_year(conn: &Connection, year: i32) -> Result<Option<Season>> {
    let season = conn
        .query_row(
            "SELECT id, year FROM seasons WHERE year = ?1",
            params![year],
            |row| {
                Ok(Season {
                    id: row.get(0)?,
                    year: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(season)
}

pub fn load_teams(conn: &Connection) -> Result<Vec<Team>> {
    let mut stmt = conn.prepare("SELECT id, canonical_name FROM teams ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Team {
            id: row.get(0)?,
            canonical_name: row.get(1)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn team_by_canonical_name(conn: &Connection, name: &str) -> Result<Option<Team>> {
    let team = conn
        .query_row(
            "SELECT id, canonical_name FROM teams WHERE canonical_name = ?1 COLLATE NOCASE",
            params![name.trim()],
            |row| {
                Ok(Team {
                    id: row.get(0)?,
                    canonical_name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(team)
}

pub fn goal_events_for_fixture(conn: &Connection, fixture_id: i64) -> Result<Vec<GoalEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, fixture_id, player_id, team_id, minute
         FROM goal_events
         WHERE fixture_id = ?1
         ORDER BY minute ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![fixture_id], |row| {
        Ok(GoalEvent {
            id: row.get(0)?,
            fixture_id: row.get(1)?,
            player_id: row.get(2)?,
            team_id: row.get(3)?,
            minute: row.get(4)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Seeding helpers for the externally-owned tables. The engine itself never calls
// these; drivers and tests use them to stand up a store.

pub fn insert_team(conn: &Connection, canonical_name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO teams(canonical_name) VALUES (?1)",
        params![canonical_name.trim()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_season(conn: &Connection, year: i32) -> Result<i64> {
    conn.execute("INSERT INTO seasons(year) VALUES (?1)", params![year])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_fixture(
    conn: &Connection,
    season_id: i64,
    home_team_id: i64,
    away_team_id: i64,
    match_timestamp: NaiveDateTime,
    score: Option<(i32, i32)>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO fixtures(
            season_id, home_team_id, away_team_id, match_timestamp, home_score, away_score
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            season_id,
            home_team_id,
            away_team_id,
            format_timestamp(&match_timestamp),
            score.map(|s| s.0),
            score.map(|s| s.1),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timestamp_accepts_store_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(1992, 8, 15)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("1992-08-15 15:00:00"), Some(expected));
        assert_eq!(parse_timestamp("1992-08-15T15:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("1992-08-15"),
            NaiveDate::from_ymd_opt(1992, 8, 15).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("15/08/1992"), None);
    }

    #[test]
    fn fixtures_in_season_filters_by_date() {
        let conn = open_in_memory().unwrap();
        let season = insert_season(&conn, 1992).unwrap();
        let arsenal = insert_team(&conn, "Arsenal").unwrap();
        let norwich = insert_team(&conn, "Norwich City").unwrap();
        let day_one = NaiveDate::from_ymd_opt(1992, 8, 15).unwrap();
        insert_fixture(
            &conn,
            season,
            arsenal,
            norwich,
            day_one.and_hms_opt(15, 0, 0).unwrap(),
            Some((2, 4)),
        )
        .unwrap();
        insert_fixture(
            &conn,
            season,
            norwich,
            arsenal,
            NaiveDate::from_ymd_opt(1993, 1, 9)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            None,
        )
        .unwrap();

        assert_eq!(fixtures_in_season(&conn, 1992, None).unwrap().len(), 2);
        let on_day = fixtures_in_season(&conn, 1992, Some(day_one)).unwrap();
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].home_name, "Arsenal");
        assert_eq!(on_day[0].fixture.home_score, Some(2));
        assert!(fixtures_in_season(&conn, 1993, None).unwrap().is_empty());
    }

    #[test]
    fn missing_fixture_is_not_found() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(
            load_fixture(&conn, 42),
            Err(ReconError::NotFound(_))
        ));
    }
}
