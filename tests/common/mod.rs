#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use premstats_recon::alias;
use premstats_recon::db;
use premstats_recon::importer::GoalInput;

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(hh, mm, 0))
        .expect("valid timestamp")
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Opening weekend of 1992-93 as it sits in the store before reconciliation:
/// every fixture filed under season 1992, Arsenal v Norwich City a day late.
pub struct Store {
    pub conn: Connection,
    pub season_1992: i64,
    pub season_1993: i64,
    pub arsenal: i64,
    pub norwich: i64,
    pub man_utd: i64,
    pub ipswich: i64,
    pub chelsea: i64,
    pub oldham: i64,
    pub liverpool: i64,
    pub spurs: i64,
    pub arsenal_norwich: i64,
    pub man_utd_ipswich: i64,
    pub chelsea_oldham: i64,
}

pub fn seeded_store() -> Store {
    seed(db::open_in_memory().expect("in-memory store"))
}

pub fn seed(conn: Connection) -> Store {
    let team = |name: &str| db::insert_team(&conn, name).expect("insert team");
    let arsenal = team("Arsenal");
    let norwich = team("Norwich City");
    let man_utd = team("Manchester United");
    let ipswich = team("Ipswich Town");
    let chelsea = team("Chelsea");
    let oldham = team("Oldham Athletic");
    let liverpool = team("Liverpool");
    let spurs = team("Tottenham Hotspur");

    let season_1992 = db::insert_season(&conn, 1992).expect("season 1992");
    let season_1993 = db::insert_season(&conn, 1993).expect("season 1993");

    let fixture = |home, away, ts, score| {
        db::insert_fixture(&conn, season_1992, home, away, ts, score).expect("insert fixture")
    };
    let arsenal_norwich = fixture(arsenal, norwich, at(1992, 8, 16, 0, 0), Some((2, 4)));
    let man_utd_ipswich = fixture(man_utd, ipswich, at(1992, 8, 21, 19, 45), Some((1, 1)));
    let chelsea_oldham = fixture(chelsea, oldham, at(1992, 8, 15, 15, 0), Some((1, 1)));

    alias::seed_canonical_aliases(&conn).expect("canonical aliases");
    let mapping = alias::parse_alias_mapping(&read_fixture("team_aliases.json"))
        .expect("alias mapping parses");
    alias::seed_from_mapping(&conn, &mapping, "team_aliases.json").expect("mapped aliases");

    Store {
        conn,
        season_1992,
        season_1993,
        arsenal,
        norwich,
        man_utd,
        ipswich,
        chelsea,
        oldham,
        liverpool,
        spurs,
        arsenal_norwich,
        man_utd_ipswich,
        chelsea_oldham,
    }
}

pub fn goal(player: &str, team: &str, minute: i32) -> GoalInput {
    GoalInput {
        player_text: player.to_string(),
        team_text: team.to_string(),
        minute,
    }
}

/// Arsenal 2-4 Norwich City, 15 August 1992.
pub fn arsenal_norwich_goals() -> Vec<GoalInput> {
    vec![
        goal("Steve Bould", "Arsenal", 28),
        goal("Kevin Campbell", "Arsenal", 39),
        goal("Mark Robins", "Norwich City", 69),
        goal("David Phillips", "Norwich City", 72),
        goal("Ruel Fox", "Norwich City", 80),
        goal("Mark Robins", "Norwich City", 84),
    ]
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count rows")
}
