use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Days, NaiveDate};
use rusqlite::Connection;

use premstats_recon::alias::{self, AliasType};
use premstats_recon::db;
use premstats_recon::locator::{self, FixtureQuery};

const CLUBS: &[(&str, &str)] = &[
    ("Arsenal", "Gunners"),
    ("Aston Villa", "Villa"),
    ("Blackburn Rovers", "Rovers"),
    ("Chelsea", "Blues"),
    ("Coventry City", "Sky Blues"),
    ("Crystal Palace", "Eagles"),
    ("Everton", "Toffees"),
    ("Ipswich Town", "Tractor Boys"),
    ("Leeds United", "Whites"),
    ("Liverpool", "Reds"),
    ("Manchester City", "Citizens"),
    ("Manchester United", "Red Devils"),
    ("Middlesbrough", "Boro"),
    ("Norwich City", "Canaries"),
    ("Nottingham Forest", "Forest"),
    ("Oldham Athletic", "Latics"),
    ("Queens Park Rangers", "Hoops"),
    ("Sheffield United", "Blades"),
    ("Sheffield Wednesday", "Owls"),
    ("Southampton", "Saints"),
    ("Tottenham Hotspur", "Spurs"),
    ("Wimbledon", "Dons"),
];

/// A full double round-robin season, one round per week.
fn seeded_season() -> Connection {
    let conn = db::open_in_memory().expect("in-memory store");
    let ids = CLUBS
        .iter()
        .map(|(name, nickname)| {
            let id = db::insert_team(&conn, name).expect("team");
            alias::register_alias(&conn, id, nickname, AliasType::Nickname, 80, "bench")
                .expect("alias");
            id
        })
        .collect::<Vec<_>>();
    alias::seed_canonical_aliases(&conn).expect("canonical aliases");

    let season = db::insert_season(&conn, 1993).expect("season");
    let opening = NaiveDate::from_ymd_opt(1992, 8, 15).expect("date");
    let mut round = 0u64;
    for (h, home) in ids.iter().enumerate() {
        for (a, away) in ids.iter().enumerate() {
            if h == a {
                continue;
            }
            let date = opening
                .checked_add_days(Days::new(7 * (round % 42)))
                .expect("date in range");
            let kickoff = date.and_hms_opt(15, 0, 0).expect("kickoff");
            db::insert_fixture(&conn, season, *home, *away, kickoff, None).expect("fixture");
            round += 1;
        }
    }
    conn
}

fn bench_lookup_team(c: &mut Criterion) {
    let conn = seeded_season();
    c.bench_function("lookup_team_nickname", |b| {
        b.iter(|| {
            let hit = alias::lookup_team(&conn, black_box("red devils")).unwrap();
            black_box(hit);
        })
    });
    c.bench_function("lookup_team_miss", |b| {
        b.iter(|| {
            let hit = alias::lookup_team(&conn, black_box("Swindon Town")).unwrap();
            black_box(hit);
        })
    });
}

fn bench_find_fixture(c: &mut Criterion) {
    let conn = seeded_season();
    let hint = NaiveDate::from_ymd_opt(1992, 8, 15);
    c.bench_function("find_fixture_exact", |b| {
        b.iter(|| {
            let outcome = locator::find_fixture(
                &conn,
                black_box(&FixtureQuery {
                    home_text: "Arsenal",
                    away_text: "Aston Villa",
                    season_year: 1993,
                    date_hint: hint,
                }),
            )
            .unwrap();
            black_box(outcome);
        })
    });
    c.bench_function("find_fixture_all_tiers_miss", |b| {
        b.iter(|| {
            let outcome = locator::find_fixture(
                &conn,
                black_box(&FixtureQuery {
                    home_text: "Swindon Town",
                    away_text: "Bristol City",
                    season_year: 1993,
                    date_hint: hint,
                }),
            )
            .unwrap();
            black_box(outcome);
        })
    });
}

criterion_group!(benches, bench_lookup_team, bench_find_fixture);
criterion_main!(benches);
