use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::alias;
use crate::db::{self, FixtureView};
use crate::error::{ReconError, Result};

/// Strategy tiers in evaluation order. The first tier to produce a verdict
/// (hit or ambiguity) ends the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateTier {
    /// Canonical names equal to the input text, exact date.
    ExactName,
    /// Both texts resolved through the alias table, exact date.
    Alias,
    /// First word of each text found inside the canonical names, exact date.
    FirstToken,
    /// `ExactName` retried at hint-1, hint, hint+1.
    DateWindow,
}

pub const TIER_ORDER: [LocateTier; 4] = [
    LocateTier::ExactName,
    LocateTier::Alias,
    LocateTier::FirstToken,
    LocateTier::DateWindow,
];

const DATE_WINDOW_OFFSETS: [i64; 3] = [-1, 0, 1];

#[derive(Debug, Clone, Copy)]
pub struct FixtureQuery<'a> {
    pub home_text: &'a str,
    pub away_text: &'a str,
    pub season_year: i32,
    pub date_hint: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LocateOutcome {
    Found {
        fixture: FixtureView,
        tier: LocateTier,
    },
    NotFound,
    Ambiguous {
        tier: LocateTier,
        candidate_ids: Vec<i64>,
    },
}

impl LocateOutcome {
    pub fn fixture(&self) -> Option<&FixtureView> {
        match self {
            LocateOutcome::Found { fixture, .. } => Some(fixture),
            _ => None,
        }
    }

    /// Lifts the two failure shapes into the error taxonomy.
    pub fn into_result(self, what: &str) -> Result<(FixtureView, LocateTier)> {
        match self {
            LocateOutcome::Found { fixture, tier } => Ok((fixture, tier)),
            LocateOutcome::NotFound => Err(ReconError::NotFound(what.to_string())),
            LocateOutcome::Ambiguous { candidate_ids, .. } => Err(ReconError::AmbiguousMatch {
                what: what.to_string(),
                candidate_ids,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TierVerdict {
    Hit(FixtureView),
    Miss,
    Ambiguous(Vec<i64>),
}

impl TierVerdict {
    fn from_best(mut best: Vec<FixtureView>) -> Self {
        match best.len() {
            0 => TierVerdict::Miss,
            1 => TierVerdict::Hit(best.remove(0)),
            _ => TierVerdict::Ambiguous(best.iter().map(|v| v.fixture.id).collect()),
        }
    }
}

pub fn find_fixture(conn: &Connection, query: &FixtureQuery<'_>) -> Result<LocateOutcome> {
    Ok(find_fixture_traced(conn, query)?.0)
}

/// Like [`find_fixture`], also returning the tiers that were actually run.
pub fn find_fixture_traced(
    conn: &Connection,
    query: &FixtureQuery<'_>,
) -> Result<(LocateOutcome, Vec<LocateTier>)> {
    let mut evaluated = Vec::new();
    for tier in TIER_ORDER {
        if tier == LocateTier::DateWindow && query.date_hint.is_none() {
            continue;
        }
        evaluated.push(tier);
        match run_tier(conn, tier, query)? {
            TierVerdict::Hit(fixture) => {
                debug!(?tier, fixture_id = fixture.fixture.id, "fixture located");
                return Ok((LocateOutcome::Found { fixture, tier }, evaluated));
            }
            TierVerdict::Ambiguous(candidate_ids) => {
                warn!(
                    ?tier,
                    home = query.home_text,
                    away = query.away_text,
                    ?candidate_ids,
                    "ambiguous fixture match"
                );
                return Ok((
                    LocateOutcome::Ambiguous {
                        tier,
                        candidate_ids,
                    },
                    evaluated,
                ));
            }
            TierVerdict::Miss => debug!(?tier, "tier found nothing"),
        }
    }
    Ok((LocateOutcome::NotFound, evaluated))
}

fn run_tier(conn: &Connection, tier: LocateTier, query: &FixtureQuery<'_>) -> Result<TierVerdict> {
    match tier {
        LocateTier::ExactName => {
            let candidates = db::fixtures_in_season(conn, query.season_year, query.date_hint)?;
            Ok(match_exact_names(&candidates, query.home_text, query.away_text))
        }
        LocateTier::Alias => {
            let Some(home) = alias::lookup_team(conn, query.home_text)? else {
                return Ok(TierVerdict::Miss);
            };
            let Some(away) = alias::lookup_team(conn, query.away_text)? else {
                return Ok(TierVerdict::Miss);
            };
            let candidates = db::fixtures_in_season(conn, query.season_year, query.date_hint)?;
            Ok(match_team_ids(&candidates, home.team_id, away.team_id))
        }
        LocateTier::FirstToken => {
            let candidates = db::fixtures_in_season(conn, query.season_year, query.date_hint)?;
            Ok(match_first_tokens(
                &candidates,
                query.home_text,
                query.away_text,
            ))
        }
        LocateTier::DateWindow => {
            let Some(hint) = query.date_hint else {
                return Ok(TierVerdict::Miss);
            };
            for offset in DATE_WINDOW_OFFSETS {
                let Some(date) = shift_date(hint, offset) else {
                    continue;
                };
                let candidates = db::fixtures_in_season(conn, query.season_year, Some(date))?;
                let verdict = match_exact_names(&candidates, query.home_text, query.away_text);
                if verdict != TierVerdict::Miss {
                    return Ok(verdict);
                }
            }
            Ok(TierVerdict::Miss)
        }
    }
}

fn shift_date(date: NaiveDate, offset: i64) -> Option<NaiveDate> {
    let days = Days::new(offset.unsigned_abs());
    if offset < 0 {
        date.checked_sub_days(days)
    } else {
        date.checked_add_days(days)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn first_token(text: &str) -> Option<String> {
    text.split_whitespace().next().map(str::to_lowercase)
}

fn match_exact_names(candidates: &[FixtureView], home: &str, away: &str) -> TierVerdict {
    let hits = candidates
        .iter()
        .filter(|c| same_name(&c.home_name, home) && same_name(&c.away_name, away))
        .cloned()
        .collect();
    TierVerdict::from_best(hits)
}

fn match_team_ids(candidates: &[FixtureView], home_id: i64, away_id: i64) -> TierVerdict {
    let hits = candidates
        .iter()
        .filter(|c| c.fixture.home_team_id == home_id && c.fixture.away_team_id == away_id)
        .cloned()
        .collect();
    TierVerdict::from_best(hits)
}

fn match_first_tokens(candidates: &[FixtureView], home: &str, away: &str) -> TierVerdict {
    let (Some(home_token), Some(away_token)) = (first_token(home), first_token(away)) else {
        return TierVerdict::Miss;
    };

    let mut ranked = candidates
        .iter()
        .filter(|c| {
            c.home_name.to_lowercase().contains(&home_token)
                && c.away_name.to_lowercase().contains(&away_token)
        })
        .map(|c| {
            let rank = usize::from(same_name(&c.home_name, home))
                + usize::from(same_name(&c.away_name, away));
            (rank, c)
        })
        .collect::<Vec<_>>();

    let Some(top) = ranked.iter().map(|(rank, _)| *rank).max() else {
        return TierVerdict::Miss;
    };
    ranked.retain(|(rank, _)| *rank == top);
    TierVerdict::from_best(ranked.into_iter().map(|(_, c)| c.clone()).collect())
}
