use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alias;
use crate::db::{self, FixtureView};
use crate::error::{ReconError, Result};
use crate::players;

pub const MIN_MINUTE: i32 = 1;
pub const MAX_MINUTE: i32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalInput {
    pub player_text: String,
    pub team_text: String,
    pub minute: i32,
}

/// What to do with a goal minute outside `1..=120`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinutePolicy {
    #[default]
    Reject,
    Clamp,
}

impl MinutePolicy {
    fn apply(self, minute: i32) -> Option<i32> {
        match self {
            MinutePolicy::Reject => (MIN_MINUTE..=MAX_MINUTE).contains(&minute).then_some(minute),
            MinutePolicy::Clamp => Some(minute.clamp(MIN_MINUTE, MAX_MINUTE)),
        }
    }
}

impl fmt::Display for MinutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinutePolicy::Reject => f.write_str("reject"),
            MinutePolicy::Clamp => f.write_str("clamp"),
        }
    }
}

impl FromStr for MinutePolicy {
    type Err = ReconError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(MinutePolicy::Reject),
            "clamp" => Ok(MinutePolicy::Clamp),
            other => Err(ReconError::InvalidInput(format!(
                "unknown minute policy {other:?} (expected reject|clamp)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Team text matches neither side, directly or through an alias.
    UnknownTeam { team_text: String },
    /// Team resolved, but it did not play in this fixture.
    TeamNotInFixture { team_text: String, team_id: i64 },
    MinuteOutOfRange { minute: i32 },
    BlankPlayer,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownTeam { team_text } => write!(f, "unknown team {team_text:?}"),
            RejectReason::TeamNotInFixture { team_text, team_id } => {
                write!(f, "team {team_text:?} (id {team_id}) not in fixture")
            }
            RejectReason::MinuteOutOfRange { minute } => {
                write!(f, "minute {minute} outside {MIN_MINUTE}..={MAX_MINUTE}")
            }
            RejectReason::BlankPlayer => f.write_str("blank player name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedGoal {
    pub event: GoalInput,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub rejected: Vec<RejectedGoal>,
}

struct AcceptedGoal {
    team_id: i64,
    minute: i32,
}

/// Replaces every goal event of `fixture_id` with `events`.
///
/// Delete and inserts share one transaction: a failure part-way leaves the
/// previous event list intact. Events that cannot be attributed are rejected
/// individually and the rest still land.
pub fn import_goals(
    conn: &mut Connection,
    fixture_id: i64,
    events: &[GoalInput],
    policy: MinutePolicy,
) -> Result<ImportOutcome> {
    let tx = conn.transaction()?;
    let view = db::load_fixture_view(&tx, fixture_id)?;

    let removed = tx.execute(
        "DELETE FROM goal_events WHERE fixture_id = ?1",
        params![fixture_id],
    )?;

    let mut outcome = ImportOutcome::default();
    for event in events {
        let accepted = match check_event(&tx, &view, event, policy)? {
            Ok(accepted) => accepted,
            Err(reason) => {
                warn!(fixture_id, player = %event.player_text, %reason, "goal event rejected");
                outcome.rejected.push(RejectedGoal {
                    event: event.clone(),
                    reason,
                });
                continue;
            }
        };

        let player = players::resolve_player(&tx, &event.player_text)?;
        tx.execute(
            "INSERT INTO goal_events(fixture_id, player_id, team_id, minute, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fixture_id,
                player.id,
                accepted.team_id,
                accepted.minute,
                Utc::now().to_rfc3339()
            ],
        )?;
        outcome.imported += 1;
    }

    tx.commit()?;
    info!(
        fixture_id,
        removed,
        imported = outcome.imported,
        rejected = outcome.rejected.len(),
        "goal events replaced"
    );
    Ok(outcome)
}

/// Outer error is the store; inner error is a per-event rejection.
fn check_event(
    conn: &Connection,
    view: &FixtureView,
    event: &GoalInput,
    policy: MinutePolicy,
) -> Result<std::result::Result<AcceptedGoal, RejectReason>> {
    let team_id = match resolve_side(conn, view, &event.team_text)? {
        Ok(team_id) => team_id,
        Err(reason) => return Ok(Err(reason)),
    };
    let Some(minute) = policy.apply(event.minute) else {
        return Ok(Err(RejectReason::MinuteOutOfRange {
            minute: event.minute,
        }));
    };
    if event.player_text.trim().is_empty() {
        return Ok(Err(RejectReason::BlankPlayer));
    }
    Ok(Ok(AcceptedGoal { team_id, minute }))
}

fn resolve_side(
    conn: &Connection,
    view: &FixtureView,
    team_text: &str,
) -> Result<std::result::Result<i64, RejectReason>> {
    let text = team_text.trim();
    if text.eq_ignore_ascii_case(view.home_name.trim()) {
        return Ok(Ok(view.fixture.home_team_id));
    }
    if text.eq_ignore_ascii_case(view.away_name.trim()) {
        return Ok(Ok(view.fixture.away_team_id));
    }

    let Some(resolved) = alias::lookup_team(conn, text)? else {
        return Ok(Err(RejectReason::UnknownTeam {
            team_text: text.to_string(),
        }));
    };
    if view.fixture.has_team(resolved.team_id) {
        Ok(Ok(resolved.team_id))
    } else {
        Ok(Err(RejectReason::TeamNotInFixture {
            team_text: text.to_string(),
            team_id: resolved.team_id,
        }))
    }
}
