use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::db::Player;
use crate::error::{ReconError, Result};

/// Find-or-create by case-insensitive exact name. Variants such as
/// "R. Wilkins" and "Ray Wilkins" stay distinct players.
pub fn resolve_player(conn: &Connection, name: &str) -> Result<Player> {
    let clean = name.trim();
    if clean.is_empty() {
        return Err(ReconError::InvalidInput("empty player name".to_string()));
    }

    if let Some(existing) = find_player(conn, clean)? {
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO players(name, created_at) VALUES (?1, ?2)",
        params![clean, Utc::now().to_rfc3339()],
    )?;
    let id = conn.last_insert_rowid();
    debug!(player = clean, id, "created player");
    Ok(Player {
        id,
        name: clean.to_string(),
    })
}

pub fn find_player(conn: &Connection, name: &str) -> Result<Option<Player>> {
    let player = conn
        .query_row(
            "SELECT id, name FROM players WHERE name = ?1 COLLATE NOCASE ORDER BY id ASC LIMIT 1",
            params![name.trim()],
            |row| {
                Ok(Player {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(player)
}

pub fn count_players(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?)
}
