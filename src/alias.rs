use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db;
use crate::error::{ReconError, Result};

pub const CANONICAL_CONFIDENCE: u8 = 100;

/// Declaration order is tie-break priority: earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasType {
    Canonical,
    Alternative,
    Historical,
    Abbreviation,
    Nickname,
}

impl AliasType {
    pub const ALL: [AliasType; 5] = [
        AliasType::Canonical,
        AliasType::Alternative,
        AliasType::Historical,
        AliasType::Abbreviation,
        AliasType::Nickname,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AliasType::Canonical => "canonical",
            AliasType::Alternative => "alternative",
            AliasType::Historical => "historical",
            AliasType::Abbreviation => "abbreviation",
            AliasType::Nickname => "nickname",
        }
    }

    /// Confidence used when seeding from a mapping file without explicit scores.
    pub fn default_confidence(self) -> u8 {
        match self {
            AliasType::Canonical => CANONICAL_CONFIDENCE,
            AliasType::Alternative => 95,
            AliasType::Historical => 90,
            AliasType::Abbreviation => 85,
            AliasType::Nickname => 80,
        }
    }
}

impl fmt::Display for AliasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AliasType {
    type Err = ReconError;

    fn from_str(raw: &str) -> Result<Self> {
        AliasType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| ReconError::InvalidInput(format!("unknown alias type {raw:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMatch {
    pub team_id: i64,
    pub canonical_name: String,
    pub alias_type: AliasType,
    pub confidence: u8,
}

/// Resolves free text to one canonical team. Case-insensitive exact match only.
///
/// Candidates are ranked by confidence, then alias type. When the two best
/// candidates are indistinguishable but name different teams there is no
/// defensible answer, so the lookup reports no match.
pub fn lookup_team(conn: &Connection, text: &str) -> Result<Option<TeamMatch>> {
    let needle = text.trim();
    if needle.is_empty() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT a.team_id, t.canonical_name, a.alias_type, a.confidence_score
         FROM team_aliases a
         JOIN teams t ON t.id = a.team_id
         WHERE a.alias_text = ?1 COLLATE NOCASE
         ORDER BY a.id ASC",
    )?;
    let rows = stmt.query_map(params![needle], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        let (team_id, canonical_name, raw_type, confidence) = row?;
        let alias_type = raw_type.parse::<AliasType>()?;
        candidates.push(TeamMatch {
            team_id,
            canonical_name,
            alias_type,
            confidence: u8::try_from(confidence.clamp(0, 100)).unwrap_or(0),
        });
    }

    let picked = pick_best(candidates);
    match &picked {
        Some(m) => debug!(text = needle, team = %m.canonical_name, "alias resolved"),
        None => debug!(text = needle, "alias not resolved"),
    }
    Ok(picked)
}

fn pick_best(mut candidates: Vec<TeamMatch>) -> Option<TeamMatch> {
    // Stable sort keeps registration order among equal keys.
    candidates.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(a.alias_type.cmp(&b.alias_type))
    });
    let mut iter = candidates.into_iter();
    let best = iter.next()?;
    let contested = iter.any(|other| {
        other.confidence == best.confidence
            && other.alias_type == best.alias_type
            && other.team_id != best.team_id
    });
    if contested {
        warn!(
            alias_type = %best.alias_type,
            confidence = best.confidence,
            "alias maps to several teams with equal rank; treating as unresolved"
        );
        return None;
    }
    Some(best)
}

/// Inserts an alias. A duplicate `(team_id, alias_text)` is a silent no-op;
/// returns whether a new row was written.
pub fn register_alias(
    conn: &Connection,
    team_id: i64,
    alias_text: &str,
    alias_type: AliasType,
    confidence: u8,
    source: &str,
) -> Result<bool> {
    let text = alias_text.trim();
    if text.is_empty() {
        return Err(ReconError::InvalidInput("empty alias text".to_string()));
    }
    if confidence > 100 {
        return Err(ReconError::InvalidInput(format!(
            "confidence {confidence} outside 0..=100"
        )));
    }

    let changed = conn.execute(
        "INSERT INTO team_aliases(
            team_id, alias_text, alias_type, confidence_score, source, created_at
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT DO NOTHING",
        params![
            team_id,
            text,
            alias_type.as_str(),
            confidence,
            source,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub unknown_teams: Vec<String>,
}

/// Registers each team's own name as its canonical alias.
pub fn seed_canonical_aliases(conn: &Connection) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for team in db::load_teams(conn)? {
        let inserted = register_alias(
            conn,
            team.id,
            &team.canonical_name,
            AliasType::Canonical,
            CANONICAL_CONFIDENCE,
            "database",
        )?;
        if inserted {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamNameVariants {
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub historical: Vec<String>,
    #[serde(default)]
    pub abbreviations: Vec<String>,
    #[serde(default)]
    pub nicknames: Vec<String>,
}

impl TeamNameVariants {
    fn entries(&self) -> Vec<(AliasType, &str)> {
        let groups = [
            (AliasType::Alternative, &self.alternatives),
            (AliasType::Historical, &self.historical),
            (AliasType::Abbreviation, &self.abbreviations),
            (AliasType::Nickname, &self.nicknames),
        ];
        groups
            .into_iter()
            .flat_map(|(alias_type, list)| list.iter().map(move |s| (alias_type, s.as_str())))
            .collect()
    }
}

/// Canonical team name -> name variants, as curated by hand.
pub type AliasMapping = BTreeMap<String, TeamNameVariants>;

pub fn parse_alias_mapping(raw: &str) -> Result<AliasMapping> {
    serde_json::from_str(raw.trim())
        .map_err(|err| ReconError::InvalidInput(format!("alias mapping json: {err}")))
}

pub fn seed_from_mapping(
    conn: &Connection,
    mapping: &AliasMapping,
    source: &str,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for (canonical, variants) in mapping {
        let Some(team) = db::team_by_canonical_name(conn, canonical)? else {
            warn!(team = %canonical, "alias mapping names a team that is not in the store");
            summary.unknown_teams.push(canonical.clone());
            continue;
        };
        for (alias_type, text) in variants.entries() {
            if text.trim().is_empty() {
                summary.skipped += 1;
                continue;
            }
            let inserted = register_alias(
                conn,
                team.id,
                text,
                alias_type,
                alias_type.default_confidence(),
                source,
            )?;
            if inserted {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(team_id: i64, alias_type: AliasType, confidence: u8) -> TeamMatch {
        TeamMatch {
            team_id,
            canonical_name: format!("Team {team_id}"),
            alias_type,
            confidence,
        }
    }

    #[test]
    fn alias_type_priority_follows_declaration_order() {
        assert!(AliasType::Canonical < AliasType::Alternative);
        assert!(AliasType::Alternative < AliasType::Historical);
        assert!(AliasType::Historical < AliasType::Abbreviation);
        assert!(AliasType::Abbreviation < AliasType::Nickname);
    }

    #[test]
    fn alias_type_round_trips_through_text() {
        for t in AliasType::ALL {
            assert_eq!(t.as_str().parse::<AliasType>().unwrap(), t);
        }
        assert_eq!("NICKNAME".parse::<AliasType>().unwrap(), AliasType::Nickname);
        assert!("slang".parse::<AliasType>().is_err());
    }

    #[test]
    fn highest_confidence_wins() {
        let best = pick_best(vec![
            candidate(1, AliasType::Nickname, 80),
            candidate(2, AliasType::Alternative, 95),
        ])
        .unwrap();
        assert_eq!(best.team_id, 2);
    }

    #[test]
    fn type_priority_breaks_confidence_ties() {
        let best = pick_best(vec![
            candidate(1, AliasType::Nickname, 90),
            candidate(2, AliasType::Historical, 90),
        ])
        .unwrap();
        assert_eq!(best.team_id, 2);
    }

    #[test]
    fn full_tie_between_teams_is_unresolved() {
        assert!(
            pick_best(vec![
                candidate(1, AliasType::Nickname, 80),
                candidate(2, AliasType::Nickname, 80),
            ])
            .is_none()
        );
    }

    #[test]
    fn lower_ranked_rival_does_not_block() {
        let best = pick_best(vec![
            candidate(1, AliasType::Nickname, 80),
            candidate(2, AliasType::Nickname, 85),
        ])
        .unwrap();
        assert_eq!(best.team_id, 2);
    }

    #[test]
    fn mapping_json_parses_partial_variant_lists() {
        let mapping = parse_alias_mapping(
            r#"{"Tottenham Hotspur": {"alternatives": ["Spurs"], "abbreviations": ["TOT"]}}"#,
        )
        .unwrap();
        let spurs = &mapping["Tottenham Hotspur"];
        assert_eq!(
            spurs.entries(),
            vec![
                (AliasType::Alternative, "Spurs"),
                (AliasType::Abbreviation, "TOT")
            ]
        );
    }
}
