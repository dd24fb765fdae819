use std::path::PathBuf;

use crate::error::{ReconError, Result};
use crate::importer::MinutePolicy;

pub const ENV_DB_PATH: &str = "RECON_DB_PATH";
pub const ENV_MINUTE_POLICY: &str = "RECON_MINUTE_POLICY";
pub const ENV_ALIAS_MAPPING: &str = "RECON_ALIAS_MAPPING";

const CACHE_DIR: &str = "premstats_recon";
const DB_FILE: &str = "premstats.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconConfig {
    pub db_path: PathBuf,
    pub minute_policy: MinutePolicy,
    pub alias_mapping: Option<PathBuf>,
}

impl ReconConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = match non_empty(ENV_DB_PATH) {
            Some(raw) => PathBuf::from(raw.trim()),
            None => default_db_path(&lookup).ok_or_else(|| {
                ReconError::InvalidInput(format!(
                    "no {ENV_DB_PATH}, XDG_CACHE_HOME or HOME to place the database"
                ))
            })?,
        };
        let minute_policy = match non_empty(ENV_MINUTE_POLICY) {
            Some(raw) => raw.parse()?,
            None => MinutePolicy::default(),
        };
        let alias_mapping = non_empty(ENV_ALIAS_MAPPING).map(|raw| PathBuf::from(raw.trim()));

        Ok(Self {
            db_path,
            minute_policy,
            alias_mapping,
        })
    }
}

/// Loads `.env.local` then `.env`; neither overrides variables already set.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// `$XDG_CACHE_HOME/premstats_recon/premstats.sqlite`, else under `~/.cache`.
pub fn default_db_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base) = lookup("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = lookup("HOME")?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}
