use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Alias, team, fixture or player lookup came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one equally-ranked fixture candidate. Never auto-resolved.
    #[error("ambiguous match: {what} ({} candidates)", .candidate_ids.len())]
    AmbiguousMatch {
        what: String,
        candidate_ids: Vec<i64>,
    },

    /// Season reclassification needs a season row that does not exist.
    #[error("no season row for year {0}")]
    SeasonMissing(i32),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl ReconError {
    /// True when the store itself is gone and the rest of the batch cannot run.
    pub fn is_fatal(&self) -> bool {
        let ReconError::Store(err) = self else {
            return false;
        };
        match err {
            rusqlite::Error::SqliteFailure(failure, _) => matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
            ),
            rusqlite::Error::InvalidPath(_) => true,
            _ => false,
        }
    }
}
