pub mod alias;
pub mod config;
pub mod corrector;
pub mod db;
pub mod error;
pub mod importer;
pub mod locator;
pub mod players;
pub mod quality;
pub mod reconcile;

pub use error::{ReconError, Result};
