use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use premstats_recon::alias::{self, SeedSummary};
use premstats_recon::config::{
    self, ENV_ALIAS_MAPPING, ENV_DB_PATH, ENV_MINUTE_POLICY, ReconConfig,
};
use premstats_recon::db;
use premstats_recon::importer::MinutePolicy;
use premstats_recon::locator::{self, FixtureQuery, LocateOutcome};
use premstats_recon::reconcile::{self, RecordStatus};

#[derive(Parser, Debug)]
#[command(name = "premstats-recon")]
#[command(about = "Reconcile verified historical match facts into the fixture store")]
#[command(version)]
struct Cli {
    /// SQLite store path
    #[arg(long, global = true, env = ENV_DB_PATH)]
    db: Option<PathBuf>,

    /// What to do with goal minutes outside 1..=120 (reject|clamp)
    #[arg(long, global = true, env = ENV_MINUTE_POLICY)]
    minute_policy: Option<MinutePolicy>,

    /// JSON file of canonical name -> name variants
    #[arg(long, global = true, env = ENV_ALIAS_MAPPING)]
    aliases: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a JSON batch of verified match records
    Run {
        #[arg(long)]
        batch: PathBuf,
        /// Print the full summary as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Register canonical names, plus the alias mapping if one is configured
    SeedAliases,
    /// Resolve free text to a team
    Lookup { text: String },
    /// Locate a fixture and show which tiers ran
    Locate {
        home: String,
        away: String,
        #[arg(long)]
        season: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let mut conn = db::open_db(&config.db_path)
        .with_context(|| format!("open sqlite db {}", config.db_path.display()))?;
    info!(db = %config.db_path.display(), policy = %config.minute_policy, "store opened");

    match &cli.command {
        Command::Run { batch, json } => run_batch(&mut conn, &config, batch, *json),
        Command::SeedAliases => {
            let summary = seed_aliases(&conn, &config)?;
            print_seed_summary(&summary);
            Ok(())
        }
        Command::Lookup { text } => {
            match alias::lookup_team(&conn, text).context("lookup team")? {
                Some(hit) => println!(
                    "{} -> {} (team {}, {} {}%)",
                    text, hit.canonical_name, hit.team_id, hit.alias_type, hit.confidence
                ),
                None => println!("{text} -> no team"),
            }
            Ok(())
        }
        Command::Locate {
            home,
            away,
            season,
            date,
        } => {
            let query = FixtureQuery {
                home_text: home,
                away_text: away,
                season_year: *season,
                date_hint: *date,
            };
            let (outcome, tiers) =
                locator::find_fixture_traced(&conn, &query).context("locate fixture")?;
            println!("Tiers run: {tiers:?}");
            match outcome {
                LocateOutcome::Found { fixture, tier } => println!(
                    "fixture {}: {} v {} at {} (season {}, via {:?})",
                    fixture.fixture.id,
                    fixture.home_name,
                    fixture.away_name,
                    fixture.fixture.match_timestamp,
                    fixture.season_year,
                    tier
                ),
                LocateOutcome::NotFound => println!("no fixture"),
                LocateOutcome::Ambiguous {
                    tier,
                    candidate_ids,
                } => println!("ambiguous at {tier:?}: {candidate_ids:?}"),
            }
            Ok(())
        }
    }
}

/// CLI flags (and their env fallbacks, via clap) win over the rest of the environment.
fn resolve_config(cli: &Cli) -> Result<ReconConfig> {
    let mut overrides = HashMap::new();
    if let Some(path) = &cli.db {
        overrides.insert(ENV_DB_PATH, path.display().to_string());
    }
    if let Some(policy) = cli.minute_policy {
        overrides.insert(ENV_MINUTE_POLICY, policy.to_string());
    }
    if let Some(path) = &cli.aliases {
        overrides.insert(ENV_ALIAS_MAPPING, path.display().to_string());
    }
    ReconConfig::from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })
    .context("resolve configuration")
}

fn seed_aliases(conn: &Connection, config: &ReconConfig) -> Result<SeedSummary> {
    let mut summary = alias::seed_canonical_aliases(conn).context("seed canonical aliases")?;
    if let Some(path) = &config.alias_mapping {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read alias mapping {}", path.display()))?;
        let mapping = alias::parse_alias_mapping(&raw)?;
        let source = path.display().to_string();
        let mapped =
            alias::seed_from_mapping(conn, &mapping, &source).context("seed alias mapping")?;
        summary.inserted += mapped.inserted;
        summary.skipped += mapped.skipped;
        summary.unknown_teams.extend(mapped.unknown_teams);
    }
    Ok(summary)
}

fn print_seed_summary(summary: &SeedSummary) {
    println!("Alias seeding complete");
    println!("Inserted: {}", summary.inserted);
    println!("Already present: {}", summary.skipped);
    if !summary.unknown_teams.is_empty() {
        println!("Unknown teams: {}", summary.unknown_teams.join(", "));
    }
}

fn run_batch(conn: &mut Connection, config: &ReconConfig, batch: &Path, json: bool) -> Result<()> {
    let seeded = seed_aliases(conn, config)?;
    info!(inserted = seeded.inserted, "aliases seeded before run");

    let raw = std::fs::read_to_string(batch)
        .with_context(|| format!("read batch file {}", batch.display()))?;
    let records = reconcile::parse_batch(&raw)?;
    let summary = reconcile::reconcile_batch(conn, &records, config.minute_policy)
        .context("reconcile batch")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize summary")?
        );
        return Ok(());
    }

    println!("Reconciliation complete (run {})", summary.run_id);
    println!("DB: {}", config.db_path.display());
    println!(
        "Records: {}/{} matched, {} reconciled",
        summary.records_matched, summary.records_total, summary.records_reconciled
    );
    println!(
        "Goals: {} imported, {} rejected",
        summary.goals_imported, summary.goals_rejected
    );
    println!(
        "Quality: perfect={} good={} poor={}",
        summary.perfect, summary.good, summary.poor
    );

    for result in &summary.results {
        let status = match &result.status {
            RecordStatus::Reconciled => result
                .classification()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "reconciled".to_string()),
            RecordStatus::Unmatched => "unmatched".to_string(),
            RecordStatus::Ambiguous { candidates } => format!("ambiguous {candidates:?}"),
            RecordStatus::Failed { reason } => format!("failed: {reason}"),
        };
        println!(
            "{}: {} fixture={}",
            result.label,
            status,
            result
                .fixture_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
        for warning in result.warnings.iter().take(6) {
            println!("   - {warning}");
        }
    }

    Ok(())
}
