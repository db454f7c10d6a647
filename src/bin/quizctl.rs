//! Offline maintenance for the challenge database: importing MegaVul, and schema setup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rand::SeedableRng;
use rand::rngs::StdRng;

use vulnquiz::config::{self, ImportConfig};
use vulnquiz::models::Difficulty;
use vulnquiz::{importer, quizdb};

#[derive(Debug, Parser)]
#[command(name = "quizctl", about = "Manage the vulnerability quiz database", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the database from a MegaVul JSON export. Existing contents are deleted.
    Import {
        /// MegaVul "simple" JSON file (a single array of records).
        #[arg(short, long, default_value = "megavul_simple.json")]
        input: PathBuf,
        #[arg(short, long, default_value = config::DEFAULT_DATABASE)]
        database: PathBuf,
        /// Maximum challenges kept per CWE.
        #[arg(long, default_value_t = config::DEFAULT_MAX_PER_CWE)]
        max_per_cwe: usize,
        /// CWE exempt from the per-CWE cap.
        #[arg(long, default_value = config::DEFAULT_UNLIMITED_CWE)]
        unlimited_cwe: String,
        /// Difficulty assigned to every imported challenge.
        #[arg(long, default_value = "easy")]
        difficulty: Difficulty,
        /// Rows inserted per transaction.
        #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Seed for the sampling RNG, for reproducible imports.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Create any missing tables and indexes.
    InitDb {
        #[arg(short, long, default_value = config::DEFAULT_DATABASE)]
        database: PathBuf,
        /// Drop every user and their progress. Challenges are kept.
        #[arg(long, default_value_t = false)]
        reset_users: bool,
    },
    /// Print how many challenges the database holds, per CWE.
    Stats {
        #[arg(short, long, default_value = config::DEFAULT_DATABASE)]
        database: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    match Cli::parse().command {
        Command::Import { input, database, max_per_cwe, unlimited_cwe, difficulty, batch_size, seed } => {
            let config = ImportConfig {
                input,
                database,
                max_per_cwe,
                unlimited_cwe,
                difficulty,
                batch_size,
                ..Default::default()
            };

            let report = match seed {
                Some(seed) => importer::run_import(&config, &mut StdRng::seed_from_u64(seed)),
                None => importer::run_import(&config, &mut rand::rng()),
            }
            .context("Import failed")?;

            println!("{report}");
            println!("Database '{}' populated.", config.database.display());
        }
        Command::InitDb { database, reset_users } => {
            let connection = quizdb::connect(&database)
                .with_context(|| format!("Could not open database {}", database.display()))?;

            if reset_users {
                quizdb::reset_users(&connection).context("Could not reset users")?;
                println!("Users and progress dropped.");
            }
            quizdb::initialize_db(&connection).context("Could not initialize database")?;
            println!("Database '{}' is ready.", database.display());
        }
        Command::Stats { database } => {
            if !database.exists() {
                anyhow::bail!("Database '{}' does not exist.", database.display());
            }
            let connection = quizdb::connect(&database)
                .with_context(|| format!("Could not open database {}", database.display()))?;

            println!("Challenges: {}", quizdb::count_challenges(&connection)?);
            for (cwe_id, count) in quizdb::count_challenges_by_cwe(&connection)? {
                println!("\t{cwe_id}: {count}");
            }
        }
    }

    Ok(())
}
