use std::fs;
use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use shift_roster_core::application::roster_store::RosterStore;
use shift_roster_core::config::AppConfig;
use shift_roster_core::domain::models::{RosterPolicy, ShiftCode};
use shift_roster_core::domain::roster_gen::{self, VISIBLE_DAYS};
use shift_roster_core::infrastructure::sqlite_repo::SqliteRepository;
use shift_roster_core::{connect, Result};

#[derive(Parser)]
#[command(name = "roster_tools")]
#[command(version = "0.1.0")]
#[command(about = "Operator tools for rosters and the roster database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the 30-day roster for one employee as JSON
    Generate {
        #[arg(short, long)]
        employee: i64,

        /// First day (YYYY-MM-DD)
        #[arg(short, long)]
        start: NaiveDate,

        /// rotating-6-2 | fixed-6-2 | fixed-5-1
        #[arg(short, long)]
        policy: RosterPolicy,

        /// A, B or C
        #[arg(long, default_value = "A")]
        shift: ShiftCode,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Prints the 8-day roster window stored in the database
    Window {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// First day of the window, defaults to today
        #[arg(short, long)]
        from: Option<NaiveDate>,
    },
}

fn generate(
    employee: i64,
    start: NaiveDate,
    policy: RosterPolicy,
    shift: ShiftCode,
    out: Option<PathBuf>,
) -> Result<()> {
    let roster = roster_gen::generate(employee, start, policy, shift)?;
    let json = serde_json::to_string_pretty(&roster)?;
    match out {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn window(config: Option<PathBuf>, from: Option<NaiveDate>) -> Result<()> {
    let config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let pool = connect(&config.database).await?;
    let mut store = RosterStore::new(std::sync::Arc::new(SqliteRepository::new(pool)));

    let start = from.unwrap_or_else(|| Local::now().date_naive());
    let end = start + Duration::days(VISIBLE_DAYS as i64 - 1);
    let grid = store.load_window(start, end).await?.to_grid();

    let header: Vec<String> = grid.dates.iter().map(|d| d.format("%m-%d").to_string()).collect();
    println!("{:<24} {}", "employee", header.join(" "));
    for row in &grid.rows {
        let cells: Vec<String> = row.cells.iter().map(|c| format!("{:<5}", c.as_str())).collect();
        println!("{:<24} {}", row.name, cells.join(" "));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let result = match args.command {
        Commands::Generate {
            employee,
            start,
            policy,
            shift,
            out,
        } => generate(employee, start, policy, shift, out),
        Commands::Window { config, from } => window(config, from).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
