mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "handin",
    about = "Course submission monitor, group registry, and leaderboard",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitoring pass: discover, grade, and publish
    Monitor {
        /// Monitor configuration file
        config: PathBuf,
    },

    /// Register the submitting user into a project group
    Groups {
        /// Group membership database
        groups_db: PathBuf,
        /// Submission tar containing group.txt
        submission: PathBuf,
    },

    /// Score a submission and update the competition leaderboard
    Leaderboard {
        /// Group membership database
        groups_db: PathBuf,
        /// Leaderboard database
        board_db: PathBuf,
        /// Ground-truth answer file
        answers: PathBuf,
        /// Submission tar containing submit.txt
        submission: PathBuf,

        /// Minimum seconds between scored submissions per team
        #[arg(long, default_value_t = 18_000)]
        min_interval_secs: u64,

        /// Rendered leaderboard page (default: next to the board database)
        #[arg(long)]
        page: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Monitor { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Monitor { config } => cmd::monitor::run(&config),
        Commands::Groups {
            groups_db,
            submission,
        } => cmd::groups::run(&groups_db, &submission, cli.json),
        Commands::Leaderboard {
            groups_db,
            board_db,
            answers,
            submission,
            min_interval_secs,
            page,
        } => cmd::leaderboard::run(
            &groups_db,
            &board_db,
            &answers,
            &submission,
            min_interval_secs,
            page.as_deref(),
            cli.json,
        ),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
