mod app;
mod commands;
mod render;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rote", about = "Spaced repetition drills over CSV decks", version)]
struct Cli {
    /// Config file (default: <config dir>/rote/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Review as if today were this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show due and total cards per deck
    Decks {
        /// CSV files or directories to load
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Review due cards
    Drill {
        /// CSV files or directories to load
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only drill this deck (repeatable; default: all decks)
        #[arg(long = "deck")]
        decks: Vec<String>,
    },

    /// Show the interval each grade would give a card
    Preview {
        /// CSV files or directories to load
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Card id
        #[arg(long)]
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();
    let today = cli.today.unwrap_or_else(|| chrono::Local::now().date_naive());

    match cli.command {
        Command::Decks { paths } => {
            let app = app::App::load(cli.config.as_deref(), &paths, today)?;
            commands::decks::run(app, &cli.format, use_color)?;
        }
        Command::Drill { paths, decks } => {
            let app = app::App::load(cli.config.as_deref(), &paths, today)?;
            commands::drill::run(app, decks, &cli.format, use_color)?;
        }
        Command::Preview { paths, id } => {
            let app = app::App::load(cli.config.as_deref(), &paths, today)?;
            commands::preview::run(app, &id, &cli.format, use_color)?;
        }
    }

    Ok(())
}

/// Check if stdout is a terminal
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
