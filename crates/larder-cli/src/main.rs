//! Larder CLI - Grocery receipt parser
//!
//! Usage:
//!   larder parse --file receipt.txt      Parse OCR text
//!   larder aliases list                  Show learned alias rules
//!   larder aliases learn "GV WHL MILK" milk
//!   larder status                        Show database and backend status

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    tracing::debug!(db = %cli.db.display(), "starting larder");

    match cli.command {
        Commands::Parse {
            file,
            store,
            force_llm,
            household,
            json,
        } => {
            commands::cmd_parse(
                &cli.db,
                cli.config.as_ref(),
                &file,
                store.as_deref(),
                force_llm,
                household,
                json,
            )
            .await
        }
        Commands::Aliases { action } => {
            let config = commands::load_config(cli.config.as_ref())?;
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(AliasesAction::List {
                    limit: 25,
                    household: None,
                }) => commands::cmd_aliases_list(&db, 25, None),
                Some(AliasesAction::List { limit, household }) => {
                    commands::cmd_aliases_list(&db, limit, household)
                }
                Some(AliasesAction::Learn {
                    text,
                    class,
                    merchant,
                    household,
                }) => commands::cmd_aliases_learn(
                    &db,
                    &config,
                    &text,
                    &class,
                    merchant.as_deref(),
                    household,
                ),
                Some(AliasesAction::Delete { id }) => commands::cmd_aliases_delete(&db, id),
                Some(AliasesAction::Stats { household }) => {
                    commands::cmd_aliases_stats(&db, &config, household)
                }
                Some(AliasesAction::Prune {
                    threshold,
                    min_age_days,
                }) => commands::cmd_aliases_prune(&db, threshold, min_age_days),
                Some(AliasesAction::Maintain) => commands::cmd_aliases_maintain(&db, &config),
            }
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.config.as_ref()).await,
    }
}
