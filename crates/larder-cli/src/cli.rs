//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Larder - Parse grocery receipts into structured pantry data
#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Hybrid heuristic/LLM grocery receipt parser", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "larder.db", global = true)]
    pub db: PathBuf,

    /// Config override file (falls back to data dir, then embedded defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a receipt from an OCR text file ("-" reads stdin)
    Parse {
        /// Path to OCR text file
        #[arg(short, long)]
        file: PathBuf,

        /// Store name hint
        #[arg(short, long)]
        store: Option<String>,

        /// Skip routing and always invoke the LLM
        #[arg(long)]
        force_llm: bool,

        /// Household scope for alias resolution
        #[arg(long)]
        household: Option<i64>,

        /// Emit the full outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Manage learned alias rules
    Aliases {
        #[command(subcommand)]
        action: Option<AliasesAction>,
    },

    /// Show database, alias, and backend status
    Status,
}

#[derive(Subcommand)]
pub enum AliasesAction {
    /// List rules, most recently used first
    List {
        /// Maximum rules to show
        #[arg(short, long, default_value = "25")]
        limit: i64,

        /// Restrict to one household's rules
        #[arg(long)]
        household: Option<i64>,
    },

    /// Learn a rule from a correction
    Learn {
        /// Raw receipt text the rule should match
        text: String,

        /// Ingredient class it resolves to
        class: String,

        /// Restrict the rule to one merchant
        #[arg(short, long)]
        merchant: Option<String>,

        /// Restrict the rule to one household
        #[arg(long)]
        household: Option<i64>,
    },

    /// Delete a rule by id
    Delete {
        /// Rule id
        id: i64,
    },

    /// Show confidence statistics, optionally scoped to one household
    Stats {
        /// Restrict to one household's rules
        #[arg(long)]
        household: Option<i64>,
    },

    /// Delete low-confidence rules outside the maintenance cycle
    Prune {
        /// Confidence threshold below which non-user rules are deleted
        #[arg(short, long)]
        threshold: f64,

        /// Minimum rule age in days
        #[arg(long, default_value = "14")]
        min_age_days: i64,
    },

    /// Run one decay/boost/prune maintenance cycle
    Maintain,
}
