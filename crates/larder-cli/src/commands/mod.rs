//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `parse` - Receipt parsing command
//! - `aliases` - Alias rule management commands
//! - `status` - Status command

pub mod aliases;
pub mod parse;
pub mod status;

// Re-export command functions for main.rs
pub use aliases::*;
pub use parse::*;
pub use status::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use larder_core::{Database, PipelineConfig};

/// Open the database, creating it on first use
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Invalid database path: {}", db_path.display()))?;
    Database::new(path_str).with_context(|| format!("Failed to open database at {}", path_str))
}

/// Load pipeline config (explicit override path, data dir, or embedded)
pub fn load_config(override_path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match override_path {
        Some(path) => PipelineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => PipelineConfig::load().context("Failed to load config"),
    }
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}

/// Format integer cents as dollars
pub fn dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_formatting() {
        assert_eq!(dollars(0), "$0.00");
        assert_eq!(dollars(399), "$3.99");
        assert_eq!(dollars(3200), "$32.00");
        assert_eq!(dollars(5), "$0.05");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer string", 10), "a longe...");
    }
}
