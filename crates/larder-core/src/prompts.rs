//! Prompt library for the LLM adapter
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/larder/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to tune prompts without modifying the source, while
//! still getting updated defaults on upgrade.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const PARSE_RECEIPT: &str = include_str!("../../../prompts/parse_receipt.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ParseReceipt,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseReceipt => "parse_receipt",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ParseReceipt]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ParseReceipt => defaults::PARSE_RECEIPT,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    /// Task type hint (structured_extraction, ...)
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    pub is_override: bool,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the prompt with `{{var}}` replacement and `{{#if var}}` blocks
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        let mut result = self.content.clone();
        for (key, value) in vars {
            let pattern = format!("{{{{{}}}}}", key);
            result = result.replace(&pattern, value);
        }
        remove_unmatched_conditionals(&result, vars)
    }

    /// Render just the user section with variables
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        if let Some(user) = self.user_section() {
            let mut result = user.to_string();
            for (key, value) in vars {
                let pattern = format!("{{{{{}}}}}", key);
                result = result.replace(&pattern, value);
            }
            remove_unmatched_conditionals(&result, vars)
        } else {
            self.render(vars)
        }
    }
}

/// Prompt library with override support and an in-memory cache
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Embedded defaults only, no filesystem lookups
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        Ok(self.cache.get(&id).expect("prompt inserted above"))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::InvalidData(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
        })
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        if let Some(ref override_dir) = self.override_dir {
            override_dir.join(format!("{}.md", id.as_str())).exists()
        } else {
            false
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("larder").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::InvalidData(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a `# Header` section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

/// Remove `{{#if var}}...{{/if}}` blocks whose variable is absent or empty
fn remove_unmatched_conditionals(content: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();

    loop {
        if let Some(if_start) = result.find("{{#if ") {
            let var_start = if_start + 6;
            if let Some(var_end) = result[var_start..].find("}}") {
                let var_name = &result[var_start..var_start + var_end];
                let block_start = var_start + var_end + 2;

                if let Some(endif_pos) = result[block_start..].find("{{/if}}") {
                    let block_content = &result[block_start..block_start + endif_pos];
                    let full_end = block_start + endif_pos + 7;

                    let should_include = vars.get(var_name).is_some_and(|v| !v.is_empty());

                    if should_include {
                        result = format!(
                            "{}{}{}",
                            &result[..if_start],
                            block_content,
                            &result[full_end..]
                        );
                    } else {
                        result = format!("{}{}", &result[..if_start], &result[full_end..]);
                    }
                    continue;
                }
            }
        }
        break;
    }

    result
}
