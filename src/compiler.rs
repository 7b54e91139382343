//! Front end for turning plain-language policy lines into compiled rules.
//!
//! The translation itself is a single request to a language model, hidden
//! behind [`LanguageModel`]. This module builds the prompt, parses the reply,
//! and writes the resulting rules document.

use std::path::Path;

use crate::error::{Error, Result};
use crate::rules::{CompiledRule, RulesDocument};

/// Instructions sent ahead of the user's rules.
pub const COMPILER_PROMPT: &str = r#"You are a rule extractor. Convert user rules into structured JSON.

Rules:
- "don't allow" / "never" / "block" → action: "block"
- "ask me" / "prompt me" / "before X" → action: "require_approval" (NEVER "allow")
- "allow" → action: "allow"

Output ONLY valid JSON: { "rules": [ { "action": "...", "tool": "...", "reason": "..." } ] }
Include tool names when inferable (e.g. gmail.delete, gmail.batchDelete for email delete).
"#;

/// Starter policy written when a user has no rules yet.
pub const STARTER_RULES: &str = "\
# AI Permissions - edit, then compile into rules.json
- block gmail.delete and gmail.batchDelete - never auto-delete emails
- require approval before exec, bash, or process - ask before running commands
- require approval before write, edit, apply_patch - ask before file changes
- allow read, search, list - safe read-only operations
";

/// Opaque text-completion capability.
pub trait LanguageModel {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<F> LanguageModel for F
where
    F: Fn(&str) -> Result<String>,
{
    fn complete(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// Extract rule lines (`- ...`) from a plain-rules list, dropping the marker
/// and any surrounding quotes.
pub fn parse_plain_rules(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-'))
        .map(|rest| {
            rest.trim_start()
                .trim_start_matches(['"', '\''])
                .trim_end_matches(['"', '\''])
                .trim()
                .to_string()
        })
        .filter(|rule| !rule.is_empty())
        .collect()
}

/// Full prompt for a list of plain-language rules.
pub fn build_prompt(plain_rules: &[String]) -> String {
    let listed: Vec<String> = plain_rules.iter().map(|r| format!("- {r}")).collect();
    format!("{COMPILER_PROMPT}\n\nUser rules:\n{}", listed.join("\n"))
}

/// Ask the model to compile `plain_rules` and parse its JSON reply.
pub fn compile(plain_rules: &[String], model: &dyn LanguageModel) -> Result<Vec<CompiledRule>> {
    let raw = model.complete(&build_prompt(plain_rules))?;
    let doc: RulesDocument =
        serde_json::from_str(strip_code_fence(&raw)).map_err(Error::InvalidCompilerOutput)?;
    log::info!("compiled {} rule(s) from {} line(s)", doc.rules.len(), plain_rules.len());
    Ok(doc.rules)
}

/// Models often wrap JSON in a fenced code block; take the inside if so.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Write [`STARTER_RULES`] to `path` unless a plain-rules file is already
/// there. Returns true when the starter file was created.
pub fn ensure_plain_rules(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, STARTER_RULES).map_err(io_err)?;
    log::info!("created {} with starter rules", path.display());
    Ok(true)
}

/// Plain-language rules from `path`, seeding it with the starter policy first
/// if it does not exist.
pub fn read_plain_rules(path: &Path) -> Result<Vec<String>> {
    ensure_plain_rules(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_plain_rules(&text))
}

/// Write `{"rules": [...]}` as pretty JSON, creating parent directories.
pub fn write_rules_file(path: &Path, rules: &[CompiledRule]) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let doc = RulesDocument {
        rules: rules.to_vec(),
    };
    let content = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, content).map_err(io_err)
}
