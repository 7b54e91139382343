//! Compiled rules: data types, rule sets with cached patterns, and rule sources.
//!
//! Rules are produced by the rule compiler and stored as a JSON document of the
//! form `{"rules": [...]}`. A missing or malformed document loads as an empty
//! rule set, so evaluation falls through to the configured no-match default.

/// Rule matching and precedence.
pub mod matcher;

pub use matcher::match_rules;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::SystemTime;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::eval::{Intent, ToolCall};

/// What a rule does when it matches. Also used for the no-match default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Block,
    #[default]
    RequireApproval,
    Allow,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Block => "block",
            RuleAction::RequireApproval => "require_approval",
            RuleAction::Allow => "allow",
        }
    }

    /// Parse the snake_case form used in config files and CLI flags.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Some(RuleAction::Block),
            "require_approval" => Some(RuleAction::RequireApproval),
            "allow" => Some(RuleAction::Allow),
            _ => None,
        }
    }
}

/// A single structured rule as emitted by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Regex tested (unanchored) against the tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_pattern: Option<String>,
    /// Regex tested case-insensitively against the intent text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_pattern: Option<String>,
    #[serde(default)]
    pub reason: String,
}

impl CompiledRule {
    pub fn for_tool(
        action: RuleAction,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            tool: Some(tool.into()),
            tool_pattern: None,
            intent_pattern: None,
            reason: reason.into(),
        }
    }

    pub fn for_pattern(
        action: RuleAction,
        tool_pattern: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            tool: None,
            tool_pattern: Some(tool_pattern.into()),
            intent_pattern: None,
            reason: reason.into(),
        }
    }

    pub fn with_intent(mut self, intent_pattern: impl Into<String>) -> Self {
        self.intent_pattern = Some(intent_pattern.into());
        self
    }
}

/// Build a standing allow rule for the call's tool, recording today's date.
pub fn create_allow_rule(call: &ToolCall, _intent: &Intent) -> CompiledRule {
    let date = chrono::Utc::now().format("%Y-%m-%d");
    CompiledRule::for_tool(
        RuleAction::Allow,
        call.tool_name.clone(),
        format!("User approved forever on {date}"),
    )
}

/// Optional regex field after compilation.
#[derive(Debug)]
enum Pattern {
    Absent,
    Valid(Regex),
    Invalid,
}

#[derive(Debug)]
struct Patterns {
    tool: Pattern,
    intent: Pattern,
}

fn compile_pattern(source: Option<&str>, case_insensitive: bool, field: &str) -> Pattern {
    let Some(source) = source else {
        return Pattern::Absent;
    };
    match RegexBuilder::new(source)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => Pattern::Valid(re),
        Err(e) => {
            log::warn!("invalid {field} {source:?}, rule disabled: {e}");
            Pattern::Invalid
        }
    }
}

/// A rule plus its lazily compiled patterns.
#[derive(Debug)]
pub struct LoadedRule {
    rule: CompiledRule,
    patterns: OnceLock<Patterns>,
}

impl LoadedRule {
    pub fn new(rule: CompiledRule) -> Self {
        Self {
            rule,
            patterns: OnceLock::new(),
        }
    }

    pub fn rule(&self) -> &CompiledRule {
        &self.rule
    }

    fn patterns(&self) -> &Patterns {
        self.patterns.get_or_init(|| Patterns {
            tool: compile_pattern(self.rule.tool_pattern.as_deref(), false, "toolPattern"),
            intent: compile_pattern(self.rule.intent_pattern.as_deref(), true, "intentPattern"),
        })
    }

    /// Whether this rule is a candidate for the call. A rule with an invalid
    /// pattern is never a candidate.
    pub fn is_candidate(&self, call: &ToolCall, intent: &Intent) -> bool {
        let patterns = self.patterns();
        if matches!(patterns.tool, Pattern::Invalid)
            || matches!(patterns.intent, Pattern::Invalid)
        {
            return false;
        }

        let tool_match = self.rule.tool.as_deref() == Some(call.tool_name.as_str())
            || matches!(&patterns.tool, Pattern::Valid(re) if re.is_match(&call.tool_name));

        let intent_match = match &patterns.intent {
            Pattern::Valid(re) => re.is_match(&intent.text),
            _ => true,
        };

        tool_match && intent_match
    }
}

/// An ordered, immutable list of loaded rules.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<LoadedRule>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RulesDocument {
    #[serde(default)]
    pub(crate) rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        Self {
            rules: rules.into_iter().map(LoadedRule::new).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a `{"rules": [...]}` document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let doc: RulesDocument = serde_json::from_str(json)?;
        Ok(Self::new(doc.rules))
    }

    /// Load a rules file, treating a missing or malformed file as empty.
    pub fn load_or_empty(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("no rules loaded from {}: {e}", path.display());
                return Self::empty();
            }
        };
        match Self::from_json(&content) {
            Ok(set) => set,
            Err(e) => {
                log::warn!("rules file {} is malformed, using no rules: {e}", path.display());
                Self::empty()
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Supplies the current rule set to the engine on every evaluation.
pub trait RuleSource: Send + Sync {
    fn load(&self) -> Arc<RuleSet>;
}

impl RuleSource for Arc<RuleSet> {
    fn load(&self) -> Arc<RuleSet> {
        Arc::clone(self)
    }
}

/// File-backed rule source. Re-reads the file when its modification time or
/// length changes and otherwise reuses the compiled set.
pub struct RuleFile {
    path: PathBuf,
    cache: Mutex<Option<CachedRules>>,
}

struct CachedRules {
    stamp: (Option<SystemTime>, u64),
    rules: Arc<RuleSet>,
}

impl RuleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleSource for RuleFile {
    fn load(&self) -> Arc<RuleSet> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let Ok(meta) = std::fs::metadata(&self.path) else {
            *cache = None;
            return Arc::new(RuleSet::empty());
        };
        let stamp = (meta.modified().ok(), meta.len());

        if let Some(cached) = cache.as_ref()
            && cached.stamp.0.is_some()
            && cached.stamp == stamp
        {
            return Arc::clone(&cached.rules);
        }

        let rules = Arc::new(RuleSet::load_or_empty(&self.path));
        log::debug!("loaded {} rule(s) from {}", rules.len(), self.path.display());
        *cache = Some(CachedRules {
            stamp,
            rules: Arc::clone(&rules),
        });
        rules
    }
}
