//! Path protection: dangerous (file-writing) tools may never target protected paths.
//!
//! This check runs ahead of rule matching and cannot be overridden by any rule,
//! which keeps the rules file and the engine's config directory out of the
//! agent's reach.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::eval::ToolCall;

/// Generic file-writing tool names.
pub const DEFAULT_DANGEROUS_TOOLS: &[&str] = &[
    "filesystem.write",
    "filesystem.edit",
    "write_file",
    "edit_file",
    "writeFile",
    "fs.writeFile",
];

/// File tools exposed by the agent host itself.
pub const HOST_DANGEROUS_TOOLS: &[&str] = &["write", "edit", "apply_patch"];

pub const DEFAULT_PROTECTED_PATTERNS: &[&str] =
    &["**/rules*.json", "**/.config/ai-permissions-layer/**"];

/// Block reason reported for a protected-path violation.
pub const PROTECTED_PATH_REASON: &str = "Protected path: rules cannot be modified by agent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathProtectionConfig {
    pub dangerous_tools: Vec<String>,
    pub protected_patterns: Vec<String>,
}

impl Default for PathProtectionConfig {
    fn default() -> Self {
        Self {
            dangerous_tools: DEFAULT_DANGEROUS_TOOLS
                .iter()
                .chain(HOST_DANGEROUS_TOOLS)
                .map(|s| s.to_string())
                .collect(),
            protected_patterns: DEFAULT_PROTECTED_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Compiled form of a [`PathProtectionConfig`].
#[derive(Debug, Clone)]
pub struct PathProtection {
    dangerous_tools: Vec<String>,
    protected: GlobSet,
}

impl PathProtection {
    /// Compile the protected patterns. Invalid globs are logged and skipped.
    pub fn new(config: &PathProtectionConfig) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.protected_patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => log::warn!("ignoring invalid protected pattern {pattern:?}: {e}"),
            }
        }
        let protected = builder.build().unwrap_or_else(|e| {
            log::warn!("protected patterns failed to build: {e}");
            GlobSet::empty()
        });

        Self {
            dangerous_tools: config.dangerous_tools.clone(),
            protected,
        }
    }

    pub fn is_dangerous(&self, tool_name: &str) -> bool {
        self.dangerous_tools.iter().any(|t| t == tool_name)
    }

    /// True iff the tool is dangerous and its path argument hits a protected glob.
    pub fn is_violation(&self, call: &ToolCall) -> bool {
        if !self.is_dangerous(&call.tool_name) {
            return false;
        }
        let Some(path) = call.path_arg() else {
            return false;
        };
        let normalized = path.replace('\\', "/");
        self.protected.is_match(normalized.as_str())
    }
}

impl Default for PathProtection {
    fn default() -> Self {
        Self::new(&PathProtectionConfig::default())
    }
}

/// One-shot check without keeping the compiled globs around.
pub fn is_protected_path_violation(call: &ToolCall, config: &PathProtectionConfig) -> bool {
    PathProtection::new(config).is_violation(call)
}
