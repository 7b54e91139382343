use std::path::PathBuf;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::eval::DEFAULT_INTERNAL_TOOL_PATTERNS;
use crate::protect::PathProtectionConfig;
use crate::rules::RuleAction;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Location of the user overlay, relative to `$HOME`.
pub const USER_CONFIG_PATH: &str = ".config/ai-permissions-layer/config.toml";

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub path_protection: PathProtectionSettings,
    #[serde(default)]
    pub approvals: ApprovalSettings,
    #[serde(default)]
    pub internal_tools: InternalTools,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Decision when no rule matches. Defaults to asking the user.
    #[serde(default)]
    pub default_when_no_match: RuleAction,
    /// Compiled rules file (`{"rules": [...]}`); `~` is expanded.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_when_no_match: RuleAction::default(),
            rules_path: default_rules_path(),
        }
    }
}

fn default_rules_path() -> String {
    "~/.config/ai-permissions-layer/rules.json".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PathProtectionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dangerous_tools")]
    pub dangerous_tools: Vec<String>,
    #[serde(default = "default_protected_patterns")]
    pub protected_patterns: Vec<String>,
}

impl Default for PathProtectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dangerous_tools: default_dangerous_tools(),
            protected_patterns: default_protected_patterns(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dangerous_tools() -> Vec<String> {
    PathProtectionConfig::default().dangerous_tools
}

fn default_protected_patterns() -> Vec<String> {
    PathProtectionConfig::default().protected_patterns
}

impl PathProtectionSettings {
    pub fn to_protection_config(&self) -> PathProtectionConfig {
        PathProtectionConfig {
            dangerous_tools: self.dangerous_tools.clone(),
            protected_patterns: self.protected_patterns.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApprovalSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Also expire approved/denied requests `ttl_secs` after resolution.
    #[serde(default = "default_true")]
    pub expire_resolved: bool,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            expire_resolved: true,
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl ApprovalSettings {
    pub fn ttl(&self) -> TimeDelta {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Case-insensitive regexes for framework tools exempt from policy.
#[derive(Debug, Deserialize, Serialize)]
pub struct InternalTools {
    #[serde(default = "default_internal_patterns")]
    pub patterns: Vec<String>,
}

impl Default for InternalTools {
    fn default() -> Self {
        Self {
            patterns: default_internal_patterns(),
        }
    }
}

fn default_internal_patterns() -> Vec<String> {
    DEFAULT_INTERNAL_TOOL_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    path_protection: PathProtectionOverlay,
    #[serde(default)]
    approvals: ApprovalsOverlay,
    #[serde(default)]
    internal_tools: InternalToolsOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    default_when_no_match: Option<RuleAction>,
    rules_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PathProtectionOverlay {
    enabled: Option<bool>,
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    dangerous_tools: Vec<String>,
    #[serde(default)]
    protected_patterns: Vec<String>,
    #[serde(default)]
    remove_dangerous_tools: Vec<String>,
    #[serde(default)]
    remove_protected_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApprovalsOverlay {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    expire_resolved: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct InternalToolsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    remove_patterns: Vec<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/ai-permissions-layer/config.toml (if exists)
    ///
    /// Lists extend, scalars override. Set `replace = true` in a section to
    /// replace its default lists, or use `remove_<field>` to subtract items.
    /// A malformed overlay is reported and ignored, leaving the defaults.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Absolute path of the user overlay, if `$HOME` is set.
    pub fn user_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(USER_CONFIG_PATH))
    }

    /// Try to load user overlay from ~/.config/ai-permissions-layer/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let path = Self::user_config_path()?;
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("ai-permissions: config parse error: {e}");
                log::warn!("config parse error, using defaults: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.default_when_no_match {
            self.settings.default_when_no_match = v;
        }
        if let Some(v) = s.rules_path {
            self.settings.rules_path = v;
        }

        // Path protection
        let p = overlay.path_protection;
        if let Some(v) = p.enabled {
            self.path_protection.enabled = v;
        }
        merge_list(
            &mut self.path_protection.dangerous_tools,
            p.dangerous_tools,
            &p.remove_dangerous_tools,
            p.replace,
        );
        merge_list(
            &mut self.path_protection.protected_patterns,
            p.protected_patterns,
            &p.remove_protected_patterns,
            p.replace,
        );

        // Approvals
        let a = overlay.approvals;
        if let Some(v) = a.ttl_secs {
            self.approvals.ttl_secs = v;
        }
        if let Some(v) = a.sweep_interval_secs {
            self.approvals.sweep_interval_secs = v;
        }
        if let Some(v) = a.expire_resolved {
            self.approvals.expire_resolved = v;
        }

        // Internal tools
        let i = overlay.internal_tools;
        merge_list(
            &mut self.internal_tools.patterns,
            i.patterns,
            &i.remove_patterns,
            i.replace,
        );
    }

    /// Rules file path with `~` and environment variables expanded.
    pub fn rules_path(&self) -> PathBuf {
        let raw = &self.settings.rules_path;
        match shellexpand::full(raw) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
        }
    }

    /// Path protection with the live rules file and the user overlay added
    /// as literal patterns, so a custom `rules_path` stays out of reach too.
    pub fn protection_config(&self) -> PathProtectionConfig {
        let mut protection = self.path_protection.to_protection_config();
        let own_files = std::iter::once(self.rules_path()).chain(Self::user_config_path());
        for path in own_files {
            let path = path.to_string_lossy().replace('\\', "/");
            let mut literals = vec![globset::escape(&path)];
            if !path.starts_with('/') {
                literals.push(format!("**/{}", globset::escape(&path)));
            }
            for literal in literals {
                if !protection.protected_patterns.contains(&literal) {
                    protection.protected_patterns.push(literal);
                }
            }
        }
        protection
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::{DEFAULT_DANGEROUS_TOOLS, DEFAULT_PROTECTED_PATTERNS, HOST_DANGEROUS_TOOLS};

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert!(config.path_protection.enabled);
        assert!(!config.path_protection.dangerous_tools.is_empty());
        assert!(!config.path_protection.protected_patterns.is_empty());
        assert!(!config.internal_tools.patterns.is_empty());
    }

    #[test]
    fn default_safe_posture() {
        let config = Config::default_config();
        assert_eq!(config.settings.default_when_no_match, RuleAction::RequireApproval);
        assert_eq!(config.approvals.ttl_secs, 3600);
        assert_eq!(config.approvals.sweep_interval_secs, 300);
        assert!(config.approvals.expire_resolved);
    }

    #[test]
    fn default_lists_match_builtin_constants() {
        let config = Config::default_config();
        let expected_tools: Vec<String> = DEFAULT_DANGEROUS_TOOLS
            .iter()
            .chain(HOST_DANGEROUS_TOOLS)
            .map(|s| s.to_string())
            .collect();
        assert_eq!(config.path_protection.dangerous_tools, expected_tools);
        assert_eq!(config.path_protection.protected_patterns, DEFAULT_PROTECTED_PATTERNS);
        assert_eq!(config.internal_tools.patterns, DEFAULT_INTERNAL_TOOL_PATTERNS);
    }

    #[test]
    fn missing_sections_fall_back_safely() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.settings.default_when_no_match, RuleAction::RequireApproval);
        assert_eq!(config.approvals.ttl_secs, 3600);
        assert!(config.approvals.expire_resolved);
        assert!(config.path_protection.enabled);
        assert!(!config.path_protection.protected_patterns.is_empty());
        assert!(!config.internal_tools.patterns.is_empty());
    }

    #[test]
    fn rules_path_expands_tilde() {
        let config = Config::default_config();
        let path = config.rules_path();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with(".config/ai-permissions-layer/rules.json"));
    }

    #[test]
    fn protection_covers_custom_rules_path() {
        let mut config = Config::default_config();
        config.settings.rules_path = "/opt/policy/compiled[1].json".into();
        let protection = config.protection_config();
        assert!(
            protection
                .protected_patterns
                .contains(&"/opt/policy/compiled[[]1[]].json".to_string())
        );
        for pattern in DEFAULT_PROTECTED_PATTERNS {
            assert!(protection.protected_patterns.contains(&pattern.to_string()));
        }
    }

    #[test]
    fn protection_covers_relative_rules_path_anywhere() {
        let mut config = Config::default_config();
        config.settings.rules_path = "policy/compiled.json".into();
        let protection = config.protection_config();
        assert!(
            protection
                .protected_patterns
                .contains(&"**/policy/compiled.json".to_string())
        );
    }

    // ── Merge semantics ──

    #[test]
    fn overlay_overrides_default_decision() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [settings]
            default_when_no_match = "block"
            rules_path = "/etc/ai-permissions/rules.json"
        "#,
        );
        assert_eq!(config.settings.default_when_no_match, RuleAction::Block);
        assert_eq!(config.rules_path(), PathBuf::from("/etc/ai-permissions/rules.json"));
    }

    #[test]
    fn overlay_extends_dangerous_tools() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [path_protection]
            dangerous_tools = ["notebook.edit"]
        "#,
        );
        let tools = &config.path_protection.dangerous_tools;
        assert!(tools.contains(&"notebook.edit".to_string()));
        assert!(tools.contains(&"filesystem.write".to_string()));
    }

    #[test]
    fn overlay_removes_and_replaces() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [path_protection]
            remove_dangerous_tools = ["edit"]

            [internal_tools]
            replace = true
            patterns = ["^sys\\."]
        "#,
        );
        assert!(!config.path_protection.dangerous_tools.contains(&"edit".to_string()));
        assert!(config.path_protection.dangerous_tools.contains(&"write".to_string()));
        assert_eq!(config.internal_tools.patterns, vec!["^sys\\."]);
    }

    #[test]
    fn overlay_no_duplicates() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [path_protection]
            protected_patterns = ["**/rules*.json"]
        "#,
        );
        let count = config
            .path_protection
            .protected_patterns
            .iter()
            .filter(|s| *s == "**/rules*.json")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn overlay_approval_policy() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [approvals]
            ttl_secs = 120
            expire_resolved = false
        "#,
        );
        assert_eq!(config.approvals.ttl(), TimeDelta::seconds(120));
        assert!(!config.approvals.expire_resolved);
        assert_eq!(config.approvals.sweep_interval_secs, 300);
    }

    #[test]
    fn overlay_can_disable_path_protection() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [path_protection]
            enabled = false
        "#,
        );
        assert!(!config.path_protection.enabled);
        assert!(!config.path_protection.dangerous_tools.is_empty());
    }

    #[test]
    fn empty_overlay_changes_nothing() {
        let original = Config::default_config();
        let mut config = Config::default_config();
        config.apply_overlay_str("");
        assert_eq!(
            config.path_protection.dangerous_tools,
            original.path_protection.dangerous_tools
        );
        assert_eq!(config.internal_tools.patterns, original.internal_tools.patterns);
        assert_eq!(config.settings.rules_path, original.settings.rules_path);
    }
}
