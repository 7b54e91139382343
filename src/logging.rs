use std::path::PathBuf;

use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use crate::eval::{Evaluation, ToolCall};

/// Log file location, relative to `$HOME`.
pub const LOG_PATH: &str = ".local/share/ai-permissions-layer/decisions.log";

/// Resolve `~/.local/share/ai-permissions-layer/decisions.log`.
pub fn log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(LOG_PATH))
}

/// Install a file logger appending to [`log_path`].
/// Best-effort: any failure leaves logging disabled (it must never block the host).
pub fn init(level: LevelFilter) {
    let Some(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    else {
        return;
    };

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let _ = WriteLogger::init(level, config, file);
}

/// Record one decision as a single tab-separated line.
pub fn log_decision(call: &ToolCall, result: &Evaluation) {
    log::info!("{}", decision_line(call, result));
}

fn decision_line(call: &ToolCall, result: &Evaluation) -> String {
    // Compact single-line reason for the log (replace newlines with "; ")
    let reason_oneline = result.reason.replace("\n\n", "; ").replace('\n', "; ");
    let tool: String = call.tool_name.chars().take(200).collect();
    let request = result
        .approval_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "{decision}\t{tool}\t{request}\t{reason}",
        decision = result.decision.as_str(),
        reason = reason_oneline,
    )
}
