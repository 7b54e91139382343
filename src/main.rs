//! ai-permissions: host adapter for the decision engine.
//!
//! Reads line-delimited JSON events from stdin and answers each with one JSON
//! line on stdout. The process is long-lived: pending approvals exist only in
//! memory, so the host keeps a single instance running.
//!
//! Events:
//!   - `{"event":"before_tool_call","toolName":"...","params":{...},"intent":"..."}`
//!     → `{"decision":"allow|block|require_approval","block":bool,`
//!       `"blockReason":...,"requestId":...}`
//!   - `{"event":"message_received","content":"..."}`
//!     → `{"handled":bool,"requestId":...,"command":"approve|deny"}`

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use ai_permissions::approval::spawn_sweeper;
use ai_permissions::config::Config;
use ai_permissions::eval::{DecisionEngine, Intent, ToolCall};
use ai_permissions::logging;
use ai_permissions::rules::RuleAction;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use simplelog::LevelFilter;

const USAGE: &str = "\
usage: ai-permissions [--rules <path>] [--default-when-no-match <allow|block|require_approval>]
                      [--no-path-protection]

Reads line-delimited JSON events on stdin and writes one decision per line to stdout.";

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum HostEvent {
    BeforeToolCall {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        params: Map<String, Value>,
        #[serde(default)]
        intent: String,
    },
    MessageReceived {
        #[serde(default)]
        content: String,
    },
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    rules: Option<PathBuf>,
    default_when_no_match: Option<RuleAction>,
    no_path_protection: bool,
}

fn parse_args(argv: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    let mut argv = argv.into_iter();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--rules" => {
                let path = argv.next().ok_or("--rules needs a path")?;
                args.rules = Some(PathBuf::from(path));
            }
            "--default-when-no-match" => {
                let value = argv.next().ok_or("--default-when-no-match needs a value")?;
                let action = RuleAction::parse(&value)
                    .ok_or_else(|| format!("unknown action: {value}"))?;
                args.default_when_no_match = Some(action);
            }
            "--no-path-protection" => args.no_path_protection = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn apply_args(config: &mut Config, args: Args) {
    if let Some(path) = args.rules {
        config.settings.rules_path = path.to_string_lossy().into_owned();
    }
    if let Some(action) = args.default_when_no_match {
        config.settings.default_when_no_match = action;
    }
    if args.no_path_protection {
        config.path_protection.enabled = false;
    }
}

/// Handle one input line and produce the response line.
fn handle_line(engine: &DecisionEngine, line: &str) -> Value {
    let event: HostEvent = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return json!({ "error": format!("invalid event: {e}") }),
    };

    match event {
        HostEvent::BeforeToolCall {
            tool_name,
            params,
            intent,
        } => {
            let call = ToolCall {
                tool_name,
                args: params,
            };
            let result = engine.evaluate(&call, &Intent::new(intent));
            logging::log_decision(&call, &result);
            json!({
                "decision": result.decision.as_str(),
                "block": result.is_blocked(),
                "blockReason": result.is_blocked().then_some(&result.reason),
                "requestId": result.approval_id,
            })
        }
        HostEvent::MessageReceived { content } => match engine.on_message(&content) {
            Some(res) => json!({
                "handled": res.applied,
                "requestId": res.command.id,
                "command": res.command.verdict.as_str(),
            }),
            None => json!({ "handled": false }),
        },
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return;
    }
    let args = match parse_args(argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ai-permissions: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    logging::init(LevelFilter::Info);

    let mut config = Config::load();
    apply_args(&mut config, args);

    let ledger = DecisionEngine::ledger_from_config(&config);
    let engine = DecisionEngine::from_config(&config, Arc::clone(&ledger));
    if let Err(e) = spawn_sweeper(ledger, config.approvals.sweep_interval()) {
        log::warn!("approval sweeper not started: {e}");
    }
    log::info!(
        "ready: rules={} default={}",
        config.rules_path().display(),
        config.settings.default_when_no_match.as_str()
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("failed to read stdin: {e}");
                std::process::exit(1);
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&engine, &line);
        if writeln!(stdout, "{response}").and_then(|_| stdout.flush()).is_err() {
            // Host went away.
            break;
        }
    }
}
