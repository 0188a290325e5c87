//! Output formatting utilities for the CLI
//!
//! Renders what the service pushes (status snapshots and outbound groups)
//! for the terminal, plus colored status messages.

use serde_json::Value;

use tether_core::{OutboundGroup, StatusMessage};

/// Format a status snapshot
///
/// Objects are rendered one `key: value` pair per line (keys sorted); any
/// other value is printed as JSON. With `json` set the snapshot is printed as
/// a single compact JSON line.
pub fn format_status(status: &StatusMessage, json: bool) -> String {
    let value = status.as_value();
    if json {
        return value.to_string();
    }

    match value {
        Value::Object(fields) if !fields.is_empty() => {
            let width = fields.keys().map(|k| k.len()).max().unwrap_or(0);
            fields
                .iter()
                .map(|(key, value)| format!("{:width$}  {}", key, scalar(value), width = width))
                .collect::<Vec<_>>()
                .join("\n")
        }
        other => other.to_string(),
    }
}

/// Format a full outbound group list
///
/// Groups carrying a `tag` are rendered as `tag (type) -> selected`, with the
/// missing parts left out; anything else is printed as JSON.
pub fn format_groups(groups: &[OutboundGroup], json: bool) -> String {
    if json {
        let values: Vec<&Value> = groups.iter().map(OutboundGroup::as_value).collect();
        return serde_json::to_string(&values).unwrap_or_default();
    }

    if groups.is_empty() {
        return "No outbound groups".to_string();
    }

    groups
        .iter()
        .map(|group| format_group(group.as_value()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_group(value: &Value) -> String {
    let Some(tag) = value.get("tag").and_then(Value::as_str) else {
        return value.to_string();
    };

    let mut line = tag.to_string();
    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        line.push_str(&format!(" ({})", kind));
    }
    if let Some(selected) = value.get("selected").and_then(Value::as_str) {
        line.push_str(&format!(" -> {}", selected));
    }
    line
}

/// Render a JSON value without quoting plain strings
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
