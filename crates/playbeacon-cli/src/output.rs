//! Output formatting for CLI

use playbeacon_core::Dispatch;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Render rows as a table, or as a JSON array
pub fn format_rows<T: Serialize + Tabled>(rows: &[T], format: &str) -> anyhow::Result<String> {
    match OutputFormat::from(format) {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => Ok(Table::new(rows).with(Style::modern()).to_string()),
    }
}

/// One line per dispatch
pub fn format_dispatch(dispatch: &Dispatch, format: &str) -> anyhow::Result<String> {
    if OutputFormat::from(format) == OutputFormat::Json {
        return Ok(serde_json::to_string(dispatch)?);
    }

    let line = match dispatch {
        Dispatch::Playback(event) => {
            let mut line = format!("{:<18}", event.kind.as_str());
            if let Some(position) = event.position_ms {
                line.push_str(&format!(" position={position}ms"));
            }
            if let Some(error) = &event.error {
                line.push_str(&format!(" code={} message={:?}", error.code, error.message));
            }
            line
        }
        Dispatch::Chunk { kind, request } => {
            let mut line = format!("{:<18} task={}", kind.as_str(), request.task_id);
            if let Some(kind) = request.kind {
                line.push_str(&format!(" type={}", serde_json::to_value(kind)?.as_str().unwrap_or("?")));
            }
            if let Some(url) = &request.url {
                line.push_str(&format!(" url={url}"));
            }
            if let Some(bytes) = request.bytes_loaded {
                line.push_str(&format!(" bytes={bytes}"));
            }
            if let Some(cancel) = &request.cancel {
                line.push_str(&format!(" cancel={cancel}"));
            }
            if let Some(error) = &request.error_text {
                line.push_str(&format!(" error={error:?}"));
            }
            line
        }
    };
    Ok(line)
}
