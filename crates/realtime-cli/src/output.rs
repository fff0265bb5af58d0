//! Output formatting for the CLI.

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde_json::{json, Value};

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render one inbound event.
pub fn format_event(event: &str, payload: &Value, at: DateTime<Utc>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "[{}] {}: {}",
            at.with_timezone(&Local).format("%H:%M:%S%.3f"),
            event,
            payload
        ),
        OutputFormat::Json => json!({
            "event": event,
            "data": payload,
            "received_at": at.to_rfc3339(),
        })
        .to_string(),
    }
}

/// Print one inbound event to stdout.
pub fn print_event(event: &str, payload: &Value, format: OutputFormat) {
    println!("{}", format_event(event, payload, Utc::now(), format));
}

/// Print a status line.
pub fn print_status(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => println!("{}", json!({ "status": "ok", "message": message })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 5).unwrap()
    }

    #[test]
    fn json_line_wraps_payload() {
        let line = format_event(
            "server_response",
            &json!({ "data": "ok" }),
            at(),
            OutputFormat::Json,
        );
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "server_response");
        assert_eq!(value["data"]["data"], "ok");
        assert_eq!(value["received_at"], "2026-03-01T14:30:05+00:00");
    }

    #[test]
    fn text_line_has_event_and_payload() {
        let line = format_event("price_tick", &json!(42), at(), OutputFormat::Text);
        assert!(line.ends_with("price_tick: 42"), "{line}");
        assert!(line.starts_with('['));
    }
}
