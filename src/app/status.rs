use chrono::{DateTime, SecondsFormat, Utc};
use locopilot::engine::LocationStatus;
use locopilot::platform::daemon::DaemonState;
use serde_json::Value;

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(
        || "-".to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn render_location(status: &LocationStatus, lines: &mut Vec<String>) {
    let state = match status.disabled_reason {
        Some(reason) => format!("disabled ({reason})"),
        None if status.enabled => "enabled".to_string(),
        None => "disabled".to_string(),
    };
    lines.push(format!("● {}  [{state}]", status.location_id));
    lines.push(format!("   principal      {}", status.principal_id));
    lines.push(format!(
        "   posting        {}  frequency: {}  timer: {}",
        on_off(status.posting_enabled),
        status.frequency.unwrap_or("-"),
        on_off(status.timer_active),
    ));
    lines.push(format!(
        "   replies        {}  poller: {}",
        on_off(status.reply_enabled),
        on_off(status.poller_active),
    ));
    lines.push(format!("   next post      {}", timestamp(status.next_due_at)));
    lines.push(format!("   last post      {}", timestamp(status.last_run_at)));
    lines.push(format!("   last check     {}", timestamp(status.last_check_at)));
    if status.executing {
        lines.push("   (posting now)".to_string());
    }
    for entry in status.recent_activity.iter().take(3) {
        lines.push(format!(
            "     {}  {:<13} {}",
            entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.action.as_ref(),
            entry.status
        ));
    }
}

fn render_daemon(daemon: Option<&DaemonState>, lines: &mut Vec<String>) {
    let Some(daemon) = daemon else {
        lines.push("daemon          not running (no state file)".to_string());
        return;
    };
    lines.push(format!("daemon          last seen {}", daemon.written_at));
    lines.push(format!(
        "   timers: {}  review pollers: {}",
        daemon.active_timers, daemon.active_pollers
    ));
    if let Some(components) = daemon.snapshot.get("components").and_then(Value::as_object) {
        for (name, component) in components {
            let status = component
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            lines.push(format!("   {name:<14} {status}"));
        }
    }
}

pub fn render_status(statuses: &[LocationStatus], daemon: Option<&DaemonState>) -> String {
    let mut lines = vec![
        format!("◆ locopilot {}", env!("CARGO_PKG_VERSION")),
        String::new(),
    ];
    render_daemon(daemon, &mut lines);
    lines.push(String::new());

    if statuses.is_empty() {
        lines.push("no locations configured".to_string());
    }
    for status in statuses {
        render_location(status, &mut lines);
    }
    lines.join("\n")
}
