//! Banner and boxed-section rendering.

use std::time::Duration;

pub const BANNER: &str = "labsh - homelab shell";

/// The banner line, newline-terminated.
pub fn banner() -> String {
    format!("{BANNER}\n")
}

/// Render `body` in a box headed by `title`:
///
/// ```text
/// +-------+
/// | TITLE |
/// |       |
/// | body  |
/// +-------+
/// ```
pub fn section(title: &str, body: &str) -> String {
    let body = body.trim_end_matches('\n');
    let mut lines = vec![title, ""];
    if body.is_empty() {
        lines.push("");
    } else {
        lines.extend(body.split('\n'));
    }

    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let border = format!("+{}+\n", "-".repeat(width + 2));

    let mut out = border.clone();
    for line in lines {
        let line = line.trim_end_matches('\r');
        let pad = width - line.chars().count();
        out.push_str(&format!("| {line}{} |\n", " ".repeat(pad)));
    }
    out.push_str(&border);
    out
}

/// `1h 5m`, `12m 3s`, `42s`, `<1s`, or `expired`.
pub fn format_ttl(ttl: Duration) -> String {
    if ttl.is_zero() {
        return "expired".into();
    }
    let total = ttl.as_secs();
    if total == 0 {
        return "<1s".into();
    }

    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 && hours == 0 {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_pads_to_widest_line() {
        let rendered = section("NODES", "node-1 Ready\nn2");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "+--------------+",
                "| NODES        |",
                "|              |",
                "| node-1 Ready |",
                "| n2           |",
                "+--------------+",
            ]
        );
    }

    #[test]
    fn section_with_empty_body() {
        let rendered = section("EMPTY", "\n");
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.contains("| EMPTY |"));
    }

    #[test]
    fn section_counts_chars_not_bytes() {
        let rendered = section("T", "✓ ok");
        assert!(rendered.contains("| ✓ ok |"));
        assert!(rendered.starts_with("+------+"));
    }

    #[test]
    fn ttl_formats() {
        assert_eq!(format_ttl(Duration::ZERO), "expired");
        assert_eq!(format_ttl(Duration::from_millis(400)), "<1s");
        assert_eq!(format_ttl(Duration::from_secs(42)), "42s");
        assert_eq!(format_ttl(Duration::from_secs(12 * 60 + 3)), "12m 3s");
        assert_eq!(format_ttl(Duration::from_secs(3600 + 5 * 60 + 9)), "1h 5m");
        assert_eq!(format_ttl(Duration::from_secs(3600 + 9)), "1h");
    }
}
