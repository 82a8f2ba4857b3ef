//! Terminal rendering of analysis records and tracker views.

use legistrack_core::{AnalysisRecord, Severity, TrackerView};

const PREVIEW_CHARS: usize = 600;

// ── Public API ──

/// Print one analysis as a vertical card.
pub fn print_analysis_card(record: &AnalysisRecord) {
    println!("=== Analysis {} ===", record.id);
    println!("  {:<14} {}", "bill", record.subject_id);
    println!(
        "  {:<14} {}",
        "created",
        record.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    if !record.tags.is_empty() {
        println!("  {:<14} {}", "tags", record.tags.join(", "));
    }
    println!();
    for line in shorten(&record.content, PREVIEW_CHARS).lines() {
        println!("  {line}");
    }
    println!();
}

/// Print the tracker's status line, button, and any error.
pub fn print_view(view: &TrackerView) {
    let badge = match &view.status_badge {
        Some(b) => format!("{} {}", severity_marker(b.severity), b.text),
        None => "(no analysis)".to_string(),
    };
    let button = if view.is_button_disabled {
        format!("[{}] (disabled)", view.button_text)
    } else {
        format!("[{}]", view.button_text)
    };

    println!("  {:<14} {}", "state", view.state);
    println!("  {:<14} {}", "status", badge);
    println!("  {:<14} {}", "action", button);
    if let Some(record) = &view.analysis {
        println!(
            "  {:<14} {} ({})",
            "analysis",
            record.id,
            record.created_at.format("%Y-%m-%d")
        );
    }
    if let Some(error) = &view.error {
        println!("  {:<14} {}", "error", error);
    }
    println!();
}

// ── Helpers ──

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "✓",
        Severity::Warning => "!",
        Severity::Info => "…",
        Severity::Error => "✗",
    }
}

/// Truncate to `max` characters on a char boundary, marking the cut.
fn shorten(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_keeps_short_text() {
        assert_eq!(shorten("Sec. 2. Findings", 50), "Sec. 2. Findings");
    }

    #[test]
    fn shorten_cuts_on_char_boundary() {
        assert_eq!(shorten("§§§§", 2), "§§...");
    }
}
