//! Human-readable report text

use crate::remove::RemovalOutcome;
use crate::report::{DocumentReport, PageText};
use crate::text_trace::TraceStatus;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

fn heading(out: &mut String, title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", rule);
}

fn full_text(out: &mut String, pages: &[PageText]) {
    heading(out, "FULL DOCUMENT TEXT (all pages)");
    for page in pages {
        let _ = writeln!(out, "\n--- Page {} ---", page.page_number);
        if page.text.trim().is_empty() {
            let _ = writeln!(out, "(no text)");
        } else {
            let _ = writeln!(out, "{}", page.text);
        }
    }
}

/// Analysis report as printed by the CLI. `program` is used in the
/// suggested removal command.
pub fn render_text(report: &DocumentReport, program: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", report.source_id);

    if report.pages.is_empty() {
        let _ = writeln!(out, "No black-box redactions detected.\n");
        full_text(&mut out, &report.full_text_by_page);
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total black rectangles (potential redactions): {}\n",
        report.total_rect_count
    );

    heading(&mut out, "EXTRACTED TEXT FROM UNDER REDACTIONS");
    for page in &report.pages {
        let _ = writeln!(
            out,
            "\n  Page {} ({} redaction(s)):",
            page.page_number,
            page.candidates.len()
        );
        for (i, hidden) in page.hidden.iter().enumerate() {
            let (x0, y0, x1, y1) = hidden.rect.rounded();
            let _ = writeln!(out, "    Rect {} at ({},{})-({},{}):", i + 1, x0, y0, x1, y1);
            match (&hidden.preview, &page.trace) {
                (Some(text), _) => {
                    for line in text.lines() {
                        let _ = writeln!(out, "      {}", line);
                    }
                    if !text.ends_with('\n') {
                        let _ = writeln!(out);
                    }
                }
                (None, TraceStatus::Degraded { .. }) => {
                    let _ = writeln!(out, "      (glyph trace unavailable on this page)");
                }
                (None, TraceStatus::Complete) => {
                    let _ = writeln!(out, "      (no text detected under this rect)");
                }
            }
        }
    }
    let _ = writeln!(out);

    full_text(&mut out, &report.full_text_by_page);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "To remove these redactions and reveal underlying text in the PDF, run:"
    );
    let _ = writeln!(
        out,
        "  {} \"{}\" --remove -o output.pdf",
        program, report.source_id
    );
    out
}

/// One-line summary printed after removal
pub fn removal_summary(outcome: &RemovalOutcome) -> String {
    format!(
        "Removed {} black box redaction(s). Saved to: {}",
        outcome.removed,
        outcome.output.display()
    )
}
