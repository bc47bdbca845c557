//! Occlusion correlator
//!
//! Text is hidden by a box when it was painted earlier and overlaps it.

use crate::content::DrawSequence;
use crate::detector::BlackRectCandidate;
use crate::geometry::Rect;
use crate::text_trace::GlyphRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HiddenTextResult {
    pub rect: Rect,
    pub seq: DrawSequence,
    /// Covered characters in extraction order, `None` when nothing is covered
    pub preview: Option<String>,
}

/// Characters of the glyphs painted before `candidate` that intersect it
pub fn hidden_text(candidate: &BlackRectCandidate, glyphs: &[GlyphRecord]) -> Option<String> {
    let preview: String = glyphs
        .iter()
        .filter(|g| g.seq < candidate.seq && g.bbox.intersects(&candidate.rect))
        .map(|g| g.ch)
        .collect();
    (!preview.is_empty()).then_some(preview)
}

/// One result per candidate, in candidate order
pub fn correlate(candidates: &[BlackRectCandidate], glyphs: &[GlyphRecord]) -> Vec<HiddenTextResult> {
    candidates
        .iter()
        .map(|candidate| HiddenTextResult {
            rect: candidate.rect,
            seq: candidate.seq,
            preview: hidden_text(candidate, glyphs),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn glyphs(text: &str, x: f64, seq: DrawSequence) -> Vec<GlyphRecord> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + i as f64 * 10.0;
                GlyphRecord {
                    ch,
                    bbox: Rect::from_corners(x0, 105.0, x0 + 10.0, 115.0),
                    seq,
                }
            })
            .collect()
    }

    fn box_at(seq: DrawSequence) -> BlackRectCandidate {
        BlackRectCandidate {
            rect: Rect::from_corners(100.0, 100.0, 200.0, 120.0),
            seq,
        }
    }

    #[test]
    fn test_text_under_later_box_is_recovered() {
        let results = correlate(&[box_at(2)], &glyphs("SECRET", 100.0, 1));
        assert_eq!(
            results,
            vec![HiddenTextResult {
                rect: Rect::from_corners(100.0, 100.0, 200.0, 120.0),
                seq: 2,
                preview: Some("SECRET".to_string()),
            }]
        );
    }

    #[test]
    fn test_text_drawn_after_box_is_not_hidden() {
        let results = correlate(&[box_at(1)], &glyphs("SECRET", 100.0, 2));
        assert_eq!(results[0].preview, None);
    }

    #[test]
    fn test_preview_keeps_extraction_order() {
        // later glyphs placed to the left still come after
        let mut trace = glyphs("AB", 150.0, 1);
        trace.extend(glyphs("CD", 100.0, 2));
        let results = correlate(&[box_at(3)], &trace);
        assert_eq!(results[0].preview.as_deref(), Some("ABCD"));
    }

    #[test]
    fn test_glyph_touching_edge_is_included() {
        let trace = vec![GlyphRecord {
            ch: 'x',
            bbox: Rect::from_corners(200.0, 110.0, 210.0, 118.0),
            seq: 1,
        }];
        assert_eq!(hidden_text(&box_at(2), &trace).as_deref(), Some("x"));
    }

    #[test]
    fn test_glyphs_outside_box_are_ignored() {
        let results = correlate(&[box_at(5)], &glyphs("far", 400.0, 1));
        assert_eq!(results[0].preview, None);
    }
}
