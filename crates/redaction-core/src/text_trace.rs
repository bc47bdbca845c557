//! Text trace extractor
//!
//! Glyph placements of a page with their boxes and draw sequence, plus the
//! page's plain text assembled from the same walk.

use crate::config::DetectionConfig;
use crate::content::{walk_page, ContentSink, DrawSequence, ShownGlyph};
use crate::error::PageError;
use crate::geometry::{Point, Rect};
use lopdf::{Document, ObjectId};
use serde::Serialize;

/// Baseline shift, in em, that starts a new line
const LINE_BREAK_EM: f64 = 0.5;
/// Horizontal gap, in em, that separates words
const WORD_GAP_EM: f64 = 0.3;

/// One glyph kept for hidden-text previews
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlyphRecord {
    pub ch: char,
    pub bbox: Rect,
    pub seq: DrawSequence,
}

/// Whether a page's glyph positions could be traced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceStatus {
    Complete,
    /// Positions can't be trusted; the glyph list is empty
    Degraded { reason: String },
}

impl TraceStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, TraceStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlyphTrace {
    pub glyphs: Vec<GlyphRecord>,
    pub status: TraceStatus,
}

impl GlyphTrace {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            glyphs: Vec::new(),
            status: TraceStatus::Degraded {
                reason: reason.into(),
            },
        }
    }
}

/// Builds plain text from glyphs in content-stream order
#[derive(Debug, Default)]
pub struct TextAssembler {
    text: String,
    last: Option<(Point, Point)>,
}

impl TextAssembler {
    pub fn push(&mut self, glyph: &ShownGlyph) {
        let em = glyph.em.max(1.0);
        if let Some((origin, end)) = self.last {
            if (glyph.origin.y - origin.y).abs() > LINE_BREAK_EM * em {
                self.break_line();
            } else if glyph.origin.x - end.x > WORD_GAP_EM * em
                && glyph.ch != ' '
                && !self.text.ends_with(char::is_whitespace)
            {
                self.text.push(' ');
            }
        }
        self.text.push(glyph.ch);
        self.last = Some((glyph.origin, glyph.advance_end));
    }

    fn break_line(&mut self) {
        while self.text.ends_with(' ') {
            self.text.pop();
        }
        self.text.push('\n');
    }

    /// Page text, newline-terminated unless empty
    pub fn finish(mut self) -> String {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.break_line();
        }
        self.text
    }
}

/// Sink producing a [`GlyphTrace`] and the page text in one pass
#[derive(Debug)]
pub struct GlyphCollector<'c> {
    config: &'c DetectionConfig,
    glyphs: Vec<GlyphRecord>,
    gap: Option<String>,
    text: TextAssembler,
}

impl<'c> GlyphCollector<'c> {
    pub fn new(config: &'c DetectionConfig) -> Self {
        Self {
            config,
            glyphs: Vec::new(),
            gap: None,
            text: TextAssembler::default(),
        }
    }

    pub fn finish(self) -> (GlyphTrace, String) {
        let trace = match self.gap {
            Some(reason) => GlyphTrace::degraded(reason),
            None => GlyphTrace {
                glyphs: self.glyphs,
                status: TraceStatus::Complete,
            },
        };
        (trace, self.text.finish())
    }
}

impl ContentSink for GlyphCollector<'_> {
    fn on_glyph(&mut self, glyph: ShownGlyph) {
        self.text.push(&glyph);
        if self.config.keeps_in_preview(glyph.ch) {
            self.glyphs.push(GlyphRecord {
                ch: glyph.ch,
                bbox: glyph.bbox,
                seq: glyph.seq,
            });
        }
    }

    fn on_trace_gap(&mut self, reason: &str) {
        if self.gap.is_none() {
            self.gap = Some(reason.to_string());
        }
    }
}

/// Glyph trace and plain text of one page
pub fn extract_glyphs(
    doc: &Document,
    page_id: ObjectId,
    config: &DetectionConfig,
) -> Result<(GlyphTrace, String), PageError> {
    let mut collector = GlyphCollector::new(config);
    walk_page(doc, page_id, &mut collector)?;
    Ok(collector.finish())
}
