//! Redaction report builder
//!
//! Runs extraction, detection and correlation over every page of one
//! document and collects the result together with each page's full text.

use crate::config::Config;
use crate::content::walk_page;
use crate::correlate::{correlate, HiddenTextResult};
use crate::detector::{detect, BlackRectCandidate};
use crate::drawings::DrawingCollector;
use crate::error::{PageError, RedactError, Warning, WarningKind};
use crate::source::DocumentSource;
use crate::text_trace::{GlyphCollector, TraceStatus};
use lopdf::{Document, ObjectId};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Findings for a page with at least one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnalysis {
    /// 1-based
    pub page_number: u32,
    pub candidates: Vec<BlackRectCandidate>,
    pub hidden: Vec<HiddenTextResult>,
    pub trace: TraceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub source_id: String,
    pub pages: Vec<PageAnalysis>,
    pub total_rect_count: usize,
    /// Every page of the document, in page order
    pub full_text_by_page: Vec<PageText>,
    pub warnings: Vec<Warning>,
    pub no_redactions_detected: bool,
}

impl DocumentReport {
    /// Text of one page, if the page exists
    pub fn page_text(&self, page_number: u32) -> Option<&str> {
        self.full_text_by_page
            .iter()
            .find(|p| p.page_number == page_number)
            .map(|p| p.text.as_str())
    }
}

/// Per-page outcome before pages without candidates are dropped
pub(crate) struct PageScan {
    pub page_number: u32,
    pub page_id: ObjectId,
    pub analysis: PageAnalysis,
    pub text: String,
}

/// Walk one page once, feeding both the drawing and glyph collectors
pub(crate) fn scan_page(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
    config: &Config,
    warnings: &mut Vec<Warning>,
) -> PageScan {
    let mut sinks = (
        DrawingCollector::default(),
        GlyphCollector::new(&config.detection),
    );
    let empty = |trace| PageAnalysis {
        page_number,
        candidates: Vec::new(),
        hidden: Vec::new(),
        trace,
    };

    if let Err(e) = walk_page(doc, page_id, &mut sinks) {
        warnings.push(Warning::new(
            page_number,
            WarningKind::PageExtractionFailed,
            e.to_string(),
        ));
        return PageScan {
            page_number,
            page_id,
            analysis: empty(TraceStatus::Degraded {
                reason: e.to_string(),
            }),
            text: String::new(),
        };
    }

    let (drawings, glyphs) = sinks;
    let (trace, text) = glyphs.finish();
    if let TraceStatus::Degraded { reason } = &trace.status {
        warnings.push(Warning::new(
            page_number,
            WarningKind::PageExtractionDegraded,
            PageError::TraceUnavailable(reason.clone()).to_string(),
        ));
    }

    let candidates = detect(&drawings.drawings, &config.detection);
    let hidden = correlate(&candidates, &trace.glyphs);
    debug!(
        page = page_number,
        drawings = drawings.drawings.len(),
        glyphs = trace.glyphs.len(),
        candidates = candidates.len(),
        "page scanned"
    );

    PageScan {
        page_number,
        page_id,
        analysis: PageAnalysis {
            page_number,
            candidates,
            hidden,
            trace: trace.status,
        },
        text,
    }
}

/// Scan every page of an open document, in page order
pub(crate) fn scan_document(
    doc: &Document,
    config: &Config,
    warnings: &mut Vec<Warning>,
) -> Vec<PageScan> {
    doc.get_pages()
        .into_iter()
        .map(|(page_number, page_id)| scan_page(doc, page_number, page_id, config, warnings))
        .collect()
}

/// Analyse an already-open document. Page failures become warnings.
pub fn analyze_document(doc: &Document, source_id: &str, config: &Config) -> DocumentReport {
    let mut warnings = Vec::new();
    let scans = scan_document(doc, config, &mut warnings);

    let mut pages = Vec::new();
    let mut full_text_by_page = Vec::with_capacity(scans.len());
    let mut total_rect_count = 0;
    for scan in scans {
        full_text_by_page.push(PageText {
            page_number: scan.page_number,
            text: scan.text,
        });
        if !scan.analysis.candidates.is_empty() {
            total_rect_count += scan.analysis.candidates.len();
            pages.push(scan.analysis);
        }
    }

    info!(
        source = source_id,
        pages = full_text_by_page.len(),
        redactions = total_rect_count,
        warnings = warnings.len(),
        "analysis complete"
    );

    DocumentReport {
        source_id: source_id.to_string(),
        pages,
        total_rect_count,
        full_text_by_page,
        warnings,
        no_redactions_detected: total_rect_count == 0,
    }
}

/// Open `source` and analyse it. The document is dropped before returning.
#[instrument(skip_all, fields(source = %source.source_id()))]
pub fn analyze<S: DocumentSource + ?Sized>(
    source: &S,
    config: &Config,
) -> Result<DocumentReport, RedactError> {
    let doc = source.load()?;
    Ok(analyze_document(&doc, &source.source_id(), config))
}
