//! Black-box redaction detection and removal
//!
//! Finds opaque black rectangles painted over page content, recovers the
//! text drawn underneath them, and rewrites documents with only those
//! rectangles taken out.
//!
//! - [`analyze`] / [`analyze_document`]: per-page candidates, hidden-text
//!   previews and the full text of every page
//! - [`remove_redactions`]: strip the boxes, keep text and images, save

pub mod config;
pub mod content;
pub mod correlate;
pub mod detector;
pub mod drawings;
pub mod error;
pub mod geometry;
pub mod remove;
pub mod render;
pub mod report;
pub mod source;
pub mod text_trace;

pub use config::{Config, DetectionConfig, ObjectKind, RemovalPolicy, Rule};
pub use correlate::{correlate, HiddenTextResult};
pub use detector::{detect, BlackRectCandidate};
pub use drawings::{extract_drawings, DrawingOp};
pub use error::{PageError, RedactError, Warning, WarningKind};
pub use geometry::Rect;
pub use remove::{default_output_path, remove_redactions, save_document, RemovalOutcome};
pub use render::{removal_summary, render_text};
pub use report::{analyze, analyze_document, DocumentReport, PageAnalysis, PageText};
pub use source::{DocumentSource, FileSource, MemorySource};
pub use text_trace::{extract_glyphs, GlyphRecord, GlyphTrace, TraceStatus};

