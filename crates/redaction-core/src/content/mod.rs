//! Content-stream interpretation shared by the drawing and text extractors

pub mod color;
pub mod fonts;
pub mod inline;
pub mod interpreter;
pub mod resources;

pub use color::FillColor;
pub use interpreter::{
    walk_page, walk_page_operations, ContentSink, DrawSequence, OpSpan, PaintKind, PaintedPath,
    PathItem, PlacedImage, ShownGlyph, StreamId,
};
