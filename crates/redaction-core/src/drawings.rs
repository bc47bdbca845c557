//! Page drawing extractor
//!
//! Filled vector paths of a page in paint order. Stroke-only paths are
//! dropped here: a redaction box is always filled.

use crate::content::{
    walk_page, ContentSink, DrawSequence, FillColor, PaintKind, PaintedPath, PathItem,
};
use crate::error::PageError;
use lopdf::{Document, ObjectId};

/// A fill or fill+stroke painting operation
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingOp {
    pub seq: DrawSequence,
    pub kind: PaintKind,
    pub fill: Option<FillColor>,
    pub fill_opacity: f32,
    pub items: Vec<PathItem>,
}

impl From<PaintedPath> for DrawingOp {
    fn from(path: PaintedPath) -> Self {
        Self {
            seq: path.seq,
            kind: path.kind,
            fill: path.fill,
            fill_opacity: path.fill_opacity,
            items: path.items,
        }
    }
}

/// Sink collecting filled paths
#[derive(Debug, Default)]
pub struct DrawingCollector {
    pub drawings: Vec<DrawingOp>,
}

impl ContentSink for DrawingCollector {
    fn on_path(&mut self, path: PaintedPath) {
        if path.kind != PaintKind::Stroke {
            self.drawings.push(path.into());
        }
    }
}

/// Filled drawing operations of one page, in content-stream order
pub fn extract_drawings(doc: &Document, page_id: ObjectId) -> Result<Vec<DrawingOp>, PageError> {
    let mut collector = DrawingCollector::default();
    walk_page(doc, page_id, &mut collector)?;
    Ok(collector.drawings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary, Object, Stream};

    #[test]
    fn test_stroke_only_paths_are_excluded() {
        let mut doc = Document::with_version("1.7");
        let content = doc.add_object(Stream::new(
            Dictionary::new(),
            b"0 g 0 G 10 10 50 50 re S 10 10 50 50 re f 10 10 50 50 re B".to_vec(),
        ));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(content),
        });

        let drawings = extract_drawings(&doc, page).unwrap();
        assert_eq!(drawings.len(), 2);
        assert_eq!(drawings[0].kind, PaintKind::Fill);
        assert_eq!(drawings[0].seq, 2);
        assert_eq!(drawings[1].kind, PaintKind::FillStroke);
        assert_eq!(drawings[1].seq, 3);
    }
}
