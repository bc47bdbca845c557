//! Black-rectangle detector
//!
//! Classifies filled drawing operations as redaction-box candidates: fully
//! opaque, near-black, and strictly larger than the minimum size in both
//! dimensions. Thin rules and decorative dots fall below the size cut.

use crate::config::DetectionConfig;
use crate::content::{DrawSequence, PathItem};
use crate::drawings::DrawingOp;
use crate::geometry::Rect;
use serde::Serialize;

/// A rectangle that looks like a black-box redaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlackRectCandidate {
    pub rect: Rect,
    pub seq: DrawSequence,
}

/// Candidates from a page's drawing operations, in drawing order.
///
/// Every rectangle sub-item of a qualifying operation is its own candidate,
/// sharing the operation's sequence number.
pub fn detect(drawings: &[DrawingOp], config: &DetectionConfig) -> Vec<BlackRectCandidate> {
    let mut candidates = Vec::new();
    for op in drawings {
        if op.fill_opacity != 1.0 {
            continue;
        }
        let Some(fill) = op.fill else { continue };
        if !fill.is_near_black(config.black_tolerance) {
            continue;
        }
        for item in &op.items {
            let PathItem::Rect(rect) = item else { continue };
            if rect.width() <= config.min_rect_size || rect.height() <= config.min_rect_size {
                continue;
            }
            candidates.push(BlackRectCandidate {
                rect: *rect,
                seq: op.seq,
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FillColor, PaintKind};
    use crate::geometry::Point;
    use pretty_assertions::assert_eq;

    fn fill_op(
        seq: DrawSequence,
        fill: Option<FillColor>,
        opacity: f32,
        items: Vec<PathItem>,
    ) -> DrawingOp {
        DrawingOp {
            seq,
            kind: PaintKind::Fill,
            fill,
            fill_opacity: opacity,
            items,
        }
    }

    fn rect_item(w: f64, h: f64) -> PathItem {
        PathItem::Rect(Rect::from_corners(100.0, 100.0, 100.0 + w, 100.0 + h))
    }

    #[test]
    fn test_opaque_black_rect_is_candidate() {
        let ops = vec![fill_op(
            4,
            Some(FillColor::BLACK),
            1.0,
            vec![rect_item(100.0, 20.0)],
        )];
        let found = detect(&ops, &DetectionConfig::default());
        assert_eq!(
            found,
            vec![BlackRectCandidate {
                rect: Rect::from_corners(100.0, 100.0, 200.0, 120.0),
                seq: 4,
            }]
        );
    }

    #[test]
    fn test_partial_opacity_is_rejected() {
        let ops = vec![fill_op(
            1,
            Some(FillColor::BLACK),
            0.99,
            vec![rect_item(100.0, 20.0)],
        )];
        assert!(detect(&ops, &DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_minimum_size_is_exclusive() {
        let config = DetectionConfig::default();
        let at_limit = vec![
            fill_op(1, Some(FillColor::BLACK), 1.0, vec![rect_item(3.0, 50.0)]),
            fill_op(2, Some(FillColor::BLACK), 1.0, vec![rect_item(50.0, 3.0)]),
        ];
        assert!(detect(&at_limit, &config).is_empty());

        let above = vec![fill_op(
            3,
            Some(FillColor::BLACK),
            1.0,
            vec![rect_item(3.01, 3.01)],
        )];
        assert_eq!(detect(&above, &config).len(), 1);
    }

    #[test]
    fn test_tolerance_boundary() {
        let config = DetectionConfig::default();
        let dark = FillColor::rgb(0.05, 0.05, 0.05);
        let ops = vec![fill_op(1, Some(dark), 1.0, vec![rect_item(10.0, 10.0)])];
        assert_eq!(detect(&ops, &config).len(), 1);

        let reddish = FillColor::rgb(0.06, 0.0, 0.0);
        let ops = vec![fill_op(1, Some(reddish), 1.0, vec![rect_item(10.0, 10.0)])];
        assert!(detect(&ops, &config).is_empty());
    }

    #[test]
    fn test_missing_fill_is_rejected() {
        let ops = vec![fill_op(1, None, 1.0, vec![rect_item(10.0, 10.0)])];
        assert!(detect(&ops, &DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_compound_path_yields_one_candidate_per_rect() {
        let ops = vec![fill_op(
            7,
            Some(FillColor::BLACK),
            1.0,
            vec![
                rect_item(10.0, 10.0),
                PathItem::Line(Point::new(0.0, 0.0), Point::new(50.0, 50.0)),
                PathItem::Rect(Rect::from_corners(300.0, 300.0, 340.0, 320.0)),
            ],
        )];
        let found = detect(&ops, &DetectionConfig::default());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.seq == 7));
    }

    #[test]
    fn test_quads_are_not_rectangle_primitives() {
        let quad = PathItem::Quad([
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 20.0),
            Point::new(-10.0, 10.0),
        ]);
        let ops = vec![fill_op(1, Some(FillColor::BLACK), 1.0, vec![quad])];
        assert!(detect(&ops, &DetectionConfig::default()).is_empty());
    }
}
