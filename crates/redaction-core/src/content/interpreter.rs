//! Content-stream walker
//!
//! Replays a page's operators with a graphics-state stack and reports
//! what gets painted to a [`ContentSink`]. Paths, text-showing operators
//! and images all draw their sequence number from one counter per page,
//! so "drawn before" comparisons hold across object kinds.

use super::color::{ColorSpace, FillColor};
use super::fonts::{Font, FontKind};
use super::inline::decode_operations;
use super::resources::{number, resolve, resolve_dict, stream_bytes, Resources};
use crate::error::PageError;
use crate::geometry::{Matrix, Point, Rect};
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::rc::Rc;

/// Relative paint order within one page
pub type DrawSequence = u64;

const MAX_FORM_DEPTH: usize = 12;

/// Which content stream an operator index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamId {
    /// The page's (concatenated) `/Contents`
    Page,
    Form(ObjectId),
}

/// Inclusive operator range inside one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpSpan {
    pub stream: StreamId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PaintKind {
    Stroke,
    Fill,
    FillStroke,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathItem {
    /// `re` under an axis-preserving CTM
    Rect(Rect),
    /// `re` under a rotating or skewing CTM
    Quad([Point; 4]),
    Line(Point, Point),
    Curve([Point; 4]),
}

impl PathItem {
    fn points(&self) -> Vec<Point> {
        match self {
            PathItem::Rect(r) => vec![Point::new(r.x0, r.y0), Point::new(r.x1, r.y1)],
            PathItem::Quad(q) | PathItem::Curve(q) => q.to_vec(),
            PathItem::Line(a, b) => vec![*a, *b],
        }
    }
}

/// A painted path, reported when its painting operator runs
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedPath {
    pub seq: DrawSequence,
    pub kind: PaintKind,
    pub fill: Option<FillColor>,
    pub fill_opacity: f32,
    pub items: Vec<PathItem>,
    pub bounds: Option<Rect>,
    /// Construction through painting operator
    pub span: OpSpan,
    /// The path also sets the clipping path (`W`/`W*`)
    pub clips: bool,
}

/// One Unicode scalar of a shown glyph
#[derive(Debug, Clone, PartialEq)]
pub struct ShownGlyph {
    pub ch: char,
    pub bbox: Rect,
    pub seq: DrawSequence,
    /// Baseline start and end of the glyph advance
    pub origin: Point,
    pub advance_end: Point,
    /// Font size in page units
    pub em: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub seq: DrawSequence,
    pub bounds: Rect,
    pub span: OpSpan,
}

/// Receives paint events from [`walk_page`]
pub trait ContentSink {
    fn on_path(&mut self, _path: PaintedPath) {}
    fn on_glyph(&mut self, _glyph: ShownGlyph) {}
    fn on_image(&mut self, _image: PlacedImage) {}
    /// Text was shown with a font whose glyph positions can't be trusted
    fn on_trace_gap(&mut self, _reason: &str) {}
}

impl<A: ContentSink, B: ContentSink> ContentSink for (A, B) {
    fn on_path(&mut self, path: PaintedPath) {
        self.0.on_path(path.clone());
        self.1.on_path(path);
    }

    fn on_glyph(&mut self, glyph: ShownGlyph) {
        self.0.on_glyph(glyph.clone());
        self.1.on_glyph(glyph);
    }

    fn on_image(&mut self, image: PlacedImage) {
        self.0.on_image(image.clone());
        self.1.on_image(image);
    }

    fn on_trace_gap(&mut self, reason: &str) {
        self.0.on_trace_gap(reason);
        self.1.on_trace_gap(reason);
    }
}

impl<S: ContentSink + ?Sized> ContentSink for &mut S {
    fn on_path(&mut self, path: PaintedPath) {
        (**self).on_path(path)
    }

    fn on_glyph(&mut self, glyph: ShownGlyph) {
        (**self).on_glyph(glyph)
    }

    fn on_image(&mut self, image: PlacedImage) {
        (**self).on_image(image)
    }

    fn on_trace_gap(&mut self, reason: &str) {
        (**self).on_trace_gap(reason)
    }
}

/// Content stream ids of a page, in order. A page without `/Contents` has none.
pub fn page_content_ids(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>, PageError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| PageError::ContentUnavailable(e.to_string()))?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    let items = match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => return Ok(vec![*id]),
        },
        Object::Array(items) => items.clone(),
        _ => {
            return Err(PageError::ContentUnavailable(
                "/Contents is neither a stream reference nor an array".to_string(),
            ))
        }
    };
    items
        .iter()
        .map(|item| match item {
            Object::Reference(id) => Ok(*id),
            _ => Err(PageError::ContentUnavailable(
                "/Contents array holds a direct object".to_string(),
            )),
        })
        .collect()
}

/// Decoded operators of a page's content
pub fn page_operations(doc: &Document, page_id: ObjectId) -> Result<Vec<Operation>, PageError> {
    let mut bytes = Vec::new();
    for id in page_content_ids(doc, page_id)? {
        let stream = doc
            .get_object(id)
            .and_then(Object::as_stream)
            .map_err(|e| PageError::ContentUnavailable(format!("stream {:?}: {}", id, e)))?;
        let data = stream_bytes(stream).ok_or_else(|| {
            PageError::ContentUnavailable(format!("stream {:?} could not be decompressed", id))
        })?;
        bytes.extend_from_slice(&data);
        bytes.push(b'\n');
    }
    decode_operations(&bytes)
}

/// Decoded operators of a form XObject
pub fn form_operations(doc: &Document, form_id: ObjectId) -> Result<Vec<Operation>, PageError> {
    let stream = doc
        .get_object(form_id)
        .and_then(Object::as_stream)
        .map_err(|e| PageError::ContentUnavailable(e.to_string()))?;
    let bytes = stream_bytes(stream).ok_or_else(|| {
        PageError::ContentUnavailable(format!("form {:?} could not be decompressed", form_id))
    })?;
    decode_operations(&bytes)
}

/// Walk a page's content, forms included, reporting paint events to `sink`
pub fn walk_page<S: ContentSink>(
    doc: &Document,
    page_id: ObjectId,
    sink: &mut S,
) -> Result<(), PageError> {
    let operations = page_operations(doc, page_id)?;
    walk_page_operations(doc, page_id, &operations, sink);
    Ok(())
}

/// Walk already-decoded page operators. Operator indices in reported spans
/// refer to `operations`.
pub fn walk_page_operations<S: ContentSink>(
    doc: &Document,
    page_id: ObjectId,
    operations: &[Operation],
    sink: &mut S,
) {
    let resources = Resources::for_page(doc, page_id);
    let mut walker = Walker {
        doc,
        sink,
        seq: 0,
        fonts: HashMap::new(),
        form_stack: Vec::new(),
    };
    walker.run(operations, StreamId::Page, resources, GraphicsState::default());
}

#[derive(Clone)]
struct TextState {
    font: Rc<Font>,
    /// Why glyph positions from this font can't be trusted
    font_gap: Option<String>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Rc::new(Font::fallback()),
            font_gap: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill_space: ColorSpace,
    fill: Option<FillColor>,
    fill_alpha: f32,
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill_space: ColorSpace::Gray,
            fill: Some(FillColor::BLACK),
            fill_alpha: 1.0,
            text: TextState::default(),
        }
    }
}

#[derive(Default)]
struct PathBuilder {
    items: Vec<PathItem>,
    current: Option<Point>,
    subpath_start: Option<Point>,
    start_index: Option<usize>,
    clips: bool,
}

impl PathBuilder {
    fn touch(&mut self, index: usize) {
        self.start_index.get_or_insert(index);
    }
}

struct Walker<'a, 's, S: ContentSink> {
    doc: &'a Document,
    sink: &'s mut S,
    seq: DrawSequence,
    fonts: HashMap<ObjectId, Rc<Font>>,
    form_stack: Vec<ObjectId>,
}

fn operands(op: &Operation) -> Vec<f64> {
    op.operands.iter().filter_map(number).collect()
}

fn matrix_from(values: &[f64]) -> Option<Matrix> {
    match values {
        [a, b, c, d, e, f] => Some(Matrix::new(*a, *b, *c, *d, *e, *f)),
        _ => None,
    }
}

impl<'a, 's, S: ContentSink> Walker<'a, 's, S> {
    fn next_seq(&mut self) -> DrawSequence {
        self.seq += 1;
        self.seq
    }

    fn run(
        &mut self,
        operations: &[Operation],
        stream: StreamId,
        resources: Resources<'a>,
        initial: GraphicsState,
    ) {
        let mut gs = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut path = PathBuilder::default();
        let mut tm = Matrix::IDENTITY;
        let mut tlm = Matrix::IDENTITY;

        for (index, op) in operations.iter().enumerate() {
            let nums = operands(op);
            match op.operator.as_str() {
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(&nums) {
                        gs.ctm = m.then(&gs.ctm);
                    }
                }

                // colour
                "g" => {
                    gs.fill_space = ColorSpace::Gray;
                    gs.fill = ColorSpace::Gray.color_from(&to_f32(&nums));
                }
                "rg" => {
                    gs.fill_space = ColorSpace::Rgb;
                    gs.fill = ColorSpace::Rgb.color_from(&to_f32(&nums));
                }
                "k" => {
                    gs.fill_space = ColorSpace::Cmyk;
                    gs.fill = ColorSpace::Cmyk.color_from(&to_f32(&nums));
                }
                "cs" => {
                    gs.fill_space = match op.operands.first() {
                        Some(Object::Name(name)) => self.color_space(resources, name),
                        _ => ColorSpace::Unsupported,
                    };
                    gs.fill = gs.fill_space.initial_color();
                }
                "sc" | "scn" => {
                    let pattern_name = op.operands.iter().any(|o| matches!(o, Object::Name(_)));
                    gs.fill = if pattern_name {
                        None
                    } else {
                        gs.fill_space.color_from(&to_f32(&nums))
                    };
                }
                "gs" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        if let Some(alpha) = self.fill_alpha(resources, name) {
                            gs.fill_alpha = alpha;
                        }
                    }
                }

                // path construction
                "m" => {
                    if let [x, y, ..] = nums[..] {
                        path.touch(index);
                        let p = gs.ctm.apply(x, y);
                        path.current = Some(p);
                        path.subpath_start = Some(p);
                    }
                }
                "l" => {
                    if let [x, y, ..] = nums[..] {
                        path.touch(index);
                        let p = gs.ctm.apply(x, y);
                        if let Some(from) = path.current {
                            path.items.push(PathItem::Line(from, p));
                        }
                        path.current = Some(p);
                    }
                }
                "c" | "v" | "y" => {
                    path.touch(index);
                    let from = path.current.unwrap_or(Point::new(0.0, 0.0));
                    let pts: Vec<Point> = nums
                        .chunks_exact(2)
                        .map(|c| gs.ctm.apply(c[0], c[1]))
                        .collect();
                    let curve = match (op.operator.as_str(), pts.as_slice()) {
                        ("c", [c1, c2, end, ..]) => Some([from, *c1, *c2, *end]),
                        ("v", [c2, end, ..]) => Some([from, from, *c2, *end]),
                        ("y", [c1, end, ..]) => Some([from, *c1, *end, *end]),
                        _ => None,
                    };
                    if let Some(curve) = curve {
                        path.current = Some(curve[3]);
                        path.items.push(PathItem::Curve(curve));
                    }
                }
                "h" => {
                    path.touch(index);
                    if let (Some(from), Some(start)) = (path.current, path.subpath_start) {
                        if from != start {
                            path.items.push(PathItem::Line(from, start));
                        }
                        path.current = Some(start);
                    }
                }
                "re" => {
                    if let [x, y, w, h, ..] = nums[..] {
                        path.touch(index);
                        path.items.push(rect_item(&gs.ctm, x, y, w, h));
                        let origin = gs.ctm.apply(x, y);
                        path.current = Some(origin);
                        path.subpath_start = Some(origin);
                    }
                }
                "W" | "W*" => {
                    path.touch(index);
                    path.clips = true;
                }

                // path painting
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    let kind = match op.operator.as_str() {
                        "S" | "s" => PaintKind::Stroke,
                        "f" | "F" | "f*" => PaintKind::Fill,
                        _ => PaintKind::FillStroke,
                    };
                    let seq = self.next_seq();
                    let built = std::mem::take(&mut path);
                    if !built.items.is_empty() {
                        let points: Vec<Point> =
                            built.items.iter().flat_map(PathItem::points).collect();
                        self.sink.on_path(PaintedPath {
                            seq,
                            kind,
                            fill: gs.fill,
                            fill_opacity: gs.fill_alpha,
                            bounds: Rect::bounding(&points),
                            items: built.items,
                            span: OpSpan {
                                stream,
                                start: built.start_index.unwrap_or(index),
                                end: index,
                            },
                            clips: built.clips,
                        });
                    }
                }
                "n" => path = PathBuilder::default(),

                // text objects and state
                "BT" => {
                    tm = Matrix::IDENTITY;
                    tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.select_font(resources, name, &mut gs.text);
                    }
                    if let Some(size) = op.operands.get(1).and_then(number) {
                        gs.text.size = size;
                    }
                }
                "Tc" => gs.text.char_spacing = nums.first().copied().unwrap_or(0.0),
                "Tw" => gs.text.word_spacing = nums.first().copied().unwrap_or(0.0),
                "Tz" => gs.text.h_scale = nums.first().copied().unwrap_or(100.0) / 100.0,
                "TL" => gs.text.leading = nums.first().copied().unwrap_or(0.0),
                "Ts" => gs.text.rise = nums.first().copied().unwrap_or(0.0),
                "Td" | "TD" => {
                    if let [tx, ty, ..] = nums[..] {
                        if op.operator == "TD" {
                            gs.text.leading = -ty;
                        }
                        tlm = Matrix::translate(tx, ty).then(&tlm);
                        tm = tlm;
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_from(&nums) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -gs.text.leading).then(&tlm);
                    tm = tlm;
                }

                // text showing
                "Tj" | "'" | "\"" | "TJ" => {
                    if op.operator == "\"" {
                        if let [aw, ac, ..] = nums[..] {
                            gs.text.word_spacing = aw;
                            gs.text.char_spacing = ac;
                        }
                    }
                    if op.operator == "'" || op.operator == "\"" {
                        tlm = Matrix::translate(0.0, -gs.text.leading).then(&tlm);
                        tm = tlm;
                    }
                    let seq = self.next_seq();
                    if let Some(reason) = &gs.text.font_gap {
                        self.sink.on_trace_gap(reason);
                    }
                    for operand in &op.operands {
                        match operand {
                            Object::String(bytes, _) => {
                                self.show_string(bytes, &gs, &mut tm, seq);
                            }
                            Object::Array(items) => {
                                for item in items {
                                    match item {
                                        Object::String(bytes, _) => {
                                            self.show_string(bytes, &gs, &mut tm, seq);
                                        }
                                        other => {
                                            if let Some(adjust) = number(other) {
                                                let tx = -adjust / 1000.0
                                                    * gs.text.size
                                                    * gs.text.h_scale;
                                                tm = Matrix::translate(tx, 0.0).then(&tm);
                                            }
                                        }
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }

                // external objects
                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.draw_xobject(resources, name, &gs, stream, index);
                    }
                }
                "BI" | "sh" => {
                    let seq = self.next_seq();
                    if op.operator == "BI" {
                        self.sink.on_image(PlacedImage {
                            seq,
                            bounds: gs.ctm.transform_rect(0.0, 0.0, 1.0, 1.0),
                            span: OpSpan {
                                stream,
                                start: index,
                                end: index,
                            },
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn show_string(&mut self, bytes: &[u8], gs: &GraphicsState, tm: &mut Matrix, seq: DrawSequence) {
        let text = &gs.text;
        let font = Rc::clone(&text.font);
        for glyph in font.decode(bytes) {
            let w0 = glyph.width / 1000.0;
            let trm = Matrix::new(text.size * text.h_scale, 0.0, 0.0, text.size, 0.0, text.rise)
                .then(tm)
                .then(&gs.ctm);
            let bbox = trm.transform_rect(0.0, font.descent, w0, font.ascent);
            let origin = trm.apply(0.0, 0.0);
            let advance_end = trm.apply(w0, 0.0);
            let top = trm.apply(0.0, 1.0);
            let em = ((top.x - origin.x).powi(2) + (top.y - origin.y).powi(2)).sqrt();
            for ch in glyph.text.chars() {
                self.sink.on_glyph(ShownGlyph {
                    ch,
                    bbox,
                    seq,
                    origin,
                    advance_end,
                    em,
                });
            }
            let spacing = text.char_spacing + if glyph.is_word_space { text.word_spacing } else { 0.0 };
            let tx = (w0 * text.size + spacing) * text.h_scale;
            *tm = Matrix::translate(tx, 0.0).then(tm);
        }
    }

    fn select_font(&mut self, resources: Resources<'a>, name: &[u8], text: &mut TextState) {
        let label = String::from_utf8_lossy(name);
        match resources.lookup(b"Font", name) {
            Some((id, obj)) => {
                let Some(dict) = resolve_dict(self.doc, obj) else {
                    text.font = Rc::new(Font::fallback());
                    text.font_gap = Some(format!("font /{} is not a dictionary", label));
                    return;
                };
                let doc = self.doc;
                let font = match id {
                    Some(id) => Rc::clone(
                        self.fonts
                            .entry(id)
                            .or_insert_with(|| Rc::new(Font::from_dict(doc, dict))),
                    ),
                    None => Rc::new(Font::from_dict(doc, dict)),
                };
                text.font_gap = (font.kind == FontKind::Type3)
                    .then(|| format!("font /{} is a Type3 font", label));
                text.font = font;
            }
            None => {
                text.font = Rc::new(Font::fallback());
                text.font_gap = Some(format!("font /{} not found in page resources", label));
            }
        }
    }

    fn color_space(&self, resources: Resources<'a>, name: &[u8]) -> ColorSpace {
        if let Some(space) = ColorSpace::from_device_name(name) {
            return space;
        }
        let Some((_, obj)) = resources.lookup(b"ColorSpace", name) else {
            return ColorSpace::Unsupported;
        };
        match obj {
            Object::Name(n) => ColorSpace::from_device_name(n).unwrap_or(ColorSpace::Unsupported),
            Object::Array(arr) => match arr.first() {
                Some(Object::Name(family)) if family.as_slice() == b"ICCBased" => arr
                    .get(1)
                    .and_then(|o| resolve_dict(self.doc, o))
                    .and_then(|d| d.get(b"N").ok())
                    .and_then(number)
                    .map(|n| ColorSpace::from_component_count(n as i64))
                    .unwrap_or(ColorSpace::Unsupported),
                Some(Object::Name(family)) => {
                    ColorSpace::from_device_name(family).unwrap_or(ColorSpace::Unsupported)
                }
                _ => ColorSpace::Unsupported,
            },
            _ => ColorSpace::Unsupported,
        }
    }

    fn fill_alpha(&self, resources: Resources<'a>, name: &[u8]) -> Option<f32> {
        let (_, obj) = resources.lookup(b"ExtGState", name)?;
        let dict = resolve_dict(self.doc, obj)?;
        let (_, ca) = resolve(self.doc, dict.get(b"ca").ok()?)?;
        number(ca).map(|a| a as f32)
    }

    fn draw_xobject(
        &mut self,
        resources: Resources<'a>,
        name: &[u8],
        gs: &GraphicsState,
        stream: StreamId,
        index: usize,
    ) {
        let Some((id, Object::Stream(xobject))) = resources.lookup(b"XObject", name) else {
            return;
        };
        let is_form = matches!(
            xobject.dict.get(b"Subtype"),
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Form"
        );
        if !is_form {
            let seq = self.next_seq();
            self.sink.on_image(PlacedImage {
                seq,
                bounds: gs.ctm.transform_rect(0.0, 0.0, 1.0, 1.0),
                span: OpSpan {
                    stream,
                    start: index,
                    end: index,
                },
            });
            return;
        }

        let Some(form_id) = id else { return };
        if self.form_stack.len() >= MAX_FORM_DEPTH || self.form_stack.contains(&form_id) {
            tracing::debug!(?form_id, "skipping recursive or deeply nested form");
            return;
        }
        let Ok(operations) = form_operations(self.doc, form_id) else {
            tracing::debug!(?form_id, "form content could not be decoded");
            return;
        };
        let form_matrix = xobject
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| matrix_from(&arr.iter().filter_map(number).collect::<Vec<_>>()))
            .unwrap_or(Matrix::IDENTITY);
        let mut inner = gs.clone();
        inner.ctm = form_matrix.then(&gs.ctm);
        let form_resources = resources.for_form(&xobject.dict);
        self.form_stack.push(form_id);
        self.run(&operations, StreamId::Form(form_id), form_resources, inner);
        self.form_stack.pop();
    }
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

fn rect_item(ctm: &Matrix, x: f64, y: f64, w: f64, h: f64) -> PathItem {
    if ctm.preserves_axes() {
        PathItem::Rect(ctm.transform_rect(x, y, x + w, y + h))
    } else {
        PathItem::Quad([
            ctm.apply(x, y),
            ctm.apply(x + w, y),
            ctm.apply(x + w, y + h),
            ctm.apply(x, y + h),
        ])
    }
}
