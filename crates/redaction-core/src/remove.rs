//! Selective redaction remover
//!
//! Each candidate is marked with a `/Redact` annotation that paints no
//! replacement fill. Applying a page's marks re-walks its content and asks
//! the [`RemovalPolicy`] about every painted object; what the policy removes
//! is cut from the content streams, everything else is left as it was.

use crate::config::{Config, ObjectKind, RemovalPolicy};
use crate::content::inline::encode_operations;
use crate::content::interpreter::{form_operations, page_operations};
use crate::content::resources::{dict_name, number, resolve, resolve_dict};
use crate::content::{
    walk_page_operations, ContentSink, OpSpan, PaintedPath, PlacedImage, StreamId,
};
use crate::error::{PageError, RedactError, Warning, WarningKind};
use crate::geometry::Rect;
use crate::report::scan_document;
use crate::source::DocumentSource;
use lopdf::content::Operation;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Result of a removal run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalOutcome {
    /// Marked candidates across all pages
    pub removed: usize,
    pub warnings: Vec<Warning>,
    pub output: PathBuf,
}

/// `<stem>_unredacted.<ext>` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_unredacted.{}", stem, ext.to_string_lossy()),
        None => format!("{}_unredacted", stem),
    };
    input.with_file_name(name)
}

fn rewrite_error(e: impl std::fmt::Display) -> PageError {
    PageError::Rewrite(e.to_string())
}

/// Where a page's `/Annots` array lives (`Some` when indirect) and its items
fn page_annotations(
    doc: &Document,
    page_id: ObjectId,
) -> Result<(Option<ObjectId>, Vec<Object>), PageError> {
    let page = doc.get_dictionary(page_id).map_err(rewrite_error)?;
    let Ok(annots) = page.get(b"Annots") else {
        return Ok((None, Vec::new()));
    };
    match resolve(doc, annots) {
        Some((location, Object::Array(items))) => Ok((location, items.clone())),
        _ => Ok((None, Vec::new())),
    }
}

fn set_page_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    location: Option<ObjectId>,
    items: Vec<Object>,
) -> Result<(), PageError> {
    if let Some(array_id) = location {
        doc.objects.insert(array_id, Object::Array(items));
        return Ok(());
    }
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(rewrite_error)?;
    if items.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", Object::Array(items));
    }
    Ok(())
}

fn is_redact_annotation(doc: &Document, annot: &Object) -> bool {
    resolve_dict(doc, annot)
        .and_then(|dict| dict_name(doc, dict, b"Subtype"))
        .is_some_and(|subtype| subtype == b"Redact")
}

/// Mark `rect` for removal. The annotation has no `/IC`, so applying it
/// paints nothing in its place.
pub fn mark_redaction(
    doc: &mut Document,
    page_id: ObjectId,
    rect: &Rect,
) -> Result<ObjectId, PageError> {
    let (location, mut items) = page_annotations(doc, page_id)?;
    let annot_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Redact",
        "Rect" => vec![
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y0 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y1 as f32),
        ],
    });
    items.push(Object::Reference(annot_id));
    set_page_annotations(doc, page_id, location, items)?;
    Ok(annot_id)
}

/// Regions of the page's `/Redact` annotations
pub fn redaction_marks(doc: &Document, page_id: ObjectId) -> Result<Vec<Rect>, PageError> {
    let (_, items) = page_annotations(doc, page_id)?;
    Ok(items
        .iter()
        .filter(|annot| is_redact_annotation(doc, annot))
        .filter_map(|annot| {
            let dict = resolve_dict(doc, annot)?;
            let coords: Vec<f64> = resolve(doc, dict.get(b"Rect").ok()?)?
                .1
                .as_array()
                .ok()?
                .iter()
                .filter_map(|o| resolve(doc, o).and_then(|(_, v)| number(v)))
                .collect();
            match coords[..] {
                [x0, y0, x1, y1] => Some(Rect::from_corners(x0, y0, x1, y1)),
                _ => None,
            }
        })
        .collect())
}

fn strip_redaction_marks(doc: &mut Document, page_id: ObjectId) -> Result<(), PageError> {
    let (location, items) = page_annotations(doc, page_id)?;
    let (marks, kept): (Vec<Object>, Vec<Object>) = items
        .into_iter()
        .partition(|annot| is_redact_annotation(doc, annot));
    set_page_annotations(doc, page_id, location, kept)?;
    for mark in marks {
        if let Object::Reference(id) = mark {
            doc.objects.remove(&id);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Cut {
    span: OpSpan,
    /// Keep construction and clip operators, turn the paint into `n`
    keep_clip: bool,
}

/// Sink deciding, per painted object, whether the policy removes it
struct RemovalPlanner<'r> {
    marks: &'r [Rect],
    policy: &'r RemovalPolicy,
    cuts: BTreeMap<StreamId, Vec<Cut>>,
    seen: HashSet<Cut>,
}

impl<'r> RemovalPlanner<'r> {
    fn new(marks: &'r [Rect], policy: &'r RemovalPolicy) -> Self {
        Self {
            marks,
            policy,
            cuts: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    fn touches(&self, bounds: Option<Rect>) -> bool {
        bounds.is_some_and(|b| self.marks.iter().any(|m| m.intersects(&b)))
    }

    fn cut(&mut self, cut: Cut) {
        // a form drawn twice reports the same span twice
        if self.seen.insert(cut) {
            self.cuts.entry(cut.span.stream).or_default().push(cut);
        }
    }

    fn count(&self) -> usize {
        self.seen.len()
    }
}

impl ContentSink for RemovalPlanner<'_> {
    fn on_path(&mut self, path: PaintedPath) {
        let touches = self.touches(path.bounds);
        if self.policy.rule_for(ObjectKind::LineArt).removes(touches) {
            self.cut(Cut {
                span: path.span,
                keep_clip: path.clips,
            });
        }
    }

    fn on_image(&mut self, image: PlacedImage) {
        let touches = self.touches(Some(image.bounds));
        if self.policy.rule_for(ObjectKind::Image).removes(touches) {
            self.cut(Cut {
                span: image.span,
                keep_clip: false,
            });
        }
    }
}

fn is_path_operator(operator: &str) -> bool {
    matches!(
        operator,
        "m" | "l" | "c" | "v" | "y" | "h" | "re" | "W" | "W*"
            | "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n"
    )
}

/// Apply cuts to one stream's operators. Only path operators and the
/// object's final operator are ever dropped.
fn apply_cuts(operations: Vec<Operation>, cuts: &[Cut]) -> Vec<Operation> {
    let len = operations.len();
    let mut dropped = vec![false; len];
    let mut unpainted = vec![false; len];
    for cut in cuts {
        let OpSpan { start, end, .. } = cut.span;
        if end >= len || start > end {
            continue;
        }
        if cut.keep_clip {
            unpainted[end] = true;
            continue;
        }
        for index in start..=end {
            if index == end || is_path_operator(&operations[index].operator) {
                dropped[index] = true;
            }
        }
    }
    operations
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !dropped[*index])
        .map(|(index, op)| {
            if unpainted[index] {
                Operation::new("n", vec![])
            } else {
                op
            }
        })
        .collect()
}

/// Cuts planned for one page, not yet written
struct PagePlan {
    operations: Vec<Operation>,
    cuts: BTreeMap<StreamId, Vec<Cut>>,
    /// Painted objects this page's marks remove
    count: usize,
}

fn plan_page(
    doc: &Document,
    page_id: ObjectId,
    policy: &RemovalPolicy,
) -> Result<Option<PagePlan>, PageError> {
    let marks = redaction_marks(doc, page_id)?;
    if marks.is_empty() {
        return Ok(None);
    }
    let operations = page_operations(doc, page_id)?;
    let mut planner = RemovalPlanner::new(&marks, policy);
    walk_page_operations(doc, page_id, &operations, &mut planner);
    let count = planner.count();
    Ok(Some(PagePlan {
        operations,
        cuts: planner.cuts,
        count,
    }))
}

fn rewrite_page(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
    cuts: &[Cut],
) -> Result<(), PageError> {
    let content = encode_operations(&apply_cuts(operations, cuts))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(rewrite_error)?
        .set("Contents", Object::Reference(content_id));
    Ok(())
}

fn rewrite_form(doc: &mut Document, form_id: ObjectId, cuts: &[Cut]) -> Result<(), PageError> {
    let form_ops = form_operations(doc, form_id)?;
    let content = encode_operations(&apply_cuts(form_ops, cuts))?;
    doc.get_object_mut(form_id)
        .and_then(Object::as_stream_mut)
        .map_err(rewrite_error)?
        .set_plain_content(content);
    Ok(())
}

/// Form cuts gathered across pages; each form is rewritten once
#[derive(Default)]
struct FormEdits {
    /// First page drawing the form, and its cuts
    forms: BTreeMap<ObjectId, (u32, Vec<Cut>)>,
}

impl FormEdits {
    fn add(&mut self, page_number: u32, form_id: ObjectId, cuts: Vec<Cut>) {
        let (_, pending) = self
            .forms
            .entry(form_id)
            .or_insert_with(|| (page_number, Vec::new()));
        for cut in cuts {
            if !pending.contains(&cut) {
                pending.push(cut);
            }
        }
    }

    /// Rewrite every form, returning `(page, error)` for failures
    fn apply(self, doc: &mut Document) -> Vec<(u32, PageError)> {
        self.forms
            .into_iter()
            .filter_map(|(form_id, (page_number, cuts))| {
                rewrite_form(doc, form_id, &cuts)
                    .err()
                    .map(|e| (page_number, e))
            })
            .collect()
    }
}

/// Write a plan's page cuts and queue its form cuts
fn commit_page(
    doc: &mut Document,
    page_number: u32,
    page_id: ObjectId,
    plan: PagePlan,
    forms: &mut FormEdits,
) -> Result<(), PageError> {
    let PagePlan {
        operations, cuts, ..
    } = plan;
    let mut operations = Some(operations);
    for (stream, stream_cuts) in cuts {
        match stream {
            StreamId::Page => {
                let ops = operations.take().unwrap_or_default();
                rewrite_page(doc, page_id, ops, &stream_cuts)?;
            }
            StreamId::Form(form_id) => forms.add(page_number, form_id, stream_cuts),
        }
    }
    Ok(())
}

/// Apply the page's redaction marks under `policy` and remove the marks.
/// Returns the number of painted objects cut from the content.
pub fn apply_redactions(
    doc: &mut Document,
    page_id: ObjectId,
    policy: &RemovalPolicy,
) -> Result<usize, PageError> {
    let Some(plan) = plan_page(doc, page_id, policy)? else {
        return Ok(0);
    };
    let count = plan.count;
    let mut forms = FormEdits::default();
    commit_page(doc, 0, page_id, plan, &mut forms)?;
    if let Some((_, e)) = forms.apply(doc).into_iter().next() {
        return Err(e);
    }
    strip_redaction_marks(doc, page_id)?;
    Ok(count)
}

fn not_applied(page_number: u32, message: impl Into<String>) -> Warning {
    Warning::new(page_number, WarningKind::RedactionNotApplied, message)
}

/// Mark and apply every candidate in an open document.
/// Returns the number of marked candidates and the warnings raised.
///
/// Every page is planned against the unedited content before anything is
/// written, so a form shared between pages is cut once and counts for each
/// page that draws it.
pub fn remove_from_document(doc: &mut Document, config: &Config) -> (usize, Vec<Warning>) {
    let mut scan_warnings = Vec::new();
    let scans = scan_document(doc, config, &mut scan_warnings);
    // glyphs play no part in removal
    let mut warnings: Vec<Warning> = scan_warnings
        .into_iter()
        .filter(|w| w.kind != WarningKind::PageExtractionDegraded)
        .collect();

    let mut removed = 0;
    let mut plans = Vec::new();
    for scan in scans {
        let candidates = &scan.analysis.candidates;
        if candidates.is_empty() {
            continue;
        }
        let marked: Result<Vec<ObjectId>, PageError> = candidates
            .iter()
            .map(|c| mark_redaction(doc, scan.page_id, &c.rect))
            .collect();
        if let Err(e) = marked {
            warnings.push(not_applied(scan.page_number, e.to_string()));
            continue;
        }
        removed += candidates.len();

        match plan_page(doc, scan.page_id, &config.removal) {
            Ok(Some(plan)) => plans.push((scan.page_number, scan.page_id, plan)),
            Ok(None) => {}
            Err(e) => {
                warnings.push(not_applied(scan.page_number, e.to_string()));
                let _ = strip_redaction_marks(doc, scan.page_id);
            }
        }
    }

    let mut forms = FormEdits::default();
    for (page_number, page_id, plan) in plans {
        let count = plan.count;
        if count == 0 {
            warnings.push(not_applied(
                page_number,
                "redactions may not have been applied",
            ));
        }
        match commit_page(doc, page_number, page_id, plan, &mut forms) {
            Ok(()) => debug!(page = page_number, cut = count, "redactions applied"),
            Err(e) => warnings.push(not_applied(page_number, e.to_string())),
        }
        if let Err(e) = strip_redaction_marks(doc, page_id) {
            warnings.push(not_applied(page_number, e.to_string()));
        }
    }
    for (page_number, e) in forms.apply(doc) {
        warnings.push(not_applied(page_number, e.to_string()));
    }
    (removed, warnings)
}

fn save_failed(path: &Path, e: impl std::fmt::Display) -> RedactError {
    RedactError::DocumentSaveFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Garbage-collect, compress and write `doc` to `path`.
///
/// The document is serialised in memory and written to a temporary file
/// beside `path`, which then replaces `path`. A failed write leaves `path`
/// untouched.
pub fn save_document(doc: &mut Document, path: &Path) -> Result<(), RedactError> {
    doc.prune_objects();
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| save_failed(path, e))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| save_failed(path, e))?;
    file.write_all(&bytes).map_err(|e| save_failed(path, e))?;
    file.as_file().sync_all().map_err(|e| save_failed(path, e))?;
    file.persist(path).map_err(|e| save_failed(path, e.error))?;
    Ok(())
}

/// Open `source`, strip its black-box redactions and save to `output`
#[instrument(skip_all, fields(source = %source.source_id(), output = %output.display()))]
pub fn remove_redactions<S: DocumentSource + ?Sized>(
    source: &S,
    output: &Path,
    config: &Config,
) -> Result<RemovalOutcome, RedactError> {
    let mut doc = source.load()?;
    let (removed, warnings) = remove_from_document(&mut doc, config);
    save_document(&mut doc, output)?;
    info!(removed, warnings = warnings.len(), "redactions removed");
    Ok(RemovalOutcome {
        removed,
        warnings,
        output: output.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rule;
    use pretty_assertions::assert_eq;

    fn page(content: &str) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(content_id),
        });
        (doc, page_id)
    }

    fn operators(doc: &Document, page_id: ObjectId) -> Vec<String> {
        page_operations(doc, page_id)
            .unwrap()
            .into_iter()
            .map(|op| op.operator)
            .collect()
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("docs/memo.pdf")),
            PathBuf::from("docs/memo_unredacted.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("memo")),
            PathBuf::from("memo_unredacted")
        );
    }

    #[test]
    fn test_mark_then_read_back() {
        let (mut doc, page_id) = page("");
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();
        let marks = redaction_marks(&doc, page_id).unwrap();
        assert_eq!(marks, vec![Rect::from_corners(100.0, 100.0, 200.0, 120.0)]);

        let annot = page_annotations(&doc, page_id).unwrap().1;
        let dict = resolve_dict(&doc, &annot[0]).unwrap();
        assert!(!dict.has(b"IC"));
    }

    #[test]
    fn test_apply_cuts_box_and_keeps_text() {
        let (mut doc, page_id) = page(
            "BT /F1 10 Tf 100 107 Td (SECRET) Tj ET 0 g 100 100 100 20 re f 0 0 5 5 re f",
        );
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();

        let cut = apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(cut, 1);
        assert_eq!(
            operators(&doc, page_id),
            vec!["BT", "Tf", "Td", "Tj", "ET", "g", "re", "f"]
        );
        assert!(redaction_marks(&doc, page_id).unwrap().is_empty());
        assert!(!doc.get_dictionary(page_id).unwrap().has(b"Annots"));
    }

    #[test]
    fn test_clipping_box_keeps_its_clip() {
        let (mut doc, page_id) = page("q 0 g 100 100 100 20 re W f Q");
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();
        apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(operators(&doc, page_id), vec!["q", "g", "re", "W", "n", "Q"]);
    }

    #[test]
    fn test_line_art_elsewhere_survives() {
        let (mut doc, page_id) = page("0 G 300 300 m 400 300 l S 0 g 100 100 100 20 re f");
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();
        apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(operators(&doc, page_id), vec!["G", "m", "l", "S", "g"]);
    }

    #[test]
    fn test_images_under_marks_are_kept_by_default() {
        let mut doc = Document::with_version("1.7");
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8],
        ));
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            b"q 100 0 0 20 100 100 cm /Im1 Do Q 0 g 100 100 100 20 re f".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => Object::Reference(image_id) },
            },
        });
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();
        apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(operators(&doc, page_id), vec!["q", "cm", "Do", "Q", "g"]);

        let strict = RemovalPolicy {
            image: Rule::IfTouched,
            ..RemovalPolicy::default()
        };
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();
        apply_redactions(&mut doc, page_id, &strict).unwrap();
        assert_eq!(operators(&doc, page_id), vec!["q", "cm", "Q", "g"]);
    }

    #[test]
    fn test_inline_image_under_mark_follows_image_rule() {
        let (mut doc, page_id) = page(
            "0 g 100 100 100 20 re f q 100 0 0 20 100 100 cm \
             BI /W 1 /H 1 /CS /G /BPC 8 ID \x00 EI Q BT /F1 10 Tf (After) Tj ET",
        );
        let mark = Rect::from_corners(100.0, 100.0, 200.0, 120.0);
        mark_redaction(&mut doc, page_id, &mark).unwrap();
        apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(
            operators(&doc, page_id),
            vec!["g", "q", "cm", "BI", "Q", "BT", "Tf", "Tj", "ET"]
        );

        let strict = RemovalPolicy {
            image: Rule::IfTouched,
            ..RemovalPolicy::default()
        };
        mark_redaction(&mut doc, page_id, &mark).unwrap();
        assert_eq!(apply_redactions(&mut doc, page_id, &strict).unwrap(), 1);
        assert_eq!(
            operators(&doc, page_id),
            vec!["g", "q", "cm", "Q", "BT", "Tf", "Tj", "ET"]
        );
    }

    #[test]
    fn test_form_content_is_edited_in_place() {
        let mut doc = Document::with_version("1.7");
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            },
            b"0 g 100 100 100 20 re f".to_vec(),
        ));
        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"/Fm1 Do /Fm1 Do".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Fm1" => Object::Reference(form_id) },
            },
        });
        mark_redaction(&mut doc, page_id, &Rect::from_corners(100.0, 100.0, 200.0, 120.0)).unwrap();

        let cut = apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap();
        assert_eq!(cut, 1);
        let form_ops: Vec<String> = form_operations(&doc, form_id)
            .unwrap()
            .into_iter()
            .map(|op| op.operator)
            .collect();
        assert_eq!(form_ops, vec!["g"]);
        assert_eq!(operators(&doc, page_id), vec!["Do", "Do"]);
    }

    #[test]
    fn test_unmarked_page_is_untouched() {
        let (mut doc, page_id) = page("0 g 100 100 100 20 re f");
        assert_eq!(apply_redactions(&mut doc, page_id, &RemovalPolicy::default()).unwrap(), 0);
        assert_eq!(operators(&doc, page_id), vec!["g", "re", "f"]);
    }
}
