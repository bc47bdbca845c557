//! Fixture documents built with lopdf

#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// "SECRET" set at 10pt with 200% horizontal scale fills (100,105)-(160,115),
/// then a black box covers (100,100)-(200,120)
pub const SECRET_UNDER_BOX: &str =
    "BT /F1 10 Tf 200 Tz 100 107 Td (SECRET) Tj ET 0 g 100 100 100 20 re f";

/// The same box painted before the text
pub const BOX_BEFORE_TEXT: &str =
    "0 g 100 100 100 20 re f BT /F1 10 Tf 200 Tz 100 107 Td (SECRET) Tj ET";

pub const PLAIN_TEXT: &str = "BT /F1 12 Tf 72 700 Td (Quarterly figures) Tj ET";

/// Thin rules and grey boxes that must not be taken for redactions
pub const NOT_REDACTIONS: &str = "BT /F1 12 Tf 72 700 Td (Summary) Tj ET \
    0 g 72 690 300 1 re f \
    0.5 g 72 600 100 20 re f \
    0 G 72 500 100 20 re S";

/// A 2x1 grey inline image scaled to (300,300)-(320,310)
pub const INLINE_IMAGE: &str =
    "q 20 0 0 10 300 300 cm BI /W 2 /H 1 /CS /G /BPC 8 ID \x00\x7f EI Q";

/// Text set well away from the redaction box
pub const FOOTER: &str = "BT /F1 10 Tf 100 50 Td (Footer) Tj ET";

/// One page per content string, all sharing a Helvetica `/F1`
pub fn build_document(contents: &[&str]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Add a form XObject and register it as `/Fm1` on every page
pub fn add_shared_form(doc: &mut Document, content: &str) -> ObjectId {
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        },
        content.as_bytes().to_vec(),
    ));
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let resources = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .and_then(|page| page.get_mut(b"Resources"))
            .and_then(Object::as_dict_mut)
            .expect("fixture pages carry resources");
        resources.set("XObject", dictionary! { "Fm1" => form_id });
    }
    form_id
}

pub fn build_pdf(contents: &[&str]) -> Vec<u8> {
    let mut doc = build_document(contents);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture should serialise");
    bytes
}
