//! Resource dictionary lookup with reference resolution and inheritance

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

const MAX_REFERENCE_HOPS: usize = 32;
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Follow indirect references until a direct object is reached.
/// Returns the id of the last reference followed, if any.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<(Option<ObjectId>, &'a Object)> {
    let mut current = obj;
    let mut id = None;
    for _ in 0..MAX_REFERENCE_HOPS {
        match current {
            Object::Reference(r) => {
                id = Some(*r);
                current = doc.get_object(*r).ok()?;
            }
            other => return Some((id, other)),
        }
    }
    None
}

pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)?.1 {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Numeric value of an integer or real operand
pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

pub fn dict_number(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<f64> {
    let obj = dict.get(key).ok()?;
    number(resolve(doc, obj)?.1)
}

pub fn dict_name<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match resolve(doc, dict.get(key).ok()?)?.1 {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Raw bytes of a stream, decompressed when it carries a filter
pub fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

/// A resource dictionary in scope for a content stream
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    doc: &'a Document,
    dict: Option<&'a Dictionary>,
}

impl<'a> Resources<'a> {
    pub fn new(doc: &'a Document, dict: Option<&'a Dictionary>) -> Self {
        Self { doc, dict }
    }

    /// Resources of a page, inherited from the page tree when absent
    pub fn for_page(doc: &'a Document, page_id: ObjectId) -> Self {
        let mut node = doc.get_dictionary(page_id).ok();
        for _ in 0..MAX_PAGE_TREE_DEPTH {
            let Some(dict) = node else { break };
            if let Some(res) = dict.get(b"Resources").ok().and_then(|o| resolve_dict(doc, o)) {
                return Self::new(doc, Some(res));
            }
            node = dict.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o));
        }
        Self::new(doc, None)
    }

    /// Resources of a form XObject, falling back to the enclosing scope
    pub fn for_form(&self, form: &'a Dictionary) -> Self {
        match form.get(b"Resources").ok().and_then(|o| resolve_dict(self.doc, o)) {
            Some(res) => Self::new(self.doc, Some(res)),
            None => *self,
        }
    }

    /// Named entry of a resource category (`Font`, `XObject`, `ExtGState`, ...)
    pub fn lookup(&self, category: &[u8], name: &[u8]) -> Option<(Option<ObjectId>, &'a Object)> {
        let dict = self.dict?;
        let category = resolve_dict(self.doc, dict.get(category).ok()?)?;
        resolve(self.doc, category.get(name).ok()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_page_inherits_resources_from_parent() {
        let mut doc = Document::with_version("1.7");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });

        let resources = Resources::for_page(&doc, page_id);
        let (id, font) = resources.lookup(b"Font", b"F1").unwrap();
        assert_eq!(id, Some(font_id));
        assert!(font.as_dict().is_ok());
        assert!(resources.lookup(b"Font", b"F2").is_none());
    }

    #[test]
    fn test_number_accepts_integer_and_real() {
        assert_eq!(number(&Object::Integer(3)), Some(3.0));
        assert_eq!(number(&Object::Real(0.5)), Some(0.5));
        assert_eq!(number(&Object::Null), None);
    }
}
