//! Inline images (`BI … ID … EI`)
//!
//! The bytes between `ID` and `EI` are raw sample data, which the operator
//! parser can't read. Each inline image is lifted out before decoding and
//! carried as the single string operand of a `BI` operation, then written
//! back byte-for-byte when the stream is encoded.

use crate::error::PageError;
use lopdf::content::{Content, Operation};
use lopdf::Object;

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Finds bare keywords, stepping over strings, names and comments
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn skip_regular(&mut self) {
        while self.pos < self.bytes.len() && is_regular(self.bytes[self.pos]) {
            self.pos += 1;
        }
    }

    fn skip_literal_string(&mut self) {
        let mut depth = 0usize;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 1,
                b'(' => depth += 1,
                b')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn skip_until(&mut self, stop: impl Fn(u8) -> bool) {
        while self.pos < self.bytes.len() && !stop(self.bytes[self.pos]) {
            self.pos += 1;
        }
    }

    /// Start offset and text of the next keyword or number
    fn next_word(&mut self) -> Option<(usize, &'a [u8])> {
        let bytes = self.bytes;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'(' => self.skip_literal_string(),
                b'%' => self.skip_until(|b| b == b'\r' || b == b'\n'),
                b'<' if bytes.get(self.pos + 1) == Some(&b'<') => self.pos += 2,
                b'<' => {
                    self.skip_until(|b| b == b'>');
                    self.pos += 1;
                }
                b'/' => {
                    self.pos += 1;
                    self.skip_regular();
                }
                b if is_regular(b) => {
                    let start = self.pos;
                    self.skip_regular();
                    return Some((start, &bytes[start..self.pos]));
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}

/// End (exclusive) of the `EI` closing image data that starts at `data_start`
fn image_end(bytes: &[u8], data_start: usize) -> Option<usize> {
    (data_start..bytes.len().saturating_sub(1)).find_map(|i| {
        let closes = &bytes[i..i + 2] == b"EI"
            && i > 0
            && is_whitespace(bytes[i - 1])
            && bytes.get(i + 2).map_or(true, |&b| !is_regular(b));
        closes.then_some(i + 2)
    })
}

fn unterminated() -> PageError {
    PageError::ContentDecode("inline image is not terminated by EI".to_string())
}

fn push_placeholder(out: &mut Vec<u8>, raw: &[u8]) {
    out.extend_from_slice(b"\n<");
    for b in raw {
        out.extend_from_slice(format!("{:02X}", b).as_bytes());
    }
    out.extend_from_slice(b"> BI\n");
}

/// `bytes` with every inline image replaced by `<raw image hex> BI`
fn lift_inline_images(bytes: &[u8]) -> Result<Vec<u8>, PageError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut scanner = Scanner::new(bytes);
    let mut copied = 0;
    while let Some((start, word)) = scanner.next_word() {
        if word != b"BI" {
            continue;
        }
        let data_start = loop {
            match scanner.next_word() {
                Some((_, word)) if word == b"ID" => break scanner.pos + 1,
                Some(_) => {}
                None => return Err(unterminated()),
            }
        };
        let end = image_end(bytes, data_start).ok_or_else(unterminated)?;
        out.extend_from_slice(&bytes[copied..start]);
        push_placeholder(&mut out, &bytes[start..end]);
        copied = end;
        scanner.pos = end;
    }
    out.extend_from_slice(&bytes[copied..]);
    Ok(out)
}

/// Raw `BI … EI` bytes carried by a lifted inline image operation
pub fn inline_image_bytes(op: &Operation) -> Option<&[u8]> {
    match (op.operator.as_str(), op.operands.as_slice()) {
        ("BI", [Object::String(raw, _)]) => Some(raw.as_slice()),
        _ => None,
    }
}

/// Decode a content stream, inline images included
pub fn decode_operations(bytes: &[u8]) -> Result<Vec<Operation>, PageError> {
    let lifted = lift_inline_images(bytes)?;
    let operations = Content::decode(&lifted)
        .map(|c| c.operations)
        .map_err(|e| PageError::ContentDecode(e.to_string()))?;
    // a stray ID or EI means the parser lost its place
    if operations
        .iter()
        .any(|op| matches!(op.operator.as_str(), "ID" | "EI"))
    {
        return Err(PageError::ContentDecode(
            "inline image operators out of place".to_string(),
        ));
    }
    Ok(operations)
}

fn flush(out: &mut Vec<u8>, pending: &mut Vec<Operation>) -> Result<(), PageError> {
    if pending.is_empty() {
        return Ok(());
    }
    let bytes = Content {
        operations: std::mem::take(pending),
    }
    .encode()
    .map_err(|e| PageError::Rewrite(e.to_string()))?;
    out.extend_from_slice(&bytes);
    out.push(b'\n');
    Ok(())
}

/// Encode operations from [`decode_operations`], writing inline images back verbatim
pub fn encode_operations(operations: &[Operation]) -> Result<Vec<u8>, PageError> {
    let mut out = Vec::new();
    let mut pending = Vec::new();
    for op in operations {
        match inline_image_bytes(op) {
            Some(raw) => {
                flush(&mut out, &mut pending)?;
                out.extend_from_slice(raw);
                out.push(b'\n');
            }
            None => pending.push(op.clone()),
        }
    }
    flush(&mut out, &mut pending)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const IMAGE: &[u8] = b"BI /W 2 /H 1 /CS /G /BPC 8 ID \x00\xff EI";

    fn operators(operations: &[Operation]) -> Vec<&str> {
        operations.iter().map(|op| op.operator.as_str()).collect()
    }

    fn stream_with_image(before: &[u8], image: &[u8], after: &[u8]) -> Vec<u8> {
        [before, image, after].concat()
    }

    #[test]
    fn test_operators_after_an_inline_image_are_kept() {
        let bytes = stream_with_image(
            b"q 2 0 0 1 300 300 cm ",
            IMAGE,
            b" Q BT /F1 10 Tf (Footer) Tj ET",
        );
        let operations = decode_operations(&bytes).unwrap();
        assert_eq!(
            operators(&operations),
            vec!["q", "cm", "BI", "Q", "BT", "Tf", "Tj", "ET"]
        );
        assert_eq!(inline_image_bytes(&operations[2]), Some(IMAGE));
    }

    #[test]
    fn test_image_data_survives_encoding() {
        let bytes = stream_with_image(b"q ", IMAGE, b" Q 0 g 0 0 5 5 re f");
        let operations = decode_operations(&bytes).unwrap();
        let encoded = encode_operations(&operations).unwrap();
        assert!(encoded.windows(IMAGE.len()).any(|w| w == IMAGE));
        let again = decode_operations(&encoded).unwrap();
        assert_eq!(operators(&again), operators(&operations));
        assert_eq!(inline_image_bytes(&again[1]), Some(IMAGE));
    }

    #[test]
    fn test_ei_inside_sample_data_does_not_end_the_image() {
        // "EI" glued to other sample bytes is data, not the closing keyword
        let image = b"BI /W 4 /H 1 /CS /G /BPC 8 ID xEIz EI";
        let bytes = stream_with_image(b"", image, b" 0 g 0 0 5 5 re f");
        let operations = decode_operations(&bytes).unwrap();
        assert_eq!(inline_image_bytes(&operations[0]), Some(&image[..]));
        assert_eq!(operators(&operations), vec!["BI", "g", "re", "f"]);
    }

    #[test]
    fn test_keywords_inside_strings_are_text() {
        let bytes = b"BT /F1 10 Tf (BI ID EI) Tj ET 0 g";
        let operations = decode_operations(bytes).unwrap();
        assert_eq!(operators(&operations), vec!["BT", "Tf", "Tj", "ET", "g"]);
    }

    #[test]
    fn test_unterminated_image_is_an_error() {
        let err = decode_operations(b"q BI /W 1 /H 1 ID \x00 Q").unwrap_err();
        assert!(matches!(err, PageError::ContentDecode(_)));
        assert!(decode_operations(b"q BI /W 1 /H 1").is_err());
    }
}
