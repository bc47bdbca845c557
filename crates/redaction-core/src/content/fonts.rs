//! Font metrics and character decoding for glyph placement
//!
//! Only what glyph boxes need: advance widths, ascent/descent and a
//! code-to-Unicode mapping. Glyph outlines are never read.

use super::resources::{dict_name, dict_number, number, resolve, resolve_dict, stream_bytes};
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

const DEFAULT_ASCENT: f64 = 0.8;
const DEFAULT_DESCENT: f64 = -0.2;
const MAX_BFRANGE_SPAN: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Simple,
    Composite,
    Type3,
}

/// One character code decoded from a shown string
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    /// Unicode text for the code, empty when unknown
    pub text: String,
    /// Advance width in glyph space (thousandths of an em)
    pub width: f64,
    /// Single-byte code 32, which receives word spacing
    pub is_word_space: bool,
}

#[derive(Debug, Clone)]
pub struct Font {
    pub kind: FontKind,
    pub base_font: String,
    /// Ascent and descent as fractions of an em
    pub ascent: f64,
    pub descent: f64,
    first_char: u32,
    widths: Vec<f64>,
    missing_width: f64,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    differences: HashMap<u32, char>,
    to_unicode: Option<HashMap<u32, String>>,
}

impl Font {
    /// Stand-in used when a font resource cannot be resolved
    pub fn fallback() -> Self {
        Self {
            kind: FontKind::Simple,
            base_font: String::new(),
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
            first_char: 0,
            widths: Vec::new(),
            missing_width: 500.0,
            cid_widths: HashMap::new(),
            default_width: 1000.0,
            differences: HashMap::new(),
            to_unicode: None,
        }
    }

    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let mut font = Self::fallback();
        font.base_font = dict_name(doc, dict, b"BaseFont")
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();
        font.kind = match dict_name(doc, dict, b"Subtype") {
            Some(b"Type0") => FontKind::Composite,
            Some(b"Type3") => FontKind::Type3,
            _ => FontKind::Simple,
        };

        let descriptor_owner = if font.kind == FontKind::Composite {
            let descendant = descendant_font(doc, dict);
            if let Some(cid_font) = descendant {
                font.default_width = dict_number(doc, cid_font, b"DW").unwrap_or(1000.0);
                font.cid_widths = parse_cid_widths(doc, cid_font);
            }
            descendant
        } else {
            font.first_char = dict_number(doc, dict, b"FirstChar").unwrap_or(0.0).max(0.0) as u32;
            font.widths = dict
                .get(b"Widths")
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(|(_, o)| o.as_array().ok())
                .map(|arr| arr.iter().map(|w| number(w).unwrap_or(0.0)).collect())
                .unwrap_or_default();
            font.missing_width = if font.base_font.contains("Courier") {
                600.0
            } else {
                500.0
            };
            font.differences = parse_differences(doc, dict);
            Some(dict)
        };

        if let Some(descriptor) = descriptor_owner
            .and_then(|d| d.get(b"FontDescriptor").ok())
            .and_then(|o| resolve_dict(doc, o))
        {
            if let Some(mw) = dict_number(doc, descriptor, b"MissingWidth") {
                if font.kind == FontKind::Simple && mw > 0.0 {
                    font.missing_width = mw;
                }
            }
            let ascent = dict_number(doc, descriptor, b"Ascent").map(|a| a / 1000.0);
            let descent = dict_number(doc, descriptor, b"Descent").map(|d| d / 1000.0);
            if let (Some(a), Some(d)) = (ascent, descent) {
                // some producers write zeros or swap the signs
                if a > 0.0 && d <= 0.0 && a - d > 0.0 {
                    font.ascent = a;
                    font.descent = d;
                }
            }
        }

        font.to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|(_, o)| o.as_stream().ok())
            .and_then(stream_bytes)
            .map(|bytes| parse_to_unicode(&bytes));

        font
    }

    fn code_width(&self, code: u32) -> f64 {
        match self.kind {
            FontKind::Composite => self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width),
            _ => code
                .checked_sub(self.first_char)
                .and_then(|i| self.widths.get(i as usize))
                .copied()
                .filter(|w| *w > 0.0)
                .unwrap_or(self.missing_width),
        }
    }

    fn code_text(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(&code)) {
            return text.clone();
        }
        match self.kind {
            FontKind::Composite => char::from_u32(code)
                .filter(|c| !c.is_control())
                .map(String::from)
                .unwrap_or_default(),
            _ => self
                .differences
                .get(&code)
                .copied()
                .or_else(|| win_ansi_char(code as u8))
                .map(String::from)
                .unwrap_or_default(),
        }
    }

    /// Split a shown string into character codes
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        match self.kind {
            FontKind::Composite => bytes
                .chunks(2)
                .map(|pair| {
                    let code = pair.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                    DecodedGlyph {
                        code,
                        text: self.code_text(code),
                        width: self.code_width(code),
                        is_word_space: false,
                    }
                })
                .collect(),
            _ => bytes
                .iter()
                .map(|b| {
                    let code = *b as u32;
                    DecodedGlyph {
                        code,
                        text: self.code_text(code),
                        width: self.code_width(code),
                        is_word_space: code == 32,
                    }
                })
                .collect(),
        }
    }
}

fn descendant_font<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let (_, arr) = resolve(doc, dict.get(b"DescendantFonts").ok()?)?;
    let first = arr.as_array().ok()?.first()?;
    resolve_dict(doc, first)
}

/// `/W` array: `c [w1 w2 ...]` or `c_first c_last w`
fn parse_cid_widths(doc: &Document, cid_font: &Dictionary) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let Some(arr) = cid_font
        .get(b"W")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|(_, o)| o.as_array().ok())
    else {
        return widths;
    };

    let mut i = 0;
    while i < arr.len() {
        let Some(start) = number(&arr[i]) else { break };
        let start = start.max(0.0) as u32;
        match arr.get(i + 1).and_then(|o| resolve(doc, o)).map(|(_, o)| o) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset).ok().and_then(|o| start.checked_add(o))
                    else {
                        break;
                    };
                    if let Some(w) = number(w) {
                        widths.insert(cid, w);
                    }
                }
                i += 2;
            }
            Some(end) => {
                let (Some(end), Some(w)) = (number(end), arr.get(i + 2).and_then(number)) else {
                    break;
                };
                let end = (end.max(0.0) as u32).min(start.saturating_add(MAX_BFRANGE_SPAN));
                for cid in start..=end {
                    widths.insert(cid, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn parse_differences(doc: &Document, dict: &Dictionary) -> HashMap<u32, char> {
    let mut map = HashMap::new();
    let Some(encoding) = dict.get(b"Encoding").ok().and_then(|o| resolve_dict(doc, o)) else {
        return map;
    };
    let Some(diffs) = encoding
        .get(b"Differences")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|(_, o)| o.as_array().ok())
    else {
        return map;
    };

    // None once a run has walked past the last code
    let mut code = Some(0u32);
    for item in diffs {
        match item {
            Object::Integer(start) => code = Some((*start).clamp(0, u32::MAX as i64) as u32),
            Object::Name(name) => {
                let Some(current) = code else { continue };
                if let Some(ch) = glyph_name_char(name) {
                    map.insert(current, ch);
                }
                code = current.checked_add(1);
            }
            _ => {}
        }
    }
    map
}

/// Unicode for the glyph names producers commonly put in `/Differences`
fn glyph_name_char(name: &[u8]) -> Option<char> {
    let name = std::str::from_utf8(name).ok()?;
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c);
        }
    }
    let hex = name
        .strip_prefix("uni")
        .filter(|h| h.len() == 4)
        .or_else(|| name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len())));
    if let Some(ch) = hex
        .and_then(|h| u32::from_str_radix(h, 16).ok())
        .and_then(char::from_u32)
    {
        return Some(ch);
    }
    let ch = match name {
        "space" | "nbspace" => ' ',
        "period" => '.',
        "comma" => ',',
        "hyphen" | "minus" => '-',
        "underscore" => '_',
        "colon" => ':',
        "semicolon" => ';',
        "slash" => '/',
        "parenleft" => '(',
        "parenright" => ')',
        "quotesingle" | "quoteright" => '\'',
        "at" => '@',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    };
    Some(ch)
}

/// WinAnsiEncoding, which matches Latin-1 outside 0x80..=0x9F
fn win_ansi_char(code: u8) -> Option<char> {
    let ch = match code {
        0x00..=0x1F | 0x7F => return None,
        0x80 => '€',
        0x82 => '‚',
        0x83 => 'ƒ',
        0x84 => '„',
        0x85 => '…',
        0x86 => '†',
        0x87 => '‡',
        0x88 => 'ˆ',
        0x89 => '‰',
        0x8A => 'Š',
        0x8B => '‹',
        0x8C => 'Œ',
        0x8E => 'Ž',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x98 => '˜',
        0x99 => '™',
        0x9A => 'š',
        0x9B => '›',
        0x9C => 'œ',
        0x9E => 'ž',
        0x9F => 'Ÿ',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        other => other as char,
    };
    Some(ch)
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize_cmap(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|b| *b == b'>')
                    .map_or(data.len(), |p| start + p);
                let digits: Vec<u8> = data[start..end]
                    .iter()
                    .filter(|b| b.is_ascii_hexdigit())
                    .copied()
                    .collect();
                let bytes = digits
                    .chunks(2)
                    .map(|pair| {
                        let hi = (pair[0] as char).to_digit(16).unwrap_or(0);
                        let lo = pair
                            .get(1)
                            .and_then(|b| (*b as char).to_digit(16))
                            .unwrap_or(0);
                        (hi * 16 + lo) as u8
                    })
                    .collect();
                tokens.push(CMapToken::Hex(bytes));
                i = end + 1;
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(CMapToken::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Destination `base` advanced by `offset` in its last UTF-16 unit
fn offset_destination(base: &[u8], offset: u32) -> String {
    let mut bytes = base.to_vec();
    if bytes.len() >= 2 {
        let n = bytes.len();
        let last = u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]).wrapping_add(offset as u16);
        bytes[n - 2..].copy_from_slice(&last.to_be_bytes());
    } else if let Some(b) = bytes.last_mut() {
        *b = b.wrapping_add(offset as u8);
    }
    utf16_text(&bytes)
}

/// `bfchar` and `bfrange` sections of a ToUnicode CMap
pub(crate) fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize_cmap(data);
    let mut map = HashMap::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Word(w) if w == "beginbfchar" => {
                i += 1;
                while let (Some(CMapToken::Hex(src)), Some(CMapToken::Hex(dst))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    map.insert(code_value(src), utf16_text(dst));
                    i += 2;
                }
            }
            CMapToken::Word(w) if w == "beginbfrange" => {
                i += 1;
                while let (Some(CMapToken::Hex(lo)), Some(CMapToken::Hex(hi))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    let (lo, hi) = (code_value(lo), code_value(hi));
                    let hi = hi.min(lo.saturating_add(MAX_BFRANGE_SPAN));
                    match tokens.get(i + 2) {
                        Some(CMapToken::Hex(dst)) => {
                            for code in lo..=hi {
                                map.insert(code, offset_destination(dst, code - lo));
                            }
                            i += 3;
                        }
                        Some(CMapToken::ArrayStart) => {
                            i += 3;
                            let mut code = Some(lo);
                            while let Some(CMapToken::Hex(dst)) = tokens.get(i) {
                                if let Some(c) = code.filter(|c| *c <= hi) {
                                    map.insert(c, utf16_text(dst));
                                }
                                code = code.and_then(|c| c.checked_add(1));
                                i += 1;
                            }
                            if let Some(CMapToken::ArrayEnd) = tokens.get(i) {
                                i += 1;
                            }
                        }
                        _ => {
                            i += 2;
                            break;
                        }
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}
