//!Encoders for synthetic chunks used by the unit tests.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::stringpool::{StyleSpan, STYLE_SPAN_END, UTF8_FLAG};

pub(crate) fn chunk_header(typ: u16, header_size: u16, size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.write_u16::<LittleEndian>(typ).unwrap();
    out.write_u16::<LittleEndian>(header_size).unwrap();
    out.write_u32::<LittleEndian>(size).unwrap();
    out
}

///Wraps `chunks` in an XML container chunk whose size covers all of them.
pub(crate) fn axml_file(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut out = chunk_header(0x0003, 8, (body.len() + 8) as u32);
    out.extend(body);
    out
}

pub(crate) fn encode_utf8_entry(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    push_utf8_len(&mut out, s.encode_utf16().count());
    push_utf8_len(&mut out, s.len());
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}

fn push_utf8_len(out: &mut Vec<u8>, len: usize) {
    if len > 0x7f {
        out.push(((len >> 8) as u8) | 0x80);
    }
    out.push(len as u8);
}

pub(crate) fn encode_utf16_entry(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let mut out = Vec::new();
    let len = units.len();
    if len > 0x7fff {
        out.write_u16::<LittleEndian>(((len >> 16) as u16) | 0x8000)
            .unwrap();
    }
    out.write_u16::<LittleEndian>(len as u16).unwrap();
    for unit in units {
        out.write_u16::<LittleEndian>(unit).unwrap();
    }
    out.write_u16::<LittleEndian>(0).unwrap();
    out
}

///Builds a complete string pool chunk the way aapt lays one out.
pub(crate) struct PoolBuilder {
    strings: Vec<String>,
    utf8: bool,
    styles: Vec<Vec<StyleSpan>>,
    padding: usize,
}

impl PoolBuilder {
    pub(crate) fn utf8(strings: &[&str]) -> Self {
        Self::new(strings, true)
    }

    pub(crate) fn utf16(strings: &[&str]) -> Self {
        Self::new(strings, false)
    }

    fn new(strings: &[&str], utf8: bool) -> Self {
        Self {
            strings: strings.iter().map(|s| s.to_string()).collect(),
            utf8,
            styles: Vec::new(),
            padding: 0,
        }
    }

    pub(crate) fn with_styles(mut self, styles: Vec<Vec<StyleSpan>>) -> Self {
        self.styles = styles;
        self
    }

    ///Inserts `padding` zero bytes between the offset tables and the string data.
    pub(crate) fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut string_offsets = Vec::new();
        let mut string_data = Vec::new();
        for s in &self.strings {
            string_offsets.push(string_data.len() as u32);
            if self.utf8 {
                string_data.extend(encode_utf8_entry(s));
            } else {
                string_data.extend(encode_utf16_entry(s));
            }
        }
        while string_data.len() % 4 != 0 {
            string_data.push(0);
        }

        let mut style_offsets = Vec::new();
        let mut style_data = Vec::new();
        for spans in &self.styles {
            style_offsets.push(style_data.len() as u32);
            for span in spans {
                style_data.write_u32::<LittleEndian>(span.name).unwrap();
                style_data.write_u32::<LittleEndian>(span.first_char).unwrap();
                style_data.write_u32::<LittleEndian>(span.last_char).unwrap();
            }
            style_data.write_u32::<LittleEndian>(STYLE_SPAN_END).unwrap();
        }
        if !self.styles.is_empty() {
            style_data.write_u32::<LittleEndian>(STYLE_SPAN_END).unwrap();
            style_data.write_u32::<LittleEndian>(STYLE_SPAN_END).unwrap();
        }

        let tables_len = 4 * (string_offsets.len() + style_offsets.len());
        let string_start = 28 + tables_len + self.padding;
        let style_start = if self.styles.is_empty() {
            0
        } else {
            string_start + string_data.len()
        };
        let size = string_start + string_data.len() + style_data.len();

        let mut out = chunk_header(0x0001, 28, size as u32);
        out.write_u32::<LittleEndian>(self.strings.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(self.styles.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(if self.utf8 { UTF8_FLAG } else { 0 })
            .unwrap();
        out.write_u32::<LittleEndian>(string_start as u32).unwrap();
        out.write_u32::<LittleEndian>(style_start as u32).unwrap();
        for offset in string_offsets.iter().chain(style_offsets.iter()) {
            out.write_u32::<LittleEndian>(*offset).unwrap();
        }
        out.extend(std::iter::repeat(0).take(self.padding));
        out.extend(string_data);
        out.extend(style_data);
        out
    }
}
