use deku::prelude::*;

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use log::{debug, trace, warn};
use std::io::{Read, Seek};
use thiserror::Error;

use crate::chunk::ChunkHeader;
use crate::{read_bytes, read_u32, read_vec, seek_to, ParseError};

///Size of a string pool chunk header: the generic 8 bytes plus five u32 fields.
pub(crate) const STRING_POOL_HEADER_SIZE: u16 = 28;

pub(crate) const SORTED_FLAG: u32 = 1 << 0;
pub(crate) const UTF8_FLAG: u32 = 1 << 8;

///Terminates the list of spans for one styled string.
pub(crate) const STYLE_SPAN_END: u32 = 0xFFFF_FFFF;

///Index value other chunks use to mean "no string".
const NO_STRING: u32 = 0xFFFF_FFFF;

#[derive(Debug, DekuRead)]
#[deku(endian = "little")]
pub(crate) struct StringPoolHeader {
    pub(crate) string_count: u32,
    pub(crate) style_count: u32,
    pub(crate) flags: u32,
    pub(crate) string_start: u32,
    pub(crate) style_start: u32,
}

///Why a single string pool entry could not be decoded.
#[derive(Error, Debug)]
pub enum StringDecodeFailure {
    #[error("offset lies outside the {region_len} byte string data region")]
    OffsetOutOfBounds { region_len: usize },

    #[error("length prefix runs past the end of the string data region")]
    TruncatedLength,

    #[error("declared length of {length} bytes runs past the end of the string data region")]
    LengthOutOfBounds { length: usize },

    #[error(transparent)]
    InvalidUtf8(std::string::FromUtf8Error),

    #[error(transparent)]
    InvalidUtf16(std::string::FromUtf16Error),
}

///A formatting run over part of a string pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleSpan {
    ///Pool index of the tag name, e.g. `b` or `font;color=#ff0000`.
    pub name: u32,
    ///First UTF-16 code unit covered by the span.
    pub first_char: u32,
    ///Last UTF-16 code unit covered by the span, inclusive.
    pub last_char: u32,
}

///The decoded string table of a binary XML file.
///
///Every entry is decoded when the pool is read, so lookups never fail for
///an index below [StringPool::len].
#[derive(Debug)]
pub struct StringPool {
    header: ChunkHeader,
    flags: u32,
    style_count: u32,
    strings: Vec<String>,
    styles: Vec<Vec<StyleSpan>>,
}

impl StringPool {
    ///Decodes a string pool chunk.
    ///
    ///`header` must have just been read from `input`; the stream is expected
    ///to sit on the first byte after the generic chunk header.
    pub(crate) fn read_from_file<F: Read + Seek>(
        input: &mut F,
        header: &ChunkHeader,
    ) -> Result<Self, ParseError> {
        let buf: [u8; (STRING_POOL_HEADER_SIZE - 8) as usize] = read_bytes(input)?;
        let (_, fields) = StringPoolHeader::from_bytes((&buf[..], 0)).map_err(ParseError::Layout)?;

        let malformed = |reason: String| ParseError::StringPoolFormat {
            offset: header.start(),
            reason,
        };

        let chunk_size = u64::from(header.size());
        let header_size = u64::from(header.header_size());
        if header_size < u64::from(STRING_POOL_HEADER_SIZE) {
            return Err(malformed(format!(
                "header size {} is smaller than {}",
                header_size, STRING_POOL_HEADER_SIZE
            )));
        }

        let tables_end =
            header_size + 4 * (u64::from(fields.string_count) + u64::from(fields.style_count));
        if tables_end > chunk_size {
            return Err(malformed(format!(
                "offset tables for {} strings and {} styles overrun the {} byte chunk",
                fields.string_count, fields.style_count, chunk_size
            )));
        }

        if fields.style_count > fields.string_count {
            return Err(malformed(format!(
                "{} styles declared for {} strings",
                fields.style_count, fields.string_count
            )));
        }

        seek_to(input, header.start() + header_size)?;
        let string_offsets = read_offsets(input, fields.string_count)?;
        let style_offsets = read_offsets(input, fields.style_count)?;

        let is_utf8 = (fields.flags & UTF8_FLAG) != 0;
        let has_styles = fields.style_start > 0 && fields.style_count > 0;
        let string_start = u64::from(fields.string_start);
        let style_start = u64::from(fields.style_start);

        let mut strings = Vec::with_capacity(string_offsets.len());
        if !string_offsets.is_empty() {
            if string_start < tables_end || string_start >= chunk_size {
                return Err(malformed(format!(
                    "string data offset {:#x} lies outside {:#x}..{:#x}",
                    string_start, tables_end, chunk_size
                )));
            }

            let string_end = if has_styles {
                if style_start < string_start || style_start > chunk_size {
                    return Err(malformed(format!(
                        "style data offset {:#x} lies outside {:#x}..={:#x}",
                        style_start, string_start, chunk_size
                    )));
                }
                style_start
            } else {
                chunk_size
            };

            let data_start = header.start() + string_start;
            seek_to(input, data_start)?;
            let string_data = read_vec(input, region_len(header, string_end - string_start)?)?;

            let parse_fn = if is_utf8 {
                parse_utf8_string
            } else {
                parse_utf16_string
            };

            for (index, offset) in string_offsets.iter().enumerate() {
                let offset = usize::try_from(*offset).unwrap_or(usize::MAX);
                let s = parse_fn(&string_data, offset).map_err(|reason| {
                    ParseError::StringDecode {
                        index,
                        offset: data_start.saturating_add(offset as u64),
                        reason,
                    }
                })?;
                strings.push(s);
            }
        }

        let mut styles = Vec::new();
        if has_styles {
            let style_data_start = header.start() + style_start;
            seek_to(input, style_data_start)?;
            let style_data = read_vec(input, region_len(header, chunk_size - style_start)?)?;

            styles.reserve(style_offsets.len());
            for (index, offset) in style_offsets.iter().enumerate() {
                let offset = usize::try_from(*offset).unwrap_or(usize::MAX);
                if offset >= style_data.len() {
                    return Err(malformed(format!(
                        "style {} offset {:#x} lies outside the {} byte style data region",
                        index,
                        offset,
                        style_data.len()
                    )));
                }
                styles.push(parse_style_spans(&style_data, offset, index));
            }
        }

        seek_to(input, header.end())?;

        debug!(
            "string pool at {:#x}: {} strings, {} styles, {}",
            header.start(),
            strings.len(),
            styles.len(),
            if is_utf8 { "UTF-8" } else { "UTF-16" }
        );

        Ok(Self {
            header: header.clone(),
            flags: fields.flags,
            style_count: fields.style_count,
            strings,
            styles,
        })
    }

    ///Returns the string at `i`.
    pub fn get(&self, i: usize) -> Result<&str, ParseError> {
        self.strings
            .get(i)
            .map(String::as_str)
            .ok_or(ParseError::IndexOutOfRange {
                index: i,
                count: self.strings.len(),
            })
    }

    ///Resolves a string reference as stored in other chunks, where
    ///`0xFFFFFFFF` stands for "no string".
    pub fn resolve(&self, index: u32) -> Result<Option<&str>, ParseError> {
        if index == NO_STRING {
            return Ok(None);
        }

        let i = usize::try_from(index).unwrap_or(usize::MAX);
        self.get(i).map(Some)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    ///Iterates over the strings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn is_utf8(&self) -> bool {
        (self.flags & UTF8_FLAG) != 0
    }

    pub fn is_sorted(&self) -> bool {
        (self.flags & SORTED_FLAG) != 0
    }

    ///Style count as declared in the pool header.
    pub fn style_count(&self) -> u32 {
        self.style_count
    }

    ///Number of entries whose style spans were decoded. Zero when the
    ///header declares styles but no style data offset.
    pub fn styled_len(&self) -> usize {
        self.styles.len()
    }

    ///Style spans of the string at `i`, if that string is styled.
    pub fn styles(&self, i: usize) -> Option<&[StyleSpan]> {
        self.styles.get(i).map(Vec::as_slice)
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }
}

fn read_offsets<F: Read + Seek>(input: &mut F, count: u32) -> Result<Vec<u32>, ParseError> {
    let mut offsets = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for _ in 0..count {
        offsets.push(read_u32(input)?);
    }

    Ok(offsets)
}

fn region_len(header: &ChunkHeader, len: u64) -> Result<usize, ParseError> {
    usize::try_from(len).map_err(|_| ParseError::StringPoolFormat {
        offset: header.start(),
        reason: format!("region of {} bytes is not addressable", len),
    })
}

fn parse_utf16_string(string_data: &[u8], offset: usize) -> Result<String, StringDecodeFailure> {
    if offset >= string_data.len() {
        return Err(StringDecodeFailure::OffsetOutOfBounds {
            region_len: string_data.len(),
        });
    }

    let read_unit = |at: usize| {
        string_data
            .get(at..at.checked_add(2)?)
            .map(LittleEndian::read_u16)
    };

    let first = read_unit(offset).ok_or(StringDecodeFailure::TruncatedLength)?;
    let mut string_start = offset + 2;

    // Strings of 0x8000 units or more store the length across two units
    let len = if is_high_bit_set_16(first) {
        let second = read_unit(string_start).ok_or(StringDecodeFailure::TruncatedLength)?;
        string_start += 2;
        (usize::from(first & 0x7fff) << 16) | usize::from(second)
    } else {
        usize::from(first)
    };

    let byte_len = len.saturating_mul(2);
    let string_end = string_start.saturating_add(byte_len);
    let bytes = string_data
        .get(string_start..string_end)
        .ok_or(StringDecodeFailure::LengthOutOfBounds { length: byte_len })?;

    let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
    let s = String::from_utf16(&units).map_err(StringDecodeFailure::InvalidUtf16)?;

    if read_unit(string_end) != Some(0) {
        trace!("UTF-16 string at {:#x} is not zero terminated", offset);
    }

    Ok(s)
}

fn is_high_bit_set_16(input: u16) -> bool {
    input & (1 << 15) != 0
}

fn parse_utf8_string(string_data: &[u8], offset: usize) -> Result<String, StringDecodeFailure> {
    if offset >= string_data.len() {
        return Err(StringDecodeFailure::OffsetOutOfBounds {
            region_len: string_data.len(),
        });
    }

    let mut cursor = offset;
    let char_len = parse_utf8_length(string_data, &mut cursor)?;
    let byte_len = parse_utf8_length(string_data, &mut cursor)?;

    let string_end = cursor + byte_len;
    let bytes = string_data
        .get(cursor..string_end)
        .ok_or(StringDecodeFailure::LengthOutOfBounds { length: byte_len })?;

    let s = String::from_utf8(bytes.to_vec()).map_err(StringDecodeFailure::InvalidUtf8)?;

    let units = s.encode_utf16().count();
    if units != char_len {
        warn!(
            "UTF-8 string at {:#x} declares {} characters but holds {}",
            offset, char_len, units
        );
    }

    if string_data.get(string_end) != Some(&0) {
        trace!("UTF-8 string at {:#x} is not zero terminated", offset);
    }

    Ok(s)
}

///Reads a UTF-8 pool length: one byte, or two when the high bit of the
///first is set.
fn parse_utf8_length(string_data: &[u8], cursor: &mut usize) -> Result<usize, StringDecodeFailure> {
    let first = *string_data
        .get(*cursor)
        .ok_or(StringDecodeFailure::TruncatedLength)?;
    *cursor += 1;

    if !is_high_bit_set_8(first) {
        return Ok(usize::from(first));
    }

    let second = *string_data
        .get(*cursor)
        .ok_or(StringDecodeFailure::TruncatedLength)?;
    *cursor += 1;

    Ok((usize::from(first & 0x7f) << 8) | usize::from(second))
}

fn is_high_bit_set_8(input: u8) -> bool {
    input & (1 << 7) != 0
}

fn parse_style_spans(style_data: &[u8], offset: usize, index: usize) -> Vec<StyleSpan> {
    let read_word = |at: usize| {
        style_data
            .get(at..at.checked_add(4)?)
            .map(LittleEndian::read_u32)
    };

    let mut spans = Vec::new();
    let mut cursor = offset;
    loop {
        let name = match read_word(cursor) {
            Some(STYLE_SPAN_END) => break,
            Some(name) => name,
            None => {
                warn!("style {} is not terminated before the end of the pool", index);
                break;
            }
        };

        match (read_word(cursor + 4), read_word(cursor + 8)) {
            (Some(first_char), Some(last_char)) => spans.push(StyleSpan {
                name,
                first_char,
                last_char,
            }),
            _ => {
                warn!("style {} ends with a truncated span", index);
                break;
            }
        }

        cursor += 12;
    }

    spans
}
