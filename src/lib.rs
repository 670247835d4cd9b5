//!Decoder for the chunk framing and string pool of Android's binary XML format.
//!
//!Every binary `AndroidManifest.xml` and compiled layout starts with an XML
//!container chunk whose first child is a string pool. Every other chunk in
//!the file refers to strings by their index into that pool, so recovering
//!it is the prerequisite for any further analysis.
//!
//!This library validates the container framing and eagerly decodes the
//!string pool (UTF-8 or UTF-16, with optional style spans). It does not
//!decode XML element chunks; after [Container::open] returns, the stream
//!is positioned at the first chunk after the string pool so another
//!decoder can pick up from there.
//!
//!All offsets and lengths read from the file are checked against the
//!region they point into. Malformed input yields a [ParseError] that
//!names the offset where decoding failed.

mod chunk;
mod container;
mod stringpool;

#[cfg(test)]
mod test_support;

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use thiserror::Error;

pub use crate::chunk::{ChunkHeader, ResourceType};
pub use crate::container::Container;
pub use crate::stringpool::{StringDecodeFailure, StringPool, StyleSpan};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("stream truncated: {needed} bytes required at offset {offset:#x}")]
    TruncatedStream { offset: u64, needed: u64 },

    #[error("unexpected chunk type at offset {offset:#x}: expected {expected:?}, found {found:#06x}")]
    UnexpectedChunkType {
        offset: u64,
        expected: ResourceType,
        found: u16,
    },

    #[error("chunk at offset {offset:#x} declares header size {header_size}, smaller than 8")]
    InvalidHeaderSize { offset: u64, header_size: u16 },

    #[error("chunk at offset {offset:#x} declares size {size}: {reason}")]
    InvalidChunkSize {
        offset: u64,
        size: u32,
        reason: &'static str,
    },

    #[error("invalid AXML file: {reason}")]
    AxmlFormat {
        reason: String,
        #[source]
        source: Option<Box<ParseError>>,
    },

    #[error("malformed string pool at offset {offset:#x}: {reason}")]
    StringPoolFormat { offset: u64, reason: String },

    #[error("cannot decode string {index} at offset {offset:#x}: {reason}")]
    StringDecode {
        index: usize,
        offset: u64,
        reason: StringDecodeFailure,
    },

    #[error("StringPool missing index: {index} (pool holds {count} strings)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("malformed fixed-size layout: {0}")]
    Layout(deku::prelude::DekuError),

    #[error(transparent)]
    IoError(std::io::Error),
}

impl ParseError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        ParseError::AxmlFormat {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn context(reason: &'static str) -> impl FnOnce(ParseError) -> ParseError {
        move |e| ParseError::AxmlFormat {
            reason: reason.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

///Validates an Android binary XML file and returns its decoded [Container].
///
///Shorthand for [Container::open].
///
///```rust
///use axmlstrings::parse;
///# use axmlstrings::ParseError;
///# let bytes: Vec<u8> = [
///#     &[0x03, 0x00, 0x08, 0x00, 0x24, 0x00, 0x00, 0x00][..],
///#     &[0x01, 0x00, 0x1c, 0x00, 0x1c, 0x00, 0x00, 0x00][..],
///#     &[0; 20][..],
///# ].concat();
///let mut f = std::io::Cursor::new(bytes);
///let container = parse(&mut f)?;
///assert!(container.string_pool().is_empty());
///# Ok::<(), ParseError>(())
///```
pub fn parse<F: Read + Seek>(input: &mut F) -> Result<Container, ParseError> {
    Container::open(input)
}

fn read_bytes<F: Read + Seek, const N: usize>(input: &mut F) -> Result<[u8; N], ParseError> {
    let mut buf = [0; N];
    read_exact_at_cursor(input, &mut buf)?;

    Ok(buf)
}

fn read_u32<F: Read + Seek>(input: &mut F) -> Result<u32, ParseError> {
    let buf: [u8; 4] = read_bytes(input)?;

    Ok(LittleEndian::read_u32(&buf))
}

fn read_vec<F: Read + Seek>(input: &mut F, len: usize) -> Result<Vec<u8>, ParseError> {
    let mut buf = vec![0; len];
    read_exact_at_cursor(input, &mut buf)?;

    Ok(buf)
}

fn read_exact_at_cursor<F: Read + Seek>(input: &mut F, buf: &mut [u8]) -> Result<(), ParseError> {
    let offset = input.stream_position().map_err(ParseError::IoError)?;
    let needed = buf.len() as u64;
    input.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ParseError::TruncatedStream { offset, needed },
        _ => ParseError::IoError(e),
    })
}

fn seek_to<F: Seek>(input: &mut F, offset: u64) -> Result<(), ParseError> {
    input
        .seek(SeekFrom::Start(offset))
        .map_err(ParseError::IoError)?;

    Ok(())
}

///Total length of the stream, leaving the cursor where it was.
fn stream_len<F: Seek>(input: &mut F) -> Result<u64, ParseError> {
    let pos = input.stream_position().map_err(ParseError::IoError)?;
    let len = input.seek(SeekFrom::End(0)).map_err(ParseError::IoError)?;
    if pos != len {
        seek_to(input, pos)?;
    }

    Ok(len)
}
