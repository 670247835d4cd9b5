use deku::prelude::*;

use num_enum::TryFromPrimitive;
use std::io::{Read, Seek};

use crate::{read_bytes, stream_len, ParseError};

///Size of the generic header that starts every chunk.
pub(crate) const CHUNK_HEADER_SIZE: u16 = 8;

///Chunk type tags used by Android's resource formats.
#[repr(u16)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
pub enum ResourceType {
    NullType = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,
    XmlStartNameSpace = 0x0100,
    XmlEndNameSpace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlResourceMap = 0x0180,
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
}

#[derive(Debug, DekuRead)]
#[deku(endian = "little")]
struct RawChunkHeader {
    typ: u16,
    header_size: u16,
    size: u32,
}

///The generic header found at the start of every chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    start: u64,
    typ: u16,
    header_size: u16,
    size: u32,
}

impl ChunkHeader {
    ///Reads a chunk header at the current stream position.
    ///
    ///The cursor is left directly after the 8 header bytes. The chunk body
    ///is not read, but its declared extent must fit inside the stream.
    pub(crate) fn read_from_file<F: Read + Seek>(
        input: &mut F,
        expected: Option<ResourceType>,
    ) -> Result<Self, ParseError> {
        let start = input.stream_position().map_err(ParseError::IoError)?;
        let len = stream_len(input)?;

        let buf: [u8; CHUNK_HEADER_SIZE as usize] = read_bytes(input)?;
        let (_, raw) = RawChunkHeader::from_bytes((&buf[..], 0)).map_err(ParseError::Layout)?;

        if let Some(expected) = expected {
            if raw.typ != expected as u16 {
                return Err(ParseError::UnexpectedChunkType {
                    offset: start,
                    expected,
                    found: raw.typ,
                });
            }
        }

        if raw.header_size < CHUNK_HEADER_SIZE {
            return Err(ParseError::InvalidHeaderSize {
                offset: start,
                header_size: raw.header_size,
            });
        }

        let invalid_size = |reason| ParseError::InvalidChunkSize {
            offset: start,
            size: raw.size,
            reason,
        };

        if raw.size < u32::from(CHUNK_HEADER_SIZE) {
            return Err(invalid_size("smaller than the generic chunk header"));
        }

        if raw.size < u32::from(raw.header_size) {
            return Err(invalid_size("smaller than the declared header size"));
        }

        if start + u64::from(raw.size) > len {
            return Err(invalid_size("extends past the end of the stream"));
        }

        Ok(ChunkHeader {
            start,
            typ: raw.typ,
            header_size: raw.header_size,
            size: raw.size,
        })
    }

    ///Raw chunk type tag.
    pub fn typ(&self) -> u16 {
        self.typ
    }

    ///The chunk type, if it is one of the known tags.
    pub fn resource_type(&self) -> Option<ResourceType> {
        ResourceType::try_from(self.typ).ok()
    }

    ///Declared size of the type-specific header, including the generic 8 bytes.
    pub fn header_size(&self) -> u16 {
        self.header_size
    }

    ///Declared size of the whole chunk.
    pub fn size(&self) -> u32 {
        self.size
    }

    ///Stream offset of the first header byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    ///Stream offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.size)
    }
}
