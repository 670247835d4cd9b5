use log::debug;
use std::io::{Read, Seek};

use crate::chunk::{ChunkHeader, ResourceType, CHUNK_HEADER_SIZE};
use crate::stringpool::{StringPool, STRING_POOL_HEADER_SIZE};
use crate::{stream_len, ParseError};

///Largest file the 32-bit chunk size field can describe.
const MAX_FILE_SIZE: u64 = u32::MAX as u64;

///A validated binary XML file together with its decoded string pool.
#[derive(Debug)]
pub struct Container {
    declared_file_size: u64,
    string_pool: StringPool,
}

impl Container {
    ///Validates the container chunk starting at the current stream position
    ///and decodes the string pool that must follow it.
    ///
    ///The container has to span the rest of the stream exactly. On success
    ///the stream is left at [Container::next_chunk_offset].
    pub fn open<F: Read + Seek>(input: &mut F) -> Result<Self, ParseError> {
        let start = input.stream_position().map_err(ParseError::IoError)?;
        let len = stream_len(input)?.saturating_sub(start);

        if len < u64::from(CHUNK_HEADER_SIZE) {
            return Err(ParseError::format("file is too small to be a valid AXML file"));
        }

        if len > MAX_FILE_SIZE {
            return Err(ParseError::format("file is too large to be a valid AXML file"));
        }

        let header = ChunkHeader::read_from_file(input, None)
            .map_err(ParseError::context("error parsing first chunk header"))?;

        if header.header_size() != CHUNK_HEADER_SIZE {
            return Err(ParseError::format(format!(
                "first chunk header size is {}, expected {}",
                header.header_size(),
                CHUNK_HEADER_SIZE
            )));
        }

        // Sizes past the end of the stream are already rejected by the header reader
        let declared_file_size = u64::from(header.size());
        if declared_file_size < len {
            return Err(ParseError::format(format!(
                "declared file size {} is smaller than stream length {}",
                declared_file_size, len
            )));
        }

        if header.resource_type() != Some(ResourceType::Xml) {
            return Err(ParseError::format(format!(
                "first chunk type is {:#06x}, not XML",
                header.typ()
            )));
        }

        let pool_header = ChunkHeader::read_from_file(input, Some(ResourceType::StringPool))
            .map_err(ParseError::context("error parsing string pool header"))?;

        if pool_header.header_size() != STRING_POOL_HEADER_SIZE {
            return Err(ParseError::format(format!(
                "string pool header size is {}, expected {}",
                pool_header.header_size(),
                STRING_POOL_HEADER_SIZE
            )));
        }

        let string_pool = StringPool::read_from_file(input, &pool_header)
            .map_err(ParseError::context("error decoding string pool"))?;

        debug!(
            "AXML container of {} bytes, string pool holds {} strings",
            declared_file_size,
            string_pool.len()
        );

        Ok(Self {
            declared_file_size,
            string_pool,
        })
    }

    ///Size of the file as declared by the container chunk.
    pub fn declared_file_size(&self) -> u64 {
        self.declared_file_size
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.string_pool
    }

    ///Stream offset of the first chunk after the string pool.
    pub fn next_chunk_offset(&self) -> u64 {
        self.string_pool.header().end()
    }
}
