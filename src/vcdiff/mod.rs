// VCDIFF format (RFC 3284) with the interleaved and checksum extensions.
//
// - `varint`        base-128 integers, most significant group first
// - `address_cache` NEAR/SAME cache for COPY addresses
// - `code_table`    default and custom 256-entry code tables
// - `header`        file and window headers, resumable header parser
// - `checksum`      zero-seeded Adler-32 for the checksum extension
// - `encoder`       instruction writer for one window
// - `decoder`       chunk-driven decoding session
// - `sink`          destination for emitted bytes

pub mod address_cache;
pub mod checksum;
pub mod code_table;
pub mod cursor;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod sink;
pub mod varint;

pub use address_cache::AddressCache;
pub use code_table::{CodeTable, CodeTableEntry, HalfInstruction, InstructionType};
pub use decoder::{
    DEFAULT_MAX_TARGET_SIZE, DecoderOptions, StreamingDecoder, decode_all, decode_all_with,
};
pub use encoder::{EncodingTable, WindowWriter};
pub use error::{DecodeError, Section, SegmentOrigin, Warning};
pub use header::{FileHeader, FormatExtensions, HeaderParser, Parsed, VCDIFF_MAGIC, WindowHeader};
pub use sink::{OutputSink, WriteSink};
