// Decoder-side error and warning types.
//
// `DecodeError` is `Clone` because a failed session keeps its error and hands
// a copy back on every later call.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::address_cache::AddressCacheError;
use super::code_table::CodeTableError;

/// Where a window's source segment is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOrigin {
    /// VCD_SOURCE: the session dictionary.
    Dictionary,
    /// VCD_TARGET: target bytes decoded by earlier windows.
    Target,
}

impl fmt::Display for SegmentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentOrigin::Dictionary => f.write_str("dictionary"),
            SegmentOrigin::Target => f.write_str("decoded target"),
        }
    }
}

/// The three sections of a delta window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Data,
    Instructions,
    Addresses,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Data => f.write_str("ADD/RUN data"),
            Section::Instructions => f.write_str("instructions and sizes"),
            Section::Addresses => f.write_str("COPY addresses"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("invalid VCDIFF magic {found:02X?}")]
    InvalidMagic { found: [u8; 3] },

    #[error("unsupported VCDIFF version byte 0x{0:02X}")]
    UnsupportedVersion(u8),

    #[error("secondary compression is not supported ({0})")]
    SecondaryCompression(&'static str),

    #[error("expected {field}; found an invalid variable-length integer")]
    MalformedVarint { field: &'static str },

    #[error("win_indicator must not have both VCD_SOURCE and VCD_TARGET set")]
    SourceAndTarget,

    #[error("delta file contains a VCD_TARGET window, which this decoder does not allow")]
    TargetSourceNotAllowed,

    #[error("source segment length {length} is larger than the {origin} ({bound} bytes)")]
    SegmentLength {
        origin: SegmentOrigin,
        length: u64,
        bound: u64,
    },

    #[error("source segment position {position} is past the end of the {origin} ({bound} bytes)")]
    SegmentPosition {
        origin: SegmentOrigin,
        position: u64,
        bound: u64,
    },

    #[error(
        "source segment [{position}, {position}+{length}) ends past the {origin} ({bound} bytes)"
    )]
    SegmentEnd {
        origin: SegmentOrigin,
        position: u64,
        length: u64,
        bound: u64,
    },

    #[error("window lengths were parsed twice for the same delta window")]
    WindowLengthsAlreadyParsed,

    #[error("{0} requested before the window lengths were parsed")]
    WindowLengthsMissing(&'static str),

    #[error(
        "delta encoding length {declared} does not match header plus section sizes ({computed})"
    )]
    DeltaEncodingLength { declared: u64, computed: u64 },

    #[error("target window of {size} bytes exceeds the limit of {limit}")]
    TargetWindowTooLarge { size: u64, limit: u64 },

    #[error("decoded target would reach {size} bytes, beyond the limit of {limit}")]
    TargetFileTooLarge { size: u64, limit: u64 },

    #[error(transparent)]
    CodeTable(#[from] CodeTableError),

    #[error("address mode {mode} out of range (code table has {mode_count} modes)")]
    InvalidAddressMode { mode: u8, mode_count: usize },

    #[error("COPY address {address} is not below the current position {here}")]
    AddressOutOfBounds { address: u64, here: u64 },

    #[error("{0} section ended before the instructions did")]
    SectionUnderflow(Section),

    #[error("{section} section has {remaining} unused bytes at the end of the window")]
    ExcessSectionData { section: Section, remaining: usize },

    #[error("instruction of {size} bytes overruns the target window ({remaining} bytes left)")]
    TargetWindowOverrun { size: u64, remaining: u64 },

    #[error("target window decoded to {actual} bytes but the header declared {declared}")]
    TargetWindowSize { declared: u64, actual: u64 },

    #[error("checksum mismatch: window declared {expected:#010x}, decoded data has {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("decode_chunk called before start_decoding")]
    NotStarted,

    #[error("decoding session already finished")]
    AlreadyFinished,

    #[error("delta file ended inside the {0}")]
    Truncated(&'static str),

    #[error("output sink failed: {0}")]
    Sink(Arc<io::Error>),

    #[error("reading delta input failed: {0}")]
    Input(Arc<io::Error>),
}

impl DecodeError {
    pub(crate) fn from_address(e: AddressCacheError, mode_count: usize) -> Self {
        match e {
            AddressCacheError::EndOfData => DecodeError::SectionUnderflow(Section::Addresses),
            AddressCacheError::Malformed => DecodeError::MalformedVarint {
                field: "COPY address",
            },
            AddressCacheError::InvalidMode { mode, .. } => {
                DecodeError::InvalidAddressMode { mode, mode_count }
            }
            AddressCacheError::OutOfBounds { address, here } => {
                DecodeError::AddressOutOfBounds { address, here }
            }
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        DecodeError::Sink(Arc::new(e))
    }
}

/// Non-fatal conditions reported while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Header indicator bits this decoder does not know; they are ignored.
    UnknownHeaderIndicator(u8),
    /// Window indicator bits this decoder does not know; they are ignored.
    UnknownWindowIndicator(u8),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnknownHeaderIndicator(bits) => {
                write!(f, "unrecognized hdr_indicator flags: 0x{bits:02x}")
            }
            Warning::UnknownWindowIndicator(bits) => {
                write!(f, "unrecognized win_indicator flags: 0x{bits:02x}")
            }
        }
    }
}
