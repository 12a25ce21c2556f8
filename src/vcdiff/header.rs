// VCDIFF file header and delta window header (RFC 3284, Section 4).
//
// Writing is straightforward and lives on `FileHeader` / `WindowHeader`.
// Reading goes through `HeaderParser`, a resumable parser over whatever
// bytes have arrived so far: every operation either completes and advances
// the cursor, or reports end-of-data / a fatal error and leaves the cursor
// where it was. Both outcomes are sticky for the lifetime of the parser.

use bitflags::bitflags;

use super::cursor::ByteCursor;
use super::error::{DecodeError, SegmentOrigin, Warning};
use super::varint::{self, VarIntError};

/// First three bytes of every delta file ("VCD" with the high bits set).
pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Fourth header byte for plain RFC 3284 files.
pub const VERSION_RFC3284: u8 = 0x00;

/// Fourth header byte for files that may use the format extensions.
pub const VERSION_EXTENDED: u8 = b'S';

bitflags! {
    /// Hdr_Indicator byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderIndicator: u8 {
        const DECOMPRESS = 0x01;
        const CODETABLE = 0x02;
        const APPHEADER = 0x04;
    }
}

bitflags! {
    /// Win_Indicator byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowIndicator: u8 {
        const SOURCE = 0x01;
        const TARGET = 0x02;
        const CHECKSUM = 0x04;
    }
}

bitflags! {
    /// Delta_Indicator byte. Any bit set means secondary compression.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 0x01;
        const INSTCOMP = 0x02;
        const ADDRCOMP = 0x04;
    }
}

bitflags! {
    /// Encoder-side format extensions. Either one switches the version byte to `S`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatExtensions: u8 {
        /// Sizes, addresses and data share the instruction section.
        const INTERLEAVED = 0x01;
        /// Every window carries an Adler-32 of its target bytes.
        const CHECKSUM = 0x02;
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Custom code table as carried in the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTableData {
    pub near_size: u8,
    pub same_size: u8,
    /// VCDIFF delta against the serialized default code table.
    pub delta: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub code_table: Option<CodeTableData>,
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    pub fn new(extensions: FormatExtensions) -> Self {
        Self {
            version: if extensions.is_empty() {
                VERSION_RFC3284
            } else {
                VERSION_EXTENDED
            },
            code_table: None,
            app_header: None,
        }
    }

    /// Whether windows of this file may use the interleaved layout.
    pub fn allows_interleaved(&self) -> bool {
        self.version == VERSION_EXTENDED
    }

    pub fn indicator(&self) -> HeaderIndicator {
        let mut ind = HeaderIndicator::empty();
        ind.set(HeaderIndicator::CODETABLE, self.code_table.is_some());
        ind.set(HeaderIndicator::APPHEADER, self.app_header.is_some());
        ind
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        out.push(self.version);
        out.push(self.indicator().bits());

        if let Some(table) = &self.code_table {
            varint::append_usize(out, table.delta.len() + 2);
            out.push(table.near_size);
            out.push(table.same_size);
            out.extend_from_slice(&table.delta);
        }

        if let Some(app) = &self.app_header {
            varint::append_usize(out, app.len());
            out.extend_from_slice(app);
        }
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Source segment of a window, validated against its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSegment {
    pub origin: SegmentOrigin,
    pub length: u64,
    pub position: u64,
}

/// Result of `parse_win_indicator_and_source_segment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSource {
    pub indicator: WindowIndicator,
    pub segment: Option<SourceSegment>,
}

impl WindowSource {
    #[inline]
    pub fn has_checksum(&self) -> bool {
        self.indicator.contains(WindowIndicator::CHECKSUM)
    }

    /// Length of the source part of the window's address space.
    #[inline]
    pub fn segment_len(&self) -> u64 {
        self.segment.map_or(0, |s| s.length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionLengths {
    pub data: usize,
    pub instructions: usize,
    pub addresses: usize,
    pub checksum: Option<u32>,
}

impl SectionLengths {
    #[inline]
    pub fn body_len(&self) -> usize {
        self.data + self.instructions + self.addresses
    }
}

/// A complete window header, as written by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHeader {
    pub segment: Option<SourceSegment>,
    pub target_window_size: u64,
    pub sections: SectionLengths,
}

impl WindowHeader {
    pub fn indicator(&self) -> WindowIndicator {
        let mut ind = WindowIndicator::empty();
        match self.segment.map(|s| s.origin) {
            Some(SegmentOrigin::Dictionary) => ind |= WindowIndicator::SOURCE,
            Some(SegmentOrigin::Target) => ind |= WindowIndicator::TARGET,
            None => {}
        }
        ind.set(WindowIndicator::CHECKSUM, self.sections.checksum.is_some());
        ind
    }

    /// Value of the "length of the delta encoding" field.
    pub fn delta_encoding_length(&self) -> u64 {
        let s = &self.sections;
        let mut len = varint::encoded_len(self.target_window_size)
            + 1
            + varint::encoded_len(s.data as u64)
            + varint::encoded_len(s.instructions as u64)
            + varint::encoded_len(s.addresses as u64)
            + s.body_len();
        if let Some(sum) = s.checksum {
            len += varint::encoded_len(u64::from(sum));
        }
        len as u64
    }

    /// Write everything up to (not including) the section bodies.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.indicator().bits());
        if let Some(seg) = &self.segment {
            varint::append_u64(out, seg.length);
            varint::append_u64(out, seg.position);
        }
        varint::append_u64(out, self.delta_encoding_length());
        varint::append_u64(out, self.target_window_size);
        out.push(DeltaIndicator::empty().bits());
        varint::append_usize(out, self.sections.data);
        varint::append_usize(out, self.sections.instructions);
        varint::append_usize(out, self.sections.addresses);
        if let Some(sum) = self.sections.checksum {
            varint::append_u64(out, u64::from(sum));
        }
    }
}

// ---------------------------------------------------------------------------
// Resumable parser
// ---------------------------------------------------------------------------

/// Outcome of a parse step that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Complete(T),
    /// Input ran out; retry with more bytes on a fresh parser.
    EndOfData,
}

/// Progress of a [`HeaderParser`], including its terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Fresh,
    Parsing,
    WindowHeaderComplete,
    SectionLengthsKnown,
    EndOfData,
    Error,
}

#[derive(Debug, Clone)]
enum Status {
    Ok,
    EndOfData,
    Failed(DecodeError),
}

/// Why a parse step stopped early. Internal so bodies can use `?`.
enum Stop {
    EndOfData,
    Fatal(DecodeError),
}

impl From<DecodeError> for Stop {
    fn from(e: DecodeError) -> Self {
        Stop::Fatal(e)
    }
}

fn varint_stop(e: VarIntError, field: &'static str) -> Stop {
    match e {
        VarIntError::EndOfData => Stop::EndOfData,
        VarIntError::Malformed => Stop::Fatal(DecodeError::MalformedVarint { field }),
    }
}

/// Parser over the unconsumed prefix of a delta stream.
pub struct HeaderParser<'a> {
    cur: ByteCursor<'a>,
    status: Status,
    progress: ParserState,
    delta_encoding_start: Option<usize>,
    delta_encoding_length: u64,
    warnings: Vec<Warning>,
}

impl<'a> HeaderParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cur: ByteCursor::new(data),
            status: Status::Ok,
            progress: ParserState::Fresh,
            delta_encoding_start: None,
            delta_encoding_length: 0,
            warnings: Vec::new(),
        }
    }

    /// Bytes consumed by the operations that completed.
    #[inline]
    pub fn position(&self) -> usize {
        self.cur.position()
    }

    pub fn state(&self) -> ParserState {
        match self.status {
            Status::Ok => self.progress,
            Status::EndOfData => ParserState::EndOfData,
            Status::Failed(_) => ParserState::Error,
        }
    }

    pub fn error(&self) -> Option<&DecodeError> {
        match &self.status {
            Status::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn terminal<T>(&self) -> Option<Result<Parsed<T>, DecodeError>> {
        match &self.status {
            Status::Ok => None,
            Status::EndOfData => Some(Ok(Parsed::EndOfData)),
            Status::Failed(e) => Some(Err(e.clone())),
        }
    }

    /// Run one atomic step: restore the cursor and latch the status on failure.
    fn step<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, Stop>,
    ) -> Result<Parsed<T>, DecodeError> {
        if let Some(done) = self.terminal() {
            return done;
        }
        let mark = self.cur.position();
        match body(self) {
            Ok(v) => Ok(Parsed::Complete(v)),
            Err(Stop::EndOfData) => {
                self.cur.reset_to(mark);
                self.status = Status::EndOfData;
                Ok(Parsed::EndOfData)
            }
            Err(Stop::Fatal(e)) => {
                self.cur.reset_to(mark);
                self.status = Status::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn byte(&mut self) -> Result<u8, Stop> {
        self.cur.read_u8().ok_or(Stop::EndOfData)
    }

    fn size(&mut self, field: &'static str) -> Result<u64, Stop> {
        varint::read_int32(&mut self.cur)
            .map(u64::from)
            .map_err(|e| varint_stop(e, field))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], Stop> {
        self.cur.read_bytes(len).ok_or(Stop::EndOfData)
    }

    pub fn parse_byte(&mut self) -> Result<Parsed<u8>, DecodeError> {
        self.step(|p| p.byte())
    }

    /// A size or length in the 32-bit signed range.
    pub fn parse_int32(&mut self, field: &'static str) -> Result<Parsed<u32>, DecodeError> {
        self.step(|p| {
            varint::read_int32(&mut p.cur).map_err(|e| varint_stop(e, field))
        })
    }

    /// An unsigned 32-bit value read through the 64-bit form.
    pub fn parse_uint32(&mut self, field: &'static str) -> Result<Parsed<u32>, DecodeError> {
        self.step(|p| {
            varint::read_uint32(&mut p.cur).map_err(|e| varint_stop(e, field))
        })
    }

    /// Magic, version, header indicator, optional code table and application header.
    pub fn parse_file_header(&mut self) -> Result<Parsed<FileHeader>, DecodeError> {
        self.step(|p| {
            let magic = p.bytes(3)?;
            if magic != VCDIFF_MAGIC {
                return Err(DecodeError::InvalidMagic {
                    found: [magic[0], magic[1], magic[2]],
                }
                .into());
            }
            let version = p.byte()?;
            if version != VERSION_RFC3284 && version != VERSION_EXTENDED {
                return Err(DecodeError::UnsupportedVersion(version).into());
            }

            let raw = p.byte()?;
            let indicator = HeaderIndicator::from_bits_retain(raw);
            if indicator.contains(HeaderIndicator::DECOMPRESS) {
                return Err(DecodeError::SecondaryCompression("VCD_DECOMPRESS in file header").into());
            }
            let unknown = raw & !HeaderIndicator::all().bits();

            let code_table = if indicator.contains(HeaderIndicator::CODETABLE) {
                let len = p.size("length of code table data")? as usize;
                if len < 2 {
                    return Err(DecodeError::CodeTable(
                        super::code_table::CodeTableError::InvalidCustomTable(format!(
                            "code table data of {len} bytes has no cache sizes"
                        )),
                    )
                    .into());
                }
                let data = p.bytes(len)?;
                Some(CodeTableData {
                    near_size: data[0],
                    same_size: data[1],
                    delta: data[2..].to_vec(),
                })
            } else {
                None
            };

            let app_header = if indicator.contains(HeaderIndicator::APPHEADER) {
                let len = p.size("length of application header")? as usize;
                Some(p.bytes(len)?.to_vec())
            } else {
                None
            };

            if unknown != 0 {
                p.warnings.push(Warning::UnknownHeaderIndicator(unknown));
            }
            p.progress = ParserState::Parsing;
            Ok(FileHeader {
                version,
                code_table,
                app_header,
            })
        })
    }

    /// Win_Indicator and, if one is declared, the source segment.
    ///
    /// The segment is checked against `dictionary_size` for VCD_SOURCE and
    /// against `decoded_target_size` for VCD_TARGET.
    pub fn parse_win_indicator_and_source_segment(
        &mut self,
        dictionary_size: u64,
        decoded_target_size: u64,
        allow_vcd_target: bool,
    ) -> Result<Parsed<WindowSource>, DecodeError> {
        self.step(|p| {
            let raw = p.byte()?;
            let indicator = WindowIndicator::from_bits_retain(raw);
            let unknown = raw & !WindowIndicator::all().bits();

            let source = indicator.contains(WindowIndicator::SOURCE);
            let target = indicator.contains(WindowIndicator::TARGET);
            let (origin, bound) = match (source, target) {
                (true, true) => return Err(DecodeError::SourceAndTarget.into()),
                (true, false) => (SegmentOrigin::Dictionary, dictionary_size),
                (false, true) if !allow_vcd_target => {
                    return Err(DecodeError::TargetSourceNotAllowed.into());
                }
                (false, true) => (SegmentOrigin::Target, decoded_target_size),
                (false, false) => {
                    p.note_window_warning(unknown);
                    p.progress = ParserState::Parsing;
                    return Ok(WindowSource {
                        indicator,
                        segment: None,
                    });
                }
            };

            let segment = p.source_segment(origin, bound)?;
            p.note_window_warning(unknown);
            p.progress = ParserState::Parsing;
            Ok(WindowSource {
                indicator,
                segment: Some(segment),
            })
        })
    }

    fn note_window_warning(&mut self, unknown: u8) {
        if unknown != 0 {
            self.warnings.push(Warning::UnknownWindowIndicator(unknown));
        }
    }

    fn source_segment(&mut self, origin: SegmentOrigin, bound: u64) -> Result<SourceSegment, Stop> {
        let length = self.size("source segment length")?;
        if length > bound {
            return Err(DecodeError::SegmentLength {
                origin,
                length,
                bound,
            }
            .into());
        }
        let position = self.size("source segment position")?;
        if position >= bound && length > 0 {
            return Err(DecodeError::SegmentPosition {
                origin,
                position,
                bound,
            }
            .into());
        }
        match position.checked_add(length) {
            Some(end) if end <= bound => Ok(SourceSegment {
                origin,
                length,
                position,
            }),
            _ => Err(DecodeError::SegmentEnd {
                origin,
                position,
                length,
                bound,
            }
            .into()),
        }
    }

    /// Length of the delta encoding, then the target window size (returned).
    pub fn parse_window_lengths(&mut self) -> Result<Parsed<u64>, DecodeError> {
        self.step(|p| {
            if p.delta_encoding_start.is_some() {
                return Err(DecodeError::WindowLengthsAlreadyParsed.into());
            }
            let declared = p.size("length of the delta encoding")?;
            let start = p.cur.position();
            let target_window_size = p.size("size of the target window")?;
            p.delta_encoding_length = declared;
            p.delta_encoding_start = Some(start);
            Ok(target_window_size)
        })
    }

    /// Offset one past the end of the current window.
    pub fn end_of_delta_window(&self) -> Result<usize, DecodeError> {
        let start = self
            .delta_encoding_start
            .ok_or(DecodeError::WindowLengthsMissing("end of delta window"))?;
        Ok(start + self.delta_encoding_length as usize)
    }

    pub fn parse_delta_indicator(&mut self) -> Result<Parsed<()>, DecodeError> {
        self.step(|p| {
            let raw = p.byte()?;
            if raw != 0 {
                return Err(DecodeError::SecondaryCompression("non-zero delta indicator").into());
            }
            p.progress = ParserState::WindowHeaderComplete;
            Ok(())
        })
    }

    /// The three section lengths and, when flagged, the checksum.
    pub fn parse_section_lengths(
        &mut self,
        has_checksum: bool,
    ) -> Result<Parsed<SectionLengths>, DecodeError> {
        self.step(|p| {
            let data = p.size("length of data for ADDs and RUNs")?;
            let instructions = p.size("length of instructions section")?;
            let addresses = p.size("length of addresses for COPYs")?;
            let checksum = if has_checksum {
                Some(
                    varint::read_uint32(&mut p.cur)
                        .map_err(|e| varint_stop(e, "Adler32 checksum value"))?,
                )
            } else {
                None
            };

            let start = p
                .delta_encoding_start
                .ok_or(DecodeError::WindowLengthsMissing("section lengths"))?;
            let header_len = (p.cur.position() - start) as u64;
            let computed = header_len + data + instructions + addresses;
            if computed != p.delta_encoding_length {
                return Err(DecodeError::DeltaEncodingLength {
                    declared: p.delta_encoding_length,
                    computed,
                }
                .into());
            }

            p.progress = ParserState::SectionLengthsKnown;
            Ok(SectionLengths {
                data: data as usize,
                instructions: instructions as usize,
                addresses: addresses as usize,
                checksum,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_bytes(header: &WindowHeader) -> Vec<u8> {
        let mut out = Vec::new();
        header.encode(&mut out);
        out
    }

    fn sample_header(segment: Option<SourceSegment>, checksum: Option<u32>) -> WindowHeader {
        WindowHeader {
            segment,
            target_window_size: 300,
            sections: SectionLengths {
                data: 10,
                instructions: 7,
                addresses: 2,
                checksum,
            },
        }
    }

    /// Parse a full window header in sequence, as the decoder does.
    fn parse_window(
        bytes: &[u8],
        dict: u64,
        decoded: u64,
        allow_target: bool,
    ) -> Result<Parsed<(WindowSource, u64, SectionLengths)>, DecodeError> {
        let mut p = HeaderParser::new(bytes);
        let src = p.parse_win_indicator_and_source_segment(dict, decoded, allow_target)?;
        let len = p.parse_window_lengths()?;
        p.parse_delta_indicator()?;
        let src_ok = match src {
            Parsed::Complete(s) => s,
            Parsed::EndOfData => return Ok(Parsed::EndOfData),
        };
        let sections = match p.parse_section_lengths(src_ok.has_checksum())? {
            Parsed::Complete(s) => s,
            Parsed::EndOfData => return Ok(Parsed::EndOfData),
        };
        match len {
            Parsed::Complete(l) => Ok(Parsed::Complete((src_ok, l, sections))),
            Parsed::EndOfData => Ok(Parsed::EndOfData),
        }
    }

    #[test]
    fn file_header_minimal() {
        let mut out = Vec::new();
        FileHeader::new(FormatExtensions::empty()).encode(&mut out);
        assert_eq!(out, [0xD6, 0xC3, 0xC4, 0x00, 0x00]);

        let mut p = HeaderParser::new(&out);
        let Parsed::Complete(h) = p.parse_file_header().unwrap() else {
            panic!("header incomplete");
        };
        assert!(!h.allows_interleaved());
        assert_eq!(p.position(), 5);
    }

    #[test]
    fn file_header_extended_with_app_header_and_table() {
        let mut header = FileHeader::new(FormatExtensions::INTERLEAVED);
        header.app_header = Some(b"app".to_vec());
        header.code_table = Some(CodeTableData {
            near_size: 2,
            same_size: 1,
            delta: vec![9, 9, 9],
        });
        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out[3], b'S');
        assert_eq!(out[4], 0x06);

        let mut p = HeaderParser::new(&out);
        assert_eq!(p.parse_file_header().unwrap(), Parsed::Complete(header));
        assert_eq!(p.position(), out.len());
    }

    #[test]
    fn file_header_truncated_at_every_length() {
        let mut header = FileHeader::new(FormatExtensions::CHECKSUM);
        header.app_header = Some(vec![1, 2, 3, 4]);
        let mut out = Vec::new();
        header.encode(&mut out);
        for cut in 0..out.len() {
            let mut p = HeaderParser::new(&out[..cut]);
            assert_eq!(p.parse_file_header().unwrap(), Parsed::EndOfData, "cut {cut}");
            assert_eq!(p.position(), 0);
            assert_eq!(p.state(), ParserState::EndOfData);
        }
    }

    #[test]
    fn file_header_rejections() {
        let mut p = HeaderParser::new(&[0xD6, 0xC3, 0xC5, 0, 0]);
        assert!(matches!(p.parse_file_header(), Err(DecodeError::InvalidMagic { .. })));

        let mut p = HeaderParser::new(&[0xD6, 0xC3, 0xC4, 0x01, 0]);
        assert!(matches!(p.parse_file_header(), Err(DecodeError::UnsupportedVersion(1))));

        let mut p = HeaderParser::new(&[0xD6, 0xC3, 0xC4, 0x00, 0x01, 0x02]);
        assert!(matches!(p.parse_file_header(), Err(DecodeError::SecondaryCompression(_))));
    }

    #[test]
    fn file_header_unknown_bits_warn() {
        let mut p = HeaderParser::new(&[0xD6, 0xC3, 0xC4, 0x00, 0x40]);
        assert!(matches!(p.parse_file_header(), Ok(Parsed::Complete(_))));
        assert_eq!(p.take_warnings(), vec![Warning::UnknownHeaderIndicator(0x40)]);
    }

    #[test]
    fn window_header_roundtrip() {
        let seg = SourceSegment {
            origin: SegmentOrigin::Dictionary,
            length: 100,
            position: 20,
        };
        let header = sample_header(Some(seg), Some(0xDEAD_BEEF));
        let bytes = window_bytes(&header);
        let Parsed::Complete((src, size, sections)) = parse_window(&bytes, 120, 0, false).unwrap()
        else {
            panic!("incomplete");
        };
        assert_eq!(src.segment, Some(seg));
        assert!(src.has_checksum());
        assert_eq!(size, 300);
        assert_eq!(sections, header.sections);
    }

    #[test]
    fn window_header_without_source() {
        let header = sample_header(None, None);
        let bytes = window_bytes(&header);
        assert_eq!(bytes[0], 0);
        let Parsed::Complete((src, _, sections)) = parse_window(&bytes, 0, 0, false).unwrap() else {
            panic!("incomplete");
        };
        assert_eq!(src.segment, None);
        assert_eq!(sections.checksum, None);
    }

    #[test]
    fn end_of_delta_window_spans_body() {
        let header = sample_header(None, None);
        let bytes = window_bytes(&header);
        let mut p = HeaderParser::new(&bytes);
        assert!(p.end_of_delta_window().is_err());
        p.parse_win_indicator_and_source_segment(0, 0, false).unwrap();
        p.parse_window_lengths().unwrap();
        p.parse_delta_indicator().unwrap();
        p.parse_section_lengths(false).unwrap();
        assert_eq!(p.state(), ParserState::SectionLengthsKnown);
        assert_eq!(p.end_of_delta_window().unwrap(), bytes.len() + header.sections.body_len());
    }

    #[test]
    fn segment_end_boundary() {
        // position + length == bound is accepted, bound + 1 is not.
        let ok = sample_header(
            Some(SourceSegment {
                origin: SegmentOrigin::Dictionary,
                length: 50,
                position: 50,
            }),
            None,
        );
        assert!(parse_window(&window_bytes(&ok), 100, 0, false).is_ok());

        let bad = sample_header(
            Some(SourceSegment {
                origin: SegmentOrigin::Dictionary,
                length: 51,
                position: 50,
            }),
            None,
        );
        assert!(matches!(
            parse_window(&window_bytes(&bad), 100, 0, false),
            Err(DecodeError::SegmentEnd { .. })
        ));
    }

    #[test]
    fn segment_length_and_position_bounds() {
        let mut p = HeaderParser::new(&[0x01, 101, 0]);
        assert!(matches!(
            p.parse_win_indicator_and_source_segment(100, 0, false),
            Err(DecodeError::SegmentLength { length: 101, bound: 100, .. })
        ));

        let mut p = HeaderParser::new(&[0x01, 1, 100]);
        assert!(matches!(
            p.parse_win_indicator_and_source_segment(100, 0, false),
            Err(DecodeError::SegmentPosition { position: 100, .. })
        ));

        // Empty segment at the bound is fine.
        let mut p = HeaderParser::new(&[0x01, 0, 100]);
        assert!(p.parse_win_indicator_and_source_segment(100, 0, false).is_ok());
    }

    #[test]
    fn target_segment_bound_is_decoded_size() {
        let mut p = HeaderParser::new(&[0x02, 10, 5]);
        let Parsed::Complete(src) = p.parse_win_indicator_and_source_segment(0, 15, true).unwrap()
        else {
            panic!("incomplete");
        };
        assert_eq!(src.segment.map(|s| s.origin), Some(SegmentOrigin::Target));

        let mut p = HeaderParser::new(&[0x02, 10, 6]);
        assert!(p.parse_win_indicator_and_source_segment(1000, 15, true).is_err());
    }

    #[test]
    fn source_and_target_rejected() {
        let mut p = HeaderParser::new(&[0x03, 0, 0]);
        assert!(matches!(
            p.parse_win_indicator_and_source_segment(100, 100, true),
            Err(DecodeError::SourceAndTarget)
        ));
        let mut p = HeaderParser::new(&[0x07]);
        assert!(matches!(
            p.parse_win_indicator_and_source_segment(0, 0, false),
            Err(DecodeError::SourceAndTarget)
        ));
    }

    #[test]
    fn target_disallowed() {
        let mut p = HeaderParser::new(&[0x02, 0, 0]);
        assert!(matches!(
            p.parse_win_indicator_and_source_segment(100, 100, false),
            Err(DecodeError::TargetSourceNotAllowed)
        ));
    }

    #[test]
    fn unknown_window_bits_warn() {
        let mut p = HeaderParser::new(&[0x80]);
        assert!(p.parse_win_indicator_and_source_segment(0, 0, false).is_ok());
        assert_eq!(p.take_warnings(), vec![Warning::UnknownWindowIndicator(0x80)]);
    }

    #[test]
    fn delta_indicator_must_be_zero() {
        let mut p = HeaderParser::new(&[0x04]);
        assert!(matches!(
            p.parse_delta_indicator(),
            Err(DecodeError::SecondaryCompression(_))
        ));
    }

    #[test]
    fn window_lengths_twice_is_fatal() {
        let mut p = HeaderParser::new(&[5, 1, 5, 1]);
        assert_eq!(p.parse_window_lengths().unwrap(), Parsed::Complete(1));
        assert!(matches!(
            p.parse_window_lengths(),
            Err(DecodeError::WindowLengthsAlreadyParsed)
        ));
    }

    #[test]
    fn section_lengths_before_window_lengths() {
        let mut p = HeaderParser::new(&[0, 0, 0]);
        assert!(matches!(
            p.parse_section_lengths(false),
            Err(DecodeError::WindowLengthsMissing(_))
        ));
    }

    #[test]
    fn section_length_sum_mismatch() {
        let mut bytes = window_bytes(&sample_header(None, None));
        // Second byte is the delta encoding length; bump it.
        bytes[1] += 1;
        assert!(matches!(
            parse_window(&bytes, 0, 0, false),
            Err(DecodeError::DeltaEncodingLength { .. })
        ));
    }

    #[test]
    fn checksum_upper_bits_rejected() {
        // lengths: delta len placeholder, target size 0, indicator, 3 x 0, checksum 2^32
        let mut body = vec![0u8, 0, 0, 0, 0];
        varint::append_u64(&mut body, 1 << 32);
        let mut bytes = vec![0x04];
        varint::append_usize(&mut bytes, body.len());
        bytes.extend_from_slice(&body);
        assert!(matches!(
            parse_window(&bytes, 0, 0, false),
            Err(DecodeError::MalformedVarint { field: "Adler32 checksum value" })
        ));
    }

    #[test]
    fn truncation_at_every_point_is_end_of_data() {
        let header = sample_header(
            Some(SourceSegment {
                origin: SegmentOrigin::Dictionary,
                length: 1000,
                position: 70000,
            }),
            Some(u32::MAX),
        );
        let bytes = window_bytes(&header);
        for cut in 0..bytes.len() {
            assert_eq!(
                parse_window(&bytes[..cut], 80000, 0, false).unwrap(),
                Parsed::EndOfData,
                "cut {cut}"
            );
        }
        assert!(matches!(
            parse_window(&bytes, 80000, 0, false).unwrap(),
            Parsed::Complete(_)
        ));
    }

    #[test]
    fn failure_is_sticky_and_keeps_cursor() {
        let mut p = HeaderParser::new(&[0x03, 0x00, 0x00, 0x00]);
        let first = p.parse_win_indicator_and_source_segment(10, 10, true);
        assert!(first.is_err());
        assert_eq!(p.state(), ParserState::Error);
        assert_eq!(p.position(), 0);
        // Anything afterwards replays the same error without reading.
        assert!(matches!(p.parse_byte(), Err(DecodeError::SourceAndTarget)));
        assert!(matches!(p.parse_delta_indicator(), Err(DecodeError::SourceAndTarget)));
        assert_eq!(p.position(), 0);
        assert!(p.error().is_some());
    }

    #[test]
    fn end_of_data_is_sticky() {
        let mut p = HeaderParser::new(&[0x81]);
        assert_eq!(p.parse_int32("x").unwrap(), Parsed::EndOfData);
        assert_eq!(p.parse_byte().unwrap(), Parsed::EndOfData);
        assert_eq!(p.position(), 0);
    }

    #[test]
    fn primitive_parsers() {
        let mut bytes = vec![7u8];
        varint::append_u64(&mut bytes, 0x7FFF_FFFF);
        varint::append_u64(&mut bytes, 0xFFFF_FFFF);
        let mut p = HeaderParser::new(&bytes);
        assert_eq!(p.parse_byte().unwrap(), Parsed::Complete(7));
        assert_eq!(p.parse_int32("a").unwrap(), Parsed::Complete(0x7FFF_FFFF));
        assert_eq!(p.parse_uint32("b").unwrap(), Parsed::Complete(0xFFFF_FFFF));
        assert_eq!(p.state(), ParserState::Fresh);
    }
}
