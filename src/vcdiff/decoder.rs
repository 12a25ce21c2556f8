// VCDIFF decoder: a resumable session that accepts the delta in arbitrary
// chunks and emits target bytes to a sink as they are reconstructed.
//
// State progression: file header, then for each window the window header
// followed by its body. Headers are parsed with a fresh `HeaderParser` over
// the buffered input on every attempt; nothing is consumed until a whole
// header parses. Standard-layout bodies are decoded once all three sections
// have arrived. Interleaved bodies (one combined section) are decoded half
// instruction by half instruction as bytes arrive, so output is produced
// before the window is complete.
//
// Once a fatal error is returned the session keeps it and returns a copy on
// every later call.

use std::borrow::Cow;

use super::address_cache::{AddressCache, AddressCacheError};
use super::checksum::Adler32;
use super::code_table::{
    CODE_TABLE_BYTES, CodeTable, CodeTableError, HalfInstruction, InstructionType,
    default_code_table, default_code_table_bytes,
};
use super::cursor::ByteCursor;
use super::error::{DecodeError, Section, SegmentOrigin, Warning};
use super::header::{
    CodeTableData, FileHeader, HeaderParser, Parsed, SectionLengths, SourceSegment,
};
use super::sink::OutputSink;
use super::varint::{self, VarIntError};

/// Default cap on a single target window and on the whole target.
pub const DEFAULT_MAX_TARGET_SIZE: u64 = 64 << 20;

/// Decoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Accept windows whose source segment is earlier decoded target
    /// (VCD_TARGET). Decoded output is retained for the whole session.
    pub allow_vcd_target: bool,
    pub max_target_window_size: u64,
    pub max_target_file_size: u64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            allow_vcd_target: true,
            max_target_window_size: DEFAULT_MAX_TARGET_SIZE,
            max_target_file_size: DEFAULT_MAX_TARGET_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

enum Phase {
    Idle,
    FileHeader,
    WindowHeader,
    WindowBody(ActiveWindow),
    Finished,
    Failed(DecodeError),
}

/// Per-window decoding state.
struct ActiveWindow {
    segment: Option<SourceSegment>,
    source_len: u64,
    target_size: u64,
    sections: SectionLengths,
    interleaved: bool,
    /// Bytes of the interleaved section still buffered or yet to arrive.
    inst_remaining: usize,
    /// Second half of an opcode whose first half already executed.
    pending_half: Option<HalfInstruction>,
    /// Absolute target offset of the window's first byte.
    window_start: u64,
    decoded: u64,
    checksum: Adler32,
}

impl ActiveWindow {
    #[inline]
    fn here(&self) -> u64 {
        self.source_len + self.decoded
    }
}

/// Decoded target bytes kept for COPY and VCD_TARGET resolution.
#[derive(Default)]
struct History {
    bytes: Vec<u8>,
    /// Absolute target offset of `bytes[0]`.
    base: u64,
    /// Index into `bytes` up to which bytes were handed to the sink.
    emitted: usize,
}

impl History {
    fn reset(&mut self, base: u64) {
        self.bytes.clear();
        self.base = base;
        self.emitted = 0;
    }

    fn emit(&mut self, window: &mut ActiveWindow, sink: &mut dyn OutputSink) -> Result<(), DecodeError> {
        let fresh = &self.bytes[self.emitted..];
        if fresh.is_empty() {
            return Ok(());
        }
        window.checksum.update(fresh);
        sink.append(fresh)?;
        self.emitted = self.bytes.len();
        Ok(())
    }
}

/// Why instruction execution stopped early.
enum Halt {
    /// A section ran out of bytes before the current half completed.
    NeedMore(Section),
    Fatal(DecodeError),
}

impl From<DecodeError> for Halt {
    fn from(e: DecodeError) -> Self {
        Halt::Fatal(e)
    }
}

impl From<CodeTableError> for Halt {
    fn from(e: CodeTableError) -> Self {
        Halt::Fatal(e.into())
    }
}

/// Section cursors of one window body. In the interleaved layout data and
/// addresses are read from the instruction cursor.
#[derive(Clone, Copy)]
struct Sections<'a> {
    inst: ByteCursor<'a>,
    data: ByteCursor<'a>,
    addr: ByteCursor<'a>,
    interleaved: bool,
}

impl<'a> Sections<'a> {
    fn interleaved(body: &'a [u8]) -> Self {
        Self {
            inst: ByteCursor::new(body),
            data: ByteCursor::new(&[]),
            addr: ByteCursor::new(&[]),
            interleaved: true,
        }
    }

    fn standard(body: &'a [u8], lens: &SectionLengths) -> Self {
        let (data, rest) = body.split_at(lens.data);
        let (inst, addr) = rest.split_at(lens.instructions);
        Self {
            inst: ByteCursor::new(inst),
            data: ByteCursor::new(data),
            addr: ByteCursor::new(&addr[..lens.addresses]),
            interleaved: false,
        }
    }

    fn data(&mut self) -> &mut ByteCursor<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.data }
    }

    fn addr(&mut self) -> &mut ByteCursor<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.addr }
    }
}

/// What instruction execution needs besides the window and its input.
struct Executor<'c> {
    table: &'c CodeTable,
    cache: &'c mut AddressCache,
    dictionary: &'c [u8],
    history: &'c mut History,
}

impl Executor<'_> {
    /// Execute instructions until the instruction section is exhausted.
    fn run(&mut self, window: &mut ActiveWindow, sections: &mut Sections<'_>) -> Result<(), Halt> {
        while window.pending_half.is_some() || !sections.inst.is_empty() {
            self.step(window, sections)?;
        }
        Ok(())
    }

    /// One half instruction: either the pending second half, or a new
    /// opcode together with its first half.
    fn step(&mut self, window: &mut ActiveWindow, sections: &mut Sections<'_>) -> Result<(), Halt> {
        if let Some(half) = window.pending_half {
            self.execute(half, window, sections)?;
            window.pending_half = None;
            return Ok(());
        }

        let mut probe = *sections;
        let opcode = probe
            .inst
            .read_u8()
            .ok_or(Halt::NeedMore(Section::Instructions))?;
        let entry = *self.table.lookup(opcode)?;
        if !entry.first.is_noop() {
            self.execute(entry.first, window, &mut probe)?;
        }
        *sections = probe;
        if !entry.second.is_noop() {
            window.pending_half = Some(entry.second);
        }
        Ok(())
    }

    /// Execute one half. Input is committed only when the half completes.
    fn execute(
        &mut self,
        half: HalfInstruction,
        window: &mut ActiveWindow,
        sections: &mut Sections<'_>,
    ) -> Result<(), Halt> {
        let mut probe = *sections;
        let size = if half.size == 0 {
            match varint::read_int32(&mut probe.inst) {
                Ok(v) => u64::from(v),
                Err(VarIntError::EndOfData) => return Err(Halt::NeedMore(Section::Instructions)),
                Err(VarIntError::Malformed) => {
                    return Err(DecodeError::MalformedVarint {
                        field: "instruction size",
                    }
                    .into());
                }
            }
        } else {
            u64::from(half.size)
        };

        let remaining = window.target_size - window.decoded;
        if size > remaining {
            return Err(DecodeError::TargetWindowOverrun { size, remaining }.into());
        }

        match half.inst {
            InstructionType::NoOp => {}
            InstructionType::Add => {
                let bytes = probe
                    .data()
                    .read_bytes(size as usize)
                    .ok_or(Halt::NeedMore(Section::Data))?;
                self.history.bytes.extend_from_slice(bytes);
            }
            InstructionType::Run => {
                let byte = probe.data().read_u8().ok_or(Halt::NeedMore(Section::Data))?;
                let len = self.history.bytes.len() + size as usize;
                self.history.bytes.resize(len, byte);
            }
            InstructionType::Copy => {
                let here = window.here();
                let address = match self.cache.decode(half.mode, probe.addr(), here) {
                    Ok(a) => a,
                    Err(AddressCacheError::EndOfData) => {
                        return Err(Halt::NeedMore(Section::Addresses));
                    }
                    Err(e) => {
                        return Err(DecodeError::from_address(e, self.cache.mode_count()).into());
                    }
                };
                self.copy(window, address, size);
            }
        }

        *sections = probe;
        window.decoded += size;
        Ok(())
    }

    /// Append `size` bytes starting at window address `address`. The range
    /// may start in the source segment and run on into the target, and may
    /// overlap the bytes it is producing.
    fn copy(&mut self, window: &ActiveWindow, mut address: u64, size: u64) {
        let history = &mut *self.history;
        let mut left = size;

        if address < window.source_len {
            let n = left.min(window.source_len - address);
            if let Some(seg) = window.segment {
                let start = seg.position + address;
                match seg.origin {
                    SegmentOrigin::Dictionary => {
                        let start = start as usize;
                        history
                            .bytes
                            .extend_from_slice(&self.dictionary[start..start + n as usize]);
                    }
                    SegmentOrigin::Target => {
                        let start = (start - history.base) as usize;
                        history.bytes.extend_from_within(start..start + n as usize);
                    }
                }
            }
            address += n;
            left -= n;
        }

        if left == 0 {
            return;
        }
        let window_base = (window.window_start - history.base) as usize;
        let from = window_base + (address - window.source_len) as usize;
        let left = left as usize;
        if from + left <= history.bytes.len() {
            history.bytes.extend_from_within(from..from + left);
        } else {
            // Overlapping copy: each byte may depend on one just written.
            for i in from..from + left {
                let byte = history.bytes[i];
                history.bytes.push(byte);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingDecoder
// ---------------------------------------------------------------------------

/// Chunk-driven VCDIFF decoding session.
///
/// ```
/// use vcdstream::vcdiff::{DecoderOptions, StreamingDecoder};
///
/// # fn run(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, vcdstream::vcdiff::DecodeError> {
/// let mut decoder = StreamingDecoder::new(DecoderOptions::default());
/// let mut target = Vec::new();
/// decoder.start_decoding(dictionary);
/// for chunk in delta.chunks(4096) {
///     decoder.decode_chunk(chunk, &mut target)?;
/// }
/// decoder.finish_decoding()?;
/// # Ok(target)
/// # }
/// ```
pub struct StreamingDecoder<'d> {
    options: DecoderOptions,
    dictionary: &'d [u8],
    phase: Phase,
    /// Received input not yet consumed.
    pending: Vec<u8>,
    table: Cow<'static, CodeTable>,
    cache: AddressCache,
    interleaved_allowed: bool,
    app_header: Option<Vec<u8>>,
    history: History,
    total_decoded: u64,
    warnings: Vec<Warning>,
    /// Cleared for the nested decode of a custom code table.
    allow_custom_table: bool,
}

impl<'d> StreamingDecoder<'d> {
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            dictionary: &[],
            phase: Phase::Idle,
            pending: Vec::new(),
            table: Cow::Borrowed(default_code_table()),
            cache: AddressCache::new(),
            interleaved_allowed: false,
            app_header: None,
            history: History::default(),
            total_decoded: 0,
            warnings: Vec::new(),
            allow_custom_table: true,
        }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Begin a session against `dictionary`, discarding any previous state.
    pub fn start_decoding(&mut self, dictionary: &'d [u8]) {
        self.dictionary = dictionary;
        self.phase = Phase::FileHeader;
        self.pending.clear();
        self.table = Cow::Borrowed(default_code_table());
        self.cache = AddressCache::new();
        self.interleaved_allowed = false;
        self.app_header = None;
        self.history.reset(0);
        self.total_decoded = 0;
        self.warnings.clear();
    }

    /// Feed the next piece of the delta. Target bytes reconstructed from the
    /// input so far are appended to `sink` before this returns.
    pub fn decode_chunk(&mut self, data: &[u8], sink: &mut dyn OutputSink) -> Result<(), DecodeError> {
        match &self.phase {
            Phase::Idle => return Err(DecodeError::NotStarted),
            Phase::Finished => return Err(DecodeError::AlreadyFinished),
            Phase::Failed(e) => return Err(e.clone()),
            _ => {}
        }
        self.pending.extend_from_slice(data);
        self.process(sink).map_err(|e| self.fail(e))
    }

    /// End the session. Fails if the delta stopped inside a header or window.
    pub fn finish_decoding(&mut self) -> Result<(), DecodeError> {
        let truncated = match &self.phase {
            Phase::Idle => return Err(DecodeError::NotStarted),
            Phase::Finished => return Err(DecodeError::AlreadyFinished),
            Phase::Failed(e) => return Err(e.clone()),
            Phase::FileHeader => Some("file header"),
            Phase::WindowHeader if !self.pending.is_empty() => Some("window header"),
            Phase::WindowHeader => None,
            Phase::WindowBody(_) => Some("window body"),
        };
        if let Some(part) = truncated {
            return Err(self.fail(DecodeError::Truncated(part)));
        }
        log::debug!("vcdiff decode finished: {} target bytes", self.total_decoded);
        self.phase = Phase::Finished;
        Ok(())
    }

    /// Application header from the file header, once it has been parsed.
    pub fn app_header(&self) -> Option<&[u8]> {
        self.app_header.as_deref()
    }

    /// Target bytes produced by completed windows.
    pub fn total_decoded(&self) -> u64 {
        self.total_decoded
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// The error this session failed with, if any.
    pub fn error(&self) -> Option<&DecodeError> {
        match &self.phase {
            Phase::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn fail(&mut self, e: DecodeError) -> DecodeError {
        log::debug!("vcdiff decode failed: {e}");
        self.phase = Phase::Failed(e.clone());
        e
    }

    fn record_warnings(&mut self, warnings: Vec<Warning>) {
        for w in &warnings {
            log::warn!("{w}");
        }
        self.warnings.extend(warnings);
    }

    /// Advance through as much buffered input as possible.
    fn process(&mut self, sink: &mut dyn OutputSink) -> Result<(), DecodeError> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::WindowHeader) {
                Phase::FileHeader => {
                    if !self.parse_file_header()? {
                        self.phase = Phase::FileHeader;
                        return Ok(());
                    }
                }
                Phase::WindowHeader => match self.parse_window_header()? {
                    Some(window) => self.phase = Phase::WindowBody(window),
                    None => return Ok(()),
                },
                Phase::WindowBody(mut window) => {
                    let done = if window.interleaved {
                        self.decode_interleaved(&mut window, sink)?
                    } else {
                        self.decode_standard(&mut window, sink)?
                    };
                    if !done {
                        self.phase = Phase::WindowBody(window);
                        return Ok(());
                    }
                    self.finish_window(window)?;
                }
                other => {
                    self.phase = other;
                    return Ok(());
                }
            }
        }
    }

    fn parse_file_header(&mut self) -> Result<bool, DecodeError> {
        let mut parser = HeaderParser::new(&self.pending);
        let header = match parser.parse_file_header()? {
            Parsed::Complete(h) => h,
            Parsed::EndOfData => return Ok(false),
        };
        let consumed = parser.position();
        let warnings = parser.take_warnings();
        self.record_warnings(warnings);
        self.pending.drain(..consumed);
        self.apply_file_header(header)?;
        Ok(true)
    }

    fn apply_file_header(&mut self, header: FileHeader) -> Result<(), DecodeError> {
        self.interleaved_allowed = header.allows_interleaved();
        if let Some(data) = &header.code_table {
            if !self.allow_custom_table {
                return Err(CodeTableError::InvalidCustomTable(
                    "nested custom code table".to_string(),
                )
                .into());
            }
            let table = decode_custom_table(data)?;
            self.table = Cow::Owned(table);
            self.cache = AddressCache::with_sizes(data.near_size, data.same_size);
        }
        log::debug!(
            "vcdiff file header: version 0x{:02x}, custom code table {}, app header {} bytes",
            header.version,
            header.code_table.is_some(),
            header.app_header.as_ref().map_or(0, Vec::len),
        );
        self.app_header = header.app_header;
        Ok(())
    }

    fn parse_window_header(&mut self) -> Result<Option<ActiveWindow>, DecodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let mut parser = HeaderParser::new(&self.pending);
        let source = parser.parse_win_indicator_and_source_segment(
            self.dictionary.len() as u64,
            self.total_decoded,
            self.options.allow_vcd_target,
        )?;
        let target_size = parser.parse_window_lengths()?;
        parser.parse_delta_indicator()?;
        let has_checksum = matches!(&source, Parsed::Complete(s) if s.has_checksum());
        let sections = parser.parse_section_lengths(has_checksum)?;

        let (Parsed::Complete(source), Parsed::Complete(target_size), Parsed::Complete(sections)) =
            (source, target_size, sections)
        else {
            return Ok(None);
        };
        let consumed = parser.position();
        let warnings = parser.take_warnings();
        self.record_warnings(warnings);

        if target_size > self.options.max_target_window_size {
            return Err(DecodeError::TargetWindowTooLarge {
                size: target_size,
                limit: self.options.max_target_window_size,
            });
        }
        let total = self.total_decoded.saturating_add(target_size);
        if total > self.options.max_target_file_size {
            return Err(DecodeError::TargetFileTooLarge {
                size: total,
                limit: self.options.max_target_file_size,
            });
        }

        self.pending.drain(..consumed);
        self.cache.init();
        if !self.options.allow_vcd_target {
            self.history.reset(self.total_decoded);
        }

        let interleaved =
            self.interleaved_allowed && sections.data == 0 && sections.addresses == 0;
        log::debug!(
            "vcdiff window at {}: target {} bytes, source {:?}, sections {}/{}/{}{}",
            self.total_decoded,
            target_size,
            source.segment,
            sections.data,
            sections.instructions,
            sections.addresses,
            if interleaved { " (interleaved)" } else { "" },
        );

        Ok(Some(ActiveWindow {
            segment: source.segment,
            source_len: source.segment_len(),
            target_size,
            sections,
            interleaved,
            inst_remaining: sections.instructions,
            pending_half: None,
            window_start: self.total_decoded,
            decoded: 0,
            checksum: Adler32::new(),
        }))
    }

    /// Decode a standard-layout body once it is fully buffered.
    fn decode_standard(
        &mut self,
        window: &mut ActiveWindow,
        sink: &mut dyn OutputSink,
    ) -> Result<bool, DecodeError> {
        let body_len = window.sections.body_len();
        if self.pending.len() < body_len {
            return Ok(false);
        }

        let Self {
            pending,
            table,
            cache,
            dictionary,
            history,
            ..
        } = self;
        let mut sections = Sections::standard(&pending[..body_len], &window.sections);
        let mut exec = Executor {
            table: &**table,
            cache: &mut *cache,
            dictionary: *dictionary,
            history: &mut *history,
        };
        let outcome = exec.run(window, &mut sections);
        history.emit(window, sink)?;
        match outcome {
            Ok(()) => {}
            Err(Halt::NeedMore(section)) => return Err(DecodeError::SectionUnderflow(section)),
            Err(Halt::Fatal(e)) => return Err(e),
        }

        for (section, cursor) in [(Section::Data, sections.data), (Section::Addresses, sections.addr)] {
            if !cursor.is_empty() {
                return Err(DecodeError::ExcessSectionData {
                    section,
                    remaining: cursor.remaining(),
                });
            }
        }
        pending.drain(..body_len);
        Ok(true)
    }

    /// Decode as much of an interleaved body as has arrived.
    fn decode_interleaved(
        &mut self,
        window: &mut ActiveWindow,
        sink: &mut dyn OutputSink,
    ) -> Result<bool, DecodeError> {
        let Self {
            pending,
            table,
            cache,
            dictionary,
            history,
            ..
        } = self;
        let available = pending.len().min(window.inst_remaining);
        let complete = available == window.inst_remaining;
        let mut sections = Sections::interleaved(&pending[..available]);
        let mut exec = Executor {
            table: &**table,
            cache: &mut *cache,
            dictionary: *dictionary,
            history: &mut *history,
        };
        let outcome = exec.run(window, &mut sections);
        let consumed = sections.inst.position();
        history.emit(window, sink)?;
        pending.drain(..consumed);
        window.inst_remaining -= consumed;

        match outcome {
            Ok(()) => Ok(complete),
            Err(Halt::NeedMore(_)) if !complete => Ok(false),
            Err(Halt::NeedMore(_)) => Err(DecodeError::SectionUnderflow(Section::Instructions)),
            Err(Halt::Fatal(e)) => Err(e),
        }
    }

    /// End-of-window checks, after every byte of the window was emitted.
    fn finish_window(&mut self, window: ActiveWindow) -> Result<(), DecodeError> {
        if window.decoded != window.target_size {
            return Err(DecodeError::TargetWindowSize {
                declared: window.target_size,
                actual: window.decoded,
            });
        }
        if let Some(expected) = window.sections.checksum {
            let actual = window.checksum.value();
            if expected != actual {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }
        self.total_decoded += window.target_size;
        Ok(())
    }
}

/// Rebuild a custom code table from its delta against the default table.
fn decode_custom_table(data: &CodeTableData) -> Result<CodeTable, DecodeError> {
    let mode_count = 2 + usize::from(data.near_size) + usize::from(data.same_size);
    if mode_count > 256 {
        return Err(CodeTableError::InvalidCustomTable(format!(
            "{mode_count} address modes do not fit in a byte"
        ))
        .into());
    }

    let options = DecoderOptions {
        allow_vcd_target: false,
        max_target_window_size: CODE_TABLE_BYTES as u64,
        max_target_file_size: CODE_TABLE_BYTES as u64,
    };
    let mut decoder = StreamingDecoder::new(options);
    decoder.allow_custom_table = false;
    let mut bytes = Vec::new();
    decoder.start_decoding(default_code_table_bytes());
    decoder.decode_chunk(&data.delta, &mut bytes)?;
    decoder.finish_decoding()?;
    if bytes.len() != CODE_TABLE_BYTES {
        return Err(CodeTableError::InvalidCustomTable(format!(
            "code table decoded to {} bytes, expected {CODE_TABLE_BYTES}",
            bytes.len()
        ))
        .into());
    }
    let table = CodeTable::from_bytes(&bytes)?;
    table.validate(mode_count)?;
    Ok(table)
}

/// Decode a complete in-memory delta against `dictionary`.
pub fn decode_all(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_all_with(dictionary, delta, DecoderOptions::default())
}

pub fn decode_all_with(
    dictionary: &[u8],
    delta: &[u8],
    options: DecoderOptions,
) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = StreamingDecoder::new(options);
    let mut target = Vec::new();
    decoder.start_decoding(dictionary);
    decoder.decode_chunk(delta, &mut target)?;
    decoder.finish_decoding()?;
    Ok(target)
}
