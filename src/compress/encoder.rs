// Streaming VCDIFF encoder.
//
// StreamingEncoder turns target bytes into delta windows against a shared
// HashedDictionary:
//   - start_encoding writes the file header (and the custom code table)
//   - encode_chunk splits its input at the window size and writes one
//     window per piece, each using the whole dictionary as source
//   - finish_encoding closes the session
//
// Nothing is buffered between calls; every window is written to the sink
// before encode_chunk returns.

use std::io;
use std::sync::{Arc, LazyLock};

use thiserror::Error;

use crate::hash::config::{self, DEFAULT_LEVEL, DEFAULT_WINDOW_SIZE, MatcherConfig};
use crate::hash::matching::{HashedDictionary, MatchEngine};
use crate::vcdiff::checksum::zero_seeded_adler32;
use crate::vcdiff::code_table::{CodeTableError, default_code_table_bytes};
use crate::vcdiff::decoder::DEFAULT_MAX_TARGET_SIZE;
use crate::vcdiff::encoder::{EncodingTable, WindowWriter};
use crate::vcdiff::header::{FileHeader, FormatExtensions};
use crate::vcdiff::sink::OutputSink;

/// Largest window the encoder writes: what a decoder with default limits
/// accepts, well inside the 31-bit size fields.
pub const MAX_WINDOW_SIZE: usize = DEFAULT_MAX_TARGET_SIZE as usize;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for a streaming encoder.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Format extensions; any flag set switches the version byte to `S`.
    pub extensions: FormatExtensions,
    /// Also match against earlier bytes of the same window.
    pub look_for_target_matches: bool,
    /// Largest target window in bytes, clamped to `1..=MAX_WINDOW_SIZE`.
    pub window_size: usize,
    /// Matcher profile, 0 (literals only) to 9.
    pub match_level: u32,
    pub app_header: Option<Vec<u8>>,
    pub code_table: EncodingTable,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            extensions: FormatExtensions::empty(),
            look_for_target_matches: true,
            window_size: DEFAULT_WINDOW_SIZE,
            match_level: DEFAULT_LEVEL,
            app_header: None,
            code_table: EncodingTable::standard(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Sink and code-table errors end the session; the encoder returns a copy
/// of the error from every later call.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    #[error("encode_chunk or finish_encoding called before start_encoding")]
    NotStarted,

    #[error("start_encoding called on a session that is already encoding")]
    AlreadyStarted,

    #[error("encoding session already finished")]
    AlreadyFinished,

    #[error(transparent)]
    CodeTable(#[from] CodeTableError),

    #[error("output sink failed: {0}")]
    Sink(Arc<io::Error>),
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self {
        EncodeError::Sink(Arc::new(e))
    }
}

// ---------------------------------------------------------------------------
// StreamingEncoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum EncoderState {
    Idle,
    Encoding,
    Finished,
    Failed(EncodeError),
}

/// Chunk-driven VCDIFF encoding session.
///
/// # Example
/// ```
/// use vcdstream::compress::encoder::{EncoderOptions, StreamingEncoder};
/// use vcdstream::hash::HashedDictionary;
///
/// let dictionary = HashedDictionary::new(b"The quick brown fox jumps over the lazy dog");
/// let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
/// let mut delta = Vec::new();
/// enc.start_encoding(&mut delta).unwrap();
/// enc.encode_chunk(b"The quick brown fox jumps over the lazy cat", &mut delta).unwrap();
/// enc.finish_encoding(&mut delta).unwrap();
///
/// let target = vcdstream::decode_all(dictionary.data(), &delta).unwrap();
/// assert_eq!(target, b"The quick brown fox jumps over the lazy cat");
/// ```
pub struct StreamingEncoder<'d> {
    dictionary: &'d HashedDictionary,
    options: EncoderOptions,
    config: MatcherConfig,
    state: EncoderState,
    bytes_in: u64,
    windows_written: u64,
}

impl<'d> StreamingEncoder<'d> {
    pub fn new(dictionary: &'d HashedDictionary, mut options: EncoderOptions) -> Self {
        let window_size = options.window_size.clamp(1, MAX_WINDOW_SIZE);
        if window_size != options.window_size {
            log::debug!(
                "window size {} clamped to {window_size}",
                options.window_size
            );
            options.window_size = window_size;
        }
        let config = config::config_for_level(options.match_level);
        Self {
            dictionary,
            options,
            config,
            state: EncoderState::Idle,
            bytes_in: 0,
            windows_written: 0,
        }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Target bytes consumed so far in this session.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Write the file header and begin a session. A finished encoder may be
    /// started again; a failed one may not.
    pub fn start_encoding(&mut self, sink: &mut dyn OutputSink) -> Result<(), EncodeError> {
        match &self.state {
            EncoderState::Encoding => return Err(EncodeError::AlreadyStarted),
            EncoderState::Failed(e) => return Err(e.clone()),
            EncoderState::Idle | EncoderState::Finished => {}
        }

        let mut header = FileHeader::new(self.options.extensions);
        header.app_header = self.options.app_header.clone();
        if !self.options.code_table.is_standard() {
            let delta = encode_code_table(&self.options.code_table).map_err(|e| self.fail(e))?;
            header.code_table = Some(self.options.code_table.header_data(delta));
        }

        let mut out = Vec::new();
        header.encode(&mut out);
        sink.append(&out).map_err(|e| self.fail(e.into()))?;

        log::debug!(
            "vcdiff encode start: version 0x{:02x}, level {} ({}), window {} bytes, dictionary {} bytes",
            header.version,
            self.options.match_level,
            self.config.name,
            self.options.window_size,
            self.dictionary.len()
        );
        self.state = EncoderState::Encoding;
        self.bytes_in = 0;
        self.windows_written = 0;
        Ok(())
    }

    /// Encode `data` as one or more windows and write them to `sink`.
    pub fn encode_chunk(&mut self, data: &[u8], sink: &mut dyn OutputSink) -> Result<(), EncodeError> {
        self.check_encoding()?;

        let interleaved = self.options.extensions.contains(FormatExtensions::INTERLEAVED);
        let checksum = self.options.extensions.contains(FormatExtensions::CHECKSUM);
        let engine = MatchEngine::new(
            self.dictionary,
            self.config,
            self.options.look_for_target_matches,
        );

        for piece in data.chunks(self.options.window_size.max(1)) {
            let mut writer = WindowWriter::for_dictionary(
                &self.options.code_table,
                self.dictionary.len() as u64,
                interleaved,
            );
            engine.encode(piece, &mut writer);
            debug_assert_eq!(writer.target_len(), piece.len() as u64);

            let window = writer.finish(checksum.then(|| zero_seeded_adler32(piece)));
            sink.append(&window).map_err(|e| self.fail(e.into()))?;

            log::debug!(
                "vcdiff window {}: {} target bytes -> {} delta bytes",
                self.windows_written,
                piece.len(),
                window.len()
            );
            self.windows_written += 1;
            self.bytes_in += piece.len() as u64;
        }
        Ok(())
    }

    /// Close the session. Every window has already been written.
    pub fn finish_encoding(&mut self, _sink: &mut dyn OutputSink) -> Result<(), EncodeError> {
        self.check_encoding()?;
        log::debug!(
            "vcdiff encode finished: {} bytes in {} windows",
            self.bytes_in,
            self.windows_written
        );
        self.state = EncoderState::Finished;
        Ok(())
    }

    fn check_encoding(&self) -> Result<(), EncodeError> {
        match &self.state {
            EncoderState::Idle => Err(EncodeError::NotStarted),
            EncoderState::Finished => Err(EncodeError::AlreadyFinished),
            EncoderState::Failed(e) => Err(e.clone()),
            EncoderState::Encoding => Ok(()),
        }
    }

    fn fail(&mut self, e: EncodeError) -> EncodeError {
        log::debug!("vcdiff encode failed: {e}");
        self.state = EncoderState::Failed(e.clone());
        e
    }
}

/// Delta of a custom table's serialized form against the default table's,
/// encoded with the default table and no extensions.
fn encode_code_table(table: &EncodingTable) -> Result<Vec<u8>, EncodeError> {
    static DEFAULT_TABLE: LazyLock<HashedDictionary> =
        LazyLock::new(|| HashedDictionary::new(default_code_table_bytes()));

    let options = EncoderOptions {
        look_for_target_matches: false,
        ..EncoderOptions::default()
    };
    encode_all_with(&DEFAULT_TABLE, &table.table().to_bytes(), options)
}

/// Encode `target` against `dictionary` in one call.
pub fn encode_all(
    dictionary: &[u8],
    target: &[u8],
    options: EncoderOptions,
) -> Result<Vec<u8>, EncodeError> {
    encode_all_with(&HashedDictionary::new(dictionary), target, options)
}

/// Like [`encode_all`] with an already hashed dictionary.
pub fn encode_all_with(
    dictionary: &HashedDictionary,
    target: &[u8],
    options: EncoderOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut enc = StreamingEncoder::new(dictionary, options);
    let mut out = Vec::new();
    enc.start_encoding(&mut out)?;
    enc.encode_chunk(target, &mut out)?;
    enc.finish_encoding(&mut out)?;
    Ok(out)
}
