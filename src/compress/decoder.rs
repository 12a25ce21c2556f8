// Reader-driven delta decoder.
//
// DeltaDecoder pulls the delta from any `Read` in fixed-size reads, feeds
// each read to a StreamingDecoder and forwards target bytes to a `Write`
// as soon as they are reconstructed. Memory stays bounded by one window
// (plus the retained target when VCD_TARGET windows are allowed).

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::vcdiff::decoder::{DecoderOptions, StreamingDecoder};
use crate::vcdiff::error::DecodeError;
use crate::vcdiff::sink::OutputSink;

/// Bytes requested from the reader per call.
pub const READ_CHUNK: usize = 64 * 1024;

/// Streaming delta decoder with progress tracking.
pub struct DeltaDecoder<'d, R: Read> {
    reader: R,
    inner: StreamingDecoder<'d>,
    bytes_read: u64,
    bytes_decoded: u64,
}

/// Forwards to a writer and counts what passed through.
struct CountingSink<'w, W: Write> {
    writer: &'w mut W,
    written: u64,
}

impl<W: Write> OutputSink for CountingSink<'_, W> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

impl<'d, R: Read> DeltaDecoder<'d, R> {
    pub fn new(reader: R, dictionary: &'d [u8]) -> Self {
        Self::with_options(reader, dictionary, DecoderOptions::default())
    }

    pub fn with_options(reader: R, dictionary: &'d [u8], options: DecoderOptions) -> Self {
        let mut inner = StreamingDecoder::new(options);
        inner.start_decoding(dictionary);
        Self {
            reader,
            inner,
            bytes_read: 0,
            bytes_decoded: 0,
        }
    }

    /// Decode the whole input, writing the target to `writer`. Returns the
    /// number of target bytes written.
    pub fn decode_to<W: Write>(&mut self, writer: &mut W) -> Result<u64, DecodeError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut sink = CountingSink { writer, written: 0 };
        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Input(Arc::new(e))),
            };
            self.bytes_read += n as u64;
            let result = self.inner.decode_chunk(&buf[..n], &mut sink);
            self.bytes_decoded += std::mem::take(&mut sink.written);
            result?;
        }
        self.inner.finish_decoding()?;
        sink.writer.flush()?;
        Ok(self.bytes_decoded)
    }

    /// Delta bytes consumed from the reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Target bytes written so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// The underlying session, for warnings and the application header.
    pub fn session(&mut self) -> &mut StreamingDecoder<'d> {
        &mut self.inner
    }
}
