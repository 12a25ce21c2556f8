// Output sink for decoded target bytes and encoded delta bytes.

use std::io::{self, Write};

/// Append-only byte destination. Each call may receive any number of bytes,
/// including none.
pub trait OutputSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl OutputSink for Vec<u8> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Adapts any [`Write`] into an [`OutputSink`].
pub struct WriteSink<W: Write>(pub W);

impl<W: Write> WriteSink<W> {
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> OutputSink for WriteSink<W> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes)
    }
}
