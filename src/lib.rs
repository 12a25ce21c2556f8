//! vcdstream: streaming VCDIFF (RFC 3284) delta encoding and decoding.
//!
//! The crate provides:
//! - The wire format, a resumable decoder and a per-window instruction writer (`vcdiff`)
//! - Dictionary hashing and block matching (`hash`)
//! - Encoding sessions and reader-driven decoding (`compress`)
//!
//! Both sides work on chunks: the encoder accepts the target piece by piece
//! and the decoder accepts the delta split at arbitrary byte boundaries,
//! emitting target bytes as soon as they can be reconstructed.
//!
//! # Quick Start
//!
//! ```
//! use vcdstream::{EncoderOptions, FormatExtensions, decode_all, encode_all};
//!
//! let dictionary = b"hello old world, hello old friend";
//! let target = b"hello new world, hello old friend";
//!
//! let options = EncoderOptions {
//!     extensions: FormatExtensions::INTERLEAVED | FormatExtensions::CHECKSUM,
//!     ..EncoderOptions::default()
//! };
//! let delta = encode_all(dictionary, target, options).unwrap();
//! let decoded = decode_all(dictionary, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod compress;
pub mod hash;
pub mod vcdiff;

pub use compress::{EncodeError, EncoderOptions, StreamingEncoder, encode_all};
pub use hash::HashedDictionary;
pub use vcdiff::checksum::{Adler32, zero_seeded_adler32};
pub use vcdiff::{
    DecodeError, DecoderOptions, FormatExtensions, OutputSink, StreamingDecoder, Warning,
    WriteSink, decode_all,
};
