// Session-level delta encoding and decoding.
//
// - `encoder`  StreamingEncoder: header, then windows per chunk, against a HashedDictionary
// - `decoder`  DeltaDecoder: pumps an `io::Read` through a StreamingDecoder
// - `pipeline` matcher output to ADD/RUN/COPY instructions

pub mod decoder;
pub mod encoder;
pub mod pipeline;

pub use decoder::DeltaDecoder;
pub use encoder::{EncodeError, EncoderOptions, StreamingEncoder, encode_all, encode_all_with};
