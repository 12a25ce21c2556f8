// Dictionary hashing and block matching for the encoder.
//
// - `config`   matcher profiles by level, block size, run threshold
// - `rolling`  rolling block hash, bucket folding, match extension helpers
// - `table`    chained block index
// - `matching` hashed dictionary and the match engine

pub mod config;
pub mod matching;
pub mod rolling;
pub mod table;

pub use config::{MatcherConfig, config_for_level};
pub use matching::{HashedDictionary, MatchEngine, MatchSink};
