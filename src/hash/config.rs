// Matcher profiles, selected by compression level.

/// Width of an indexed block. Dictionary and target are hashed in blocks of
/// this many bytes at aligned offsets; a match is only found through a block
/// that matches in full.
pub const BLOCK_SIZE: usize = 16;

/// Shortest run of one byte encoded as RUN instead of ADD.
pub const MIN_RUN: usize = 8;

/// Default target window size (8 MiB).
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 23;

/// Default compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Tuning for the block matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    pub name: &'static str,
    /// Bucket chain entries examined per position. Zero disables matching.
    pub max_probes: usize,
    /// Shortest match turned into a COPY, after extension.
    pub min_match: usize,
    /// A match this long ends the search at the current position.
    pub long_enough: usize,
}

impl MatcherConfig {
    #[inline]
    pub fn matches_enabled(&self) -> bool {
        self.max_probes > 0
    }
}

/// Level 0 stores literals only; 1 through 9 probe progressively deeper.
pub fn config_for_level(level: u32) -> MatcherConfig {
    match level {
        0 => STORE,
        1 => FASTEST,
        2 => FASTER,
        3..=5 => FAST,
        6 => DEFAULT,
        _ => SLOW,
    }
}

pub const STORE: MatcherConfig = MatcherConfig {
    name: "store",
    max_probes: 0,
    min_match: BLOCK_SIZE,
    long_enough: 0,
};

pub const FASTEST: MatcherConfig = MatcherConfig {
    name: "fastest",
    max_probes: 1,
    min_match: 32,
    long_enough: 64,
};

pub const FASTER: MatcherConfig = MatcherConfig {
    name: "faster",
    max_probes: 4,
    min_match: 24,
    long_enough: 128,
};

pub const FAST: MatcherConfig = MatcherConfig {
    name: "fast",
    max_probes: 8,
    min_match: BLOCK_SIZE,
    long_enough: 256,
};

pub const DEFAULT: MatcherConfig = MatcherConfig {
    name: "default",
    max_probes: 32,
    min_match: BLOCK_SIZE,
    long_enough: 1024,
};

pub const SLOW: MatcherConfig = MatcherConfig {
    name: "slow",
    max_probes: 256,
    min_match: BLOCK_SIZE,
    long_enough: 4096,
};
