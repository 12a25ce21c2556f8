// Block matching against a hashed dictionary and, optionally, against the
// earlier part of the target being encoded.
//
// The dictionary is hashed once at block-aligned offsets. The target is
// scanned one byte at a time with a rolling hash; at each position the
// bucket chains are probed, each verified candidate block is extended
// forwards and backwards (over bytes not yet encoded), and the longest match
// wins. Matches shorter than the profile's minimum are left as literals.

use super::config::{BLOCK_SIZE, MatcherConfig};
use super::rolling::{self, RollingHash};
use super::table::BlockIndex;

// ---------------------------------------------------------------------------
// Output seam
// ---------------------------------------------------------------------------

/// Receives the matcher's output in target order. Literal and copy calls
/// together cover the target exactly once.
pub trait MatchSink {
    fn literal(&mut self, bytes: &[u8]);
    /// COPY `len` bytes from `address` in the window's address space: the
    /// dictionary occupies `[0, dictionary_len)` and the target follows.
    fn copy(&mut self, len: usize, address: u64);
    /// Encoded size of `address` for a COPY issued once `pending` more
    /// literal bytes have been written; used to break ties.
    fn address_cost(&self, address: u64, pending: u64) -> usize;
}

// ---------------------------------------------------------------------------
// Hashed dictionary
// ---------------------------------------------------------------------------

/// A dictionary with its block index. Built once, read-only afterwards, and
/// shareable between any number of encoding sessions and threads.
pub struct HashedDictionary {
    data: Vec<u8>,
    index: BlockIndex,
    hasher: RollingHash,
}

impl HashedDictionary {
    pub fn new(dictionary: &[u8]) -> Self {
        let hasher = RollingHash::new(BLOCK_SIZE);
        let mut index = BlockIndex::with_blocks(dictionary.len() / BLOCK_SIZE);
        for (block, bytes) in dictionary.chunks_exact(BLOCK_SIZE).enumerate() {
            index.insert(hasher.hash(bytes), block);
        }
        log::debug!(
            "hashed dictionary: {} bytes, {} blocks, {} buckets",
            dictionary.len(),
            index.capacity(),
            index.cfg().size
        );
        Self {
            data: dictionary.to_vec(),
            index,
            hasher,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for HashedDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashedDictionary")
            .field("len", &self.data.len())
            .field("blocks", &self.index.capacity())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Match engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    Dictionary,
    Target,
}

/// A verified, extended match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub origin: MatchOrigin,
    /// Offset of the matched bytes in the dictionary or the target.
    pub source_start: usize,
    pub target_start: usize,
    pub len: usize,
}

pub struct MatchEngine<'d> {
    dictionary: &'d HashedDictionary,
    config: MatcherConfig,
    look_for_target_matches: bool,
}

impl<'d> MatchEngine<'d> {
    pub fn new(
        dictionary: &'d HashedDictionary,
        config: MatcherConfig,
        look_for_target_matches: bool,
    ) -> Self {
        Self {
            dictionary,
            config,
            look_for_target_matches,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Address of a match in the window's address space.
    #[inline]
    fn address(&self, m: &Match) -> u64 {
        match m.origin {
            MatchOrigin::Dictionary => m.source_start as u64,
            MatchOrigin::Target => (self.dictionary.len() + m.source_start) as u64,
        }
    }

    /// Describe `target` to `sink` as literals and copies.
    pub fn encode<S: MatchSink + ?Sized>(&self, target: &[u8], sink: &mut S) {
        if !self.config.matches_enabled() || target.len() < BLOCK_SIZE {
            sink.literal(target);
            return;
        }

        let hasher = self.dictionary.hasher;
        let mut target_index = self
            .look_for_target_matches
            .then(|| BlockIndex::with_blocks(target.len() / BLOCK_SIZE));
        let mut next_block = 0usize;

        let last = target.len() - BLOCK_SIZE;
        let mut literal_start = 0usize;
        let mut pos = 0usize;
        let mut hash = hasher.hash(target);

        loop {
            // Target blocks become candidates once they start before `pos`.
            if let Some(index) = target_index.as_mut() {
                while next_block * BLOCK_SIZE < pos && next_block < index.capacity() {
                    let start = next_block * BLOCK_SIZE;
                    index.insert(hasher.hash(&target[start..]), next_block);
                    next_block += 1;
                }
            }

            match self.best_match(target, pos, literal_start, hash, target_index.as_ref(), sink) {
                Some(m) => {
                    log::trace!(
                        "match {:?} {} bytes: target {} <- {}",
                        m.origin,
                        m.len,
                        m.target_start,
                        m.source_start
                    );
                    sink.literal(&target[literal_start..m.target_start]);
                    sink.copy(m.len, self.address(&m));
                    pos = m.target_start + m.len;
                    literal_start = pos;
                    if pos > last {
                        break;
                    }
                    hash = hasher.hash(&target[pos..]);
                }
                None => {
                    if pos == last {
                        break;
                    }
                    hash = hasher.roll(hash, target[pos], target[pos + BLOCK_SIZE]);
                    pos += 1;
                }
            }
        }

        sink.literal(&target[literal_start..]);
    }

    /// Best match for the block at `pos`, or `None` if nothing reaches the
    /// minimum length. Backward extension stops at `literal_start`.
    fn best_match<S: MatchSink + ?Sized>(
        &self,
        target: &[u8],
        pos: usize,
        literal_start: usize,
        hash: u32,
        target_index: Option<&BlockIndex>,
        sink: &S,
    ) -> Option<Match> {
        let block = &target[pos..pos + BLOCK_SIZE];
        let pending = &target[literal_start..pos];
        let ahead = &target[pos + BLOCK_SIZE..];
        let dict = self.dictionary.data();
        let mut best: Option<Match> = None;

        for candidate in self.dictionary.index.candidates(hash).take(self.config.max_probes) {
            let start = candidate * BLOCK_SIZE;
            if dict[start..start + BLOCK_SIZE] != *block {
                continue;
            }
            let forward = rolling::forward_match(&dict[start + BLOCK_SIZE..], ahead);
            let back = rolling::backward_match(&dict[..start], pending);
            self.consider(
                &mut best,
                Match {
                    origin: MatchOrigin::Dictionary,
                    source_start: start - back,
                    target_start: pos - back,
                    len: back + BLOCK_SIZE + forward,
                },
                literal_start,
                sink,
            );
            if self.long_enough(&best) {
                break;
            }
        }

        if let Some(index) = target_index.filter(|_| !self.long_enough(&best)) {
            for candidate in index.candidates(hash).take(self.config.max_probes) {
                let start = candidate * BLOCK_SIZE;
                if target[start..start + BLOCK_SIZE] != *block {
                    continue;
                }
                let forward = rolling::forward_match(&target[start + BLOCK_SIZE..], ahead);
                let back = rolling::backward_match(&target[..start], pending);
                self.consider(
                    &mut best,
                    Match {
                        origin: MatchOrigin::Target,
                        source_start: start - back,
                        target_start: pos - back,
                        len: back + BLOCK_SIZE + forward,
                    },
                    literal_start,
                    sink,
                );
                if self.long_enough(&best) {
                    break;
                }
            }
        }

        best.filter(|m| m.len >= self.config.min_match)
    }

    /// Keep the longer match; on equal length keep the cheaper address.
    /// Costs are taken where each COPY would land, after the literals
    /// between `literal_start` and its start.
    fn consider<S: MatchSink + ?Sized>(
        &self,
        best: &mut Option<Match>,
        candidate: Match,
        literal_start: usize,
        sink: &S,
    ) {
        let cost = |m: &Match| {
            sink.address_cost(self.address(m), (m.target_start - literal_start) as u64)
        };
        let better = match best {
            None => true,
            Some(b) if candidate.len != b.len => candidate.len > b.len,
            Some(b) => cost(&candidate) < cost(&*b),
        };
        if better {
            *best = Some(candidate);
        }
    }

    #[inline]
    fn long_enough(&self, best: &Option<Match>) -> bool {
        best.is_some_and(|m| m.len >= self.config.long_enough)
    }
}
