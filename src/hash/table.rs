// Block index: chained hash buckets over block-aligned offsets.
//
// Each bucket holds the most recently added block with that hash; `next`
// links every block to the previous block in its bucket. Stored values are
// block numbers plus one so that 0 means "empty".

use super::rolling::HashCfg;

pub struct BlockIndex {
    cfg: HashCfg,
    heads: Vec<u32>,
    next: Vec<u32>,
}

impl BlockIndex {
    /// Index sized for `blocks` blocks.
    pub fn with_blocks(blocks: usize) -> Self {
        let cfg = HashCfg::new(blocks);
        Self {
            cfg,
            heads: vec![0; cfg.size],
            next: vec![0; blocks],
        }
    }

    /// Number of blocks the index was sized for.
    pub fn capacity(&self) -> usize {
        self.next.len()
    }

    pub fn cfg(&self) -> &HashCfg {
        &self.cfg
    }

    /// Add block number `block` under `hash`. Blocks beyond the capacity are
    /// ignored.
    #[inline]
    pub fn insert(&mut self, hash: u32, block: usize) {
        let Some(stored) = block
            .checked_add(1)
            .and_then(|b| u32::try_from(b).ok())
            .filter(|_| block < self.next.len())
        else {
            return;
        };
        let bucket = self.cfg.bucket(hash);
        self.next[block] = self.heads[bucket];
        self.heads[bucket] = stored;
    }

    /// Blocks added under `hash`'s bucket, newest first. Different hashes can
    /// share a bucket; callers verify the bytes.
    #[inline]
    pub fn candidates(&self, hash: u32) -> Candidates<'_> {
        Candidates {
            next: &self.next,
            current: self.heads[self.cfg.bucket(hash)],
        }
    }
}

/// Iterator over one bucket's chain.
pub struct Candidates<'a> {
    next: &'a [u32],
    current: u32,
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.current == 0 {
            return None;
        }
        let block = (self.current - 1) as usize;
        self.current = self.next[block];
        Some(block)
    }
}
