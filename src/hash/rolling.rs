// Rolling block hash and byte comparison helpers for the matcher.
//
// The block hash is a polynomial over a fixed window, evaluated in wrapping
// 32-bit arithmetic, so a window can be slid one byte at a time:
//
//   h(b[i..i+w]) = sum_k b[i+k] * M^(w-1-k)
//   h(b[i+1..i+w+1]) = (h - b[i] * M^(w-1)) * M + b[i+w]

/// Odd multiplier for the polynomial hash.
pub const HASH_MULT_32: u32 = 1_597_334_677;

/// Rolling hash over windows of a fixed width.
#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    width: usize,
    /// `HASH_MULT_32^(width - 1)`, the weight of the byte leaving the window.
    remove_factor: u32,
}

impl RollingHash {
    pub fn new(width: usize) -> Self {
        debug_assert!(width > 0);
        let remove_factor = (1..width).fold(1u32, |f, _| f.wrapping_mul(HASH_MULT_32));
        Self {
            width,
            remove_factor,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Hash of `window[..width]`.
    #[inline]
    pub fn hash(&self, window: &[u8]) -> u32 {
        window[..self.width].iter().fold(0u32, |h, &b| {
            h.wrapping_mul(HASH_MULT_32).wrapping_add(u32::from(b))
        })
    }

    /// Slide the window one byte: drop `outgoing`, append `incoming`.
    #[inline]
    pub fn roll(&self, hash: u32, outgoing: u8, incoming: u8) -> u32 {
        hash.wrapping_sub(u32::from(outgoing).wrapping_mul(self.remove_factor))
            .wrapping_mul(HASH_MULT_32)
            .wrapping_add(u32::from(incoming))
    }
}

// ---------------------------------------------------------------------------
// Bucket index computation
// ---------------------------------------------------------------------------

/// Power-of-two bucket count and the fold used to map a hash onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCfg {
    pub size: usize,
    /// `32 - log2(size)`.
    pub shift: u32,
    pub mask: u32,
}

impl HashCfg {
    /// Smallest table with at least `slots` buckets, between 2^4 and 2^28.
    pub fn new(slots: usize) -> Self {
        let bits = slots.next_power_of_two().trailing_zeros().clamp(4, 28);
        let size = 1usize << bits;
        Self {
            size,
            shift: 32 - bits,
            mask: (size - 1) as u32,
        }
    }

    /// Fold the high bits into the low ones; the polynomial's low bits
    /// depend only on the last few bytes of the window.
    #[inline]
    pub fn bucket(&self, hash: u32) -> usize {
        ((hash >> self.shift) ^ (hash & self.mask)) as usize
    }
}

// ---------------------------------------------------------------------------
// Match extension
// ---------------------------------------------------------------------------

/// Length of the common prefix of `a` and `b`.
#[inline]
pub fn forward_match(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);

    let mut matched = 0;
    for (wa, wb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let x = u64::from_le_bytes(word(wa)) ^ u64::from_le_bytes(word(wb));
        if x != 0 {
            return matched + (x.trailing_zeros() / 8) as usize;
        }
        matched += 8;
    }
    matched
        + a[matched..]
            .iter()
            .zip(&b[matched..])
            .take_while(|(x, y)| x == y)
            .count()
}

/// Length of the common suffix of `a` and `b`.
#[inline]
pub fn backward_match(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Number of leading bytes of `data` equal to `byte`.
#[inline]
pub fn run_length(data: &[u8], byte: u8) -> usize {
    data.iter().take_while(|&&b| b == byte).count()
}

#[inline(always)]
fn word(chunk: &[u8]) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(chunk);
    w
}
