// Window checksum.
//
// The checksum extension uses Adler-32 started from a zero state (both sums
// at 0), not the usual initial value of 1. Values must match exactly for
// deltas to interoperate.

/// Incremental zero-seeded Adler-32.
pub struct Adler32 {
    #[cfg(feature = "adler32")]
    inner: simd_adler32::Adler32,
    #[cfg(not(feature = "adler32"))]
    a: u32,
    #[cfg(not(feature = "adler32"))]
    b: u32,
}

#[cfg(not(feature = "adler32"))]
const MOD_ADLER: u32 = 65521;

/// Bytes that can be summed before the 32-bit accumulators must be reduced.
#[cfg(not(feature = "adler32"))]
const NMAX: usize = 5552;

impl Adler32 {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "adler32")]
            inner: simd_adler32::Adler32::from_checksum(0),
            #[cfg(not(feature = "adler32"))]
            a: 0,
            #[cfg(not(feature = "adler32"))]
            b: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        #[cfg(feature = "adler32")]
        self.inner.write(data);

        #[cfg(not(feature = "adler32"))]
        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    pub fn value(&self) -> u32 {
        #[cfg(feature = "adler32")]
        {
            self.inner.finish()
        }
        #[cfg(not(feature = "adler32"))]
        {
            (self.b << 16) | self.a
        }
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-seeded Adler-32 of `data` in one call.
pub fn zero_seeded_adler32(data: &[u8]) -> u32 {
    let mut sum = Adler32::new();
    sum.update(data);
    sum.value()
}
