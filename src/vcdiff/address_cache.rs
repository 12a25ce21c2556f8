// VCDIFF address cache (RFC 3284, Section 5.3).
//
// NEAR and SAME caches used to compactly encode COPY addresses. The encoder
// and decoder drive identical caches, so every successful encode on one side
// is mirrored by a decode on the other. The caches are re-initialised at the
// start of every target window.

use thiserror::Error;

use super::cursor::ByteCursor;
use super::varint::{self, VarIntError};

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in the address space).
pub const VCD_HERE: u8 = 1;

pub const DEFAULT_NEAR_SIZE: u8 = 4;
pub const DEFAULT_SAME_SIZE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressCacheError {
    /// More address bytes are needed.
    #[error("address truncated (end of data)")]
    EndOfData,
    #[error("malformed address varint")]
    Malformed,
    #[error("address mode {mode} out of range (cache has {mode_count} modes)")]
    InvalidMode { mode: u8, mode_count: usize },
    #[error("decoded address {address} is not below current position {here}")]
    OutOfBounds { address: u64, here: u64 },
}

impl From<VarIntError> for AddressCacheError {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::EndOfData => AddressCacheError::EndOfData,
            VarIntError::Malformed => AddressCacheError::Malformed,
        }
    }
}

/// NEAR/SAME address cache.
///
/// With the default sizes (near = 4, same = 3) there are 9 modes:
///   0      VCD_SELF  absolute
///   1      VCD_HERE  here - value
///   2..5   NEAR      near\[mode-2\] + value
///   6..8   SAME      same\[(mode-6)*256 + byte\]
#[derive(Debug, Clone)]
pub struct AddressCache {
    near: Vec<u64>,
    same: Vec<u64>,
    next_slot: usize,
}

/// The encoded form of one COPY address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAddress {
    /// SELF, HERE and NEAR modes carry a varint.
    VarInt(u64),
    /// SAME modes carry a single raw byte.
    SameByte(u8),
}

impl EncodedAddress {
    /// Bytes this address occupies in the address section.
    pub fn len(&self) -> usize {
        match self {
            EncodedAddress::VarInt(v) => varint::encoded_len(*v),
            EncodedAddress::SameByte(_) => 1,
        }
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        match self {
            EncodedAddress::VarInt(v) => varint::append_u64(out, *v),
            EncodedAddress::SameByte(b) => out.push(*b),
        }
    }
}

impl AddressCache {
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_NEAR_SIZE, DEFAULT_SAME_SIZE)
    }

    /// Cache with the sizes carried by a custom code table.
    pub fn with_sizes(near_size: u8, same_size: u8) -> Self {
        Self {
            near: vec![0; usize::from(near_size)],
            same: vec![0; usize::from(same_size) * 256],
            next_slot: 0,
        }
    }

    /// Reset to the all-zero state used at the start of each window.
    pub fn init(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    #[inline]
    pub fn near_size(&self) -> usize {
        self.near.len()
    }

    #[inline]
    pub fn same_size(&self) -> usize {
        self.same.len() / 256
    }

    /// Total number of address modes (2 + near + same).
    #[inline]
    pub fn mode_count(&self) -> usize {
        2 + self.near_size() + self.same_size()
    }

    #[inline]
    fn first_same_mode(&self) -> usize {
        2 + self.near_size()
    }

    /// Record a successfully encoded or decoded address.
    #[inline]
    pub fn update(&mut self, address: u64) {
        if !self.near.is_empty() {
            self.near[self.next_slot] = address;
            self.next_slot = (self.next_slot + 1) % self.near.len();
        }
        if !self.same.is_empty() {
            let slot = (address % self.same.len() as u64) as usize;
            self.same[slot] = address;
        }
    }

    /// Pick the cheapest mode for `address` without touching the cache.
    ///
    /// SAME wins outright when it hits (one byte). Otherwise the smallest of
    /// SELF, HERE and the NEAR offsets is chosen, earlier modes winning ties.
    pub fn choose(&self, address: u64, here: u64) -> (u8, EncodedAddress) {
        debug_assert!(address < here);

        if !self.same.is_empty() {
            let slot = (address % self.same.len() as u64) as usize;
            if self.same[slot] == address {
                let mode = (self.first_same_mode() + slot / 256) as u8;
                return (mode, EncodedAddress::SameByte((slot % 256) as u8));
            }
        }

        let mut best_mode = VCD_SELF;
        let mut best_value = address;

        let here_value = here - address;
        if here_value < best_value {
            best_mode = VCD_HERE;
            best_value = here_value;
        }

        for (i, &near) in self.near.iter().enumerate() {
            if address >= near && address - near < best_value {
                best_mode = (i + 2) as u8;
                best_value = address - near;
            }
        }

        (best_mode, EncodedAddress::VarInt(best_value))
    }

    /// Encode an address and update the cache.
    pub fn encode(&mut self, address: u64, here: u64) -> (u8, EncodedAddress) {
        let chosen = self.choose(address, here);
        self.update(address);
        chosen
    }

    /// Bytes `address` would cost if encoded now.
    pub fn address_cost(&self, address: u64, here: u64) -> usize {
        self.choose(address, here).1.len()
    }

    /// Decode the address for `mode`, reading its encoded value from `cur`.
    ///
    /// On any failure the cursor and the cache are left untouched.
    pub fn decode(
        &mut self,
        mode: u8,
        cur: &mut ByteCursor<'_>,
        here: u64,
    ) -> Result<u64, AddressCacheError> {
        let m = usize::from(mode);
        if m >= self.mode_count() {
            return Err(AddressCacheError::InvalidMode {
                mode,
                mode_count: self.mode_count(),
            });
        }

        let mut probe = *cur;
        let first_same = self.first_same_mode();
        let address = if m < first_same {
            let raw = u64::from(varint::read_int32(&mut probe)?);
            match mode {
                VCD_SELF => Some(raw),
                VCD_HERE => here.checked_sub(raw),
                _ => self.near[m - 2].checked_add(raw),
            }
        } else {
            let byte = probe.read_u8().ok_or(AddressCacheError::EndOfData)?;
            Some(self.same[(m - first_same) * 256 + usize::from(byte)])
        };

        let address = match address {
            Some(a) if a < here => a,
            Some(a) => return Err(AddressCacheError::OutOfBounds { address: a, here }),
            None => return Err(AddressCacheError::OutOfBounds { address: 0, here }),
        };

        *cur = probe;
        self.update(address);
        Ok(address)
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}
