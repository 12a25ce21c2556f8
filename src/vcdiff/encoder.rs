// VCDIFF instruction writer: one delta window at a time.
//
// Takes ADD/COPY/RUN instructions in target order, picks opcodes through the
// code table's reverse map (folding pairs into double opcodes when the table
// has one), encodes COPY addresses through the address cache, and assembles
// the window header plus sections. In the interleaved layout everything goes
// into the instruction section in the order the decoder will read it.

use super::address_cache::{AddressCache, DEFAULT_NEAR_SIZE, DEFAULT_SAME_SIZE};
use super::code_table::{
    CodeTable, CodeTableError, InstructionMap, InstructionType, default_code_table,
};
use super::error::SegmentOrigin;
use super::header::{CodeTableData, SectionLengths, SourceSegment, WindowHeader};
use super::varint;

// ---------------------------------------------------------------------------
// Encoding table
// ---------------------------------------------------------------------------

/// A code table plus its reverse map and address cache sizes.
#[derive(Debug, Clone)]
pub struct EncodingTable {
    table: CodeTable,
    map: InstructionMap,
    near_size: u8,
    same_size: u8,
}

impl EncodingTable {
    /// The RFC 3284 default table with near = 4, same = 3.
    pub fn standard() -> Self {
        Self {
            table: default_code_table().clone(),
            map: InstructionMap::for_default_table().clone(),
            near_size: DEFAULT_NEAR_SIZE,
            same_size: DEFAULT_SAME_SIZE,
        }
    }

    /// A custom table; validated against the mode range implied by the sizes.
    pub fn custom(table: CodeTable, near_size: u8, same_size: u8) -> Result<Self, CodeTableError> {
        let mode_count = 2 + usize::from(near_size) + usize::from(same_size);
        if mode_count > 256 {
            return Err(CodeTableError::InvalidCustomTable(format!(
                "{mode_count} address modes do not fit in a byte"
            )));
        }
        table.validate(mode_count)?;
        let map = InstructionMap::new(&table, mode_count);
        Ok(Self {
            table,
            map,
            near_size,
            same_size,
        })
    }

    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    pub fn near_size(&self) -> u8 {
        self.near_size
    }

    pub fn same_size(&self) -> u8 {
        self.same_size
    }

    /// Whether this is the default table, which needs no header entry.
    pub fn is_standard(&self) -> bool {
        self.near_size == DEFAULT_NEAR_SIZE
            && self.same_size == DEFAULT_SAME_SIZE
            && &self.table == default_code_table()
    }

    /// Header entry for this table, given its delta against the default table.
    pub fn header_data(&self, delta: Vec<u8>) -> CodeTableData {
        CodeTableData {
            near_size: self.near_size,
            same_size: self.same_size,
            delta,
        }
    }

    pub(crate) fn new_cache(&self) -> AddressCache {
        AddressCache::with_sizes(self.near_size, self.same_size)
    }
}

impl Default for EncodingTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Window writer
// ---------------------------------------------------------------------------

/// Accumulates the instructions of a single window.
pub struct WindowWriter<'t> {
    table: &'t EncodingTable,
    cache: AddressCache,
    interleaved: bool,
    segment: Option<SourceSegment>,

    data: Vec<u8>,
    inst: Vec<u8>,
    addr: Vec<u8>,

    /// Index in `inst` of the last single opcode that may still become a double.
    last_opcode: Option<usize>,
    target_len: u64,
}

impl<'t> WindowWriter<'t> {
    pub fn new(table: &'t EncodingTable, segment: Option<SourceSegment>, interleaved: bool) -> Self {
        Self {
            table,
            cache: table.new_cache(),
            interleaved,
            segment,
            data: Vec::new(),
            inst: Vec::new(),
            addr: Vec::new(),
            last_opcode: None,
            target_len: 0,
        }
    }

    /// Window over the whole dictionary (or with no source when it is empty).
    pub fn for_dictionary(table: &'t EncodingTable, dictionary_len: u64, interleaved: bool) -> Self {
        let segment = (dictionary_len > 0).then_some(SourceSegment {
            origin: SegmentOrigin::Dictionary,
            length: dictionary_len,
            position: 0,
        });
        Self::new(table, segment, interleaved)
    }

    /// Current position in the window's address space.
    #[inline]
    pub fn here(&self) -> u64 {
        self.segment.map_or(0, |s| s.length) + self.target_len
    }

    #[inline]
    pub fn source_len(&self) -> u64 {
        self.segment.map_or(0, |s| s.length)
    }

    #[inline]
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    /// Bytes a COPY from `address` would spend on its address if it were
    /// written after `pending` more target bytes. ADD and RUN leave the
    /// cache alone, so only `here` moves.
    pub fn address_cost(&self, address: u64, pending: u64) -> usize {
        self.cache.address_cost(address, self.here() + pending)
    }

    pub fn add(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.encode_instruction(InstructionType::Add, bytes.len() as u64, 0);
        let data = if self.interleaved { &mut self.inst } else { &mut self.data };
        data.extend_from_slice(bytes);
        self.target_len += bytes.len() as u64;
    }

    pub fn run(&mut self, len: u64, byte: u8) {
        if len == 0 {
            return;
        }
        self.encode_instruction(InstructionType::Run, len, 0);
        let data = if self.interleaved { &mut self.inst } else { &mut self.data };
        data.push(byte);
        self.target_len += len;
    }

    /// COPY `len` bytes from `address` (source segment first, then this window's target).
    pub fn copy(&mut self, len: u64, address: u64) {
        if len == 0 {
            return;
        }
        let (mode, encoded) = self.cache.encode(address, self.here());
        self.encode_instruction(InstructionType::Copy, len, mode);
        let addr = if self.interleaved { &mut self.inst } else { &mut self.addr };
        encoded.append_to(addr);
        self.target_len += len;
    }

    fn encode_instruction(&mut self, inst: InstructionType, size: u64, mode: u8) {
        let table = self.table;
        let map = &table.map;
        let small = u8::try_from(size).ok();

        if let Some(idx) = self.last_opcode.take() {
            let lead = self.inst[idx];
            if let Some(op) = small.and_then(|s| map.second_opcode(lead, inst, s, mode)) {
                self.inst[idx] = op;
                return;
            }
            if let Some(op) = map.second_opcode(lead, inst, 0, mode) {
                self.inst[idx] = op;
                varint::append_u64(&mut self.inst, size);
                return;
            }
        }

        if let Some(op) = small
            .filter(|&s| s != 0)
            .and_then(|s| map.first_opcode(inst, s, mode))
        {
            self.inst.push(op);
            self.last_opcode = Some(self.inst.len() - 1);
            return;
        }

        // A validated table always has an explicit-size opcode for every type and mode.
        let op = map.first_opcode(inst, 0, mode).unwrap_or_default();
        debug_assert!(map.first_opcode(inst, 0, mode).is_some());
        self.inst.push(op);
        self.last_opcode = Some(self.inst.len() - 1);
        varint::append_u64(&mut self.inst, size);
    }

    /// Assemble header and sections. `checksum` is recorded when present.
    pub fn finish(self, checksum: Option<u32>) -> Vec<u8> {
        let header = WindowHeader {
            segment: self.segment,
            target_window_size: self.target_len,
            sections: SectionLengths {
                data: self.data.len(),
                instructions: self.inst.len(),
                addresses: self.addr.len(),
                checksum,
            },
        };
        let mut out = Vec::with_capacity(
            32 + self.data.len() + self.inst.len() + self.addr.len(),
        );
        header.encode(&mut out);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.inst);
        out.extend_from_slice(&self.addr);
        out
    }
}
