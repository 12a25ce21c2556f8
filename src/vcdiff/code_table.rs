// VCDIFF instruction code tables (RFC 3284, Sections 5.4 to 5.6 and 7).
//
// A code table maps each of the 256 opcodes to one or two instructions.
// The default table is generated from the RFC descriptor; custom tables
// arrive serialized as six 256-byte arrays and must pass `validate` before a
// session uses them. `InstructionMap` is the reverse index used by the
// instruction writer.

use std::collections::HashMap;
use std::sync::LazyLock;

use thiserror::Error;

use super::address_cache::{DEFAULT_NEAR_SIZE, DEFAULT_SAME_SIZE};

/// Serialized size of a code table: inst1, inst2, size1, size2, mode1, mode2.
pub const CODE_TABLE_BYTES: usize = 6 * 256;

/// Smallest COPY size with an implicit-size opcode in the default table.
pub const MIN_COPY_SIZE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeTableError {
    #[error("opcode {0} does not encode any instruction")]
    InvalidOpcode(u8),
    #[error("invalid custom code table: {0}")]
    InvalidCustomTable(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstructionType {
    #[default]
    NoOp = 0,
    Add = 1,
    Run = 2,
    Copy = 3,
}

impl InstructionType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::NoOp),
            1 => Some(Self::Add),
            2 => Some(Self::Run),
            3 => Some(Self::Copy),
            _ => None,
        }
    }
}

/// One half of an opcode. `size == 0` means the size follows as a varint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalfInstruction {
    pub inst: InstructionType,
    pub size: u8,
    pub mode: u8,
}

impl HalfInstruction {
    const NOOP: Self = Self {
        inst: InstructionType::NoOp,
        size: 0,
        mode: 0,
    };

    fn new(inst: InstructionType, size: u8, mode: u8) -> Self {
        Self { inst, size, mode }
    }

    #[inline]
    pub fn is_noop(&self) -> bool {
        self.inst == InstructionType::NoOp
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub first: HalfInstruction,
    pub second: HalfInstruction,
}

/// A complete 256-entry code table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTable {
    entries: [CodeTableEntry; 256],
}

/// Build the default RFC 3284 code table.
pub fn build_default_code_table() -> CodeTable {
    use InstructionType::{Add, Copy, Run};

    const ADD_SIZES: u8 = 17;
    const COPY_SIZES: u8 = 15;
    const MODES: u8 = 2 + DEFAULT_NEAR_SIZE + DEFAULT_SAME_SIZE;
    const FIRST_SAME: u8 = 2 + DEFAULT_NEAR_SIZE;

    let mut entries = Vec::with_capacity(256);
    let mut single = |h: HalfInstruction| entries.push((h, HalfInstruction::NOOP));

    single(HalfInstruction::new(Run, 0, 0));
    for size in 0..=ADD_SIZES {
        single(HalfInstruction::new(Add, size, 0));
    }
    for mode in 0..MODES {
        single(HalfInstruction::new(Copy, 0, mode));
        for size in MIN_COPY_SIZE..MIN_COPY_SIZE + COPY_SIZES {
            single(HalfInstruction::new(Copy, size, mode));
        }
    }

    // ADD(1..4) followed by COPY(4..6) in SELF/HERE/NEAR modes, COPY(4) in SAME modes.
    for mode in 0..MODES {
        let copy_max = if mode < FIRST_SAME { 6 } else { 4 };
        for add in 1..=4 {
            for copy in MIN_COPY_SIZE..=copy_max {
                entries.push((
                    HalfInstruction::new(Add, add, 0),
                    HalfInstruction::new(Copy, copy, mode),
                ));
            }
        }
    }

    // COPY(4) followed by ADD(1), every mode.
    for mode in 0..MODES {
        entries.push((
            HalfInstruction::new(Copy, MIN_COPY_SIZE, mode),
            HalfInstruction::new(Add, 1, 0),
        ));
    }

    debug_assert_eq!(entries.len(), 256, "code table must have exactly 256 entries");
    let mut table = CodeTable {
        entries: [CodeTableEntry::default(); 256],
    };
    for (slot, (first, second)) in table.entries.iter_mut().zip(entries) {
        *slot = CodeTableEntry { first, second };
    }
    table
}

/// The lazily built default table.
pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_default_code_table);
    &TABLE
}

/// Serialized default table; the dictionary custom tables are encoded against.
pub fn default_code_table_bytes() -> &'static [u8] {
    static BYTES: LazyLock<Vec<u8>> = LazyLock::new(|| default_code_table().to_bytes());
    &BYTES
}

impl CodeTable {
    #[inline]
    pub fn entry(&self, opcode: u8) -> &CodeTableEntry {
        &self.entries[usize::from(opcode)]
    }

    /// Entry for `opcode`, rejecting opcodes whose halves are both NOOP.
    pub fn lookup(&self, opcode: u8) -> Result<&CodeTableEntry, CodeTableError> {
        let entry = self.entry(opcode);
        if entry.first.is_noop() && entry.second.is_noop() {
            return Err(CodeTableError::InvalidOpcode(opcode));
        }
        Ok(entry)
    }

    pub fn entries(&self) -> &[CodeTableEntry; 256] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [CodeTableEntry; 256] {
        &mut self.entries
    }

    /// Serialize as the six 256-byte arrays of RFC 3284 Section 7.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; CODE_TABLE_BYTES];
        for (i, e) in self.entries.iter().enumerate() {
            out[i] = e.first.inst as u8;
            out[256 + i] = e.second.inst as u8;
            out[512 + i] = e.first.size;
            out[768 + i] = e.second.size;
            out[1024 + i] = e.first.mode;
            out[1280 + i] = e.second.mode;
        }
        out
    }

    /// Parse the serialized form. Structural checks only; see [`validate`](Self::validate).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodeTableError> {
        if bytes.len() != CODE_TABLE_BYTES {
            return Err(CodeTableError::InvalidCustomTable(format!(
                "expected {CODE_TABLE_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let inst = |v: u8, opcode: usize| {
            InstructionType::from_u8(v).ok_or_else(|| {
                CodeTableError::InvalidCustomTable(format!(
                    "opcode {opcode} has instruction type {v}"
                ))
            })
        };
        let mut table = CodeTable {
            entries: [CodeTableEntry::default(); 256],
        };
        for (i, slot) in table.entries.iter_mut().enumerate() {
            slot.first = HalfInstruction::new(inst(bytes[i], i)?, bytes[512 + i], bytes[1024 + i]);
            slot.second = HalfInstruction::new(inst(bytes[256 + i], i)?, bytes[768 + i], bytes[1280 + i]);
        }
        Ok(table)
    }

    /// Check the table is usable with an address cache of `mode_count` modes.
    ///
    /// Every mode must be reachable with an explicit-size COPY, and ADD and
    /// RUN must each have an explicit-size opcode, so that any instruction
    /// can be written.
    pub fn validate(&self, mode_count: usize) -> Result<(), CodeTableError> {
        let bad = |msg: String| Err(CodeTableError::InvalidCustomTable(msg));
        let mut explicit_add = false;
        let mut explicit_run = false;
        let mut explicit_copy = vec![false; mode_count];

        for (opcode, e) in self.entries.iter().enumerate() {
            for half in [e.first, e.second] {
                if usize::from(half.mode) >= mode_count {
                    return bad(format!(
                        "opcode {opcode} uses mode {} but only {mode_count} modes exist",
                        half.mode
                    ));
                }
                match half.inst {
                    InstructionType::NoOp if half.size != 0 || half.mode != 0 => {
                        return bad(format!("opcode {opcode} has a NOOP with size or mode"));
                    }
                    InstructionType::Add | InstructionType::Run if half.mode != 0 => {
                        return bad(format!("opcode {opcode} has a non-COPY with a mode"));
                    }
                    _ => {}
                }
            }
            if e.first.is_noop() && !e.second.is_noop() {
                return bad(format!("opcode {opcode} has only a second instruction"));
            }
            if e.second.is_noop() && e.first.size == 0 {
                match e.first.inst {
                    InstructionType::Add => explicit_add = true,
                    InstructionType::Run => explicit_run = true,
                    InstructionType::Copy => explicit_copy[usize::from(e.first.mode)] = true,
                    InstructionType::NoOp => {}
                }
            }
        }

        if !explicit_add {
            return bad("no explicit-size ADD opcode".into());
        }
        if !explicit_run {
            return bad("no explicit-size RUN opcode".into());
        }
        if let Some(mode) = explicit_copy.iter().position(|&seen| !seen) {
            return bad(format!("no explicit-size COPY opcode for mode {mode}"));
        }
        Ok(())
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        default_code_table().clone()
    }
}

// ---------------------------------------------------------------------------
// Reverse index (encoder side)
// ---------------------------------------------------------------------------

/// Maps (instruction, size, mode) back to opcodes for one code table.
///
/// `first` holds single-instruction opcodes. `second` holds double opcodes,
/// keyed by the single opcode that encodes their first half.
#[derive(Debug, Clone)]
pub struct InstructionMap {
    mode_count: usize,
    first: Vec<Option<u8>>,
    second: HashMap<(u8, InstructionType, u8, u8), u8>,
}

impl InstructionMap {
    pub fn new(table: &CodeTable, mode_count: usize) -> Self {
        let mut first = vec![None; 4 * 256 * mode_count.max(1)];
        let key = |inst: InstructionType, size: u8, mode: u8| {
            (usize::from(inst as u8) * 256 + usize::from(size)) * mode_count.max(1)
                + usize::from(mode)
        };

        for (opcode, e) in table.entries().iter().enumerate() {
            if e.second.is_noop() && !e.first.is_noop() && usize::from(e.first.mode) < mode_count {
                let slot = &mut first[key(e.first.inst, e.first.size, e.first.mode)];
                slot.get_or_insert(opcode as u8);
            }
        }

        let mut second = HashMap::new();
        for (opcode, e) in table.entries().iter().enumerate() {
            if e.first.is_noop() || e.second.is_noop() {
                continue;
            }
            if usize::from(e.first.mode) >= mode_count || usize::from(e.second.mode) >= mode_count {
                continue;
            }
            if let Some(lead) = first[key(e.first.inst, e.first.size, e.first.mode)] {
                second
                    .entry((lead, e.second.inst, e.second.size, e.second.mode))
                    .or_insert(opcode as u8);
            }
        }

        Self {
            mode_count,
            first,
            second,
        }
    }

    pub fn for_default_table() -> &'static InstructionMap {
        static MAP: LazyLock<InstructionMap> = LazyLock::new(|| {
            InstructionMap::new(
                default_code_table(),
                usize::from(2 + DEFAULT_NEAR_SIZE + DEFAULT_SAME_SIZE),
            )
        });
        &MAP
    }

    /// Single opcode for (inst, size, mode); `size == 0` asks for the explicit-size form.
    pub fn first_opcode(&self, inst: InstructionType, size: u8, mode: u8) -> Option<u8> {
        if usize::from(mode) >= self.mode_count {
            return None;
        }
        let idx = (usize::from(inst as u8) * 256 + usize::from(size)) * self.mode_count
            + usize::from(mode);
        self.first.get(idx).copied().flatten()
    }

    /// Double opcode that extends the single opcode `lead` with (inst, size, mode).
    pub fn second_opcode(&self, lead: u8, inst: InstructionType, size: u8, mode: u8) -> Option<u8> {
        self.second.get(&(lead, inst, size, mode)).copied()
    }
}
