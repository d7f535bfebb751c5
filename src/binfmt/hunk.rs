//! AmigaDOS Hunk executable/object file reader.
//!
//! A Hunk file is a sequence of big-endian longword-aligned blocks. Load
//! files start with `HUNK_HEADER`; object files start with `HUNK_UNIT`.
//! Strings are stored as a longword count followed by NUL-padded bytes.
//! Loadable hunk size words carry memory-placement flags in their top two
//! bits.

use std::fmt;
use std::fs;
use std::path::Path;

use strum::Display;

use super::stab::{self, Stab, StringTable};
use super::{hexdump, Reader};
use crate::error::Result;

pub const HUNK_UNIT: u32 = 999;
pub const HUNK_NAME: u32 = 1000;
pub const HUNK_CODE: u32 = 1001;
pub const HUNK_DATA: u32 = 1002;
pub const HUNK_BSS: u32 = 1003;
pub const HUNK_RELOC32: u32 = 1004;
pub const HUNK_RELOC16: u32 = 1005;
pub const HUNK_RELOC8: u32 = 1006;
pub const HUNK_EXT: u32 = 1007;
pub const HUNK_SYMBOL: u32 = 1008;
pub const HUNK_DEBUG: u32 = 1009;
pub const HUNK_END: u32 = 1010;
pub const HUNK_HEADER: u32 = 1011;
pub const HUNK_OVERLAY: u32 = 1013;
pub const HUNK_BREAK: u32 = 1014;

// External symbol record types inside HUNK_EXT.
pub const EXT_SYMB: u32 = 0;
pub const EXT_DEF: u32 = 1;
pub const EXT_ABS: u32 = 2;
pub const EXT_REF32: u32 = 129;
pub const EXT_COMMON: u32 = 130;
pub const EXT_REF16: u32 = 131;
pub const EXT_REF8: u32 = 132;

/// Memory placement requested for a loadable hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Memory {
    #[default]
    Any,
    Chip,
    Fast,
}

/// One size entry from the `HUNK_HEADER` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub memory: Memory,
    pub longwords: u32,
}

impl SizeSpec {
    pub fn bytes(&self) -> u32 {
        self.longwords * 4
    }
}

/// `HUNK_HEADER` contents of a load file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub residents: Vec<String>,
    pub table_size: u32,
    pub first: u32,
    pub last: u32,
    pub sizes: Vec<SizeSpec>,
}

/// One relocation group: offsets within the current hunk that refer into
/// the target hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocBlock {
    pub hunk: u32,
    pub offsets: Vec<u32>,
}

/// A `HUNK_SYMBOL` entry: name and offset within the defining hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkSymbol {
    pub name: String,
    pub offset: u32,
}

/// A typed external record from `HUNK_EXT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtRecord {
    Def { name: String, offset: u32 },
    Abs { name: String, value: u32 },
    Ref32 { name: String, refs: Vec<u32> },
    Ref16 { name: String, refs: Vec<u32> },
    Ref8 { name: String, refs: Vec<u32> },
    Common { name: String, size: u32, refs: Vec<u32> },
}

impl ExtRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Def { name, .. }
            | Self::Abs { name, .. }
            | Self::Ref32 { name, .. }
            | Self::Ref16 { name, .. }
            | Self::Ref8 { name, .. }
            | Self::Common { name, .. } => name,
        }
    }
}

/// `HUNK_DEBUG` payload: decoded stabs when the block follows the GNU
/// toolchain convention, raw bytes otherwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugData {
    Stabs { stabs: Vec<Stab>, strings: StringTable },
    Raw(Vec<u8>),
}

/// One parsed block of a Hunk file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hunk {
    Header(Header),
    Unit(String),
    Name(String),
    Code { memory: Memory, data: Vec<u8> },
    Data { memory: Memory, data: Vec<u8> },
    /// Size is in bytes
    Bss { memory: Memory, size: u32 },
    Reloc32(Vec<RelocBlock>),
    Reloc16(Vec<RelocBlock>),
    Reloc8(Vec<RelocBlock>),
    Ext(Vec<ExtRecord>),
    Symbol(Vec<HunkSymbol>),
    Debug(DebugData),
    Overlay(Vec<u32>),
    Break,
    End,
}

impl Hunk {
    /// The `HUNK_*` name of this block
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Header(_) => "HUNK_HEADER",
            Self::Unit(_) => "HUNK_UNIT",
            Self::Name(_) => "HUNK_NAME",
            Self::Code { .. } => "HUNK_CODE",
            Self::Data { .. } => "HUNK_DATA",
            Self::Bss { .. } => "HUNK_BSS",
            Self::Reloc32(_) => "HUNK_RELOC32",
            Self::Reloc16(_) => "HUNK_RELOC16",
            Self::Reloc8(_) => "HUNK_RELOC8",
            Self::Ext(_) => "HUNK_EXT",
            Self::Symbol(_) => "HUNK_SYMBOL",
            Self::Debug(_) => "HUNK_DEBUG",
            Self::Overlay(_) => "HUNK_OVERLAY",
            Self::Break => "HUNK_BREAK",
            Self::End => "HUNK_END",
        }
    }

    /// Size in bytes of the loadable content, if this is a loadable hunk
    pub fn loadable_size(&self) -> Option<u32> {
        match self {
            Self::Code { data, .. } | Self::Data { data, .. } => Some(data.len() as u32),
            Self::Bss { size, .. } => Some(*size),
            _ => None,
        }
    }
}

/// Read and parse a whole Hunk file
pub fn read_file(path: &Path) -> Result<Vec<Hunk>> {
    let data = fs::read(path)?;
    parse(&data, path)
}

/// Parse an in-memory Hunk file image
pub fn parse(data: &[u8], path: &Path) -> Result<Vec<Hunk>> {
    let mut r = Reader::new(data, path);
    let mut hunks = Vec::new();
    while !r.is_empty() {
        hunks.push(read_hunk(&mut r)?);
    }
    Ok(hunks)
}

fn read_hunk(r: &mut Reader<'_>) -> Result<Hunk> {
    let word = r.u32()?;
    // Bits 30-31 of the type word may carry memory flags on loadable hunks.
    let typ = word & 0x3fff_ffff;
    let memory = decode_memory(r, word)?;

    match typ {
        HUNK_HEADER => read_header(r).map(Hunk::Header),
        HUNK_UNIT => read_string(r).map(Hunk::Unit),
        HUNK_NAME => read_string(r).map(Hunk::Name),
        HUNK_CODE => {
            let data = read_sized_data(r)?;
            Ok(Hunk::Code { memory, data })
        }
        HUNK_DATA => {
            let data = read_sized_data(r)?;
            Ok(Hunk::Data { memory, data })
        }
        HUNK_BSS => {
            let longwords = r.u32()? & 0x3fff_ffff;
            Ok(Hunk::Bss {
                memory,
                size: longwords * 4,
            })
        }
        HUNK_RELOC32 => read_reloc(r).map(Hunk::Reloc32),
        HUNK_RELOC16 => read_reloc(r).map(Hunk::Reloc16),
        HUNK_RELOC8 => read_reloc(r).map(Hunk::Reloc8),
        HUNK_EXT => read_ext(r).map(Hunk::Ext),
        HUNK_SYMBOL => read_symbols(r).map(Hunk::Symbol),
        HUNK_DEBUG => read_debug(r).map(Hunk::Debug),
        HUNK_OVERLAY => {
            // Table size, then that many longwords of overlay tree data.
            let longwords = r.u32()?;
            let mut words = Vec::with_capacity(longwords as usize);
            for _ in 0..longwords {
                words.push(r.u32()?);
            }
            Ok(Hunk::Overlay(words))
        }
        HUNK_BREAK => Ok(Hunk::Break),
        HUNK_END => Ok(Hunk::End),
        other => Err(r.error(format!("unknown hunk type {}", other))),
    }
}

/// Memory flags occupy the top two bits of type and size words: 01 chip,
/// 10 fast. Both bits set means an extra longword of extended flags
/// follows, which we read and ignore.
fn decode_memory(r: &mut Reader<'_>, word: u32) -> Result<Memory> {
    match word >> 30 {
        0b01 => Ok(Memory::Chip),
        0b10 => Ok(Memory::Fast),
        0b11 => {
            r.u32()?;
            Ok(Memory::Any)
        }
        _ => Ok(Memory::Any),
    }
}

/// Strings are a longword count followed by NUL-padded characters
fn read_string(r: &mut Reader<'_>) -> Result<String> {
    let longwords = r.u32()? as usize;
    read_string_of(r, longwords)
}

fn read_string_of(r: &mut Reader<'_>, longwords: usize) -> Result<String> {
    let raw = r.bytes(longwords * 4)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn read_sized_data(r: &mut Reader<'_>) -> Result<Vec<u8>> {
    let word = r.u32()?;
    let longwords = (word & 0x3fff_ffff) as usize;
    Ok(r.bytes(longwords * 4)?.to_vec())
}

fn read_header(r: &mut Reader<'_>) -> Result<Header> {
    let mut residents = Vec::new();
    loop {
        let longwords = r.u32()? as usize;
        if longwords == 0 {
            break;
        }
        residents.push(read_string_of(r, longwords)?);
    }
    let table_size = r.u32()?;
    let first = r.u32()?;
    let last = r.u32()?;
    let count = last
        .checked_sub(first)
        .ok_or_else(|| r.error("header hunk range is inverted"))?
        + 1;
    let mut sizes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let word = r.u32()?;
        let memory = decode_memory(r, word)?;
        sizes.push(SizeSpec {
            memory,
            longwords: word & 0x3fff_ffff,
        });
    }
    Ok(Header {
        residents,
        table_size,
        first,
        last,
        sizes,
    })
}

/// Reloc32 blocks are (count, target-hunk, offsets...) groups terminated
/// by a zero count
fn read_reloc(r: &mut Reader<'_>) -> Result<Vec<RelocBlock>> {
    let mut blocks = Vec::new();
    loop {
        let count = r.u32()?;
        if count == 0 {
            break;
        }
        let hunk = r.u32()?;
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(r.u32()?);
        }
        blocks.push(RelocBlock { hunk, offsets });
    }
    Ok(blocks)
}

/// Symbol entries are (name, offset) pairs terminated by a zero-length
/// name
fn read_symbols(r: &mut Reader<'_>) -> Result<Vec<HunkSymbol>> {
    let mut symbols = Vec::new();
    loop {
        let longwords = r.u32()? as usize;
        if longwords == 0 {
            break;
        }
        let name = read_string_of(r, longwords)?;
        let offset = r.u32()?;
        symbols.push(HunkSymbol { name, offset });
    }
    Ok(symbols)
}

fn read_ext(r: &mut Reader<'_>) -> Result<Vec<ExtRecord>> {
    let mut records = Vec::new();
    loop {
        let word = r.u32()?;
        if word == 0 {
            break;
        }
        let typ = word >> 24;
        let longwords = (word & 0x00ff_ffff) as usize;
        let name = read_string_of(r, longwords)?;
        let record = match typ {
            EXT_DEF | EXT_SYMB => ExtRecord::Def {
                name,
                offset: r.u32()?,
            },
            EXT_ABS => ExtRecord::Abs {
                name,
                value: r.u32()?,
            },
            EXT_REF32 => ExtRecord::Ref32 {
                name,
                refs: read_ref_list(r)?,
            },
            EXT_REF16 => ExtRecord::Ref16 {
                name,
                refs: read_ref_list(r)?,
            },
            EXT_REF8 => ExtRecord::Ref8 {
                name,
                refs: read_ref_list(r)?,
            },
            EXT_COMMON => {
                let size = r.u32()?;
                ExtRecord::Common {
                    name,
                    size,
                    refs: read_ref_list(r)?,
                }
            }
            other => return Err(r.error(format!("unknown ext record type {}", other))),
        };
        records.push(record);
    }
    Ok(records)
}

fn read_ref_list(r: &mut Reader<'_>) -> Result<Vec<u32>> {
    let count = r.u32()? as usize;
    let mut refs = Vec::with_capacity(count);
    for _ in 0..count {
        refs.push(r.u32()?);
    }
    Ok(refs)
}

/// `HUNK_DEBUG` is an opaque payload of `n` longwords. The GNU toolchain
/// puts a stab table and string table in there; anything else is kept raw.
fn read_debug(r: &mut Reader<'_>) -> Result<DebugData> {
    let longwords = r.u32()? as usize;
    let raw = r.bytes(longwords * 4)?;
    match stab::parse_stabs(raw, Path::new("HUNK_DEBUG")) {
        Some((stabs, strings)) => Ok(DebugData::Stabs { stabs, strings }),
        None => Ok(DebugData::Raw(raw.to_vec())),
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.type_name())?;
        match self {
            Self::Header(h) => {
                for name in &h.residents {
                    writeln!(f, "  resident: {}", name)?;
                }
                writeln!(
                    f,
                    "  table size: {}, hunks: {}..{}",
                    h.table_size, h.first, h.last
                )?;
                for (i, spec) in h.sizes.iter().enumerate() {
                    writeln!(
                        f,
                        "  hunk {}: {} bytes ({})",
                        h.first as usize + i,
                        spec.bytes(),
                        spec.memory
                    )?;
                }
            }
            Self::Unit(name) | Self::Name(name) => writeln!(f, "  {}", name)?,
            Self::Code { memory, data } | Self::Data { memory, data } => {
                writeln!(f, "  {} bytes ({})", data.len(), memory)?;
                for line in hexdump(data) {
                    writeln!(f, "  {}", line)?;
                }
            }
            Self::Bss { memory, size } => writeln!(f, "  {} bytes ({})", size, memory)?,
            Self::Reloc32(blocks) | Self::Reloc16(blocks) | Self::Reloc8(blocks) => {
                for block in blocks {
                    let offsets: Vec<String> =
                        block.offsets.iter().map(|o| format!("{:08X}", o)).collect();
                    writeln!(f, "  hunk {}: {}", block.hunk, offsets.join(" "))?;
                }
            }
            Self::Ext(records) => {
                for rec in records {
                    match rec {
                        ExtRecord::Def { name, offset } => {
                            writeln!(f, "  DEF {} at {:08X}", name, offset)?
                        }
                        ExtRecord::Abs { name, value } => {
                            writeln!(f, "  ABS {} = {:08X}", name, value)?
                        }
                        ExtRecord::Ref32 { name, refs } => {
                            writeln!(f, "  REF32 {} from {}", name, fmt_refs(refs))?
                        }
                        ExtRecord::Ref16 { name, refs } => {
                            writeln!(f, "  REF16 {} from {}", name, fmt_refs(refs))?
                        }
                        ExtRecord::Ref8 { name, refs } => {
                            writeln!(f, "  REF8 {} from {}", name, fmt_refs(refs))?
                        }
                        ExtRecord::Common { name, size, refs } => writeln!(
                            f,
                            "  COMMON {} ({} bytes) from {}",
                            name,
                            size,
                            fmt_refs(refs)
                        )?,
                    }
                }
            }
            Self::Symbol(symbols) => {
                for sym in symbols {
                    writeln!(f, "  {:08X}: {}", sym.offset, sym.name)?;
                }
            }
            Self::Debug(DebugData::Stabs { stabs, strings }) => {
                for st in stabs {
                    writeln!(
                        f,
                        "  {:6} {:08X} desc={:<5} {}",
                        st.type_name(),
                        st.value,
                        st.desc,
                        st.name(strings)
                    )?;
                }
            }
            Self::Debug(DebugData::Raw(data)) => {
                writeln!(f, "  unrecognised debug format, {} bytes", data.len())?;
            }
            Self::Overlay(words) => writeln!(f, "  {} longwords of overlay table", words.len())?,
            Self::Break | Self::End => {}
        }
        Ok(())
    }
}

fn fmt_refs(refs: &[u32]) -> String {
    let parts: Vec<String> = refs.iter().map(|o| format!("{:08X}", o)).collect();
    parts.join(" ")
}
