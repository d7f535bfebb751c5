//! Symbol and source-line database extracted from a Hunk executable.
//!
//! `HUNK_SYMBOL` blocks contribute plain symbols; `HUNK_DEBUG` stabs
//! contribute function symbols, line records and file-scope variables.
//! Addresses start out file-relative (sections laid out back to back) and
//! can be rebased against the runtime segment list of a running target.

use std::fmt;
use std::path::Path;

use tracing::warn;

use crate::binfmt::hunk::{self, DebugData, Hunk};
use crate::binfmt::stab::Stab;
use crate::debug::state::Segment;
use crate::error::{AmidevError, Result};

/// A named address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u32,
    pub name: String,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}: {}", self.address, self.name)
    }
}

/// A line-number record: address, source path, line, owning symbol name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub address: u32,
    pub path: String,
    pub line: u32,
    pub name: String,
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}: {} {}:{}",
            self.address, self.name, self.path, self.line
        )
    }
}

/// Result of an address lookup: the nearest preceding line record or
/// symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Line(SourceLine),
    Symbol(Symbol),
}

impl Location {
    pub fn address(&self) -> u32 {
        match self {
            Self::Line(l) => l.address,
            Self::Symbol(s) => s.address,
        }
    }

    /// Source position, when the lookup resolved to a line record
    pub fn source(&self) -> Option<(&str, u32)> {
        match self {
            Self::Line(l) if !l.path.is_empty() => Some((&l.path, l.line)),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(l) => l.fmt(f),
            Self::Symbol(s) => s.fmt(f),
        }
    }
}

/// Symbols and line records of one loadable section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub start: u32,
    pub size: u32,
    pub symbols: Vec<Symbol>,
    pub lines: Vec<SourceLine>,
}

impl Section {
    pub fn end(&self) -> u32 {
        self.start + self.size
    }

    pub fn has_address(&self, addr: u32) -> bool {
        self.start <= addr && addr < self.end()
    }

    fn shift(&mut self, new_start: u32) {
        let diff = new_start.wrapping_sub(self.start);
        for s in &mut self.symbols {
            s.address = s.address.wrapping_add(diff);
        }
        for l in &mut self.lines {
            l.address = l.address.wrapping_add(diff);
        }
        self.start = new_start;
    }

    /// Deduplicate same-address symbol pairs (preferring the name without
    /// the `_` prefix) and resolve COMMON line records against the real
    /// definitions living in this section.
    fn cleanup(&mut self, extra_lines: &[SourceLine]) {
        self.symbols.sort_by(|a, b| {
            a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name))
        });
        let old = std::mem::take(&mut self.symbols);
        let mut deduped: Vec<Symbol> = Vec::with_capacity(old.len());
        for sym in old {
            if let Some(last) = deduped.last_mut() {
                if last.address == sym.address
                    && last.name.trim_start_matches('_') == sym.name.trim_start_matches('_')
                {
                    last.name = sym.name.trim_start_matches('_').to_string();
                    continue;
                }
            }
            deduped.push(sym);
        }
        self.symbols = deduped;

        // Common symbols carry their source position, but their addresses
        // only exist where DATA/BSS actually defines them.
        for el in extra_lines {
            for s in &mut self.symbols {
                if s.name == el.name || s.name.strip_prefix('_') == Some(el.name.as_str()) {
                    s.name = el.name.clone();
                    self.lines.push(SourceLine {
                        address: s.address,
                        path: el.path.clone(),
                        line: el.line,
                        name: el.name.clone(),
                    });
                }
            }
        }
        self.lines.sort_by(|a, b| {
            a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name))
        });
    }

    /// The greatest line record or symbol at or below `addr`
    pub fn ask_address(&self, addr: u32) -> Option<Location> {
        if !self.has_address(addr) {
            return None;
        }
        let best_line = self
            .lines
            .iter()
            .filter(|l| l.address <= addr)
            .max_by_key(|l| l.address);
        let best_sym = self
            .symbols
            .iter()
            .filter(|s| s.address <= addr)
            .max_by_key(|s| s.address);
        match (best_line, best_sym) {
            (Some(l), Some(s)) if s.address > l.address => Some(Location::Symbol(s.clone())),
            (Some(l), _) => Some(Location::Line(l.clone())),
            (None, Some(s)) => Some(Location::Symbol(s.clone())),
            (None, None) => None,
        }
    }

    pub fn ask_symbol(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.address)
    }

    pub fn ask_source_line(&self, path: &str, line: u32) -> Option<u32> {
        self.lines
            .iter()
            .find(|l| l.path.ends_with(path) && l.line >= line)
            .map(|l| l.address)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{:08X} - {:08X}]:", self.name, self.start, self.end())?;
        writeln!(f, "  SYMBOLS:")?;
        for s in &self.symbols {
            writeln!(f, "    {}", s)?;
        }
        writeln!(f, "  LINES:")?;
        for l in &self.lines {
            writeln!(f, "    {}", l)?;
        }
        Ok(())
    }
}

/// The whole database: one section per loadable hunk kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub text: Section,
    pub data: Section,
    pub bss: Section,
}

impl DebugInfo {
    /// Extract debug information from a Hunk executable on disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let hunks = hunk::read_file(path)?;
        Ok(Self::from_hunks(&hunks))
    }

    /// Extract debug information from parsed hunks
    pub fn from_hunks(hunks: &[Hunk]) -> Self {
        Builder::default().build(hunks)
    }

    fn sections(&self) -> [&Section; 3] {
        [&self.text, &self.data, &self.bss]
    }

    fn sections_mut(&mut self) -> [&mut Section; 3] {
        [&mut self.text, &mut self.data, &mut self.bss]
    }

    /// Rebase all sections against the target's runtime segments, given in
    /// TEXT, DATA, BSS order. Fails without modifying anything when a
    /// segment size does not match the executable.
    pub fn relocate(&mut self, segments: &[Segment]) -> Result<()> {
        let sections = self.sections();
        if segments.len() < sections.len() {
            return Err(AmidevError::protocol(format!(
                "target reported {} segments, executable has {} sections",
                segments.len(),
                sections.len()
            )));
        }
        for (section, segment) in sections.iter().zip(segments) {
            if section.size != segment.size {
                return Err(AmidevError::protocol(format!(
                    "{} section is {} bytes, target segment is {}",
                    section.name, section.size, segment.size
                )));
            }
        }
        for (section, segment) in self.sections_mut().into_iter().zip(segments) {
            section.shift(segment.start);
        }
        Ok(())
    }

    pub fn ask_address(&self, addr: u32) -> Option<Location> {
        self.sections().iter().find_map(|s| s.ask_address(addr))
    }

    pub fn ask_symbol(&self, name: &str) -> Option<u32> {
        self.sections().iter().find_map(|s| s.ask_symbol(name))
    }

    /// Resolve a `path:line` reference to an address
    pub fn ask_source_line(&self, loc: &str) -> Option<u32> {
        let (path, line) = loc.rsplit_once(':')?;
        let line: u32 = line.parse().ok()?;
        self.sections()
            .iter()
            .find_map(|s| s.ask_source_line(path, line))
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in self.sections() {
            section.fmt(f)?;
        }
        Ok(())
    }
}

/// Accumulates state while walking the hunk list
#[derive(Default)]
struct Builder {
    info: DebugInfo,
    common: Vec<SourceLine>,
    offset: u32,
}

impl Builder {
    fn build(mut self, hunks: &[Hunk]) -> DebugInfo {
        self.info.text.name = "TEXT";
        self.info.data.name = "DATA";
        self.info.bss.name = "BSS";

        let mut current: Option<SectionKind> = None;
        for h in hunks {
            match h {
                Hunk::Code { data, .. } => {
                    current = Some(self.open(SectionKind::Text, data.len() as u32))
                }
                Hunk::Data { data, .. } => {
                    current = Some(self.open(SectionKind::Data, data.len() as u32))
                }
                Hunk::Bss { size, .. } => current = Some(self.open(SectionKind::Bss, *size)),
                Hunk::Symbol(symbols) => match current {
                    Some(kind) => {
                        let start = self.section(kind).start;
                        for sym in symbols {
                            self.section_mut(kind).symbols.push(Symbol {
                                address: start + sym.offset,
                                name: strip_underscore(&sym.name),
                            });
                        }
                    }
                    None => warn!("symbol block before any loadable hunk, ignored"),
                },
                Hunk::Debug(DebugData::Stabs { stabs, strings }) => {
                    let named: Vec<(Stab, String)> = stabs
                        .iter()
                        .map(|st| (*st, st.name(strings).to_string()))
                        .collect();
                    self.walk_stabs(&named);
                }
                Hunk::Debug(DebugData::Raw(_)) => {
                    warn!("debug block in unrecognised format, ignored");
                }
                _ => {}
            }
        }

        let common = std::mem::take(&mut self.common);
        self.info.text.cleanup(&common);
        self.info.data.cleanup(&common);
        self.info.bss.cleanup(&common);
        self.info
    }

    fn open(&mut self, kind: SectionKind, size: u32) -> SectionKind {
        let start = self.offset;
        self.offset += size;
        let section = self.section_mut(kind);
        section.start = start;
        section.size = size;
        kind
    }

    fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::Text => &self.info.text,
            SectionKind::Data => &self.info.data,
            SectionKind::Bss => &self.info.bss,
        }
    }

    fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        match kind {
            SectionKind::Text => &mut self.info.text,
            SectionKind::Data => &mut self.info.data,
            SectionKind::Bss => &mut self.info.bss,
        }
    }

    fn walk_stabs(&mut self, stabs: &[(Stab, String)]) {
        let mut dir = String::new();
        let mut source = String::new();
        let mut func = String::new();

        for (st, name) in stabs {
            match st.type_name() {
                // Path and name of the compilation unit / include file.
                "SO" | "SOL" => {
                    if name.ends_with('/') {
                        dir = name.clone();
                    } else if name.starts_with('/') {
                        source = name.clone();
                    } else {
                        source = format!("{}{}", dir, name);
                    }
                }
                "DATA" | "BSS" => {
                    let section = if st.type_name() == "DATA" {
                        &mut self.info.data
                    } else {
                        &mut self.info.bss
                    };
                    section.symbols.push(Symbol {
                        address: st.value,
                        name: strip_underscore(name),
                    });
                }
                // File-scope variables keep their source position; the
                // address is matched up during cleanup.
                "GSYM" | "STSYM" | "LCSYM" => {
                    let symbol_name = strip_underscore(stab_symbol(name));
                    let record = SourceLine {
                        address: st.value,
                        path: source.clone(),
                        line: st.desc as u32,
                        name: symbol_name.clone(),
                    };
                    match st.type_name() {
                        "GSYM" => self.common.push(record),
                        "STSYM" => {
                            self.info.data.symbols.push(Symbol {
                                address: st.value,
                                name: symbol_name,
                            });
                            self.info.data.lines.push(record);
                        }
                        _ => {
                            self.info.bss.symbols.push(Symbol {
                                address: st.value,
                                name: symbol_name,
                            });
                            self.info.bss.lines.push(record);
                        }
                    }
                }
                "FUN" => {
                    func = strip_underscore(stab_symbol(name));
                    self.info.text.symbols.push(Symbol {
                        address: st.value,
                        name: func.clone(),
                    });
                }
                "SLINE" => {
                    self.info.text.lines.push(SourceLine {
                        address: st.value,
                        path: source.clone(),
                        line: st.desc as u32,
                        name: func.clone(),
                    });
                }
                _ => {}
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Text,
    Data,
    Bss,
}

/// Stab names look like `symbol:type-descriptor`; keep the symbol part
fn stab_symbol(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

/// Compilers prefix C symbols with `_`; strip it so users type the name
/// they wrote
fn strip_underscore(name: &str) -> String {
    name.strip_prefix('_').unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binfmt::hunk::{DebugData, Hunk, HunkSymbol, Memory};
    use crate::binfmt::stab::{Stab, StringTable, N_FUN, N_SLINE, N_SO};

    fn strings(entries: &[&str]) -> (StringTable, Vec<u32>) {
        let mut data = vec![0u8; 4];
        let mut offsets = Vec::new();
        for s in entries {
            offsets.push(data.len() as u32);
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }
        let size = data.len() as u32;
        data[..4].copy_from_slice(&size.to_be_bytes());
        (StringTable::new(data), offsets)
    }

    fn stab(strx: u32, typ: u8, desc: u16, value: u32) -> Stab {
        Stab {
            strx,
            typ,
            other: 0,
            desc,
            value,
        }
    }

    fn sample() -> DebugInfo {
        let (table, off) = strings(&["/src/", "main.c", "_main:F1", "crt0"]);
        let hunks = vec![
            Hunk::Code {
                memory: Memory::Any,
                data: vec![0; 0x40],
            },
            Hunk::Symbol(vec![HunkSymbol {
                name: "_crt0".to_string(),
                offset: 0,
            }]),
            Hunk::Debug(DebugData::Stabs {
                stabs: vec![
                    stab(off[0], N_SO, 0, 0),
                    stab(off[1], N_SO, 0, 0),
                    stab(off[2], N_FUN, 0, 0x10),
                    stab(0, N_SLINE, 3, 0x10),
                    stab(0, N_SLINE, 4, 0x18),
                ],
                strings: table,
            }),
            Hunk::End,
            Hunk::Data {
                memory: Memory::Any,
                data: vec![0; 0x20],
            },
            Hunk::End,
        ];
        DebugInfo::from_hunks(&hunks)
    }

    #[test]
    fn test_sections_laid_out_in_file_order() {
        let info = sample();
        assert_eq!(info.text.start, 0);
        assert_eq!(info.text.size, 0x40);
        assert_eq!(info.data.start, 0x40);
        assert_eq!(info.data.size, 0x20);
    }

    #[test]
    fn test_function_and_lines_extracted() {
        let info = sample();
        assert_eq!(info.ask_symbol("main"), Some(0x10));
        assert_eq!(info.ask_symbol("crt0"), Some(0));

        let loc = info.ask_address(0x19).unwrap();
        let Location::Line(line) = loc else {
            panic!("expected a line record");
        };
        assert_eq!(line.path, "/src/main.c");
        assert_eq!(line.line, 4);
        assert_eq!(line.name, "main");
    }

    #[test]
    fn test_ask_source_line() {
        let info = sample();
        assert_eq!(info.ask_source_line("main.c:3"), Some(0x10));
        assert_eq!(info.ask_source_line("main.c:4"), Some(0x18));
        assert_eq!(info.ask_source_line("other.c:1"), None);
        assert_eq!(info.ask_source_line("nonsense"), None);
    }

    #[test]
    fn test_relocate_shifts_all_addresses() {
        let mut info = sample();
        let segments = [
            Segment {
                start: 0x2000,
                size: 0x40,
            },
            Segment {
                start: 0x4000,
                size: 0x20,
            },
            Segment { start: 0, size: 0 },
        ];
        info.relocate(&segments).unwrap();
        assert_eq!(info.ask_symbol("main"), Some(0x2010));
        assert!(info.text.has_address(0x2018));
        assert_eq!(info.ask_source_line("main.c:4"), Some(0x2018));
    }

    #[test]
    fn test_relocate_size_mismatch_is_atomic() {
        let mut info = sample();
        let before = info.clone();
        let segments = [
            Segment {
                start: 0x2000,
                size: 0x40,
            },
            Segment {
                start: 0x4000,
                size: 0x999,
            },
            Segment { start: 0, size: 0 },
        ];
        assert!(info.relocate(&segments).is_err());
        assert_eq!(info, before);
    }

    #[test]
    fn test_underscore_dedup() {
        let hunks = vec![
            Hunk::Code {
                memory: Memory::Any,
                data: vec![0; 16],
            },
            Hunk::Symbol(vec![HunkSymbol {
                name: "_start".to_string(),
                offset: 4,
            }]),
            Hunk::End,
        ];
        let info = DebugInfo::from_hunks(&hunks);
        // The leading underscore is stripped on the way in.
        assert_eq!(info.ask_symbol("start"), Some(4));
        assert_eq!(info.ask_symbol("_start"), None);
    }
}
