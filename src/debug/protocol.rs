//! Debugger protocol abstraction.
//!
//! The command set is roughly based on the GDB Remote Serial Protocol
//! (https://sourceware.org/gdb/onlinedocs/gdb/Remote-Protocol.html).
//! Every method defaults to [`AmidevError::NotSupported`] so a target only
//! implements what it actually has; callers must degrade gracefully.

use std::fmt;

use crate::debug::state::{Registers, Segment};
use crate::debug::uae::UaeProcess;
use crate::error::{AmidevError, Result};

/// One line of disassembly as reported by the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyLine {
    pub address: u32,
    /// Opcode bytes as hex digits, two per byte
    pub opcode: String,
    pub mnemonic: String,
}

impl DisassemblyLine {
    /// Address of the instruction following this one
    pub fn next_address(&self) -> u32 {
        self.address + (self.opcode.len() as u32) / 2
    }
}

impl fmt::Display for DisassemblyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X} {:<32} {}", self.address, self.opcode, self.mnemonic)
    }
}

/// Commands a debug target may understand
#[allow(unused_variables)]
pub trait DebugProtocol {
    /// Resume execution, optionally at `addr`. Returns immediately; use
    /// [`DebugProtocol::wait_stop`] to block until the target stops again.
    fn cont(&mut self, addr: Option<u32>) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Execute a single instruction
    fn step(&mut self, addr: Option<u32>) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Block until the target stops (breakpoint, step, interrupt) and
    /// return whatever it printed while stopping
    fn wait_stop(&mut self) -> Result<Vec<String>> {
        Err(AmidevError::NotSupported)
    }

    /// Read all general registers
    fn read_registers(&mut self) -> Result<Registers> {
        Err(AmidevError::NotSupported)
    }

    /// Write all general registers
    fn write_registers(&mut self, regs: &Registers) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Read a single register by name
    fn read_register(&mut self, name: &str) -> Result<u32> {
        Err(AmidevError::NotSupported)
    }

    /// Write a single register by name
    fn write_register(&mut self, name: &str, value: u32) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Read memory; returns the target's formatted dump lines
    fn read_memory(&mut self, addr: u32, length: u32) -> Result<Vec<String>> {
        Err(AmidevError::NotSupported)
    }

    /// Write bytes to memory
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Insert a hardware breakpoint
    fn insert_breakpoint(&mut self, addr: u32) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Remove a hardware breakpoint
    fn remove_breakpoint(&mut self, addr: u32) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Disassemble `count` instructions starting at `addr`
    fn disassemble(&mut self, addr: u32, count: u32) -> Result<Vec<DisassemblyLine>> {
        Err(AmidevError::NotSupported)
    }

    /// Runtime segment list of the inspected task, in section order
    fn fetch_segments(&mut self) -> Result<Vec<Segment>> {
        Err(AmidevError::NotSupported)
    }

    /// Reset the entire target system
    fn reset(&mut self) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Kill the target
    fn kill(&mut self) -> Result<()> {
        Err(AmidevError::NotSupported)
    }

    /// Pass a raw command line through to the target and return its output
    fn raw_command(&mut self, cmd: &str) -> Result<Vec<String>> {
        Err(AmidevError::NotSupported)
    }
}

/// [`DebugProtocol`] over the FS-UAE console debugger.
///
/// The console debugger is line-oriented: one command in on stdin, a block
/// of output ending with a `>` prompt back on stderr. Breakpoints are a
/// toggle (`f addr`), continue is `g`, step is `t`.
pub struct UaeProtocol {
    process: UaeProcess,
}

impl UaeProtocol {
    pub fn new(process: UaeProcess) -> Self {
        Self { process }
    }

    pub fn process(&self) -> &UaeProcess {
        &self.process
    }

    fn command(&mut self, cmd: &str) -> Result<Vec<String>> {
        self.process.send(cmd)?;
        self.process.recv()
    }
}

impl DebugProtocol for UaeProtocol {
    fn cont(&mut self, addr: Option<u32>) -> Result<()> {
        match addr {
            Some(addr) => self.process.send(&format!("g {:x}", addr)),
            None => self.process.send("g"),
        }
    }

    fn step(&mut self, _addr: Option<u32>) -> Result<()> {
        self.process.send("t")
    }

    fn wait_stop(&mut self) -> Result<Vec<String>> {
        self.process.recv()
    }

    fn read_registers(&mut self) -> Result<Registers> {
        let lines = self.command("r")?;
        Ok(Registers::parse(&lines))
    }

    fn write_register(&mut self, name: &str, value: u32) -> Result<()> {
        // `r <reg> <value>` modifies a single register.
        self.command(&format!("r {} {:x}", name, value))?;
        Ok(())
    }

    fn read_memory(&mut self, addr: u32, length: u32) -> Result<Vec<String>> {
        // `m` prints 16 bytes per line.
        let lines = length.div_ceil(16).max(1);
        self.command(&format!("m {:x} {}", addr, lines))
    }

    fn insert_breakpoint(&mut self, addr: u32) -> Result<()> {
        self.command(&format!("f {:x}", addr))?;
        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u32) -> Result<()> {
        // The console debugger toggles breakpoints with the same command.
        self.command(&format!("f {:x}", addr))?;
        Ok(())
    }

    fn disassemble(&mut self, addr: u32, count: u32) -> Result<Vec<DisassemblyLine>> {
        let lines = self.command(&format!("d {:x} {}", addr, count))?;
        Ok(lines
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| parse_disassembly_line(l))
            .collect())
    }

    fn reset(&mut self) -> Result<()> {
        self.process.send("R")
    }

    fn kill(&mut self) -> Result<()> {
        self.process.send("q")?;
        self.process.shutdown();
        Ok(())
    }

    fn raw_command(&mut self, cmd: &str) -> Result<Vec<String>> {
        self.command(cmd)
    }
}

/// Parse a console debugger disassembly line: address, opcode words,
/// mnemonic. Falls back to keeping the whole line as the mnemonic when the
/// shape is unexpected.
fn parse_disassembly_line(line: &str) -> DisassemblyLine {
    let mut tokens = line.split_whitespace();
    let address = tokens
        .next()
        .and_then(|t| u32::from_str_radix(t, 16).ok());
    match address {
        Some(address) => {
            let rest: Vec<&str> = tokens.collect();
            // Opcode words print as lowercase hex; mnemonics are uppercase,
            // which keeps ABCD and friends out of the opcode column.
            let opcode_words: Vec<&str> = rest
                .iter()
                .take_while(|t| {
                    t.len() % 4 == 0
                        && t.chars()
                            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                })
                .copied()
                .collect();
            let mnemonic = rest[opcode_words.len()..].join(" ");
            DisassemblyLine {
                address,
                opcode: opcode_words.join(""),
                mnemonic,
            }
        }
        None => DisassemblyLine {
            address: 0,
            opcode: String::new(),
            mnemonic: line.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disassembly_line() {
        let line = parse_disassembly_line("00FC0514 4eae fe44 JSR (A6,-$01bc)");
        assert_eq!(line.address, 0x00fc0514);
        assert_eq!(line.opcode, "4eaefe44");
        assert_eq!(line.mnemonic, "JSR (A6,-$01bc)");
        assert_eq!(line.next_address(), 0x00fc0518);
    }

    #[test]
    fn test_parse_disassembly_line_garbage() {
        let line = parse_disassembly_line("not a disassembly");
        assert_eq!(line.address, 0);
        assert!(line.opcode.is_empty());
        assert_eq!(line.mnemonic, "not a disassembly");
    }

    #[test]
    fn test_next_address_counts_bytes() {
        let line = DisassemblyLine {
            address: 0x100,
            opcode: "4e75".to_string(),
            mnemonic: "RTS".to_string(),
        };
        assert_eq!(line.next_address(), 0x102);
    }
}
