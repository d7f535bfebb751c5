//! Interactive debugger session.
//!
//! A line-based command loop in front of a [`DebugProtocol`] target. The
//! command set is terse, two letters at most:
//!
//! ```text
//! b <addr>    insert breakpoint        bd <addr>   delete breakpoint
//! bl          list breakpoints         c           continue
//! s           single step              ir          show registers
//! mr <a> <n>  read memory              dr <a> <b>  disassemble range
//! Zf <file>   load debug info          !           where am I
//! : <cmd>     raw target command       q           quit
//! ```
//!
//! Addresses accept hex literals (`1c018`, `0x1c018`, `$1c018`), symbol
//! names and `file:line` once debug info is loaded.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::debug;

use crate::debug::info::DebugInfo;
use crate::debug::protocol::DebugProtocol;
use crate::debug::state::{Breakpoint, Registers};
use crate::error::{AmidevError, Result};

/// What the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Interactive session state
pub struct DebugSession<P: DebugProtocol> {
    protocol: P,
    debuginfo: Option<DebugInfo>,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint: u32,
    registers: Registers,
    history: Vec<String>,
}

impl<P: DebugProtocol> DebugSession<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            debuginfo: None,
            breakpoints: Vec::new(),
            next_breakpoint: 1,
            registers: Registers::new(),
            history: Vec::new(),
        }
    }

    /// Run the command loop until quit or end of input
    pub fn run(&mut self) -> Result<()> {
        // The target greets us with its startup banner.
        match self.protocol.wait_stop() {
            Ok(lines) => print_lines(&lines),
            Err(e) if e.is_not_supported() => {}
            Err(e) => return Err(e),
        }
        if let Err(e) = self.prologue() {
            println!("{}", e);
        }

        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("(debug) ");
            io::stdout().flush()?;

            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                // End of input: treat like quit so a closed stdin cannot
                // spin the loop.
                let _ = self.protocol.kill();
                break;
            }
            let cmd = line.trim().to_string();
            if !cmd.is_empty() {
                self.history.push(cmd.clone());
            }
            match self.dispatch(&cmd) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                // Command failures are reported, the session survives.
                Err(e) => println!("{}", e),
            }
        }
        Ok(())
    }

    /// Commands entered so far, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Execute one command line
    fn dispatch(&mut self, cmd: &str) -> Result<Flow> {
        if let Some(raw) = cmd.strip_prefix(':') {
            print_lines(&self.protocol.raw_command(raw.trim())?);
            return Ok(Flow::Continue);
        }

        let fields: Vec<&str> = cmd.split_whitespace().collect();
        let Some((&op, args)) = fields.split_first() else {
            return Ok(Flow::Continue);
        };

        match (op, args) {
            ("mr", [addr, length]) => {
                let addr = self.address_of(addr)?;
                let length: u32 = length
                    .parse()
                    .map_err(|_| AmidevError::protocol("bad length"))?;
                print_lines(&self.protocol.read_memory(addr, length)?);
            }
            ("b", [addr]) => {
                let addr = self.address_of(addr)?;
                self.do_break_insert(addr)?;
            }
            ("bd", [addr]) => {
                let addr = self.address_of(addr)?;
                self.do_break_remove(addr)?;
            }
            ("bl", []) => self.do_break_show(),
            ("dr", [start, end]) => {
                let start = self.address_of(start)?;
                let end = self.address_of(end)?;
                self.do_disassemble_range(start, end)?;
            }
            ("c", []) => self.do_cont()?,
            ("s", []) => self.do_step()?,
            ("ir", []) => println!("{}", self.protocol.read_registers()?),
            ("Zf", [file]) => self.do_debuginfo_read(Path::new(file))?,
            ("!", []) => self.break_show(self.registers.pc())?,
            ("q", []) => {
                self.protocol.kill()?;
                return Ok(Flow::Quit);
            }
            _ => println!("Unknown command"),
        }
        Ok(Flow::Continue)
    }

    /// Resolve a user-typed location: hex literal, then `file:line`, then
    /// symbol name
    fn address_of(&self, loc: &str) -> Result<u32> {
        let hex = loc
            .strip_prefix("0x")
            .or_else(|| loc.strip_prefix('$'))
            .unwrap_or(loc);
        if let Ok(addr) = u32::from_str_radix(hex, 16) {
            return Ok(addr);
        }
        if let Some(info) = &self.debuginfo {
            if let Some(addr) = info.ask_source_line(loc) {
                return Ok(addr);
            }
            if let Some(addr) = info.ask_symbol(loc) {
                return Ok(addr);
            }
        }
        Err(AmidevError::protocol(format!(
            "cannot resolve `{}` to an address",
            loc
        )))
    }

    /// Symbolic description of an address, falling back to plain hex
    fn break_info(&self, pc: u32) -> String {
        self.debuginfo
            .as_ref()
            .and_then(|info| info.ask_address(pc))
            .map(|loc| loc.to_string())
            .unwrap_or_else(|| format!("{:08X}", pc))
    }

    fn break_lookup(&self, addr: u32) -> Option<Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.address == addr).copied()
    }

    /// Show where the target stopped: source context when the line table
    /// resolves, disassembly otherwise
    fn break_show(&mut self, pc: u32) -> Result<()> {
        println!("Stopped at {}:", self.break_info(pc));

        let source = self
            .debuginfo
            .as_ref()
            .and_then(|info| info.ask_address(pc))
            .and_then(|loc| loc.source().map(|(path, line)| (path.to_string(), line)));

        if let Some((path, line)) = source {
            if let Ok(contents) = fs::read_to_string(&path) {
                for n in line.saturating_sub(2)..=line + 2 {
                    if n == 0 {
                        continue;
                    }
                    if let Some(text) = contents.lines().nth(n as usize - 1) {
                        println!("{} {}", n, text.trim_end());
                    }
                }
                return Ok(());
            }
            debug!("source file {} not readable", path);
        }

        match self.protocol.disassemble(pc, 5) {
            Ok(lines) => {
                for line in lines {
                    println!("{}", line);
                }
            }
            Err(e) if e.is_not_supported() => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Refresh registers after a stop and show where we are
    fn prologue(&mut self) -> Result<()> {
        self.registers = self.protocol.read_registers()?;
        println!("{}", self.registers);
        println!();
        self.break_show(self.registers.pc())
    }

    fn do_cont(&mut self) -> Result<()> {
        self.protocol.cont(None)?;
        println!("Continue...");
        print_lines(&self.protocol.wait_stop()?);
        self.prologue()
    }

    fn do_step(&mut self) -> Result<()> {
        self.protocol.step(None)?;
        print_lines(&self.protocol.wait_stop()?);
        self.prologue()
    }

    fn do_break_insert(&mut self, addr: u32) -> Result<()> {
        if self.break_lookup(addr).is_some() {
            return Ok(());
        }
        self.protocol.insert_breakpoint(addr)?;
        let bp = Breakpoint {
            number: self.next_breakpoint,
            address: addr,
        };
        self.next_breakpoint += 1;
        self.breakpoints.push(bp);
        println!("Added breakpoint #{}, {}", bp.number, self.break_info(addr));
        Ok(())
    }

    fn do_break_remove(&mut self, addr: u32) -> Result<()> {
        let Some(bp) = self.break_lookup(addr) else {
            return Ok(());
        };
        self.breakpoints.retain(|b| b.number != bp.number);
        self.protocol.remove_breakpoint(addr)?;
        println!("Removed breakpoint #{}", bp.number);
        Ok(())
    }

    fn do_break_show(&self) {
        let mut sorted = self.breakpoints.clone();
        sorted.sort_by_key(|bp| bp.number);
        for bp in sorted {
            println!("#{}: {}", bp.number, self.break_info(bp.address));
        }
    }

    fn do_disassemble_range(&mut self, start: u32, end: u32) -> Result<()> {
        let mut addr = start;
        while addr < end {
            let lines = self.protocol.disassemble(addr, 1)?;
            let Some(line) = lines.first() else {
                break;
            };
            println!("{}", line);
            let next = line.next_address();
            if next <= addr {
                break; // no forward progress, bail out
            }
            addr = next;
        }
        Ok(())
    }

    /// Load debug info from an executable and rebase it against the
    /// running task when the target can report its segments
    fn do_debuginfo_read(&mut self, path: &Path) -> Result<()> {
        let mut info = DebugInfo::from_file(path)?;
        match self.protocol.fetch_segments() {
            Ok(segments) => {
                if let Err(e) = info.relocate(&segments) {
                    println!(
                        "Failed to associate debug info from \"{}\" with task segments: {}",
                        path.display(),
                        e
                    );
                    return Ok(());
                }
            }
            Err(e) if e.is_not_supported() => {
                println!("Target does not report segments; addresses are file-relative.");
            }
            Err(e) => return Err(e),
        }
        self.debuginfo = Some(info);
        Ok(())
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
