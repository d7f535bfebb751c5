//! Debugger-visible target state: the m68k register file, breakpoints and
//! runtime segments.

use std::collections::HashMap;
use std::fmt;

/// Register names in display order
pub const REGISTER_NAMES: [&str; 20] = [
    "D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "A0", "A1", "A2", "A3", "A4", "A5", "A6",
    "A7", "PC", "USP", "ISP", "SR",
];

/// The m68k register file as reported by the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    values: HashMap<&'static str, u32>,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical name for a register, if `name` is one
    fn canonical(name: &str) -> Option<&'static str> {
        REGISTER_NAMES
            .iter()
            .find(|&&n| n.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn get(&self, name: &str) -> u32 {
        Self::canonical(name)
            .and_then(|n| self.values.get(n))
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, name: &str, value: u32) -> bool {
        match Self::canonical(name) {
            Some(n) => {
                self.values.insert(n, value);
                true
            }
            None => false,
        }
    }

    pub fn pc(&self) -> u32 {
        self.get("PC")
    }

    /// Extract register values from a register dump.
    ///
    /// The emulator's output format is not stable across versions, so this
    /// scans for `NAME value` and `NAME=value` token pairs and takes what
    /// it recognises. Unknown tokens are skipped.
    pub fn parse(lines: &[String]) -> Self {
        let mut regs = Self::new();
        for line in lines {
            let tokens: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == '=' || c == ':')
                .filter(|t| !t.is_empty())
                .collect();
            let mut i = 0;
            while i < tokens.len() {
                if Self::canonical(tokens[i]).is_some() && i + 1 < tokens.len() {
                    if let Ok(value) = u32::from_str_radix(tokens[i + 1], 16) {
                        regs.set(tokens[i], value);
                        i += 2;
                        continue;
                    }
                }
                i += 1;
            }
        }
        regs
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |names: &[&str]| -> String {
            names
                .iter()
                .map(|n| format!("{}={:08X}", n, self.get(n)))
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(f, "{}", row(&REGISTER_NAMES[..8]))?;
        writeln!(f, "{}", row(&REGISTER_NAMES[8..16]))?;
        // SR is a 16-bit register.
        write!(
            f,
            "{} SR={:04X}",
            row(&REGISTER_NAMES[16..19]),
            self.get("SR") & 0xffff
        )
    }
}

/// A numbered breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub number: u32,
    pub address: u32,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} at {:08X}", self.number, self.address)
    }
}

/// Runtime placement of a loaded section as reported by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u32,
    pub size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_case_insensitive() {
        let mut regs = Registers::new();
        assert!(regs.set("pc", 0xf80000));
        assert_eq!(regs.get("PC"), 0xf80000);
        assert!(!regs.set("D8", 1));
    }

    #[test]
    fn test_parse_register_dump() {
        let lines = vec![
            "  D0 00000001   D1 00000002   D2 FFFFFFFF   D3 00000000".to_string(),
            "  A0 00DFF000   A7 00040000".to_string(),
            "  USP  00040000 ISP  00080000".to_string(),
            "  T=00 S=0 M=0 X=0 N=0 Z=1 V=0 C=0".to_string(),
            "PC=00FC0514".to_string(),
        ];
        let regs = Registers::parse(&lines);
        assert_eq!(regs.get("D0"), 1);
        assert_eq!(regs.get("D2"), 0xffffffff);
        assert_eq!(regs.get("A0"), 0x00dff000);
        assert_eq!(regs.get("USP"), 0x00040000);
        assert_eq!(regs.pc(), 0x00fc0514);
        // Flag soup must not be mistaken for registers.
        assert_eq!(regs.get("SR"), 0);
    }

    #[test]
    fn test_display_layout() {
        let mut regs = Registers::new();
        regs.set("D0", 0xdeadbeef);
        regs.set("SR", 0x2700);
        let text = format!("{}", regs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("D0=DEADBEEF D1=00000000"));
        assert!(lines[2].ends_with("SR=2700"));
    }

    #[test]
    fn test_breakpoint_display() {
        let bp = Breakpoint {
            number: 3,
            address: 0xc0ffee,
        };
        assert_eq!(bp.to_string(), "#3 at 00C0FFEE");
    }
}
