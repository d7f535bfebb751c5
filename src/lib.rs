//! amidev - tools useful for AmigaOS/m68k development.
//!
//! This library backs the `amidev` binary: readers for the binary formats
//! produced by the cross toolchain (hunk, a.out, ar), debug-info
//! extraction, a front-end for the FS-UAE console debugger, and the build
//! glue that replaces the historical makefile.

pub mod binfmt;
pub mod cli;
pub mod config;
pub mod debug;
pub mod error;
pub mod process_guard;
pub mod tasks;

// Re-export main types for convenience
pub use binfmt::aout::AoutFile;
pub use binfmt::ar::ArMember;
pub use binfmt::hunk::Hunk;
pub use binfmt::stab::{Stab, StringTable};
pub use config::{EmulatorSettings, Settings};
pub use debug::info::{DebugInfo, Location, Section, SourceLine, Symbol};
pub use debug::protocol::{DebugProtocol, DisassemblyLine, UaeProtocol};
pub use debug::session::DebugSession;
pub use debug::state::{Breakpoint, Registers, Segment};
pub use debug::uae::UaeProcess;
pub use error::{AmidevError, Result};
pub use process_guard::CommandProcessGroup;
pub use tasks::{run_target, Operation, Target};
