//! Source-level debugging support: debug-info extraction from hunk files
//! and an interactive front-end for the FS-UAE console debugger.

pub mod info;
pub mod protocol;
pub mod session;
pub mod state;
pub mod uae;
