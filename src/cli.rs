use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// amidev - tools useful for AmigaOS/m68k development
#[derive(Parser)]
#[command(name = "amidev")]
#[command(about = "Tools useful for AmigaOS/m68k development")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a build target (all, clean, install)
    Make {
        /// Target name
        target: String,
    },
    /// Inspect binary files used by the toolchain
    Dump {
        #[command(subcommand)]
        format: DumpCommands,
    },
    /// Run FS-UAE with the console debugger attached
    Debug {
        /// Settings file (defaults to ./amidev.json when present)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// FS-UAE configuration file
        #[arg(short = 'c', long)]
        uae_config: Option<PathBuf>,

        /// Extra arguments passed through to the emulator
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum DumpCommands {
    /// Dump the structure of AmigaDOS hunk files
    Hunk {
        /// Hunk executables or object files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Dump big-endian m68k a.out object files
    Aout {
        /// a.out object files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the members of ar archives
    Ar {
        /// Archive files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Dump debug information extracted from hunk executables
    DebugInfo {
        /// Hunk executables with symbol/debug blocks
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_takes_single_target() {
        let cli = Cli::try_parse_from(["amidev", "make", "clean"]).unwrap();
        let Commands::Make { target } = cli.command else {
            panic!("expected make");
        };
        assert_eq!(target, "clean");

        assert!(Cli::try_parse_from(["amidev", "make"]).is_err());
        assert!(Cli::try_parse_from(["amidev", "make", "clean", "install"]).is_err());
    }

    #[test]
    fn test_dump_requires_files() {
        assert!(Cli::try_parse_from(["amidev", "dump", "hunk"]).is_err());
        let cli = Cli::try_parse_from(["amidev", "dump", "hunk", "a", "b"]).unwrap();
        let Commands::Dump {
            format: DumpCommands::Hunk { files },
        } = cli.command
        else {
            panic!("expected dump hunk");
        };
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_debug_passes_extra_args_through() {
        let cli = Cli::try_parse_from([
            "amidev",
            "debug",
            "-c",
            "a500.fs-uae",
            "--",
            "--fullscreen=0",
        ])
        .unwrap();
        let Commands::Debug {
            uae_config, args, ..
        } = cli.command
        else {
            panic!("expected debug");
        };
        assert_eq!(uae_config.unwrap().to_str(), Some("a500.fs-uae"));
        assert_eq!(args, vec!["--fullscreen=0"]);
    }
}
