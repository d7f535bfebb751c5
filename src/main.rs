//! amidev - main entry point.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use amidev::binfmt::{aout::AoutFile, ar, hunk};
use amidev::cli::{Cli, Commands, DumpCommands};
use amidev::config::Settings;
use amidev::debug::info::DebugInfo;
use amidev::debug::protocol::UaeProtocol;
use amidev::debug::session::DebugSession;
use amidev::debug::uae::UaeProcess;
use amidev::tasks;

/// Initialize logging; RUST_LOG selects the filter, warnings by default
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let result = match cli.command {
        Commands::Make { target } => run_make(&target),
        Commands::Dump { format } => run_dump(&format),
        Commands::Debug {
            settings,
            uae_config,
            args,
        } => run_debug(settings.as_deref(), uae_config.as_deref(), &args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("amidev: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_make(target: &str) -> Result<()> {
    tasks::run_target(target, Path::new("."))?;
    Ok(())
}

fn run_dump(format: &DumpCommands) -> Result<()> {
    match format {
        DumpCommands::Hunk { files } => {
            for path in files {
                println!("Parsing \"{}\".", path.display());
                println!();
                for h in hunk::read_file(path)? {
                    println!("{}", h);
                }
            }
        }
        DumpCommands::Aout { files } => {
            for path in files {
                let obj = AoutFile::read_file(path)?;
                println!("{}", obj);
            }
        }
        DumpCommands::Ar { files } => {
            for path in files {
                println!("{}:", path.display());
                for (num, entry) in ar::read_file(path)?.iter().enumerate() {
                    println!("{:5}: {} (length: {})", num + 1, entry.name, entry.data.len());
                }
                println!();
            }
        }
        DumpCommands::DebugInfo { files } => {
            for path in files {
                println!("Parsing \"{}\".", path.display());
                println!();
                println!("{}", DebugInfo::from_file(path)?);
            }
        }
    }
    Ok(())
}

fn run_debug(
    settings: Option<&Path>,
    uae_config: Option<&Path>,
    extra_args: &[String],
) -> Result<()> {
    let settings = Settings::resolve(settings).context("failed to load settings")?;

    let mut args: Vec<String> = Vec::new();
    if let Some(config) = uae_config {
        args.push(config.display().to_string());
    }
    args.extend_from_slice(extra_args);

    let process = UaeProcess::launch(&settings.emulator, &args)
        .context("failed to start the emulator")?;
    process
        .install_break_handler()
        .context("failed to install Ctrl+C handler")?;
    info!("emulator running as pid {}", process.pid());

    let mut session = DebugSession::new(UaeProtocol::new(process));
    session.run().context("debugger session failed")?;
    Ok(())
}
