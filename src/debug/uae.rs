//! FS-UAE child process plumbing.
//!
//! The emulator is started with its console debugger enabled. Its stdout
//! carries ordinary emulator log output; the debugger conversation runs
//! over stderr (responses) and stdin (commands). A response is complete
//! when the emulator prints its `>` prompt.
//!
//! Two reader threads own the pipes and feed the synchronous session
//! through channels. SIGINT is the emulator's enter-the-debugger gesture,
//! so the child lives in its own process group and Ctrl+C is forwarded
//! to it explicitly instead of letting the terminal deliver it.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::config::EmulatorSettings;
use crate::error::{AmidevError, Result};
use crate::process_guard::{self, CommandProcessGroup};

/// Arguments that enable the console debugger conversation
const DEBUGGER_ARGS: [&str; 2] = ["--console_debugger=1", "--stdout=1"];

/// A running emulator with the console debugger attached
pub struct UaeProcess {
    child: Child,
    stdin: ChildStdin,
    responses: Receiver<Vec<String>>,
}

impl UaeProcess {
    /// Launch the emulator and wire up the debugger pipes
    pub fn launch(settings: &EmulatorSettings, extra_args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(&settings.executable);
        cmd.args(&settings.args)
            .args(DEBUGGER_ARGS)
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        info!("launching emulator: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            AmidevError::emulator(format!("failed to launch {}: {}", settings.executable, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AmidevError::emulator("emulator has no stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AmidevError::emulator("emulator has no stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AmidevError::emulator("emulator has no stderr pipe"))?;

        // Emulator log output; forwarded to our logging, not the session.
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => debug!(target: "uae", "{}", line),
                    Err(_) => break,
                }
            }
        });

        let (tx, responses) = mpsc::channel();
        thread::spawn(move || response_loop(stderr, tx));

        Ok(Self {
            child,
            stdin,
            responses,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Write one command line to the debugger
    pub fn send(&mut self, cmd: &str) -> Result<()> {
        debug!("-> {}", cmd);
        self.stdin.write_all(cmd.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Block until the next complete response block.
    ///
    /// This may legitimately take forever (the emulator is running until a
    /// breakpoint or an interrupt), so there is no timeout; a dead
    /// emulator is detected through the closed channel instead.
    pub fn recv(&mut self) -> Result<Vec<String>> {
        self.responses
            .recv()
            .map_err(|_| AmidevError::emulator("emulator closed the debugger channel"))
    }

    /// Ask the emulator to stop and enter the debugger
    pub fn interrupt(&self) -> Result<()> {
        process_guard::send_signal(self.pid(), Signal::SIGINT)
            .map_err(|e| AmidevError::emulator(format!("failed to interrupt emulator: {}", e)))
    }

    /// Forward Ctrl+C to the emulator for the rest of this process's life
    pub fn install_break_handler(&self) -> Result<()> {
        let pid = self.pid();
        ctrlc::set_handler(move || {
            let _ = process_guard::send_signal(pid, Signal::SIGINT);
        })
        .map_err(|e| AmidevError::emulator(format!("failed to install Ctrl+C handler: {}", e)))
    }

    /// Give the emulator a moment to exit after a quit command
    pub fn shutdown(&mut self) {
        for _ in 0..50 {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!("emulator exited: {}", status);
                    return;
                }
                Ok(None) => thread::sleep(Duration::from_millis(100)),
                Err(e) => {
                    warn!("failed to wait for emulator: {}", e);
                    return;
                }
            }
        }
        warn!("emulator still running after quit command");
    }
}

impl Drop for UaeProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            process_guard::terminate_group(self.pid(), Duration::from_secs(5));
        }
        // Reap so no zombie is left behind.
        let _ = self.child.wait();
    }
}

/// Accumulate stderr bytes and ship one block per debugger prompt
fn response_loop(mut stderr: ChildStderr, tx: Sender<Vec<String>>) {
    let mut buffer = String::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));
                if buffer.ends_with('>') {
                    let text = &buffer[..buffer.len() - 1];
                    let lines = text.lines().map(|l| l.trim().to_string()).collect();
                    if tx.send(lines).is_err() {
                        break;
                    }
                    buffer.clear();
                }
            }
        }
    }
    debug!("emulator stderr closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    // Drive the pipe plumbing against a shell standing in for the
    // emulator: it answers every stdin line with a block ending in the
    // debugger prompt on stderr.
    fn fake_emulator() -> EmulatorSettings {
        EmulatorSettings {
            executable: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                // The --console_debugger/--stdout arguments land in $0/$1
                // and are ignored.
                "printf 'welcome\\n>' >&2; while read cmd; do printf 'echo %s\\n>' \"$cmd\" >&2; done"
                    .to_string(),
            ],
        }
    }

    #[test]
    fn test_send_recv_roundtrip() {
        let mut uae = UaeProcess::launch(&fake_emulator(), &[]).unwrap();
        assert_eq!(uae.recv().unwrap(), vec!["welcome".to_string()]);

        uae.send("r").unwrap();
        assert_eq!(uae.recv().unwrap(), vec!["echo r".to_string()]);
    }

    #[test]
    fn test_dead_emulator_is_an_error() {
        let settings = EmulatorSettings {
            executable: "true".to_string(),
            args: vec![],
        };
        let mut uae = UaeProcess::launch(&settings, &[]).unwrap();
        // `true` exits immediately without ever printing a prompt.
        assert!(uae.recv().is_err());
    }
}
