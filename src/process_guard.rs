//! Process lifecycle management for the emulator child.
//!
//! The emulator runs in its own process group so that terminal signals
//! aimed at us do not tear it down (Ctrl+C means "enter the debugger",
//! not "quit"), and so that on our exit the whole emulator process tree
//! can be terminated with a single group signal.

use std::time::{Duration, Instant};

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Send a signal to a single process
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group (negative PID form)
pub fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // Zombies can still receive signals but are not running; field 3 of
    // /proc/pid/stat is the state letter.
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }
    true
}

/// Terminate a process group: SIGTERM first, SIGKILL after `grace_period`
pub fn terminate_group(pgid: u32, grace_period: Duration) {
    if !is_process_alive(pgid) {
        return;
    }
    if let Err(e) = send_signal_to_group(pgid, Signal::SIGTERM) {
        warn!("failed to send SIGTERM to process group {}: {}", pgid, e);
        let _ = send_signal(pgid, Signal::SIGTERM);
    }

    let start = Instant::now();
    while start.elapsed() < grace_period {
        if !is_process_alive(pgid) {
            debug!("process group {} terminated gracefully", pgid);
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    warn!("process group {} did not terminate, sending SIGKILL", pgid);
    if send_signal_to_group(pgid, Signal::SIGKILL).is_err() {
        let _ = send_signal(pgid, Signal::SIGKILL);
    }
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group, dying with
    /// its parent
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // Become leader of a fresh process group (PGID = own PID).
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // Make sure the child does not outlive a crashed parent.
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn test_child_gets_own_process_group() {
        let mut child = Command::new("sleep")
            .arg("5")
            .in_new_process_group()
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();

        let pgid = nix::unistd::getpgid(Some(Pid::from_raw(pid as i32))).unwrap();
        assert_eq!(pgid.as_raw(), pid as i32);

        terminate_group(pid, Duration::from_secs(2));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_dead_process_is_not_alive() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_process_alive(pid));
    }
}
