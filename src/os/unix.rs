use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid as NixPid;
use procfs::process::{ProcState, Process};

use super::{Pid, ProcessControl};
use crate::error::OsError;

/// [`ProcessControl`] backed by `kill(2)`, `waitpid(2)` and `/proc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessControl;

impl UnixProcessControl {
    pub fn new() -> Self {
        Self
    }

    fn signal(&self, pid: Pid, sig: Signal) -> Result<(), OsError> {
        if pid <= 0 {
            return Ok(());
        }
        match signal::kill(NixPid::from_raw(pid), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(OsError::Signal {
                pid,
                signal: sig.as_str(),
                reason: e.desc().to_string(),
            }),
        }
    }
}

impl ProcessControl for UnixProcessControl {
    fn children(&self, pid: Pid) -> Vec<Pid> {
        let Ok(all) = procfs::process::all_processes() else {
            return Vec::new();
        };
        all.filter_map(Result::ok)
            .filter_map(|p| p.stat().ok())
            .filter(|st| st.ppid == pid)
            .map(|st| st.pid)
            .collect()
    }

    fn is_alive(&self, pid: Pid) -> bool {
        pid_alive(pid)
    }

    fn terminate(&self, pid: Pid) -> Result<(), OsError> {
        self.signal(pid, Signal::SIGTERM)
    }

    fn kill(&self, pid: Pid) -> Result<(), OsError> {
        self.signal(pid, Signal::SIGKILL)
    }

    fn reap(&self, pid: Pid) -> Option<i32> {
        if pid <= 0 {
            return None;
        }
        match waitpid(NixPid::from_raw(pid), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Some(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => Some(128 + sig as i32),
            _ => None,
        }
    }
}

/// Liveness by pid: the OS still tracks it, it is positive and not a zombie.
///
/// `EPERM` from the null signal means the process exists but belongs to someone else.
pub fn pid_alive(pid: Pid) -> bool {
    if pid <= 0 {
        return false;
    }
    match signal::kill(NixPid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => {}
        Err(_) => return false,
    }
    match Process::new(pid).and_then(|p| p.stat()) {
        Ok(st) => !matches!(st.state(), Ok(ProcState::Zombie) | Ok(ProcState::Dead)),
        // Raced with exit between the two checks.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_reaped(ctl: &UnixProcessControl, pid: Pid) -> Option<i32> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(code) = ctl.reap(pid) {
                return Some(code);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn non_positive_pids_are_dead() {
        assert!(!pid_alive(0));
        assert!(!pid_alive(-5));
    }

    #[test]
    fn own_process_is_alive() {
        assert!(pid_alive(std::process::id() as i32));
    }

    #[test]
    fn zombie_is_not_alive_and_reap_returns_code() {
        let ctl = UnixProcessControl::new();
        let child = Command::new("/bin/sh").args(["-c", "exit 7"]).spawn().unwrap();
        let pid = child.id() as i32;

        let deadline = Instant::now() + Duration::from_secs(5);
        while pid_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!pid_alive(pid));
        assert_eq!(wait_reaped(&ctl, pid), Some(7));
    }

    #[test]
    fn terminate_reports_signal_exit_code() {
        let ctl = UnixProcessControl::new();
        let child = Command::new("/bin/sleep").arg("30").spawn().unwrap();
        let pid = child.id() as i32;

        ctl.terminate(pid).unwrap();
        assert_eq!(wait_reaped(&ctl, pid), Some(128 + 15));
        // Already gone: still not an error.
        ctl.kill(pid).unwrap();
    }

    #[test]
    fn children_of_shell_are_listed() {
        let ctl = UnixProcessControl::new();
        let child = Command::new("/bin/sh")
            .args(["-c", "sleep 30 & sleep 30 & wait"])
            .spawn()
            .unwrap();
        let pid = child.id() as i32;

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut kids = Vec::new();
        while kids.len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            kids = ctl.children(pid);
        }
        assert_eq!(kids.len(), 2);

        for k in &kids {
            ctl.kill(*k).unwrap();
        }
        ctl.kill(pid).unwrap();
        assert!(wait_reaped(&ctl, pid).is_some());
    }
}
