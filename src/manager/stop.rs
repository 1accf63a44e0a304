//! Signal delivery and forced-kill escalation for operator stops.

use std::io;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Sender};
use log::{debug, warn};

/// Cancels the pending forced kill when dropped.
pub struct DeadlineToken {
    _cancel: Sender<()>,
}

/// Sends `signal` to the process group led by `pid`. Fails with `ESRCH`
/// once the leader has been reaped; the bare pid is never signalled.
pub fn signal_tree(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let rc = unsafe { libc::kill(-pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub fn terminate(pid: u32) -> io::Result<()> {
    signal_tree(pid, libc::SIGTERM)
}

/// Starts the grace period for `pid`. Unless the returned token is dropped
/// first, the process tree receives `SIGKILL` once `grace` has elapsed.
pub fn arm_deadline(id: &str, pid: u32, grace: Duration) -> DeadlineToken {
    let (cancel_tx, cancel_rx) = bounded::<()>(0);
    let id = id.to_string();
    thread::spawn(move || {
        select! {
            recv(cancel_rx) -> _ => {
                debug!("Stop deadline for '{}' cancelled", id);
            }
            recv(after(grace)) -> _ => {
                warn!("Process '{}' ignored SIGTERM for {:?}, sending SIGKILL", id, grace);
                if let Err(e) = signal_tree(pid, libc::SIGKILL) {
                    warn!("Failed to kill process '{}' (PID {}): {}", id, pid, e);
                }
            }
        }
    });
    DeadlineToken { _cancel: cancel_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::{Command, Stdio};
    use std::time::Instant;

    fn spawn_stubborn() -> std::process::Child {
        Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap()
    }

    #[test]
    fn terminate_reaches_the_process_group() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & wait")
            .process_group(0)
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        terminate(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn deadline_forces_kill_when_term_is_ignored() {
        let mut child = spawn_stubborn();
        thread::sleep(Duration::from_millis(100));
        terminate(child.id()).unwrap();
        let _token = arm_deadline("stubborn", child.id(), Duration::from_millis(200));

        let started = Instant::now();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn dropped_token_cancels_the_kill() {
        let mut child = spawn_stubborn();
        let token = arm_deadline("stubborn", child.id(), Duration::from_millis(100));
        drop(token);
        thread::sleep(Duration::from_millis(400));
        assert!(child.try_wait().unwrap().is_none());

        signal_tree(child.id(), libc::SIGKILL).unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn signalling_a_missing_process_fails() {
        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        let err = terminate(pid).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }

    #[test]
    fn only_group_leaders_are_signalled() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let err = terminate(child.id()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
        assert!(child.try_wait().unwrap().is_none());

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
