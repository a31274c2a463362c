// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::config::StopSignal;
use crate::errors::{ForceKillError, SignalDeliveryError};

fn native_signal(signal: StopSignal) -> Signal {
    match signal {
        StopSignal::Quit => Signal::SIGQUIT,
        StopSignal::Close => Signal::SIGHUP,
        StopSignal::Interrupt => Signal::SIGINT,
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

pub(super) fn send_signal(pid: u32, signal: StopSignal) -> Result<(), SignalDeliveryError> {
    let target = to_pid(pid).ok_or_else(|| SignalDeliveryError {
        pid,
        signal,
        reason: "invalid pid".to_string(),
    })?;
    match signal::kill(target, native_signal(signal)) {
        // Already exited and reaped.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SignalDeliveryError {
            pid,
            signal,
            reason: e.to_string(),
        }),
    }
}

/// The launcher makes every child a process group leader, so the group id is
/// the child pid and survives the leader exiting.
pub(super) fn kill_tree(pid: u32) -> Result<(), ForceKillError> {
    let group = to_pid(pid).ok_or_else(|| ForceKillError {
        pid,
        reason: "invalid pid".to_string(),
    })?;
    match signal::killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ForceKillError {
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::os::unix::process::CommandExt;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(native_signal(StopSignal::Quit), Signal::SIGQUIT);
        assert_eq!(native_signal(StopSignal::Close), Signal::SIGHUP);
        assert_eq!(native_signal(StopSignal::Interrupt), Signal::SIGINT);
    }

    #[test]
    fn test_invalid_pid_rejected() {
        assert!(send_signal(0, StopSignal::Interrupt).is_err());
        assert!(kill_tree(u32::MAX).is_err());
    }

    #[test]
    fn test_interrupt_stops_child() {
        let mut child = Command::new("/bin/sleep").arg("60").spawn().unwrap();
        send_signal(child.id(), StopSignal::Interrupt).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    /// Zombies still answer `kill(pid, 0)`, so look at the process state.
    #[cfg(target_os = "linux")]
    fn is_running(pid: Pid) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .is_some_and(|(_, rest)| !rest.starts_with('Z')),
            Err(_) => false,
        }
    }

    #[test]
    fn test_signal_to_reaped_child_is_delivered() {
        let mut child = Command::new("/bin/true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(send_signal(pid, StopSignal::Interrupt).is_ok());
        assert!(send_signal(pid, StopSignal::Quit).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_kill_tree_reaches_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 60 & echo $! > {}; wait", pid_file.display());
        let mut child = Command::new("/bin/sh")
            .args(["-c", &script])
            .process_group(0)
            .spawn()
            .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let grandchild = loop {
            if let Ok(raw) = std::fs::read_to_string(&pid_file)
                && let Ok(pid) = raw.trim().parse::<i32>()
            {
                break Pid::from_raw(pid);
            }
            assert!(std::time::Instant::now() < deadline, "grandchild never started");
            std::thread::sleep(std::time::Duration::from_millis(20));
        };

        kill_tree(child.id()).unwrap();
        child.wait().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while is_running(grandchild) {
            assert!(std::time::Instant::now() < deadline, "grandchild survived");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }

    #[test]
    fn test_kill_tree_of_gone_group_is_ok() {
        let mut child = Command::new("/bin/true").process_group(0).spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(kill_tree(pid).is_ok());
    }
}
