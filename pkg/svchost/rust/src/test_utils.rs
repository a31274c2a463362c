// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Fakes shared by the unit tests: an in-memory log sink, a scripted
//! launcher and a recording process-control double.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::StopSignal;
use crate::controller::StatusReporter;
use crate::errors::{CompanionLaunchError, ForceKillError, LaunchError, SignalDeliveryError};
use crate::launcher::{ChildExit, LaunchSpec, Launcher, RunningChild};
use crate::logging::{LogLevel, LogSink};
use crate::platform::ProcessControl;
use crate::state::{ServiceState, ServiceStatus};

#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(LogLevel, u32, String)>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<(LogLevel, u32, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, _, m)| m).collect()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.messages().iter().any(|m| m.contains(pattern))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, event_id: u32, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((level, event_id, message.to_string()));
    }
}

/// Launcher whose children only exit when the test says so.
#[derive(Default)]
pub struct FakeLauncher {
    inner: Mutex<FakeLauncherState>,
}

#[derive(Default)]
struct FakeLauncherState {
    next_pid: u32,
    fail_starts: VecDeque<bool>,
    fail_companions: bool,
    exits: Vec<oneshot::Sender<ChildExit>>,
    starts: usize,
    companions: Vec<(String, Vec<String>)>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `start` call fails.
    pub fn fail_next_start(&self) {
        self.inner.lock().unwrap().fail_starts.push_back(true);
    }

    pub fn fail_companions(&self) {
        self.inner.lock().unwrap().fail_companions = true;
    }

    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    pub fn companions(&self) -> Vec<(String, Vec<String>)> {
        self.inner.lock().unwrap().companions.clone()
    }

    /// Complete the most recently started child.
    pub fn exit_latest(&self, exit: ChildExit) {
        if let Some(tx) = self.inner.lock().unwrap().exits.pop() {
            let _ = tx.send(exit);
        }
    }

    /// Wait until `n` children have been started.
    pub async fn wait_for_starts(&self, n: usize) {
        while self.starts() < n {
            tokio::task::yield_now().await;
        }
    }
}

impl Launcher for FakeLauncher {
    fn start(&self, spec: &LaunchSpec) -> Result<RunningChild, LaunchError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_starts.pop_front().unwrap_or(false) {
            return Err(LaunchError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        inner.starts += 1;
        inner.next_pid += 1;
        let pid = 1000 + inner.next_pid;
        let (tx, rx) = oneshot::channel();
        inner.exits.push(tx);
        Ok(RunningChild::new(pid, rx))
    }

    fn spawn_companion(&self, program: &str, args: &[String]) -> Result<u32, CompanionLaunchError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_companions || !Path::new(program).is_absolute() {
            return Err(CompanionLaunchError {
                program: program.to_string(),
                reason: "not found".to_string(),
            });
        }
        inner.companions.push((program.to_string(), args.to_vec()));
        Ok(4242)
    }
}

/// Records signals and kills. A child "honors" a signal when it is listed in
/// `honored`, in which case the matching launcher child is completed.
pub struct FakeProcessControl {
    pub launcher: Arc<FakeLauncher>,
    honored: Vec<StopSignal>,
    failing: Vec<StopSignal>,
    kill_fails: bool,
    log: Mutex<Vec<String>>,
}

impl FakeProcessControl {
    pub fn new(launcher: Arc<FakeLauncher>) -> Self {
        Self {
            launcher,
            honored: Vec::new(),
            failing: Vec::new(),
            kill_fails: false,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn honoring(mut self, signal: StopSignal) -> Self {
        self.honored.push(signal);
        self
    }

    pub fn failing(mut self, signal: StopSignal) -> Self {
        self.failing.push(signal);
        self
    }

    pub fn with_failing_kill(mut self) -> Self {
        self.kill_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn killed(&self) -> bool {
        self.calls().iter().any(|c| c.starts_with("kill_tree"))
    }
}

#[async_trait]
impl ProcessControl for FakeProcessControl {
    fn send_signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalDeliveryError> {
        self.log.lock().unwrap().push(format!("{signal} {pid}"));
        if self.failing.contains(&signal) {
            return Err(SignalDeliveryError {
                pid,
                signal,
                reason: "no window".to_string(),
            });
        }
        if self.honored.contains(&signal) {
            self.launcher.exit_latest(ChildExit::Exited(0));
        }
        Ok(())
    }

    async fn kill_tree(&self, pid: u32) -> Result<(), ForceKillError> {
        self.log.lock().unwrap().push(format!("kill_tree {pid}"));
        // The child goes away even when the kill reports an error.
        self.launcher.exit_latest(ChildExit::Terminated);
        if self.kill_fails {
            return Err(ForceKillError {
                pid,
                reason: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

/// Collects every reported status; clones share the same history.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    statuses: Arc<Mutex<Vec<ServiceStatus>>>,
}

impl RecordingReporter {
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<ServiceState> {
        self.statuses().iter().map(|s| s.state).collect()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&mut self, status: ServiceStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}
