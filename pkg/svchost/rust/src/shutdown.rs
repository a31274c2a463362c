// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Graceful stop of the supervised process: cooperative signals first, a
//! bounded grace period, then termination of the whole process tree.

use std::sync::Arc;

use tokio::time::{Duration, timeout};

use crate::config::{DEFAULT_STOP_TIMEOUT, StopSignal, StopSignals};
use crate::launcher::{ChildExit, RunningChild};
use crate::logging::{EVENT_LIFECYCLE, Logger};
use crate::platform::ProcessControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Signaling,
    WaitingForExit,
    ForceKilling,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Phases in the order they were entered.
    pub phases: Vec<ShutdownPhase>,
    pub delivered: Vec<StopSignal>,
    pub failed: Vec<StopSignal>,
    pub force_killed: bool,
    /// Signals were configured but none could be delivered.
    pub signal_delivery_exhausted: bool,
    pub exit: ChildExit,
}

pub struct ShutdownCoordinator {
    control: Arc<dyn ProcessControl>,
    grace: Duration,
    logger: Logger,
}

impl ShutdownCoordinator {
    pub fn new(control: Arc<dyn ProcessControl>, logger: Logger) -> Self {
        Self {
            control,
            grace: DEFAULT_STOP_TIMEOUT,
            logger,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Stop `child` and wait for it to be gone. Always returns once the
    /// completion event arrived.
    pub async fn shutdown(&self, child: &mut RunningChild, signals: &StopSignals) -> ShutdownReport {
        let pid = child.pid();
        if let Ok(exit) = timeout(Duration::ZERO, child.wait()).await {
            self.logger.debug(format!("pid {pid} already exited, nothing to stop"));
            return ShutdownReport {
                phases: vec![ShutdownPhase::Done],
                delivered: Vec::new(),
                failed: Vec::new(),
                force_killed: false,
                signal_delivery_exhausted: false,
                exit,
            };
        }

        let mut phases = Vec::new();
        let mut delivered = Vec::new();
        let mut failed = Vec::new();

        if !signals.is_empty() {
            phases.push(ShutdownPhase::Signaling);
            for signal in signals.iter() {
                self.logger.debug(format!("sending {signal} to pid {pid}"));
                match self.control.send_signal(pid, signal) {
                    Ok(()) => delivered.push(signal),
                    Err(e) => {
                        self.logger.warning(EVENT_LIFECYCLE, e.to_string());
                        failed.push(signal);
                    }
                }
            }
        }
        let signal_delivery_exhausted = !signals.is_empty() && delivered.is_empty();

        if !delivered.is_empty() {
            phases.push(ShutdownPhase::WaitingForExit);
            if let Ok(exit) = timeout(self.grace, child.wait()).await {
                phases.push(ShutdownPhase::Done);
                return ShutdownReport {
                    phases,
                    delivered,
                    failed,
                    force_killed: false,
                    signal_delivery_exhausted,
                    exit,
                };
            }
            self.logger.warning(
                EVENT_LIFECYCLE,
                format!(
                    "pid {pid} did not exit within {}s, terminating process tree",
                    self.grace.as_secs()
                ),
            );
        } else if signal_delivery_exhausted {
            self.logger.warning(
                EVENT_LIFECYCLE,
                format!("no stop signal reached pid {pid}, terminating process tree"),
            );
        }

        phases.push(ShutdownPhase::ForceKilling);
        if let Err(e) = self.control.kill_tree(pid).await {
            self.logger.error(EVENT_LIFECYCLE, e.to_string());
        }
        let exit = child.wait().await;
        phases.push(ShutdownPhase::Done);

        ShutdownReport {
            phases,
            delivered,
            failed,
            force_killed: true,
            signal_delivery_exhausted,
            exit,
        }
    }
}
