// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Decides what happens after the supervised executable exits with a
//! non-zero code.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RecoveryAction;
use crate::launcher::Launcher;
use crate::logging::{EVENT_RECOVERY, Logger};

/// Policy-driven restarts within the current reset window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartCounter {
    pub count: u32,
    pub last_restart: Option<Instant>,
}

impl RestartCounter {
    /// Zero the counter when the last restart is older than `reset_after`.
    /// Returns whether a reset happened.
    fn reset_if_stale(&mut self, now: Instant, reset_after: Duration) -> bool {
        match self.last_restart {
            Some(last) if now.saturating_duration_since(last) > reset_after => {
                self.count = 0;
                true
            }
            _ => false,
        }
    }

    fn record(&mut self, now: Instant) {
        self.count += 1;
        self.last_restart = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// No recovery action for this exit code.
    Unhandled { exit_code: i32 },
    LimitExceeded { max_restarts: u32 },
    /// The action only runs a companion program, and it failed to start.
    CompanionLaunchFailed,
    /// The action only runs a companion program.
    NoRestart,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::Unhandled { exit_code } => {
                write!(f, "no recovery action defined for exit code {exit_code}")
            }
            GiveUpReason::LimitExceeded { max_restarts } => {
                write!(f, "restart limit of {max_restarts} reached")
            }
            GiveUpReason::CompanionLaunchFailed => write!(f, "companion program failed to start"),
            GiveUpReason::NoRestart => write!(f, "recovery action does not restart"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    Restart,
    /// Stop the service gracefully.
    Stop,
    GiveUp(GiveUpReason),
}

/// Owns the restart counter of one supervised session.
pub struct RecoveryPolicyEngine {
    launcher: Arc<dyn Launcher>,
    counter: RestartCounter,
    logger: Logger,
}

impl RecoveryPolicyEngine {
    pub fn new(launcher: Arc<dyn Launcher>, logger: Logger) -> Self {
        Self {
            launcher,
            counter: RestartCounter::default(),
            logger,
        }
    }

    pub fn counter(&self) -> RestartCounter {
        self.counter
    }

    /// Evaluate the action table for `exit_code`.
    ///
    /// A restart decision sleeps for the configured delay before returning,
    /// so the caller is suspended for the whole pause.
    pub async fn evaluate(
        &mut self,
        exit_code: i32,
        actions: &BTreeMap<i32, RecoveryAction>,
    ) -> RecoveryDecision {
        let Some(action) = actions.get(&exit_code) else {
            self.logger.debug(format!("no recovery action for exit code {exit_code}"));
            return RecoveryDecision::GiveUp(GiveUpReason::Unhandled { exit_code });
        };

        self.logger.info(EVENT_RECOVERY, "Applying defined recovery action...");
        if action.action.is_none() {
            self.logger.info(EVENT_RECOVERY, "Stopping service gracefully...");
            return RecoveryDecision::Stop;
        }

        let mut companion_failed = false;
        if action.action.run_program {
            companion_failed = !self.run_companion(action);
        }

        if !action.action.restart {
            return RecoveryDecision::GiveUp(if companion_failed {
                GiveUpReason::CompanionLaunchFailed
            } else {
                GiveUpReason::NoRestart
            });
        }

        let now = Instant::now();
        if self.counter.reset_if_stale(now, action.reset_after()) {
            self.logger.info(EVENT_RECOVERY, "Resetting restart counter...");
        }

        if action.max_restarts > 0 && self.counter.count >= action.max_restarts {
            self.logger.error(
                EVENT_RECOVERY,
                format!("Restart limit of {} reached", action.max_restarts),
            );
            return RecoveryDecision::GiveUp(GiveUpReason::LimitExceeded {
                max_restarts: action.max_restarts,
            });
        }

        self.counter.record(now);
        let delay = action.delay();
        if !delay.is_zero() {
            self.logger
                .debug(format!("waiting {}s before restart", delay.as_secs()));
            tokio::time::sleep(delay).await;
        }
        RecoveryDecision::Restart
    }

    fn run_companion(&self, action: &RecoveryAction) -> bool {
        let program = action.program.as_deref().unwrap_or_default();
        self.logger.info(
            EVENT_RECOVERY,
            format!("Executing defined program '{program}'..."),
        );
        match self.launcher.spawn_companion(program, &action.arguments) {
            Ok(pid) => {
                self.logger.debug(format!("companion '{program}' started (pid={pid})"));
                true
            }
            Err(e) => {
                self.logger.error(EVENT_RECOVERY, e.to_string());
                false
            }
        }
    }
}
