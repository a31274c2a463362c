// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

/// OS-visible service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Launching the executable.
    StartPending,
    /// Child process is alive.
    Running,
    /// Shutdown protocol in progress.
    StopPending,
    /// Terminal.
    Stopped,
}

impl ServiceState {
    pub fn is_terminal(self) -> bool {
        self == ServiceState::Stopped
    }

    pub(crate) fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (StartPending, Running)
                | (StartPending, Stopped)
                | (Running, StopPending)
                | (Running, Stopped)
                | (StopPending, Stopped)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::StartPending => write!(f, "start pending"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::StopPending => write!(f, "stop pending"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Status reported to the service-control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Stop and shutdown requests are only accepted while running.
    pub accepts_stop: bool,
    /// Service-specific exit code, only meaningful once stopped.
    pub exit_code: u32,
}

impl ServiceStatus {
    pub fn start_pending() -> Self {
        Self {
            state: ServiceState::StartPending,
            accepts_stop: false,
            exit_code: 0,
        }
    }

    pub fn running() -> Self {
        Self {
            state: ServiceState::Running,
            accepts_stop: true,
            exit_code: 0,
        }
    }

    pub fn stop_pending() -> Self {
        Self {
            state: ServiceState::StopPending,
            accepts_stop: false,
            exit_code: 0,
        }
    }

    pub fn stopped(exit_code: u32) -> Self {
        Self {
            state: ServiceState::Stopped,
            accepts_stop: false,
            exit_code,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.state.is_terminal() {
            write!(f, "{} (exit code {})", self.state, self.exit_code)
        } else {
            write!(f, "{}", self.state)
        }
    }
}
