// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The supervision loop behind a running service.
//!
//! A single task owns the current child handle and the recovery engine and
//! waits on two sources: the child's completion event and the stream of
//! control requests coming from the OS. Handlers never run concurrently, so
//! a restart (including its delay) always finishes before the next control
//! request is looked at.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::ServiceConfig;
use crate::errors::LaunchError;
use crate::launcher::{ChildExit, LaunchSpec, Launcher, RunningChild};
use crate::logging::{
    EVENT_LAUNCH_FAILED, EVENT_LIFECYCLE, EVENT_RECOVERY, EVENT_UNEXPECTED_CONTROL, Logger,
};
use crate::platform::ProcessControl;
use crate::recovery::{RecoveryDecision, RecoveryPolicyEngine};
use crate::shutdown::ShutdownCoordinator;
use crate::state::ServiceStatus;

/// Request delivered by the service-control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Interrogate,
    Stop,
    Shutdown,
    /// Anything else the OS may send; carries a printable name.
    Other(String),
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::Interrogate => write!(f, "interrogate"),
            ControlRequest::Stop => write!(f, "stop"),
            ControlRequest::Shutdown => write!(f, "shutdown"),
            ControlRequest::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Receives every status change of the service.
pub trait StatusReporter: Send {
    fn report(&mut self, status: ServiceStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    Stopped,
    /// The executable could not be started at all.
    LaunchFailed,
    /// The child failed in a way the recovery policy could not absorb.
    Failed,
}

impl ServiceOutcome {
    pub fn exit_code(self) -> u32 {
        match self {
            ServiceOutcome::Stopped => 0,
            ServiceOutcome::LaunchFailed => 2,
            ServiceOutcome::Failed => 3,
        }
    }
}

enum Event {
    Exited(ChildExit),
    Control(Option<ControlRequest>),
}

enum ExitHandling {
    Relaunched(RunningChild),
    Finished(ServiceOutcome),
}

pub struct ServiceController {
    config: ServiceConfig,
    launcher: Arc<dyn Launcher>,
    engine: RecoveryPolicyEngine,
    shutdown: ShutdownCoordinator,
    logger: Logger,
    status: ServiceStatus,
}

impl ServiceController {
    pub fn new(
        config: ServiceConfig,
        launcher: Arc<dyn Launcher>,
        control: Arc<dyn ProcessControl>,
        logger: Logger,
    ) -> Self {
        Self {
            engine: RecoveryPolicyEngine::new(launcher.clone(), logger.clone()),
            shutdown: ShutdownCoordinator::new(control, logger.clone()),
            config,
            launcher,
            logger,
            status: ServiceStatus::start_pending(),
        }
    }

    /// Override the shutdown grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.shutdown = self.shutdown.with_grace(grace);
        self
    }

    /// Run the service until it reaches `Stopped`. The final status carries
    /// the outcome's exit code.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<ControlRequest>,
        reporter: &mut dyn StatusReporter,
    ) -> ServiceOutcome {
        reporter.report(self.status);

        let mut child = match self.launch() {
            Ok(child) => child,
            Err(e) => {
                self.logger.error(EVENT_LAUNCH_FAILED, e.to_string());
                let outcome = ServiceOutcome::LaunchFailed;
                self.transition(reporter, ServiceStatus::stopped(outcome.exit_code()));
                return outcome;
            }
        };

        self.transition(reporter, ServiceStatus::running());
        self.logger.info(
            EVENT_LIFECYCLE,
            format!("Service {} is running...", self.config.name),
        );

        let outcome = loop {
            let event = tokio::select! {
                exit = child.wait() => Event::Exited(exit),
                request = requests.recv() => Event::Control(request),
            };

            match event {
                Event::Exited(exit) => match self.handle_exit(exit).await {
                    ExitHandling::Relaunched(next) => child = next,
                    ExitHandling::Finished(outcome) => break outcome,
                },
                Event::Control(Some(ControlRequest::Interrogate)) => reporter.report(self.status),
                Event::Control(Some(ControlRequest::Stop | ControlRequest::Shutdown)) => {
                    self.logger.info(
                        EVENT_LIFECYCLE,
                        "Received shutdown command, shutting down...",
                    );
                    break self.stop(&mut child, reporter).await;
                }
                Event::Control(Some(ControlRequest::Other(name))) => {
                    self.logger.warning(
                        EVENT_UNEXPECTED_CONTROL,
                        format!("Unexpected control request received: {name}"),
                    );
                }
                Event::Control(None) => {
                    self.logger.info(
                        EVENT_LIFECYCLE,
                        "Service control channel closed, shutting down...",
                    );
                    break self.stop(&mut child, reporter).await;
                }
            }
        };

        self.transition(reporter, ServiceStatus::stopped(outcome.exit_code()));
        match outcome {
            ServiceOutcome::Stopped => self.logger.info(
                EVENT_LIFECYCLE,
                format!("Service {} stopped...", self.config.name),
            ),
            _ => self.logger.error(
                EVENT_RECOVERY,
                format!("Service {} unexpectedly stopped...", self.config.name),
            ),
        }
        outcome
    }

    fn launch(&self) -> Result<RunningChild, LaunchError> {
        let spec = LaunchSpec::from_config(&self.config)?;
        self.logger.debug(format!(
            "launching {} {:?}",
            spec.program.display(),
            spec.args
        ));
        self.launcher.start(&spec)
    }

    async fn handle_exit(&mut self, exit: ChildExit) -> ExitHandling {
        let executable = self.config.executable.display().to_string();
        let code = match exit {
            ChildExit::Exited(0) => {
                self.logger.info(
                    EVENT_LIFECYCLE,
                    format!("Executable '{executable}' exited cleanly"),
                );
                return ExitHandling::Finished(ServiceOutcome::Stopped);
            }
            ChildExit::Terminated => {
                self.logger.info(
                    EVENT_LIFECYCLE,
                    format!("Executable '{executable}' was terminated by a signal"),
                );
                return ExitHandling::Finished(ServiceOutcome::Stopped);
            }
            ChildExit::WaitFailed(reason) => {
                self.logger.error(
                    EVENT_RECOVERY,
                    format!("Lost track of executable '{executable}': {reason}"),
                );
                return ExitHandling::Finished(ServiceOutcome::Failed);
            }
            ChildExit::Exited(code) => code,
        };

        self.logger.error(
            EVENT_RECOVERY,
            format!("Executable '{executable}' exited with code {code}"),
        );
        match self
            .engine
            .evaluate(code, &self.config.recovery_actions)
            .await
        {
            RecoveryDecision::Restart => {
                self.logger.info(
                    EVENT_RECOVERY,
                    format!("Restarting service {}", self.config.name),
                );
                match self.launch() {
                    Ok(child) => ExitHandling::Relaunched(child),
                    Err(e) => {
                        self.logger.error(EVENT_RECOVERY, e.to_string());
                        ExitHandling::Finished(ServiceOutcome::Failed)
                    }
                }
            }
            RecoveryDecision::Stop => ExitHandling::Finished(ServiceOutcome::Stopped),
            RecoveryDecision::GiveUp(reason) => {
                self.logger.error(EVENT_RECOVERY, format!("Giving up: {reason}"));
                ExitHandling::Finished(ServiceOutcome::Failed)
            }
        }
    }

    async fn stop(
        &mut self,
        child: &mut RunningChild,
        reporter: &mut dyn StatusReporter,
    ) -> ServiceOutcome {
        self.transition(reporter, ServiceStatus::stop_pending());
        let report = self
            .shutdown
            .shutdown(child, &self.config.stop_signals)
            .await;
        self.logger.debug(format!(
            "shutdown finished after {:?}: {:?}",
            report.phases, report.exit
        ));
        if report.signal_delivery_exhausted {
            ServiceOutcome::Failed
        } else {
            ServiceOutcome::Stopped
        }
    }

    fn transition(&mut self, reporter: &mut dyn StatusReporter, next: ServiceStatus) {
        if !self.status.state.can_transition_to(next.state) {
            self.logger.debug(format!(
                "unexpected state change {} -> {}",
                self.status.state, next.state
            ));
        }
        self.status = next;
        reporter.report(next);
    }
}
