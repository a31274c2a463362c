// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
// Test code is allowed to panic on broken fixtures.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod config;
pub mod controller;
mod env;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod platform;
mod printer;
pub mod recovery;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{RecoveryAction, RecoveryKind, ServiceConfig, StartType, StopSignal, StopSignals};
pub use controller::{ControlRequest, ServiceController, ServiceOutcome, StatusReporter};
pub use errors::{
    CompanionLaunchError, ConfigError, ForceKillError, LaunchError, SignalDeliveryError,
    StoreError,
};
pub use launcher::{ChildExit, LaunchSpec, Launcher, ProcessLauncher, RunningChild};
pub use logging::{FacadeSink, FileLog, LogLevel, LogSink, Logger, TeeSink};
pub use platform::{NativeProcessControl, ProcessControl};
pub use recovery::{GiveUpReason, RecoveryDecision, RecoveryPolicyEngine, RestartCounter};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase, ShutdownReport};
pub use state::{ServiceState, ServiceStatus};
pub use store::{ConfigStore, YamlConfigStore};
