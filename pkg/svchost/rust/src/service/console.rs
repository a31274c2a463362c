// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Runs a service in the foreground, with process signals standing in for
//! the OS service-control channel.

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::sync::mpsc;

use crate::config::ServiceConfig;
use crate::controller::{ControlRequest, StatusReporter};
use crate::state::ServiceStatus;

use super::build_controller;

/// Logs every status change.
pub struct LogReporter {
    name: String,
}

impl LogReporter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StatusReporter for LogReporter {
    fn report(&mut self, status: ServiceStatus) {
        info!("service '{}' is {status}", self.name);
    }
}

pub fn run(config: ServiceConfig) -> Result<u32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let (tx, rx) = mpsc::unbounded_channel();
        forward_signals(tx)?;

        let mut reporter = LogReporter::new(config.name.clone());
        let controller = build_controller(config, None);
        let outcome = controller.run(rx, &mut reporter).await;
        Ok(outcome.exit_code())
    })
}

/// SIGINT stops, SIGTERM shuts down, SIGUSR1 interrogates.
#[cfg(unix)]
fn forward_signals(tx: mpsc::UnboundedSender<ControlRequest>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("failed to register SIGUSR1 handler")?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = sigint.recv() => ControlRequest::Stop,
                _ = sigterm.recv() => ControlRequest::Shutdown,
                _ = sigusr1.recv() => ControlRequest::Interrogate,
            };
            debug!("forwarding {request} request");
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    Ok(())
}

/// Ctrl-C and Ctrl-Break stop, console close and logoff shut down.
#[cfg(windows)]
fn forward_signals(tx: mpsc::UnboundedSender<ControlRequest>) -> Result<()> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown};

    let mut ctrl_c = ctrl_c().context("failed to register Ctrl-C handler")?;
    let mut ctrl_break = ctrl_break().context("failed to register Ctrl-Break handler")?;
    let mut ctrl_close = ctrl_close().context("failed to register console close handler")?;
    let mut ctrl_shutdown = ctrl_shutdown().context("failed to register shutdown handler")?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = ctrl_c.recv() => ControlRequest::Stop,
                _ = ctrl_break.recv() => ControlRequest::Stop,
                _ = ctrl_close.recv() => ControlRequest::Shutdown,
                _ = ctrl_shutdown.recv() => ControlRequest::Shutdown,
            };
            debug!("forwarding {request} request");
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    Ok(())
}

