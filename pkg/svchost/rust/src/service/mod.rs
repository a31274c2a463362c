// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Glue between a stored service configuration and the OS: running it under
//! the service manager (or in the foreground) and keeping the OS registration
//! in sync with the store.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};

use crate::config::ServiceConfig;
use crate::controller::ServiceController;
use crate::launcher::ProcessLauncher;
use crate::logging::{FacadeSink, LogSink, Logger, TeeSink};
use crate::platform::NativeProcessControl;

pub mod console;
#[cfg(windows)]
mod windows;

/// How long `remove` waits for a running service to stop.
#[cfg_attr(not(windows), allow(dead_code))]
const REMOVE_STOP_TIMEOUT: Duration = Duration::from_secs(30);

fn service_logger(extra_events: Option<Arc<dyn LogSink>>) -> Logger {
    let facade: Arc<dyn LogSink> = Arc::new(FacadeSink::events());
    let events = match extra_events {
        Some(extra) => Arc::new(TeeSink::new(vec![facade, extra])),
        None => facade,
    };
    Logger::new(events).with_verbose(Arc::new(FacadeSink::verbose()))
}

/// `extra_events` receives service events in addition to the `log` facade.
pub(crate) fn build_controller(
    config: ServiceConfig,
    extra_events: Option<Arc<dyn LogSink>>,
) -> ServiceController {
    let logger = service_logger(extra_events);
    let grace = config.stop_timeout();
    ServiceController::new(
        config,
        Arc::new(ProcessLauncher::new()),
        Arc::new(NativeProcessControl),
        logger,
    )
    .with_grace(grace)
}

/// Supervise `config` until it stops. Returns the exit code of the host
/// process.
pub fn run(config: ServiceConfig, console: bool) -> Result<u32> {
    #[cfg(windows)]
    if !console {
        return windows::run(config);
    }
    #[cfg(not(windows))]
    if !console {
        log::debug!("no service manager integration on this platform, running in the foreground");
    }
    console::run(config)
}

/// Create the OS service entry. `config_dir` is handed back to the host when
/// the service manager starts it.
pub fn register(config: &ServiceConfig, config_dir: &Path) -> Result<()> {
    #[cfg(windows)]
    return windows::register(config, config_dir);
    #[cfg(not(windows))]
    {
        log::debug!(
            "no service manager registration for '{}' ({}) on this platform",
            config.name,
            config_dir.display()
        );
        Ok(())
    }
}

pub fn update(config: &ServiceConfig, config_dir: &Path) -> Result<()> {
    #[cfg(windows)]
    return windows::update(config, config_dir);
    #[cfg(not(windows))]
    {
        log::debug!(
            "no service manager entry to update for '{}' ({})",
            config.name,
            config_dir.display()
        );
        Ok(())
    }
}

/// Poll `is_stopped` every `interval` until it holds, failing once `limit`
/// has passed.
#[cfg_attr(not(windows), allow(dead_code))]
fn wait_until_stopped(
    mut is_stopped: impl FnMut() -> Result<bool>,
    limit: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + limit;
    loop {
        if is_stopped()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("service did not stop within {}s", limit.as_secs());
        }
        std::thread::sleep(interval);
    }
}

/// Stop the service if it is running, then delete the OS service entry.
pub fn deregister(name: &str) -> Result<()> {
    #[cfg(windows)]
    return windows::deregister(name);
    #[cfg(not(windows))]
    {
        log::debug!("no service manager entry to delete for '{name}'");
        Ok(())
    }
}
