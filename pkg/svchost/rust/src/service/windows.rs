// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::ffi::{OsStr, OsString};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::mpsc;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::EventLog::{
    DeregisterEventSource, EVENTLOG_ERROR_TYPE, EVENTLOG_INFORMATION_TYPE,
    EVENTLOG_WARNING_TYPE, RegisterEventSourceW, ReportEventW,
};
use windows_service::service::{
    ServiceAccess, ServiceControl, ServiceControlAccept, ServiceErrorControl, ServiceExitCode,
    ServiceInfo, ServiceStartType, ServiceState as ScmState, ServiceStatus as ScmStatus,
    ServiceType,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};
use windows_service::{define_windows_service, service_dispatcher};

use crate::config::{ServiceConfig, StartType};
use crate::controller::{ControlRequest, StatusReporter};
use crate::logging::{EVENT_LIFECYCLE, EVENT_RUN_FAILED, LogLevel, LogSink};
use crate::state::{ServiceState, ServiceStatus};

use super::{REMOVE_STOP_TIMEOUT, build_controller, console, service_logger, wait_until_stopped};

/// The process was not started by the service control manager.
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

/// Extra time the SCM should allow while a state change is pending.
const PENDING_WAIT_HINT: Duration = Duration::from_secs(5);

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

static SERVICE_CONFIG: OnceLock<ServiceConfig> = OnceLock::new();
static EXIT_CODE: AtomicU32 = AtomicU32::new(0);

define_windows_service!(ffi_service_main, service_main);

pub(super) fn run(config: ServiceConfig) -> Result<u32> {
    let name = config.name.clone();
    if SERVICE_CONFIG.set(config.clone()).is_err() {
        anyhow::bail!("service '{name}' is already running in this process");
    }

    match service_dispatcher::start(&name, ffi_service_main) {
        Ok(()) => Ok(EXIT_CODE.load(Ordering::SeqCst)),
        Err(windows_service::Error::Winapi(e))
            if e.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) =>
        {
            info!("not started by the service control manager, running '{name}' in the console");
            console::run(config)
        }
        Err(e) => Err(e).context("failed to start service dispatcher"),
    }
}

fn service_main(_arguments: Vec<OsString>) {
    let Some(config) = SERVICE_CONFIG.get().cloned() else {
        error!("service configuration was not set");
        EXIT_CODE.store(1, Ordering::SeqCst);
        return;
    };

    let event_log: Option<Arc<dyn LogSink>> = match EventLogSink::open(&config.name) {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            warn!("failed to open the event log for '{}': {e}", config.name);
            None
        }
    };
    let logger = service_logger(event_log.clone());
    logger.info(EVENT_LIFECYCLE, format!("Starting service {}...", config.name));

    if let Err(e) = run_under_scm(config, event_log) {
        logger.error(EVENT_RUN_FAILED, format!("Failed to run service: {e:#}"));
        EXIT_CODE.store(1, Ordering::SeqCst);
    }
}

fn run_under_scm(config: ServiceConfig, event_log: Option<Arc<dyn LogSink>>) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let event_handler = move |control: ServiceControl| -> ServiceControlHandlerResult {
        let (request, result) = match &control {
            ServiceControl::Interrogate => {
                (ControlRequest::Interrogate, ServiceControlHandlerResult::NoError)
            }
            ServiceControl::Stop => (ControlRequest::Stop, ServiceControlHandlerResult::NoError),
            ServiceControl::Shutdown => {
                (ControlRequest::Shutdown, ServiceControlHandlerResult::NoError)
            }
            other => (
                ControlRequest::Other(format!("{other:?}")),
                ServiceControlHandlerResult::NotImplemented,
            ),
        };
        if tx.send(request).is_err() {
            warn!("service controller is gone, dropping {control:?}");
        }
        result
    };
    let handle = service_control_handler::register(&config.name, event_handler)
        .context("failed to register service control handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let mut reporter = ScmReporter::new(handle);
    let controller = build_controller(config, event_log);
    let outcome = runtime.block_on(controller.run(rx, &mut reporter));
    EXIT_CODE.store(outcome.exit_code(), Ordering::SeqCst);
    Ok(())
}

/// Writes service events to the Windows event log under the service name.
struct EventLogSink {
    handle: HANDLE,
}

// SAFETY: event source handles may be used from any thread.
unsafe impl Send for EventLogSink {}
// SAFETY: `ReportEventW` is thread safe.
unsafe impl Sync for EventLogSink {}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

impl EventLogSink {
    fn open(source: &str) -> std::io::Result<Self> {
        let source = wide(source);
        // SAFETY: `source` is a NUL terminated UTF-16 string alive for the call.
        let handle = unsafe { RegisterEventSourceW(std::ptr::null(), source.as_ptr()) };
        if handle.is_null() {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { handle })
    }
}

impl LogSink for EventLogSink {
    fn log(&self, level: LogLevel, event_id: u32, message: &str) {
        let kind = match level {
            LogLevel::Info => EVENTLOG_INFORMATION_TYPE,
            LogLevel::Warning => EVENTLOG_WARNING_TYPE,
            LogLevel::Error => EVENTLOG_ERROR_TYPE,
        };
        let message = wide(message);
        let strings = [message.as_ptr()];
        // SAFETY: the handle is open until drop and `strings` holds one valid
        // NUL terminated string for the duration of the call.
        let ok = unsafe {
            ReportEventW(
                self.handle,
                kind,
                0,
                event_id,
                std::ptr::null_mut(),
                1,
                0,
                strings.as_ptr(),
                std::ptr::null(),
            )
        };
        if ok == 0 {
            warn!(
                "failed to write to the event log: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

impl Drop for EventLogSink {
    fn drop(&mut self) {
        // SAFETY: the handle came from `RegisterEventSourceW` and is released once.
        unsafe { DeregisterEventSource(self.handle) };
    }
}

/// Forwards status changes to the service control manager.
struct ScmReporter {
    handle: ServiceStatusHandle,
    checkpoint: u32,
}

impl ScmReporter {
    fn new(handle: ServiceStatusHandle) -> Self {
        Self {
            handle,
            checkpoint: 0,
        }
    }
}

impl StatusReporter for ScmReporter {
    fn report(&mut self, status: ServiceStatus) {
        let pending = matches!(
            status.state,
            ServiceState::StartPending | ServiceState::StopPending
        );
        self.checkpoint = if pending { self.checkpoint + 1 } else { 0 };

        let scm_status = ScmStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: match status.state {
                ServiceState::StartPending => ScmState::StartPending,
                ServiceState::Running => ScmState::Running,
                ServiceState::StopPending => ScmState::StopPending,
                ServiceState::Stopped => ScmState::Stopped,
            },
            controls_accepted: if status.accepts_stop {
                ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN
            } else {
                ServiceControlAccept::empty()
            },
            exit_code: match status.exit_code {
                0 => ServiceExitCode::Win32(0),
                code => ServiceExitCode::ServiceSpecific(code),
            },
            checkpoint: self.checkpoint,
            wait_hint: if pending {
                PENDING_WAIT_HINT
            } else {
                Duration::default()
            },
            process_id: None,
        };
        if let Err(e) = self.handle.set_service_status(scm_status) {
            warn!("failed to report {status} to the service control manager: {e}");
        }
    }
}

fn service_info(config: &ServiceConfig, config_dir: &Path) -> Result<ServiceInfo> {
    let executable_path =
        std::env::current_exe().context("failed to resolve the service host executable")?;
    Ok(ServiceInfo {
        name: OsString::from(&config.name),
        display_name: OsString::from(&config.display_name),
        service_type: ServiceType::OWN_PROCESS,
        start_type: match config.start_type {
            StartType::Manual => ServiceStartType::OnDemand,
            StartType::AutoStart | StartType::DelayedAutoStart => ServiceStartType::AutoStart,
            StartType::Disabled => ServiceStartType::Disabled,
        },
        error_control: ServiceErrorControl::Normal,
        executable_path,
        launch_arguments: vec![
            OsString::from("--config-dir"),
            config_dir.as_os_str().to_owned(),
            OsString::from("run"),
            OsString::from(&config.name),
        ],
        dependencies: vec![],
        account_name: None,
        account_password: None,
    })
}

fn apply_extras(service: &windows_service::service::Service, config: &ServiceConfig) -> Result<()> {
    service
        .set_description(config.description.as_deref().unwrap_or_default())
        .context("failed to set service description")?;
    service
        .set_delayed_auto_start(config.start_type == StartType::DelayedAutoStart)
        .context("failed to set delayed auto start")?;
    Ok(())
}

pub(super) fn register(config: &ServiceConfig, config_dir: &Path) -> Result<()> {
    let manager = ServiceManager::local_computer(
        None::<&str>,
        ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
    )
    .context("failed to connect to the service control manager")?;
    let info = service_info(config, config_dir)?;
    let service = manager
        .create_service(&info, ServiceAccess::CHANGE_CONFIG)
        .with_context(|| format!("failed to create service '{}'", config.name))?;
    apply_extras(&service, config)
}

pub(super) fn update(config: &ServiceConfig, config_dir: &Path) -> Result<()> {
    let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)
        .context("failed to connect to the service control manager")?;
    let service = manager
        .open_service(&config.name, ServiceAccess::CHANGE_CONFIG)
        .with_context(|| format!("failed to open service '{}'", config.name))?;
    service
        .change_config(&service_info(config, config_dir)?)
        .with_context(|| format!("failed to update service '{}'", config.name))?;
    apply_extras(&service, config)
}

pub(super) fn deregister(name: &str) -> Result<()> {
    let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)
        .context("failed to connect to the service control manager")?;
    let service = manager
        .open_service(
            name,
            ServiceAccess::STOP | ServiceAccess::QUERY_STATUS | ServiceAccess::DELETE,
        )
        .with_context(|| format!("failed to open service '{name}'"))?;

    let query = || -> Result<ScmState> {
        Ok(service
            .query_status()
            .with_context(|| format!("failed to query service '{name}'"))?
            .current_state)
    };
    let state = query()?;
    if state != ScmState::Stopped {
        info!("stopping service '{name}'");
        if state != ScmState::StopPending {
            service
                .stop()
                .with_context(|| format!("failed to stop service '{name}'"))?;
        }
        wait_until_stopped(
            || Ok(query()? == ScmState::Stopped),
            REMOVE_STOP_TIMEOUT,
            STOP_POLL_INTERVAL,
        )
        .with_context(|| format!("failed to stop service '{name}'"))?;
    }

    service
        .delete()
        .with_context(|| format!("failed to delete service '{name}'"))
}
