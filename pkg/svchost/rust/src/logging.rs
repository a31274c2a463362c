// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service event logging.
//!
//! The supervision engine never touches a global logger. It receives a
//! [`Logger`] at construction: a leveled sink for service events (console,
//! plus the system event log when running under the service manager) and a
//! verbose sink for step-by-step diagnostics. Both discard by default.
//!
//! [`FileLog`] copies everything that goes through the `log` facade into a
//! file, for the cases where nobody is watching the console.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Path of an extra log file, see [`FileLog`].
pub const LOG_FILE_ENV: &str = "DD_SVCHOST_LOG_FILE";

/// Service lifecycle (starting, running, stopped).
pub const EVENT_LIFECYCLE: u32 = 1;
/// The executable could not be launched.
pub const EVENT_LAUNCH_FAILED: u32 = 2;
/// Child exits and recovery handling.
pub const EVENT_RECOVERY: u32 = 3;
/// Control request the service does not handle.
pub const EVENT_UNEXPECTED_CONTROL: u32 = 4;
/// The service runner itself failed.
pub const EVENT_RUN_FAILED: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, event_id: u32, message: &str);
}

pub struct DiscardSink;

impl LogSink for DiscardSink {
    fn log(&self, _level: LogLevel, _event_id: u32, _message: &str) {}
}

/// Forwards service events to the `log` facade.
pub struct FacadeSink {
    target: &'static str,
    /// Verbose sinks log everything at debug level.
    verbose: bool,
}

impl FacadeSink {
    pub fn events() -> Self {
        Self {
            target: "service",
            verbose: false,
        }
    }

    pub fn verbose() -> Self {
        Self {
            target: "service::debug",
            verbose: true,
        }
    }
}

impl LogSink for FacadeSink {
    fn log(&self, level: LogLevel, event_id: u32, message: &str) {
        let level = match (self.verbose, level) {
            (true, _) => log::Level::Debug,
            (false, LogLevel::Info) => log::Level::Info,
            (false, LogLevel::Warning) => log::Level::Warn,
            (false, LogLevel::Error) => log::Level::Error,
        };
        log::log!(target: self.target, level, "[{event_id}] {message}");
    }
}

/// Sends every entry to each of its sinks.
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for TeeSink {
    fn log(&self, level: LogLevel, event_id: u32, message: &str) {
        for sink in &self.sinks {
            sink.log(level, event_id, message);
        }
    }
}

/// A `log` backend that hands records to `inner` and appends them to a file.
pub struct FileLog {
    inner: Box<dyn log::Log>,
    file: Mutex<File>,
}

impl FileLog {
    pub fn open(inner: Box<dyn log::Log>, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner,
            file: Mutex::new(file),
        })
    }
}

impl log::Log for FileLog {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.inner.log(record);

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        if let Ok(mut file) = self.file.lock() {
            // A full disk must not take the service down with it.
            let _ = writeln!(
                file,
                "{timestamp} {:<5} [{}] {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

#[derive(Clone)]
pub struct Logger {
    events: Arc<dyn LogSink>,
    verbose: Arc<dyn LogSink>,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            events: Arc::new(DiscardSink),
            verbose: Arc::new(DiscardSink),
        }
    }
}

impl Logger {
    pub fn new(events: Arc<dyn LogSink>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: Arc<dyn LogSink>) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn info(&self, event_id: u32, message: impl AsRef<str>) {
        self.events.log(LogLevel::Info, event_id, message.as_ref());
    }

    pub fn warning(&self, event_id: u32, message: impl AsRef<str>) {
        self.events.log(LogLevel::Warning, event_id, message.as_ref());
    }

    pub fn error(&self, event_id: u32, message: impl AsRef<str>) {
        self.events.log(LogLevel::Error, event_id, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.verbose.log(LogLevel::Info, 0, message.as_ref());
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}
