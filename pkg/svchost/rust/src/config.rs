// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[cfg(unix)]
const DEFAULT_CONFIG_DIR: &str = "/etc/datadog-agent/services.d";
#[cfg(windows)]
const DEFAULT_CONFIG_DIR: &str = r"C:\ProgramData\Datadog\services.d";

pub const CONFIG_DIR_ENV: &str = "DD_SVCHOST_CONFIG_DIR";

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Everything needed to run one executable as a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub executable: PathBuf,
    /// Defaults to the directory containing the executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Overrides applied on top of the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_file: Option<PathBuf>,
    #[serde(default)]
    pub start_type: StartType,
    #[serde(default, skip_serializing_if = "StopSignals::is_empty")]
    pub stop_signals: StopSignals,
    /// Grace period between the stop signals and killing the process tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recovery_actions: BTreeMap<i32, RecoveryAction>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: None,
            executable: executable.into(),
            working_dir: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            environment_file: None,
            start_type: StartType::default(),
            stop_signals: StopSignals::default(),
            stop_timeout_sec: None,
            recovery_actions: BTreeMap::new(),
        }
    }

    /// Fill in everything an install can derive from the executable path:
    /// absolute executable, service name from the file name, display name
    /// and working directory. Also strips single quotes wrapping arguments.
    pub fn prepare(&mut self) -> Result<(), ConfigError> {
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::EmptyExecutable);
        }
        if let Ok(abs) = std::path::absolute(&self.executable) {
            debug!("using absolute executable path {}", abs.display());
            self.executable = abs;
        }

        if self.name.is_empty() {
            self.name = name_from_executable(&self.executable)?;
            debug!("derived service name '{}'", self.name);
        }

        trim_quoted_args(&mut self.args);

        if self.display_name.is_empty() {
            self.display_name = self.name.clone();
        }

        if self.working_dir.is_none() {
            self.working_dir = self.executable.parent().map(Path::to_path_buf);
        }

        Ok(())
    }

    /// Checks applied before a configuration is persisted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!("validating configuration of '{}'", self.name);
        validate_name(&self.name)?;

        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::EmptyExecutable);
        }
        if !self.executable.is_file() {
            return Err(ConfigError::NotAFile(self.executable.clone()));
        }

        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(ConfigError::InvalidEnvironment(key.clone()));
        }

        for (&key, action) in &self.recovery_actions {
            if key != action.exit_code {
                return Err(ConfigError::MismatchedExitCode {
                    key,
                    exit_code: action.exit_code,
                });
            }
            if action.action.run_program {
                let program = action
                    .program
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or(ConfigError::MissingProgram(key))?;
                if !Path::new(program).is_file() {
                    return Err(ConfigError::ProgramNotAFile {
                        exit_code: key,
                        program: PathBuf::from(program),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .clone()
            .or_else(|| self.executable.parent().map(Path::to_path_buf))
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout_sec
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STOP_TIMEOUT)
    }

    pub fn set_recovery_action(&mut self, action: RecoveryAction) {
        self.recovery_actions.insert(action.exit_code, action);
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn name_from_executable(executable: &Path) -> Result<String, ConfigError> {
    let file_name = executable
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConfigError::InvalidName(executable.display().to_string()))?;
    match file_name.rfind('.') {
        Some(0) => Err(ConfigError::InvalidName(file_name.to_string())),
        Some(idx) => Ok(file_name.get(..idx).unwrap_or(file_name).to_string()),
        None => Ok(file_name.to_string()),
    }
}

fn trim_quoted_args(args: &mut [String]) {
    for arg in args.iter_mut() {
        if arg.len() >= 2 && arg.starts_with('\'') && arg.ends_with('\'') {
            *arg = arg[1..arg.len() - 1].to_string();
        }
    }
}

/// How the OS should start the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StartType {
    #[default]
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "autostart")]
    AutoStart,
    #[serde(rename = "delayed")]
    DelayedAutoStart,
    #[serde(rename = "disabled")]
    Disabled,
}

impl StartType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "autostart" | "auto" => Some(Self::AutoStart),
            "delayed" | "delayed-autostart" => Some(Self::DelayedAutoStart),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::AutoStart => "autostart",
            Self::DelayedAutoStart => "delayed autostart",
            Self::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("invalid start type: '{s}'. Valid options: manual, autostart, delayed, disabled")
        })
    }
}

/// Cooperative shutdown request. Declaration order is delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    Quit,
    Close,
    Interrupt,
}

impl StopSignal {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quit" | "wm-quit" | "wmquit" => Some(Self::Quit),
            "close" | "wm-close" | "wmclose" => Some(Self::Close),
            "interrupt" | "ctrl-c" | "ctrlc" => Some(Self::Interrupt),
            _ => None,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Quit => "quit",
            Self::Close => "close",
            Self::Interrupt => "interrupt",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StopSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("invalid stop signal: '{s}'. Valid options: quit, close, interrupt")
        })
    }
}

/// Set of stop signals; iteration always yields quit, close, interrupt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopSignals(BTreeSet<StopSignal>);

impl StopSignals {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, signal: StopSignal) {
        self.0.insert(signal);
    }

    pub fn contains(&self, signal: StopSignal) -> bool {
        self.0.contains(&signal)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = StopSignal> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<StopSignal> for StopSignals {
    fn from_iter<I: IntoIterator<Item = StopSignal>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for StopSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Which recovery capabilities an action uses. Neither flag means the
/// service is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecoveryKind {
    pub restart: bool,
    pub run_program: bool,
}

impl RecoveryKind {
    pub const NONE: Self = Self {
        restart: false,
        run_program: false,
    };
    pub const RESTART: Self = Self {
        restart: true,
        run_program: false,
    };
    pub const RUN_PROGRAM: Self = Self {
        restart: false,
        run_program: true,
    };
    pub const RUN_AND_RESTART: Self = Self {
        restart: true,
        run_program: true,
    };

    pub fn is_none(&self) -> bool {
        !self.restart && !self.run_program
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::NONE),
            "restart" => Some(Self::RESTART),
            "run" => Some(Self::RUN_PROGRAM),
            "run-restart" | "restart-run" => Some(Self::RUN_AND_RESTART),
            _ => None,
        }
    }
}

impl fmt::Display for RecoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match (self.restart, self.run_program) {
            (false, false) => "none",
            (true, false) => "restart",
            (false, true) => "run",
            (true, true) => "run-restart",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RecoveryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("invalid recovery action: '{s}'. Valid options: none, restart, run, run-restart")
        })
    }
}

impl TryFrom<String> for RecoveryKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecoveryKind> for String {
    fn from(kind: RecoveryKind) -> Self {
        kind.to_string()
    }
}

/// What to do when the executable exits with `exit_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub exit_code: i32,
    pub action: RecoveryKind,
    /// Seconds to wait before restarting.
    #[serde(default)]
    pub delay_sec: u64,
    /// Restarts allowed within the reset window, 0 means unlimited.
    #[serde(default)]
    pub max_restarts: u32,
    /// Seconds without a restart after which the counter is cleared.
    #[serde(default)]
    pub reset_after_sec: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl RecoveryAction {
    pub fn new(exit_code: i32, action: RecoveryKind) -> Self {
        Self {
            exit_code,
            action,
            delay_sec: 0,
            max_restarts: 0,
            reset_after_sec: 0,
            program: None,
            arguments: Vec::new(),
        }
    }

    pub fn restart(exit_code: i32, delay_sec: u64, max_restarts: u32, reset_after_sec: u64) -> Self {
        Self {
            delay_sec,
            max_restarts,
            reset_after_sec,
            ..Self::new(exit_code, RecoveryKind::RESTART)
        }
    }

    pub fn run_program(exit_code: i32, program: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            program: Some(program.into()),
            arguments,
            ..Self::new(exit_code, RecoveryKind::RUN_PROGRAM)
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_sec)
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_after_sec)
    }
}
