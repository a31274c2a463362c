// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::StopSignal;

/// The supervised executable could not be spawned.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read environment file {path}: {source}")]
    EnvironmentFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("spawned {program} but the OS did not report a pid")]
    MissingPid { program: PathBuf },
}

/// A recovery companion program could not be spawned.
#[derive(Error, Debug)]
#[error("failed to start companion program '{program}': {reason}")]
pub struct CompanionLaunchError {
    pub program: String,
    pub reason: String,
}

#[derive(Error, Debug)]
#[error("failed to deliver {signal} to pid {pid}: {reason}")]
pub struct SignalDeliveryError {
    pub pid: u32,
    pub signal: StopSignal,
    pub reason: String,
}

#[derive(Error, Debug)]
#[error("failed to terminate process tree rooted at pid {pid}: {reason}")]
pub struct ForceKillError {
    pub pid: u32,
    pub reason: String,
}

/// Rejected service configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("service name can't be empty")]
    EmptyName,
    #[error("invalid service name '{0}'")]
    InvalidName(String),
    #[error("executable path can't be empty")]
    EmptyExecutable,
    #[error("executable path '{0}' isn't a binary file")]
    NotAFile(PathBuf),
    #[error("recovery action for exit code {0} has no program to run")]
    MissingProgram(i32),
    #[error("recovery action program '{program}' for exit code {exit_code} isn't a binary file")]
    ProgramNotAFile { exit_code: i32, program: PathBuf },
    #[error("recovery action stored under exit code {key} applies to exit code {exit_code}")]
    MismatchedExitCode { key: i32, exit_code: i32 },
    #[error("invalid environment entry '{0}', expected KEY=VALUE")]
    InvalidEnvironment(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("couldn't find service '{0}'")]
    NotFound(String),
    #[error("invalid service name '{0}'")]
    InvalidName(String),
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("serializing service '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}
