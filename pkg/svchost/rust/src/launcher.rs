// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use log::{debug, info, warn};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::config::ServiceConfig;
use crate::env::{merge_environment, parse_environment_file};
use crate::errors::{CompanionLaunchError, LaunchError};

/// How a supervised child finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    /// Killed by a signal, no exit code available.
    Terminated,
    /// The exit status could not be observed.
    WaitFailed(String),
}

impl ChildExit {
    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ChildExit::Exited(code),
            None => ChildExit::Terminated,
        }
    }
}

/// Handle on one child lifetime. Replaced wholesale on every restart.
#[derive(Debug)]
pub struct RunningChild {
    pid: u32,
    completion: oneshot::Receiver<ChildExit>,
    exit: Option<ChildExit>,
}

impl RunningChild {
    pub fn new(pid: u32, completion: oneshot::Receiver<ChildExit>) -> Self {
        Self {
            pid,
            completion,
            exit: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Resolves once the watcher reports the exit. Cancel safe, and keeps
    /// returning the same result after the first completion.
    pub async fn wait(&mut self) -> ChildExit {
        if let Some(exit) = &self.exit {
            return exit.clone();
        }
        let exit = match (&mut self.completion).await {
            Ok(exit) => exit,
            Err(_) => ChildExit::WaitFailed("process watcher went away".to_string()),
        };
        self.exit = Some(exit.clone());
        exit
    }
}

/// Fully resolved launch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Environment is the inherited one, then the environment file, then the
    /// configured overrides.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, LaunchError> {
        let file_vars = match &config.environment_file {
            Some(path) => {
                parse_environment_file(path).map_err(|source| LaunchError::EnvironmentFile {
                    path: path.clone(),
                    source,
                })?
            }
            None => Vec::new(),
        };
        let overrides: Vec<(String, String)> = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            program: config.executable.clone(),
            args: config.args.clone(),
            working_dir: config.effective_working_dir(),
            env: merge_environment(std::env::vars(), &[file_vars, overrides]),
        })
    }
}

pub trait Launcher: Send + Sync {
    /// Spawn the supervised executable and a watcher task reporting its exit.
    fn start(&self, spec: &LaunchSpec) -> Result<RunningChild, LaunchError>;

    /// Fire-and-forget start of a recovery companion program.
    fn spawn_companion(&self, program: &str, args: &[String]) -> Result<u32, CompanionLaunchError>;
}

/// Launches real OS processes through `tokio::process`. Must be used from
/// within a tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for ProcessLauncher {
    fn start(&self, spec: &LaunchSpec) -> Result<RunningChild, LaunchError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.env_clear();
        cmd.envs(&spec.env);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        isolate_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| LaunchError::MissingPid {
            program: spec.program.clone(),
        })?;
        info!("spawned {} (pid={pid})", spec.program.display());

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => {
                    debug!("pid {pid} exited with {status}");
                    ChildExit::from_status(status)
                }
                Err(e) => ChildExit::WaitFailed(e.to_string()),
            };
            // The controller may already be gone during process teardown.
            let _ = tx.send(exit);
        });

        Ok(RunningChild::new(pid, rx))
    }

    fn spawn_companion(&self, program: &str, args: &[String]) -> Result<u32, CompanionLaunchError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| CompanionLaunchError {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        let pid = child.id().unwrap_or(0);
        info!("started companion program {program} (pid={pid})");

        let program = program.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("companion program {program} exited with {status}"),
                Err(e) => warn!("failed to wait on companion program {program}: {e}"),
            }
        });
        Ok(pid)
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    // The tree kill targets the whole group.
    cmd.process_group(0);
}

#[cfg(windows)]
fn isolate_process_group(cmd: &mut Command) {
    use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
    // Console control events are addressed by group id, which is the child pid.
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            env: std::env::vars().collect(),
        }
    }

    #[tokio::test]
    async fn test_clean_exit() {
        let mut child = ProcessLauncher::new().start(&sh("exit 0")).unwrap();
        assert!(child.pid() > 0);
        assert_eq!(child.wait().await, ChildExit::Exited(0));
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let mut child = ProcessLauncher::new().start(&sh("exit 7")).unwrap();
        assert_eq!(child.wait().await, ChildExit::Exited(7));
        // Repeated waits return the cached result.
        assert_eq!(child.wait().await, ChildExit::Exited(7));
    }

    #[tokio::test]
    async fn test_signal_termination_has_no_code() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let mut child = ProcessLauncher::new().start(&sh("sleep 60")).unwrap();
        kill(Pid::from_raw(child.pid() as i32), Signal::SIGKILL).unwrap();
        let exit = child.wait().await;
        assert_eq!(exit, ChildExit::Terminated);
    }

    #[tokio::test]
    async fn test_child_leads_its_own_process_group() {
        use nix::unistd::{Pid, getpgid};

        let mut child = ProcessLauncher::new().start(&sh("sleep 60")).unwrap();
        let pid = Pid::from_raw(child.pid() as i32);
        assert_eq!(getpgid(Some(pid)).unwrap(), pid);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).unwrap();
        child.wait().await;
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_launch_error() {
        let spec = LaunchSpec {
            program: PathBuf::from("/nonexistent/binary"),
            args: vec![],
            working_dir: None,
            env: BTreeMap::new(),
        };
        let err = ProcessLauncher::new().start(&spec).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut spec = sh(&format!("printf '%s:%s' \"$GREETING\" \"$(pwd)\" > {}", out.display()));
        spec.env.insert("GREETING".to_string(), "hello".to_string());
        spec.working_dir = Some(dir.path().to_path_buf());

        let mut child = ProcessLauncher::new().start(&spec).unwrap();
        assert_eq!(child.wait().await, ChildExit::Exited(0));

        let written = std::fs::read_to_string(&out).unwrap();
        let cwd = dir.path().canonicalize().unwrap();
        assert_eq!(written, format!("hello:{}", cwd.display()));
    }

    #[test]
    fn test_spec_from_config_layers_environment() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("env");
        std::fs::write(&env_file, "FROM_FILE=file\nSHARED=file\n").unwrap();

        let mut cfg = ServiceConfig::new("svc", "/opt/app/agent");
        cfg.args = vec!["run".to_string()];
        cfg.environment_file = Some(env_file);
        cfg.env.insert("SHARED".to_string(), "override".to_string());

        let spec = LaunchSpec::from_config(&cfg).unwrap();
        assert_eq!(spec.program, PathBuf::from("/opt/app/agent"));
        assert_eq!(spec.args, vec!["run"]);
        assert_eq!(spec.working_dir.as_deref(), Some(Path::new("/opt/app")));
        assert_eq!(spec.env["FROM_FILE"], "file");
        assert_eq!(spec.env["SHARED"], "override");
    }

    #[test]
    fn test_spec_from_config_missing_env_file() {
        let mut cfg = ServiceConfig::new("svc", "/opt/app/agent");
        cfg.environment_file = Some(PathBuf::from("/nonexistent/env"));
        assert!(matches!(
            LaunchSpec::from_config(&cfg),
            Err(LaunchError::EnvironmentFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_companion_start() {
        let launcher = ProcessLauncher::new();
        assert!(launcher.spawn_companion("/bin/true", &[]).is_ok());
        let err = launcher
            .spawn_companion("/nonexistent/notify", &["--crashed".to_string()])
            .unwrap_err();
        assert_eq!(err.program, "/nonexistent/notify");
    }
}
