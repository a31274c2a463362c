// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use simple_logger::SimpleLogger;

use crate::config::{
    self, CONFIG_DIR_ENV, RecoveryAction, RecoveryKind, ServiceConfig, StartType, StopSignal,
};
use crate::env::parse_env_entry;
use crate::errors::StoreError;
use crate::logging::{FileLog, LOG_FILE_ENV};
use crate::printer::KeyValuePrinter;
use crate::service;
use crate::store::{ConfigStore, YamlConfigStore};

#[derive(Parser, Debug)]
#[command(name = "dd-service-host")]
#[command(about = "Run any executable as an OS service", long_about = None)]
pub struct Cli {
    /// Log debug output
    #[arg(short, long, global = true, env = "DD_SVCHOST_VERBOSE")]
    pub verbose: bool,

    /// Directory holding the service configurations
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    pub config_dir: Option<PathBuf>,

    /// Also append log output to this file, useful for services started by
    /// the service manager
    #[arg(long, global = true, env = LOG_FILE_ENV)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the version
    Version,
    /// List installed services
    List {
        /// Only show services whose name contains this word
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Install an executable as a service
    Install(InstallArgs),
    /// Change an installed service
    Edit(EditArgs),
    /// Remove an installed service
    Remove {
        name: String,
    },
    /// Run an installed service
    Run {
        name: String,
        /// Stay in the foreground instead of attaching to the service manager
        #[arg(long)]
        console: bool,
    },
    /// Manage recovery actions
    #[command(subcommand)]
    Recovery(RecoveryCommand),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Path to the executable
    #[arg(short = 'x', long)]
    pub executable: PathBuf,
    /// Service name, defaults to the executable name
    #[arg(short, long)]
    pub name: Option<String>,
    /// Working directory, defaults to the executable's directory
    #[arg(short, long = "workdir")]
    pub working_dir: Option<PathBuf>,
    #[arg(short = 'i', long)]
    pub display_name: Option<String>,
    #[arg(short, long = "desc")]
    pub description: Option<String>,
    /// Argument passed to the executable, in order (repeatable)
    #[arg(short, long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// KEY=VALUE environment override (repeatable)
    #[arg(short, long = "env", value_parser = parse_env_arg)]
    pub env: Vec<(String, String)>,
    /// File with KEY=VALUE lines loaded before the overrides
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    #[arg(long, default_value = "manual")]
    pub start_type: StartType,
    /// Signal sent to stop the executable (repeatable)
    #[arg(long = "stop-signal")]
    pub stop_signals: Vec<StopSignal>,
    /// Seconds to wait after the stop signals before killing the process tree
    #[arg(long)]
    pub stop_timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub name: String,
    #[arg(short = 'x', long)]
    pub executable: Option<PathBuf>,
    #[arg(short, long = "workdir")]
    pub working_dir: Option<PathBuf>,
    #[arg(short = 'i', long)]
    pub display_name: Option<String>,
    #[arg(short, long = "desc")]
    pub description: Option<String>,
    /// Replaces the argument list (repeatable)
    #[arg(short, long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// KEY=VALUE added to the environment overrides (repeatable)
    #[arg(short, long = "env", value_parser = parse_env_arg)]
    pub env: Vec<(String, String)>,
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    #[arg(long)]
    pub start_type: Option<StartType>,
    /// Added to the stop signals (repeatable)
    #[arg(long = "stop-signal")]
    pub stop_signals: Vec<StopSignal>,
    #[arg(long)]
    pub stop_timeout: Option<u64>,
    /// Clear the argument list
    #[arg(long)]
    pub no_args: bool,
    /// Clear the environment overrides and environment file
    #[arg(long)]
    pub no_env: bool,
    /// Clear the stop signals
    #[arg(long)]
    pub no_signal: bool,
}

#[derive(Subcommand, Debug)]
pub enum RecoveryCommand {
    /// Set the recovery action for an exit code
    Set(RecoverySetArgs),
    /// Delete the recovery action for an exit code
    Del {
        name: String,
        #[arg(allow_negative_numbers = true)]
        exit_code: i32,
    },
}

#[derive(Args, Debug)]
pub struct RecoverySetArgs {
    pub name: String,
    #[arg(short, long, allow_negative_numbers = true)]
    pub exit_code: i32,
    /// One of none, restart, run, run-restart
    #[arg(short, long)]
    pub action: RecoveryKind,
    /// Seconds to wait before restarting
    #[arg(short, long, default_value_t = 0)]
    pub delay: u64,
    /// Restarts allowed within the reset window, 0 means unlimited
    #[arg(short = 'r', long, default_value_t = 0)]
    pub max_restarts: u32,
    /// Seconds without a restart after which the counter is cleared
    #[arg(short = 'c', long, default_value_t = 0)]
    pub reset_after: u64,
    /// Program to run when the exit code is seen
    #[arg(short = 'x', long = "exec")]
    pub program: Option<String>,
    /// Arguments for the program, after `--`
    #[arg(last = true)]
    pub arguments: Vec<String>,
}

fn parse_env_arg(s: &str) -> Result<(String, String), String> {
    parse_env_entry(s).map_err(|e| e.to_string())
}

impl Cli {
    pub fn store(&self) -> YamlConfigStore {
        YamlConfigStore::new(self.config_dir.clone().unwrap_or_else(config::config_dir))
    }
}

/// Install the process-wide logger: console output through `simple_logger`,
/// copied into `log_file` when one is given.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let console = SimpleLogger::new().with_level(level);
    let Some(path) = log_file else {
        return console.init().context("failed to initialize logging");
    };

    let file_log = FileLog::open(Box::new(console), path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    log::set_boxed_logger(Box::new(file_log)).context("failed to initialize logging")?;
    log::set_max_level(level);
    Ok(())
}

/// Execute the parsed command line. Returns the exit code of the process.
pub fn execute(cli: Cli) -> Result<u32> {
    let store = cli.store();
    match cli.command {
        Command::Version => {
            writeln!(io::stdout(), "dd-service-host {}", env!("CARGO_PKG_VERSION"))?;
            Ok(0)
        }
        Command::List { filter } => {
            list(&store, filter.as_deref(), &mut io::stdout().lock())?;
            Ok(0)
        }
        Command::Install(args) => install(&store, args).map(|()| 0),
        Command::Edit(args) => edit(&store, args).map(|()| 0),
        Command::Remove { name } => remove(&store, &name).map(|()| 0),
        Command::Run { name, console } => {
            let config = store
                .load(&name)
                .with_context(|| format!("failed to load service '{name}'"))?;
            service::run(config, console)
        }
        Command::Recovery(RecoveryCommand::Set(args)) => recovery_set(&store, args).map(|()| 0),
        Command::Recovery(RecoveryCommand::Del { name, exit_code }) => {
            recovery_del(&store, &name, exit_code).map(|()| 0)
        }
    }
}

pub fn list(store: &impl ConfigStore, filter: Option<&str>, out: &mut impl Write) -> Result<()> {
    let services = store.list_all()?;
    let filter = filter.map(str::to_lowercase);
    let separator = "-".repeat(80);

    writeln!(out, "\nInstalled services:")?;
    writeln!(out, "{separator}")?;

    let mut p = KeyValuePrinter::new(5);
    for svc in services {
        if let Some(word) = &filter
            && !svc.name.to_lowercase().contains(word.as_str())
        {
            continue;
        }

        p.line("Name", &svc.name);
        p.line("Display Name", &svc.display_name);
        p.line("Description", svc.description.as_deref().unwrap_or_default());
        p.line("Executable Path", svc.executable.display());
        if let Some(dir) = svc.effective_working_dir() {
            p.line("Working Directory", dir.display());
        }
        if !svc.args.is_empty() {
            p.line("Arguments", svc.args.join(" "));
        }
        if !svc.env.is_empty() {
            let env: Vec<String> = svc.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
            p.line("Environment Variables", env.join(" "));
        }
        if let Some(file) = &svc.environment_file {
            p.line("Environment File", file.display());
        }
        p.line("Start Type", svc.start_type);
        if !svc.stop_signals.is_empty() {
            p.line("Stop Signal", &svc.stop_signals);
            p.line("Stop Timeout", format!("{}s", svc.stop_timeout().as_secs()));
        }

        let mut remaining = svc.recovery_actions.len();
        if remaining > 0 {
            p.label("Recovery Actions");
            p.indent();
            for action in svc.recovery_actions.values() {
                p.line("Exit Code", action.exit_code);
                p.line("Action", action.action);
                if action.action.restart {
                    p.line("Delay", format!("{}s", action.delay_sec));
                    p.line("Max Restarts", action.max_restarts);
                    p.line("Reset After", format!("{}s", action.reset_after_sec));
                }
                if action.action.run_program {
                    p.line("Program", action.program.as_deref().unwrap_or_default());
                    p.line("Arguments", format!("[{}]", action.arguments.join(", ")));
                }
                if remaining > 1 {
                    p.label("-");
                }
                remaining -= 1;
            }
            p.unindent();
        }

        p.write_to(out)?;
        writeln!(out, "{separator}")?;
    }
    Ok(())
}

fn install(store: &YamlConfigStore, args: InstallArgs) -> Result<()> {
    let mut cfg = ServiceConfig::new(args.name.unwrap_or_default(), args.executable);
    cfg.working_dir = args.working_dir;
    cfg.display_name = args.display_name.unwrap_or_default();
    cfg.description = args.description;
    cfg.args = args.args;
    cfg.env = args.env.into_iter().collect();
    cfg.environment_file = args.env_file;
    cfg.start_type = args.start_type;
    cfg.stop_signals = args.stop_signals.into_iter().collect();
    cfg.stop_timeout_sec = args.stop_timeout;

    cfg.prepare()?;
    cfg.validate()?;

    match store.load(&cfg.name) {
        Ok(_) => bail!("service '{}' is already installed", cfg.name),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    service::register(&cfg, store.dir())?;
    if let Err(e) = store.save(&cfg) {
        // Keep the OS and the store consistent.
        if let Err(cleanup) = service::deregister(&cfg.name) {
            log::warn!("failed to roll back registration of '{}': {cleanup:#}", cfg.name);
        }
        return Err(e.into());
    }
    info!("installed service '{}'", cfg.name);
    Ok(())
}

fn apply_edit(cfg: &mut ServiceConfig, args: EditArgs) {
    if let Some(exe) = args.executable {
        cfg.executable = exe;
    }
    if let Some(dir) = args.working_dir.filter(|d| !d.as_os_str().is_empty()) {
        cfg.working_dir = Some(dir);
    }
    if let Some(name) = args.display_name {
        cfg.display_name = name;
    }
    if let Some(desc) = args.description {
        cfg.description = Some(desc).filter(|d| !d.is_empty());
    }

    if args.no_args {
        cfg.args.clear();
    }
    if !args.args.is_empty() {
        cfg.args = args.args;
    }

    if args.no_env {
        cfg.env.clear();
        cfg.environment_file = None;
    }
    cfg.env.extend(args.env);
    if let Some(file) = args.env_file {
        cfg.environment_file = Some(file);
    }

    if let Some(start_type) = args.start_type {
        cfg.start_type = start_type;
    }

    if args.no_signal {
        cfg.stop_signals.clear();
    }
    for signal in args.stop_signals {
        cfg.stop_signals.insert(signal);
    }
    if args.stop_timeout.is_some() {
        cfg.stop_timeout_sec = args.stop_timeout;
    }
}

fn edit(store: &YamlConfigStore, args: EditArgs) -> Result<()> {
    let mut cfg = store
        .load(&args.name)
        .with_context(|| format!("failed to load service '{}'", args.name))?;
    apply_edit(&mut cfg, args);
    cfg.validate()?;
    service::update(&cfg, store.dir())?;
    store.save(&cfg)?;
    info!("updated service '{}'", cfg.name);
    Ok(())
}

fn remove(store: &YamlConfigStore, name: &str) -> Result<()> {
    store
        .load(name)
        .with_context(|| format!("failed to load service '{name}'"))?;
    service::deregister(name)?;
    store.remove(name)?;
    info!("removed service '{name}'");
    Ok(())
}

fn recovery_set(store: &impl ConfigStore, args: RecoverySetArgs) -> Result<()> {
    let mut cfg = store
        .load(&args.name)
        .with_context(|| format!("failed to load service '{}'", args.name))?;
    let action = RecoveryAction {
        exit_code: args.exit_code,
        action: args.action,
        delay_sec: args.delay,
        max_restarts: args.max_restarts,
        reset_after_sec: args.reset_after,
        program: args.program,
        arguments: args.arguments,
    };
    cfg.set_recovery_action(action);
    cfg.validate()?;
    store.save(&cfg)?;
    info!(
        "set recovery action '{}' for exit code {} of '{}'",
        args.action, args.exit_code, cfg.name
    );
    Ok(())
}

fn recovery_del(store: &impl ConfigStore, name: &str, exit_code: i32) -> Result<()> {
    let mut cfg = store
        .load(name)
        .with_context(|| format!("failed to load service '{name}'"))?;
    if cfg.recovery_actions.remove(&exit_code).is_none() {
        info!("service '{name}' has no recovery action for exit code {exit_code}");
        return Ok(());
    }
    store.save(&cfg)?;
    info!("deleted recovery action for exit code {exit_code} of '{name}'");
    Ok(())
}
