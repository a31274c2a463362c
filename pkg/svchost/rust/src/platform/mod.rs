// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! OS primitives used to stop the supervised process.

use async_trait::async_trait;

use crate::config::StopSignal;
use crate::errors::{ForceKillError, SignalDeliveryError};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Ask the top-level process to terminate. It may ignore the request.
    /// A process that is already gone counts as delivered.
    fn send_signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalDeliveryError>;

    /// Forcibly terminate `pid` and all of its descendants.
    async fn kill_tree(&self, pid: u32) -> Result<(), ForceKillError>;
}

/// Signal delivery and tree termination for the current platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProcessControl;

#[async_trait]
impl ProcessControl for NativeProcessControl {
    fn send_signal(&self, pid: u32, signal: StopSignal) -> Result<(), SignalDeliveryError> {
        #[cfg(unix)]
        return unix::send_signal(pid, signal);
        #[cfg(windows)]
        return windows::send_signal(pid, signal);
    }

    async fn kill_tree(&self, pid: u32) -> Result<(), ForceKillError> {
        #[cfg(unix)]
        return unix::kill_tree(pid);
        #[cfg(windows)]
        return windows::kill_tree(pid).await;
    }
}
