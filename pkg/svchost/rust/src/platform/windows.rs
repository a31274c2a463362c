// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use windows_sys::Win32::Foundation::{HWND, LPARAM};
use windows_sys::Win32::System::Console::{CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, PostMessageW, WM_CLOSE, WM_QUIT,
};
use windows_sys::core::BOOL;

use crate::config::StopSignal;
use crate::errors::{ForceKillError, SignalDeliveryError};

pub(super) fn send_signal(pid: u32, signal: StopSignal) -> Result<(), SignalDeliveryError> {
    let result = match signal {
        // The child runs in its own process group whose id is its pid.
        StopSignal::Interrupt => ctrl_break(pid),
        StopSignal::Close => post_to_windows(pid, WM_CLOSE),
        StopSignal::Quit => post_to_windows(pid, WM_QUIT),
    };
    result.map_err(|e| SignalDeliveryError {
        pid,
        signal,
        reason: e.to_string(),
    })
}

fn ctrl_break(pid: u32) -> io::Result<()> {
    // SAFETY: plain FFI call without pointers.
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

struct WindowSearch {
    pid: u32,
    windows: Vec<HWND>,
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the `WindowSearch` passed to `EnumWindows`, which
    // outlives the enumeration.
    let search = unsafe { &mut *(lparam as *mut WindowSearch) };
    let mut owner = 0u32;
    // SAFETY: hwnd comes from the enumeration and owner is a valid out pointer.
    unsafe { GetWindowThreadProcessId(hwnd, &mut owner) };
    if owner == search.pid {
        search.windows.push(hwnd);
    }
    1
}

fn post_to_windows(pid: u32, message: u32) -> io::Result<()> {
    let mut search = WindowSearch {
        pid,
        windows: Vec::new(),
    };
    // SAFETY: the callback only touches `search` for the duration of the call.
    let ok = unsafe {
        EnumWindows(
            Some(collect_window),
            &mut search as *mut WindowSearch as LPARAM,
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    if search.windows.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "process has no top-level window",
        ));
    }

    let mut delivered = false;
    let mut last_error = None;
    for hwnd in search.windows {
        // SAFETY: hwnd was just enumerated; posting to a destroyed window fails cleanly.
        if unsafe { PostMessageW(hwnd, message, 0, 0) } != 0 {
            delivered = true;
        } else {
            last_error = Some(io::Error::last_os_error());
        }
    }
    match (delivered, last_error) {
        (true, _) => Ok(()),
        (false, Some(e)) => Err(e),
        (false, None) => Err(io::Error::other("message was not posted")),
    }
}

/// Upper bound for `taskkill` itself; the shutdown path waits on it.
const KILL_TREE_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn kill_tree(pid: u32) -> Result<(), ForceKillError> {
    let run = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = timeout(KILL_TREE_TIMEOUT, run)
        .await
        .map_err(|_| ForceKillError {
            pid,
            reason: format!(
                "taskkill did not finish within {}s",
                KILL_TREE_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| ForceKillError {
            pid,
            reason: format!("failed to run taskkill: {e}"),
        })?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = match stderr.trim() {
        "" => stdout.trim(),
        s => s,
    };
    Err(ForceKillError {
        pid,
        reason: if detail.is_empty() {
            "taskkill failed (no output)".to_string()
        } else {
            detail.to_string()
        },
    })
}
