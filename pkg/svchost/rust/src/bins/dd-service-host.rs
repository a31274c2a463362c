// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::Result;
use clap::Parser;
use log::{debug, error};

use dd_service_host::cli::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.log_file.as_deref())?;
    debug!(
        "dd-service-host starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let code = match cli::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };
    log::logger().flush();
    std::process::exit(code as i32);
}
