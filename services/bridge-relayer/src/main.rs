// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

#![deny(unsafe_code)]

//! The bridge relayer binary.

use tokio::signal::unix;
use webb_bridge_relayer::service::{build_axum_services, ignite};

use webb_relayer_config::cli::{create_store, load_config, setup_logger, Opts};
use webb_relayer_context::RelayerContext;
use webb_relayer_utils::probe;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    let dotenv = dotenv::dotenv();

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    setup_logger(args.verbose, config.compliance.log_path.as_deref())?;
    match dotenv {
        Ok(_) => tracing::trace!("Loaded .env file"),
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }

    // persistent storage for the relayer
    let store = create_store(&args).await?;
    let ctx = RelayerContext::new(config, store.clone())?;

    let metrics_ctx = ctx.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = build_axum_services(metrics_ctx).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let shutdown = || {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true
        );
        tracing::warn!("Shutting down...");
        // send shutdown signal to all of the application.
        ctx.shutdown();
        server_handle.abort();
        std::thread::sleep(std::time::Duration::from_millis(300));
        tracing::info!("Clean Exit ..");
    };

    // startup waits for blocks and for a TSS key, which may take a while.
    tokio::select! {
        result = ignite(&ctx, store) => {
            result?;
        },
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) during startup ...");
            shutdown();
            return Ok(());
        },
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );

    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            shutdown();
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            shutdown();
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            shutdown();
        },
    }
    Ok(())
}
