// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use webb_relayer_context::{CoreContext, CoreSnapshot, RelayerContext};
use webb_relayer_types::ChainId;
use webb_relayer_utils::probe;

use crate::BridgeClient;

/// Pulls a fresh snapshot of the coordination chain into `core`.
///
/// Parameters of unsupported chains are dropped, and only chains for which
/// `configured` returns `true` are kept.
pub async fn update_core_context(
    client: &BridgeClient,
    core: &CoreContext,
    configured: impl Fn(ChainId) -> bool,
) -> webb_relayer_utils::Result<()> {
    let rpc = client.rpc();
    let chains = rpc.supported_chains().await?;
    let params = rpc.chain_params().await?;
    let keygen = rpc.keygen().await?;
    let crosschain_flags = rpc.crosschain_flags().await?;
    let tss = rpc.current_tss().await?;

    let chain_params = params
        .into_iter()
        .filter(|p| {
            if !p.is_supported {
                tracing::warn!(chain_id = p.chain_id, "Skipping unsupported chain");
            }
            p.is_supported
        })
        .map(|p| (p.chain_id, p))
        .collect();
    core.update(
        CoreSnapshot {
            keygen,
            chains,
            chain_params,
            current_tss_pubkey: tss.map(|t| t.tss_pubkey).unwrap_or_default(),
            crosschain_flags,
        },
        configured,
    );
    Ok(())
}

/// Refreshes the core context every `context-update-interval-secs` until
/// the relayer shuts down.
pub async fn run(
    ctx: RelayerContext,
    client: BridgeClient,
) -> webb_relayer_utils::Result<()> {
    let interval = Duration::from_secs(
        ctx.config.coordinator.context_update_interval_secs.max(1),
    );
    let mut ticker = tokio::time::interval(interval);
    let mut shutdown_signal = ctx.shutdown_signal();
    let configured = |chain_id| ctx.config.evm_chain(chain_id).is_some();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) =
                    update_core_context(&client, ctx.core(), configured).await
                {
                    tracing::error!(%e, "Failed to update the core context");
                }
            },
            _ = shutdown_signal.recv() => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Lifecycle,
                    core_context_updater = "stopped",
                );
                return Ok(());
            },
        }
    }
}
