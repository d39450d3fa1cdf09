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

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tower_http::trace::TraceLayer;
use webb_bridge_client::rest::RestCoordinatorRpc;
use webb_bridge_client::{updater, BridgeClient};
use webb_event_watcher_traits::{
    ChainObserver, ChainSigner, EventReactor, EvmRpcClient,
};
use webb_ew_evm::handlers::SharedChainParams;
use webb_ew_evm::{default_handlers, EvmObserver, HandlerContext, ObserverOptions};
use webb_outbound_signer::{EvmSigner, ReporterOptions};
use webb_relayer_context::RelayerContext;
use webb_relayer_orchestrator::{ChainFactory, Orchestrator, OrchestratorOptions};
use webb_relayer_store::{ScanCursorStore, SledStore};
use webb_relayer_tss::{generate_tss, KeygenOptions, LocalKeygenCeremony, Tss};
use webb_relayer_types::{Chain, ChainId, ChainParams};
use webb_relayer_utils::{probe, Error};

/// Serves `GET /metrics` on the configured port.
///
/// # Arguments
///
/// * `ctx` - RelayerContext that holds the configuration and the metrics
pub async fn build_axum_services(ctx: RelayerContext) -> anyhow::Result<()> {
    let port = ctx.config.port;
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(ctx));
    let socket_addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Serving metrics on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// Renders every metric in the Prometheus text format.
pub async fn handle_metrics(
    State(ctx): State<Arc<RelayerContext>>,
) -> Result<String, (StatusCode, String)> {
    ctx.metrics
        .gather_metrics()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Builds the observers and signers of the configured EVM chains.
///
/// The observer and the signer of a chain share one parameter cell, so a
/// refresh through either is seen by both.
pub struct EvmChainFactory {
    ctx: RelayerContext,
    client: BridgeClient,
    tss: Arc<Tss>,
    store: Arc<dyn ScanCursorStore>,
    params: Mutex<HashMap<ChainId, SharedChainParams>>,
}

impl EvmChainFactory {
    /// Creates a factory signing with `tss` and keeping scan cursors in
    /// `store`.
    pub fn new(
        ctx: RelayerContext,
        client: BridgeClient,
        tss: Arc<Tss>,
        store: Arc<dyn ScanCursorStore>,
    ) -> Self {
        Self {
            ctx,
            client,
            tss,
            store,
            params: Default::default(),
        }
    }

    fn shared_params(
        &self,
        chain_id: ChainId,
        params: ChainParams,
    ) -> SharedChainParams {
        let mut cells = self.params.lock();
        let cell = cells
            .entry(chain_id)
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(params.clone())));
        cell.store(Arc::new(params));
        cell.clone()
    }

    fn rpc(&self, chain_id: ChainId) -> crate::Result<Arc<dyn EvmRpcClient>> {
        Ok(self.ctx.evm_provider(chain_id)?)
    }
}

impl ChainFactory for EvmChainFactory {
    fn is_configured(&self, chain_id: ChainId) -> bool {
        self.ctx.config.evm_chain(chain_id).is_some()
    }

    fn observer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> crate::Result<Arc<dyn ChainObserver>> {
        let config = self
            .ctx
            .config
            .evm_chain(chain.id)
            .ok_or(Error::ChainNotFound { chain_id: chain.id })?;
        let rpc = self.rpc(chain.id)?;
        let params = self.shared_params(chain.id, params);
        let handler_ctx = HandlerContext::builder()
            .rpc(rpc.clone())
            .params(params.clone())
            .chain_id(chain.id)
            .coordinator_chain_id(self.ctx.config.coordinator.chain_id)
            .signer(self.client.operator())
            .restricted(self.ctx.restricted_addresses())
            .build();
        let reactor =
            EventReactor::new(chain.id, default_handlers(&handler_ctx));
        let observer = EvmObserver::builder()
            .chain(chain.clone())
            .params(params)
            .rpc(rpc)
            .client(self.client.clone())
            .core(self.ctx.core().clone())
            .tss(self.tss.clone())
            .store(self.store.clone())
            .reactor(reactor)
            .metrics(self.ctx.metrics.clone())
            .options(ObserverOptions::from(config))
            .build();
        tracing::info!(%chain, "Built observer");
        Ok(Arc::new(observer))
    }

    fn signer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> crate::Result<Arc<dyn ChainSigner>> {
        let block_time =
            Duration::from_secs(self.ctx.config.coordinator.block_time_secs);
        let signer = EvmSigner::builder()
            .chain(chain.clone())
            .params(self.shared_params(chain.id, params))
            .rpc(self.rpc(chain.id)?)
            .tss(self.tss.clone())
            .client(self.client.clone())
            .restricted(self.ctx.restricted_addresses())
            .reporter_options(
                ReporterOptions::builder()
                    .report_interval(block_time * 3)
                    .build(),
            )
            .build();
        Ok(Arc::new(signer))
    }
}

/// Starts every background service of the relayer.
///
/// Waits for the coordination chain, loads its state once, then blocks
/// until this node holds a TSS key. The orchestrator is started last and
/// returned.
///
/// # Arguments
///
/// * `ctx` - RelayerContext that holds the configuration
/// * `store` - [Sled](https://sled.rs)-based database store
pub async fn ignite(
    ctx: &RelayerContext,
    store: SledStore,
) -> crate::Result<Arc<Orchestrator>> {
    let config = &ctx.config;
    let rpc = Arc::new(RestCoordinatorRpc::new(config.coordinator.endpoint.clone())?);
    let client =
        BridgeClient::from_config(&config.coordinator, rpc, ctx.metrics.clone());

    let height = client.wait_for_blocks().await?;
    tracing::info!(height, "Coordination chain is producing blocks");
    let configured = |chain_id| config.evm_chain(chain_id).is_some();
    updater::update_core_context(&client, ctx.core(), configured).await?;
    let updater_task = updater::run(ctx.clone(), client.clone());
    tokio::spawn(async move {
        if let Err(e) = updater_task.await {
            tracing::error!(%e, "Core context updater stopped");
        }
    });

    let ceremony = match config.tss.private_key.clone() {
        Some(key) => LocalKeygenCeremony::builder()
            .store(Arc::new(store.clone()))
            .private_key(key)
            .build(),
        None => LocalKeygenCeremony::builder()
            .store(Arc::new(store.clone()))
            .build(),
    };
    let tss = Arc::new(Tss::new(Arc::new(ceremony)));
    let keygen_options = KeygenOptions::builder()
        .coordinator_chain_id(config.coordinator.chain_id)
        .poll_interval(Duration::from_millis(config.tss.keygen_poll_interval_ms))
        .test_keysign(config.tss.test_keysign)
        .metrics(ctx.metrics.clone())
        .build();
    let key = generate_tss(&client, &tss, &keygen_options).await?;
    tracing::info!(pubkey = %key.pubkey, address = ?key.address, "TSS key ready");

    let factory =
        EvmChainFactory::new(ctx.clone(), client.clone(), tss, Arc::new(store));
    let block_time = Duration::from_secs(config.coordinator.block_time_secs);
    let orchestrator = Arc::new(
        Orchestrator::builder()
            .client(client)
            .core(ctx.core().clone())
            .factory(Arc::new(factory))
            .metrics(ctx.metrics.clone())
            .options(OrchestratorOptions::from_block_time(block_time))
            .build(),
    );
    orchestrator.start(ctx);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        ignited = true,
    );
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webb_relayer_store::InMemoryStore;
    use webb_relayer_types::ChainKind;

    fn context() -> RelayerContext {
        let config = serde_json::from_value(serde_json::json!({
            "coordinator": {
                "chain-id": 186,
                "name": "coordinator",
                "endpoint": "http://127.0.0.1:1317",
                "operator-address": "relayer1operator"
            },
            "evm": {
                "11155111": {
                    "name": "sepolia",
                    "chain-id": 11155111,
                    "http-endpoints": ["http://127.0.0.1:8545"]
                }
            }
        }))
        .unwrap();
        RelayerContext::new(config, SledStore::temporary().unwrap()).unwrap()
    }

    fn factory(ctx: &RelayerContext) -> EvmChainFactory {
        let rpc = Arc::new(
            RestCoordinatorRpc::new(ctx.config.coordinator.endpoint.clone())
                .unwrap(),
        );
        let client = BridgeClient::from_config(
            &ctx.config.coordinator,
            rpc,
            ctx.metrics.clone(),
        );
        let ceremony = LocalKeygenCeremony::builder()
            .store(Arc::new(InMemoryStore::default()))
            .build();
        EvmChainFactory::new(
            ctx.clone(),
            client,
            Arc::new(Tss::new(Arc::new(ceremony))),
            Arc::new(InMemoryStore::default()),
        )
    }

    fn params(lookahead: i64) -> ChainParams {
        ChainParams {
            chain_id: 11155111,
            is_supported: true,
            outbound_schedule_lookahead: lookahead,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn observer_and_signer_share_their_params() {
        let ctx = context();
        let factory = factory(&ctx);
        let sepolia = Chain::new(11155111, ChainKind::Evm, "sepolia");
        assert!(factory.is_configured(11155111));
        assert!(!factory.is_configured(1));

        let observer = factory.observer(&sepolia, params(5)).unwrap();
        let signer = factory.signer(&sepolia, params(5)).unwrap();
        assert_eq!(observer.chain().id, 11155111);
        observer.set_chain_params(params(7));
        assert_eq!(signer.chain_params().outbound_schedule_lookahead, 7);
    }

    #[tokio::test]
    async fn unconfigured_chains_get_nothing() {
        let ctx = context();
        let factory = factory(&ctx);
        let bsc = Chain::new(97, ChainKind::Evm, "bsc");
        assert!(matches!(
            factory.observer(&bsc, params(5)),
            Err(Error::ChainNotFound { chain_id: 97 })
        ));
        assert!(factory.signer(&bsc, params(5)).is_err());
    }

    #[tokio::test]
    async fn metrics_are_rendered_as_text() {
        let ctx = context();
        ctx.metrics.last_coordinator_block.set(42);
        let page = handle_metrics(State(Arc::new(ctx))).await.unwrap();
        assert!(page.contains("relayer_last_coordinator_block 42"));
    }
}
