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

//! The observer of one EVM chain.
//!
//! An [`EvmObserver`] runs one watch task per concern (inbound scan,
//! inbound trackers, outbound trackers, gas price, RPC health and TSS
//! balances). Every task re-reads its interval from the chain parameters
//! on each tick, so parameter updates apply without a restart.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Block, Transaction, TransactionReceipt, H256, U256};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::{ChainObserver, EventReactor, EvmRpcClient};
use webb_relayer_config::evm::EvmChainConfig;
use webb_relayer_context::CoreContext;
use webb_relayer_store::{ScanCursor, ScanCursorStore};
use webb_relayer_tss::TssSigner;
use webb_relayer_types::{Chain, ChainParams, OutboundJob};
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::Result;

use crate::handlers::SharedChainParams;

mod inbound;
mod outbound;
mod watch;

#[cfg(test)]
pub(crate) use inbound::apply_scan_override;
pub use watch::Watch;

const BLOCK_CACHE_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);
const CURSOR_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables of an observer that do not come from the coordination chain.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct ObserverOptions {
    /// Forces both cursors to this height at startup. Zero disables it.
    #[builder(default)]
    pub force_start_height: u64,
    /// How far the scan may run ahead of the coordination chain index.
    #[builder(default = 100)]
    pub max_latest_indexed_block_gap: u64,
    /// Applied to the suggested gas price before it is posted.
    #[builder(default = 1.0)]
    pub gas_price_multiplier: f64,
    /// Age of the latest block after which the RPC is reported as lagging.
    #[builder(default = Duration::from_secs(100))]
    pub rpc_latency_alert: Duration,
    /// Blocks scanned per inbound tick.
    #[builder(default = 100)]
    pub scan_batch_size: u64,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&EvmChainConfig> for ObserverOptions {
    fn from(config: &EvmChainConfig) -> Self {
        Self::builder()
            .force_start_height(config.force_start_height)
            .max_latest_indexed_block_gap(config.max_latest_indexed_block_gap)
            .gas_price_multiplier(config.gas_price_multiplier)
            .rpc_latency_alert(Duration::from_secs(config.rpc_latency_alert_secs))
            .build()
    }
}

/// Heights seen by the inbound scan.
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    /// Highest chain height ever reported by the RPC.
    last_block: u64,
    cursor: ScanCursor,
}

/// Outbound transactions found for the tracked nonces.
#[derive(Debug, Default)]
pub(crate) struct OutboundState {
    /// Mined transactions without enough confirmations yet.
    pending: HashMap<u64, Transaction>,
    /// Confirmed transactions, by nonce.
    confirmed: HashMap<u64, (TransactionReceipt, Transaction)>,
}

/// Watches one EVM chain and votes what it sees.
#[derive(typed_builder::TypedBuilder)]
pub struct EvmObserver {
    chain: Chain,
    params: SharedChainParams,
    rpc: Arc<dyn EvmRpcClient>,
    client: BridgeClient,
    core: CoreContext,
    tss: Arc<dyn TssSigner>,
    store: Arc<dyn ScanCursorStore>,
    reactor: EventReactor,
    metrics: Arc<Metrics>,
    #[builder(default)]
    options: ObserverOptions,
    #[builder(setter(skip), default)]
    scan: Mutex<ScanState>,
    #[builder(setter(skip), default)]
    outbound: Mutex<OutboundState>,
    #[builder(setter(skip), default = Mutex::new(LruCache::new(BLOCK_CACHE_SIZE)))]
    block_cache: Mutex<LruCache<u64, Block<H256>>>,
    #[builder(setter(skip), default = broadcast::channel(1).0)]
    stop: broadcast::Sender<()>,
    #[builder(setter(skip), default)]
    stopped: AtomicBool,
}

impl std::fmt::Debug for EvmObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmObserver")
            .field("chain", &self.chain)
            .field("reactor", &self.reactor)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl EvmObserver {
    /// The scan cursor currently held in memory.
    pub fn scan_cursor(&self) -> ScanCursor {
        self.scan.lock().cursor
    }

    /// Highest chain height ever reported by the RPC.
    pub fn last_block(&self) -> u64 {
        self.scan.lock().last_block
    }

    /// Moves the in-memory cursor, without persisting it.
    pub fn force_cursor(&self, cursor: ScanCursor) {
        self.scan.lock().cursor = cursor;
    }

    /// Whether [`stop`](ChainObserver::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn params(&self) -> Arc<ChainParams> {
        self.params.load_full()
    }

    fn chain_label(&self) -> String {
        self.chain.id.to_string()
    }
}

#[async_trait::async_trait]
impl ChainObserver for EvmObserver {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_params(&self) -> ChainParams {
        ChainParams::clone(&self.params.load())
    }

    fn set_chain_params(&self, params: ChainParams) {
        self.params.store(Arc::new(params));
    }

    fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            while let Err(e) = self.load_scan_cursor().await {
                tracing::error!(%e, chain = %self.chain, "Unable to load the scan cursor");
                if self.is_stopped() {
                    return;
                }
                tokio::time::sleep(CURSOR_RETRY_INTERVAL).await;
            }
            tracing::info!(
                chain = %self.chain,
                cursor = ?self.scan_cursor(),
                handlers = self.reactor.len(),
                "Starting observer"
            );
            for watch in Watch::ALL {
                tokio::spawn(self.clone().watch_loop(watch));
            }
        });
    }

    fn stop(&self) {
        tracing::info!(chain = %self.chain, "Stopping observer");
        self.stopped.store(true, Ordering::SeqCst);
        // no receiver simply means no task was started.
        let _ = self.stop.send(());
    }

    async fn is_outbound_processed(
        &self,
        job: &OutboundJob,
    ) -> Result<(bool, bool)> {
        self.vote_outbound_result(job).await
    }

    fn is_nonce_included(&self, nonce: u64) -> bool {
        self.outbound.lock().confirmed.contains_key(&nonce)
    }

    fn pending_gas_price(&self, nonce: u64) -> Option<U256> {
        self.outbound
            .lock()
            .pending
            .get(&nonce)
            .and_then(|tx| tx.gas_price.or(tx.max_fee_per_gas))
    }
}
