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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::H256;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::EvmRpcClient;
use webb_relayer_types::ChainId;

/// Timings of the tracker reporter.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder)]
pub struct ReporterOptions {
    /// Wait between two inclusion checks.
    #[builder(default = Duration::from_secs(10))]
    pub inclusion_poll_interval: Duration,
    /// Give up on a transaction not mined after this long.
    #[builder(default = Duration::from_secs(20 * 60))]
    pub inclusion_timeout: Duration,
    /// Wait between two report attempts, three coordination blocks.
    #[builder(default = Duration::from_secs(3 * 6))]
    pub report_interval: Duration,
    /// Give up reporting after this long.
    #[builder(default = Duration::from_secs(10 * 60))]
    pub report_timeout: Duration,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

type InFlight = Arc<Mutex<HashSet<(ChainId, H256)>>>;

/// Removes the in-flight mark of a report when its task ends, however it
/// ends.
struct ReportGuard {
    in_flight: InFlight,
    key: (ChainId, H256),
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Reports broadcast outbound hashes to the coordination chain tracker once
/// they are mined.
///
/// A hash that is never mined is never reported, a missing hash is
/// preferred over a wrong one.
#[derive(Clone)]
pub struct TrackerReporter {
    rpc: Arc<dyn EvmRpcClient>,
    client: BridgeClient,
    options: ReporterOptions,
    in_flight: InFlight,
}

impl std::fmt::Debug for TrackerReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerReporter")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl TrackerReporter {
    /// A reporter with nothing in flight.
    pub fn new(
        rpc: Arc<dyn EvmRpcClient>,
        client: BridgeClient,
        options: ReporterOptions,
    ) -> Self {
        Self {
            rpc,
            client,
            options,
            in_flight: Default::default(),
        }
    }

    /// Whether a report of `tx_hash` is running.
    pub fn is_reporting(&self, chain_id: ChainId, tx_hash: H256) -> bool {
        self.in_flight.lock().contains(&(chain_id, tx_hash))
    }

    /// Spawns the report of `tx_hash`, unless one is already running.
    pub fn spawn(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx_hash: H256,
    ) -> Option<JoinHandle<()>> {
        let key = (chain_id, tx_hash);
        if !self.in_flight.lock().insert(key) {
            tracing::info!(
                chain_id,
                nonce,
                ?tx_hash,
                "Outbound is already being reported to the tracker"
            );
            return None;
        }
        let guard = ReportGuard {
            in_flight: self.in_flight.clone(),
            key,
        };
        let this = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            this.report(chain_id, nonce, tx_hash).await;
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn report(&self, chain_id: ChainId, nonce: u64, tx_hash: H256) {
        let Some(block) = self.wait_for_inclusion(tx_hash).await else {
            return;
        };
        let tx_hash = format!("{tx_hash:?}");
        let started = Instant::now();
        loop {
            if started.elapsed() > self.options.report_timeout {
                tracing::warn!("Timeout adding the hash to the tracker, add it manually");
                return;
            }
            match self.client.rpc().job_by_nonce(chain_id, nonce).await {
                Ok(Some(job)) if !job.status.is_pending() => {
                    tracing::info!(job = %job.index, "Job already finalized");
                    return;
                }
                Ok(None) => {
                    tracing::info!("No job holds this nonce anymore");
                    return;
                }
                Ok(Some(_)) => {}
                Err(e) => tracing::warn!(%e, "Unable to fetch the job"),
            }
            match self
                .client
                .post_add_tx_hash_to_out_tx_tracker(chain_id, nonce, &tx_hash)
                .await
            {
                Ok(hash) if hash.is_empty() => {
                    tracing::info!("Tracker already holds the hash");
                    return;
                }
                Ok(hash) => {
                    tracing::info!(coordinator_tx = %hash, block, "Added the hash to the tracker")
                }
                Err(e) => tracing::warn!(%e, "Error adding the hash to the tracker"),
            }
            tokio::time::sleep(self.options.report_interval).await;
        }
    }

    /// Polls `tx_hash` until it is mined, returning its block height.
    async fn wait_for_inclusion(&self, tx_hash: H256) -> Option<u64> {
        let started = Instant::now();
        loop {
            tokio::time::sleep(self.options.inclusion_poll_interval).await;
            if started.elapsed() > self.options.inclusion_timeout {
                tracing::info!("Timeout waiting for the tx inclusion");
                return None;
            }
            let tx = match self.rpc.transaction_by_hash(tx_hash).await {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::debug!(%e, "Error fetching the tx");
                    continue;
                }
            };
            match tx.and_then(|tx| tx.block_number) {
                Some(height) => {
                    let height = match self.rpc.transaction_receipt(tx_hash).await {
                        Ok(Some(receipt)) => receipt
                            .block_number
                            .map_or(height.as_u64(), |n| n.as_u64()),
                        Ok(None) => height.as_u64(),
                        Err(e) => {
                            tracing::debug!(%e, "Error fetching the receipt");
                            height.as_u64()
                        }
                    };
                    return Some(height);
                }
                None => tracing::debug!("Tx has not been included yet"),
            }
        }
    }
}
