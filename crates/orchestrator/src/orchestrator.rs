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

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::{ChainObserver, ChainSigner};
use webb_relayer_context::{CoreContext, RelayerContext};
use webb_relayer_types::{Chain, ChainId, ChainParams, OutboundJob};
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::{probe, Result};

use crate::active_set::{ActiveGuard, ActiveOutboundSet};
use crate::burn_rate::BurnRate;
use crate::{rate_limiter, schedule};

/// Builds the observer and the signer of one external chain.
pub trait ChainFactory: Send + Sync + 'static {
    /// Whether this relayer is configured for `chain_id`.
    fn is_configured(&self, chain_id: ChainId) -> bool;

    /// A new, not yet started, observer of `chain`.
    fn observer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> Result<Arc<dyn ChainObserver>>;

    /// A new signer of `chain`.
    fn signer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> Result<Arc<dyn ChainSigner>>;
}

/// Loop cadences of the [`Orchestrator`].
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder)]
pub struct OrchestratorOptions {
    /// How often the coordination height is polled.
    #[builder(default = Duration::from_secs(3))]
    pub tick_interval: Duration,
    /// How often the observers and signers are reconciled with the
    /// supported chains.
    #[builder(default = Duration::from_secs(60))]
    pub sync_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OrchestratorOptions {
    /// Reconciles every ten coordination blocks.
    pub fn from_block_time(block_time: Duration) -> Self {
        Self::builder().sync_interval(block_time * 10).build()
    }
}

/// Observers and signers added and removed by one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Observers started.
    pub observers_added: usize,
    /// Observers stopped.
    pub observers_removed: usize,
    /// Signers created.
    pub signers_added: usize,
    /// Signers dropped.
    pub signers_removed: usize,
}

impl SyncReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Default)]
struct ChainMaps {
    observers: HashMap<ChainId, Arc<dyn ChainObserver>>,
    signers: HashMap<ChainId, Arc<dyn ChainSigner>>,
}

#[derive(Debug, Default)]
struct BurnState {
    last_balance: Option<U256>,
    rate: BurnRate,
}

/// Decides, for every coordination block, which outbound jobs get a
/// signing attempt.
#[derive(typed_builder::TypedBuilder)]
pub struct Orchestrator {
    client: BridgeClient,
    core: CoreContext,
    factory: Arc<dyn ChainFactory>,
    metrics: Arc<Metrics>,
    #[builder(default)]
    options: OrchestratorOptions,
    #[builder(setter(skip), default = ActiveOutboundSet::new(metrics.outbound_active_jobs.clone()))]
    active: ActiveOutboundSet,
    #[builder(setter(skip), default)]
    chains: RwLock<ChainMaps>,
    #[builder(setter(skip), default)]
    burn: Mutex<BurnState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chains = self.chains.read();
        f.debug_struct("Orchestrator")
            .field("options", &self.options)
            .field("active", &self.active.len())
            .field("observers", &chains.observers.keys().collect::<Vec<_>>())
            .field("signers", &chains.signers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Orchestrator {
    /// Outbound jobs with an attempt in flight.
    pub fn active(&self) -> &ActiveOutboundSet {
        &self.active
    }

    /// The running observer of `chain_id`.
    pub fn observer(&self, chain_id: ChainId) -> Option<Arc<dyn ChainObserver>> {
        self.chains.read().observers.get(&chain_id).cloned()
    }

    /// The signer of `chain_id`.
    pub fn signer(&self, chain_id: ChainId) -> Option<Arc<dyn ChainSigner>> {
        self.chains.read().signers.get(&chain_id).cloned()
    }

    /// Spawns the scheduler and the sync loops. Both stop on the relayer
    /// shutdown signal, the observers with them.
    pub fn start(self: &Arc<Self>, ctx: &RelayerContext) {
        tracing::info!(operator = %self.client.operator(), "Starting orchestrator");
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Orchestrator,
            starting = true,
        );

        let this = self.clone();
        let mut shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            tokio::select! {
                _ = this.run_sync() => {
                    tracing::warn!("Observer sync stopped");
                },
                _ = shutdown.recv() => {
                    tracing::trace!("Stopping the observers");
                    this.stop_observers();
                },
            }
        });

        let this = self.clone();
        let mut shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            tokio::select! {
                _ = this.run_scheduler() => {
                    tracing::warn!("Outbound scheduler stopped");
                },
                _ = shutdown.recv() => {
                    tracing::trace!("Stopping the outbound scheduler");
                },
            }
        });
    }

    /// Handles every coordination block exactly once, one per tick, never
    /// skipping ahead.
    pub async fn run_scheduler(&self) {
        let mut ticker = tokio::time::interval(self.options.tick_interval);
        let mut last_block = 0;
        loop {
            ticker.tick().await;
            let height = match self.client.block_height().await {
                Ok(height) if height < 0 => {
                    tracing::error!(height, "Negative coordination height");
                    continue;
                }
                Ok(height) => height,
                Err(e) => {
                    tracing::error!(%e, "Unable to get the coordination height");
                    continue;
                }
            };
            if last_block == 0 {
                last_block = height - 1;
            }
            if height <= last_block {
                continue;
            }
            let next = last_block + 1;
            if next % 10 == 0 {
                tracing::debug!(height = next, "Coordination heartbeat");
            }
            self.schedule_block(next).await;
            last_block = next;
        }
    }

    /// Schedules the signing attempts of coordination block `height`.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_block(&self, height: i64) {
        self.track_burn_rate(height).await;

        let chains = self.core.external_chains();
        let chain_ids: Vec<_> = chains.iter().map(|c| c.id).collect();
        let mut jobs = match self.pending_jobs_within_rate_limit(&chain_ids).await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(%e, "Unable to get the pending jobs");
                HashMap::new()
            }
        };

        for chain in chains {
            let Some((observer, signer)) = self.resolve(chain.id) else {
                tracing::debug!(%chain, "No observer or signer for chain");
                continue;
            };
            let chain_jobs = jobs.remove(&chain.id).unwrap_or_default();
            self.metrics
                .pending_outbound_jobs
                .with_label_values(&[&chain.id.to_string()])
                .set(chain_jobs.len() as f64);
            if chain_jobs.is_empty() {
                continue;
            }
            if !self
                .core
                .is_outbound_observation_enabled(&observer.chain_params())
            {
                tracing::debug!(%chain, "Outbound observation disabled");
                continue;
            }
            self.schedule_chain(
                height as u64,
                chain.id,
                &chain_jobs,
                observer,
                signer,
            )
            .await;
        }
        self.metrics.last_coordinator_block.set(height);
    }

    /// Pending jobs of `chain_ids`, through the rate limiter when it is
    /// usable and unbounded otherwise.
    pub async fn pending_jobs_within_rate_limit(
        &self,
        chain_ids: &[ChainId],
    ) -> Result<HashMap<ChainId, Vec<OutboundJob>>> {
        let rpc = self.client.rpc();
        let flags = rpc.rate_limiter_flags().await?;
        if !flags.is_usable() {
            let mut jobs = HashMap::new();
            for &chain_id in chain_ids {
                match rpc.pending_jobs(chain_id).await {
                    Ok(list) => {
                        jobs.insert(chain_id, list);
                    }
                    Err(e) => {
                        tracing::warn!(%e, chain_id, "Unable to list the pending jobs")
                    }
                }
            }
            return Ok(jobs);
        }

        let input = rpc.rate_limiter_input(flags.window).await?;
        let output = rate_limiter::apply(&input, flags.window, flags.rate);
        let usage = output.usage_percent(flags.rate);
        self.metrics.rate_limiter_usage_percent.set(usage);
        tracing::debug!(
            window = output.window,
            rate = %output.current_rate,
            usage,
            exceeded = output.exceeded,
            "Rate limiter applied"
        );
        Ok(output.jobs)
    }

    async fn track_burn_rate(&self, height: i64) {
        let balance = match self
            .client
            .rpc()
            .operator_balance(self.client.operator())
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                tracing::error!(%e, "Unable to get the operator balance");
                return;
            }
        };
        let rate = {
            let mut burn = self.burn.lock();
            if let Some(last) = burn.last_balance {
                if last > balance {
                    burn.rate.add(height as u64, last - balance);
                }
            }
            burn.last_balance = Some(balance);
            burn.rate.rate()
        };
        let rate = u128::try_from(rate).map_or(f64::MAX, |r| r as f64);
        self.metrics.hot_key_burn_rate.set(rate);
    }

    /// The observer and signer of `chain_id`, with their parameters brought
    /// up to date.
    fn resolve(
        &self,
        chain_id: ChainId,
    ) -> Option<(Arc<dyn ChainObserver>, Arc<dyn ChainSigner>)> {
        let (observer, signer) = {
            let chains = self.chains.read();
            (
                chains.observers.get(&chain_id).cloned()?,
                chains.signers.get(&chain_id).cloned()?,
            )
        };
        if let Some(params) = self.core.chain_params(chain_id) {
            if signer.chain_params() != params {
                tracing::info!(
                    chain_id,
                    connector = ?params.connector_contract_address,
                    "Updated the signer chain params"
                );
                signer.set_chain_params(params.clone());
            }
            if observer.chain_params() != params {
                tracing::info!(chain_id, ?params, "Updated the observer chain params");
                observer.set_chain_params(params);
            }
        }
        Some((observer, signer))
    }

    async fn schedule_chain(
        &self,
        height: u64,
        chain_id: ChainId,
        jobs: &[OutboundJob],
        observer: Arc<dyn ChainObserver>,
        signer: Arc<dyn ChainSigner>,
    ) {
        let tracked: HashSet<u64> =
            match self.client.all_out_tx_trackers(chain_id).await {
                Ok(trackers) => trackers.iter().map(|t| t.nonce).collect(),
                Err(e) => {
                    tracing::warn!(%e, chain_id, "Unable to list the outbound trackers");
                    return;
                }
            };
        let params = observer.chain_params();
        let interval = u64::try_from(params.outbound_schedule_interval).unwrap_or(0);
        if interval == 0 {
            tracing::warn!(chain_id, "No outbound schedule interval");
            return;
        }

        let window = schedule::nonce_window(jobs, params.outbound_schedule_lookahead);
        for (idx, job) in window.iter().enumerate() {
            let nonce = job.nonce();
            let outbound_id = job.outbound_id();
            if job.receiver_chain_id() != chain_id {
                tracing::error!(
                    %outbound_id,
                    want = chain_id,
                    got = job.receiver_chain_id(),
                    "Outbound chain mismatch"
                );
                continue;
            }
            match observer.is_outbound_processed(job).await {
                Ok((true, _)) => {
                    tracing::info!(%outbound_id, "Outbound already processed, no keysign");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(%e, %outbound_id, "Unable to check the outbound");
                    continue;
                }
            }

            let interval = schedule::retry_interval(nonce, idx == 0, &tracked, interval);
            if !schedule::is_due(nonce, height, interval) {
                continue;
            }
            let Some(guard) = self.active.try_acquire(&outbound_id) else {
                continue;
            };
            tracing::debug!(%outbound_id, height, interval, "Scheduling keysign");
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Orchestrator,
                chain_id,
                nonce,
                height,
                scheduled = true,
            );
            let observer = observer.clone();
            let signer = signer.clone();
            let job = job.clone();
            tokio::spawn(supervise(guard, async move {
                signer.try_process_outbound(job, observer, height).await
            }));
        }
    }

    /// Reconciles the observers and signers right away, then every
    /// `sync_interval`.
    pub async fn run_sync(&self) {
        let mut ticker = tokio::time::interval(self.options.sync_interval);
        loop {
            ticker.tick().await;
            self.sync_chains();
        }
    }

    /// Starts the observer and creates the signer of every newly supported
    /// chain, and stops and drops those of chains no longer supported.
    pub fn sync_chains(&self) -> SyncReport {
        let present: Vec<Chain> = self
            .core
            .external_chains()
            .into_iter()
            .filter(|c| self.factory.is_configured(c.id))
            .collect();
        let present_ids: HashSet<ChainId> = present.iter().map(|c| c.id).collect();

        let mut report = SyncReport::default();
        let mut chains = self.chains.write();
        for chain in &present {
            let has_observer = chains.observers.contains_key(&chain.id);
            let has_signer = chains.signers.contains_key(&chain.id);
            if has_observer && has_signer {
                continue;
            }
            let Some(params) = self.core.chain_params(chain.id) else {
                tracing::warn!(%chain, "No chain params yet");
                continue;
            };
            if !has_observer {
                match self.factory.observer(chain, params.clone()) {
                    Ok(observer) => {
                        observer.clone().start();
                        chains.observers.insert(chain.id, observer);
                        report.observers_added += 1;
                    }
                    Err(e) => {
                        tracing::error!(%e, %chain, "Unable to build the observer")
                    }
                }
            }
            if !has_signer {
                match self.factory.signer(chain, params) {
                    Ok(signer) => {
                        tracing::info!(%chain, "Added signer");
                        chains.signers.insert(chain.id, signer);
                        report.signers_added += 1;
                    }
                    Err(e) => {
                        tracing::error!(%e, %chain, "Unable to build the signer")
                    }
                }
            }
        }

        chains.observers.retain(|chain_id, observer| {
            let keep = present_ids.contains(chain_id);
            if !keep {
                tracing::info!(chain_id, "Removing observer");
                observer.stop();
                report.observers_removed += 1;
            }
            keep
        });
        chains.signers.retain(|chain_id, _| {
            let keep = present_ids.contains(chain_id);
            if !keep {
                tracing::info!(chain_id, "Removing signer");
                report.signers_removed += 1;
            }
            keep
        });
        drop(chains);

        if !report.is_empty() {
            tracing::info!(?report, "Synced observers and signers");
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Sync,
                observers_added = report.observers_added,
                observers_removed = report.observers_removed,
            );
        }
        report
    }

    /// Stops every running observer.
    pub fn stop_observers(&self) {
        for observer in self.chains.read().observers.values() {
            observer.stop();
        }
    }
}

/// Runs one signing attempt, turning an error or a panic into a log line.
/// The outbound leaves the active set once the attempt ended, whatever way.
pub async fn supervise<F>(guard: ActiveGuard, attempt: F)
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(Ok(())) => {
            tracing::trace!(outbound_id = %guard.outbound_id(), "Signing attempt done")
        }
        Ok(Err(e)) => {
            tracing::error!(%e, outbound_id = %guard.outbound_id(), "Signing attempt failed")
        }
        Err(_) => {
            tracing::error!(outbound_id = %guard.outbound_id(), "Signing attempt panicked")
        }
    }
    drop(guard);
}
