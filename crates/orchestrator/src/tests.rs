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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use parking_lot::Mutex;
use tokio::sync::Notify;
use webb_bridge_client::mocked::MockedCoordinator;
use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::{ChainObserver, ChainSigner};
use webb_relayer_context::{CoreContext, CoreSnapshot};
use webb_relayer_types::chain::CrosschainFlags;
use webb_relayer_types::outbound::OutboundParams;
use webb_relayer_types::rate_limit::{RateLimiterFlags, RateLimiterInput};
use webb_relayer_types::{
    Chain, ChainId, ChainKind, ChainParams, JobStatus, OutboundJob,
};
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::{Error, Result};

use crate::{ChainFactory, Orchestrator, SyncReport};

const COORDINATOR: ChainId = 186;
const SEPOLIA: ChainId = 11155111;
const BSC: ChainId = 97;

fn chain(id: ChainId) -> Chain {
    match id {
        COORDINATOR => Chain::new(id, ChainKind::Coordinator, "coordinator"),
        SEPOLIA => Chain::new(id, ChainKind::Evm, "sepolia"),
        _ => Chain::new(id, ChainKind::Evm, "bsc"),
    }
}

fn params(chain_id: ChainId, interval: i64, lookahead: i64) -> ChainParams {
    ChainParams {
        chain_id,
        is_supported: true,
        outbound_schedule_interval: interval,
        outbound_schedule_lookahead: lookahead,
        connector_contract_address: Address::repeat_byte(0xc0),
        ..Default::default()
    }
}

fn job(chain_id: ChainId, nonce: u64) -> OutboundJob {
    OutboundJob {
        index: format!("0x{nonce:064x}"),
        sender: format!("{:?}", Address::repeat_byte(0x5e)),
        sender_chain_id: BSC,
        status: JobStatus::PendingOutbound,
        value: U256::from(nonce),
        inbound_event: None,
        outbound: OutboundParams {
            receiver: format!("{:?}", Address::repeat_byte(0x7e)),
            receiver_chain_id: chain_id,
            tss_nonce: nonce,
            gas_limit: 100_000,
            gas_price: "30".into(),
            gas_priority_fee: "0".into(),
            tss_pubkey: String::new(),
        },
    }
}

struct StubObserver {
    chain: Chain,
    params: Mutex<ChainParams>,
    processed: HashSet<u64>,
    started: AtomicBool,
    stopped: AtomicBool,
}

#[async_trait::async_trait]
impl ChainObserver for StubObserver {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_params(&self) -> ChainParams {
        self.params.lock().clone()
    }

    fn set_chain_params(&self, params: ChainParams) {
        *self.params.lock() = params;
    }

    fn start(self: Arc<Self>) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn is_outbound_processed(
        &self,
        job: &OutboundJob,
    ) -> Result<(bool, bool)> {
        let done = self.processed.contains(&job.nonce());
        Ok((done, done))
    }

    fn is_nonce_included(&self, nonce: u64) -> bool {
        self.processed.contains(&nonce)
    }

    fn pending_gas_price(&self, _nonce: u64) -> Option<U256> {
        None
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Fail,
    Panic,
    /// Waits for [`RecordingSigner::release`].
    Hold,
}

/// Records every attempt as `(chain, nonce)`.
struct RecordingSigner {
    chain: Chain,
    params: Mutex<ChainParams>,
    attempts: Arc<Mutex<Vec<(ChainId, u64)>>>,
    outcome: Outcome,
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl ChainSigner for RecordingSigner {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_params(&self) -> ChainParams {
        self.params.lock().clone()
    }

    fn set_chain_params(&self, params: ChainParams) {
        *self.params.lock() = params;
    }

    async fn try_process_outbound(
        &self,
        job: OutboundJob,
        _observer: Arc<dyn ChainObserver>,
        _height: u64,
    ) -> Result<()> {
        self.attempts.lock().push((self.chain.id, job.nonce()));
        match self.outcome {
            Outcome::Done => Ok(()),
            Outcome::Fail => Err(Error::Rpc("connection reset".into())),
            Outcome::Panic => panic!("keysign blew up"),
            Outcome::Hold => {
                self.release.notified().await;
                Ok(())
            }
        }
    }
}

struct StubFactory {
    configured: HashSet<ChainId>,
    processed: HashSet<u64>,
    outcome: Outcome,
    attempts: Arc<Mutex<Vec<(ChainId, u64)>>>,
    release: Arc<Notify>,
    observers: Mutex<HashMap<ChainId, Arc<StubObserver>>>,
}

impl StubFactory {
    fn new(configured: &[ChainId], outcome: Outcome) -> Self {
        Self {
            configured: configured.iter().copied().collect(),
            processed: HashSet::new(),
            outcome,
            attempts: Default::default(),
            release: Arc::new(Notify::new()),
            observers: Default::default(),
        }
    }

    fn built_observer(&self, chain_id: ChainId) -> Arc<StubObserver> {
        self.observers.lock()[&chain_id].clone()
    }

    fn attempts(&self) -> Vec<(ChainId, u64)> {
        let mut attempts = self.attempts.lock().clone();
        attempts.sort();
        attempts
    }
}

impl ChainFactory for StubFactory {
    fn is_configured(&self, chain_id: ChainId) -> bool {
        self.configured.contains(&chain_id)
    }

    fn observer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> Result<Arc<dyn ChainObserver>> {
        let observer = Arc::new(StubObserver {
            chain: chain.clone(),
            params: Mutex::new(params),
            processed: self.processed.clone(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        self.observers.lock().insert(chain.id, observer.clone());
        Ok(observer)
    }

    fn signer(
        &self,
        chain: &Chain,
        params: ChainParams,
    ) -> Result<Arc<dyn ChainSigner>> {
        Ok(Arc::new(RecordingSigner {
            chain: chain.clone(),
            params: Mutex::new(params),
            attempts: self.attempts.clone(),
            outcome: self.outcome,
            release: self.release.clone(),
        }))
    }
}

struct Harness {
    coordinator: Arc<MockedCoordinator>,
    core: CoreContext,
    factory: Arc<StubFactory>,
    metrics: Arc<Metrics>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(factory: StubFactory) -> Self {
        let coordinator = Arc::new(MockedCoordinator::new());
        let client = BridgeClient::builder()
            .rpc(coordinator.clone())
            .operator("relayer1operator")
            .broadcast_retry_count(0)
            .broadcast_retry_interval(Duration::from_millis(1))
            .build();
        let core = CoreContext::new(chain(COORDINATOR));
        let factory = Arc::new(factory);
        let metrics = Arc::new(Metrics::new().unwrap());
        let orchestrator = Orchestrator::builder()
            .client(client)
            .core(core.clone())
            .factory(factory.clone())
            .metrics(metrics.clone())
            .build();
        Self {
            coordinator,
            core,
            factory,
            metrics,
            orchestrator,
        }
    }

    fn support(&self, chains: &[ChainId], params: Vec<ChainParams>) {
        self.support_with_flags(chains, params, CrosschainFlags::default());
    }

    fn support_with_flags(
        &self,
        chains: &[ChainId],
        params: Vec<ChainParams>,
        crosschain_flags: CrosschainFlags,
    ) {
        let snapshot = CoreSnapshot {
            chains: chains.iter().map(|&id| chain(id)).collect(),
            chain_params: params.into_iter().map(|p| (p.chain_id, p)).collect(),
            crosschain_flags,
            ..Default::default()
        };
        self.core.update(snapshot, |_| true);
    }

    /// Waits until every dispatched attempt has ended.
    async fn settle(&self) {
        for _ in 0..1_000 {
            if self.orchestrator.active().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("attempts still running");
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn sync_starts_and_stops_observers() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA, BSC], Outcome::Done));
    h.support(
        &[COORDINATOR, SEPOLIA, BSC, 1],
        vec![params(SEPOLIA, 1, 10), params(BSC, 1, 10), params(1, 1, 10)],
    );

    let report = h.orchestrator.sync_chains();
    assert_eq!(
        report,
        SyncReport {
            observers_added: 2,
            signers_added: 2,
            ..Default::default()
        }
    );
    assert!(h.orchestrator.observer(SEPOLIA).is_some());
    assert!(h.orchestrator.signer(BSC).is_some());
    // not configured locally, and never the coordination chain.
    assert!(h.orchestrator.observer(1).is_none());
    assert!(h.orchestrator.observer(COORDINATOR).is_none());
    assert!(h.factory.built_observer(BSC).started.load(Ordering::SeqCst));

    // nothing changes on a second pass.
    assert_eq!(h.orchestrator.sync_chains(), SyncReport::default());

    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
    let report = h.orchestrator.sync_chains();
    assert_eq!(report.observers_removed, 1);
    assert_eq!(report.signers_removed, 1);
    assert!(h.orchestrator.observer(BSC).is_none());
    assert!(h.orchestrator.signer(BSC).is_none());
    assert!(h.factory.built_observer(BSC).stopped.load(Ordering::SeqCst));
    assert!(!h.factory.built_observer(SEPOLIA).stopped.load(Ordering::SeqCst));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn chains_without_params_wait_for_them() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA], Outcome::Done));
    h.support(&[COORDINATOR, SEPOLIA], Vec::new());
    assert_eq!(h.orchestrator.sync_chains(), SyncReport::default());
    assert!(logs_contain("No chain params yet"));

    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
    assert_eq!(h.orchestrator.sync_chains().observers_added, 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn at_most_lookahead_jobs_are_attempted_per_block() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA], Outcome::Done));
    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 3)]);
    h.orchestrator.sync_chains();
    h.coordinator
        .set_pending_jobs(SEPOLIA, (20..30).map(|n| job(SEPOLIA, n)).collect());

    h.orchestrator.schedule_block(40).await;
    h.settle().await;
    assert_eq!(
        h.factory.attempts(),
        vec![(SEPOLIA, 20), (SEPOLIA, 21), (SEPOLIA, 22)]
    );
    assert_eq!(
        h.metrics
            .pending_outbound_jobs
            .with_label_values(&[&SEPOLIA.to_string()])
            .get(),
        10.0
    );
    assert_eq!(h.metrics.last_coordinator_block.get(), 40);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn jobs_are_attempted_on_their_retry_slot() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA], Outcome::Done));
    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 15, 10)]);
    h.orchestrator.sync_chains();
    h.coordinator.set_pending_jobs(SEPOLIA, vec![job(SEPOLIA, 50)]);

    h.orchestrator.schedule_block(120).await;
    h.settle().await;
    assert!(h.factory.attempts().is_empty());

    h.orchestrator.schedule_block(125).await;
    h.settle().await;
    assert_eq!(h.factory.attempts(), vec![(SEPOLIA, 50)]);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn an_active_outbound_is_not_attempted_twice() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA], Outcome::Hold));
    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
    h.orchestrator.sync_chains();
    h.coordinator.set_pending_jobs(SEPOLIA, vec![job(SEPOLIA, 7)]);

    h.orchestrator.schedule_block(40).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.orchestrator.schedule_block(41).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.factory.attempts().len(), 1);
    assert_eq!(h.orchestrator.active().len(), 1);
    assert_eq!(h.metrics.outbound_active_jobs.get(), 1);

    h.factory.release.notify_waiters();
    h.settle().await;
    assert_eq!(h.metrics.outbound_active_jobs.get(), 0);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn failed_and_panicked_attempts_are_released() {
    for outcome in [Outcome::Fail, Outcome::Panic] {
        let h = Harness::new(StubFactory::new(&[SEPOLIA], outcome));
        h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
        h.orchestrator.sync_chains();
        h.coordinator.set_pending_jobs(SEPOLIA, vec![job(SEPOLIA, 7)]);

        h.orchestrator.schedule_block(40).await;
        h.settle().await;
        // the next block tries again.
        h.orchestrator.schedule_block(41).await;
        h.settle().await;
        assert_eq!(h.factory.attempts(), vec![(SEPOLIA, 7), (SEPOLIA, 7)]);
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn processed_outbounds_and_disabled_chains_are_skipped() {
    let mut factory = StubFactory::new(&[SEPOLIA], Outcome::Done);
    factory.processed = [7].into();
    let h = Harness::new(factory);
    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
    h.orchestrator.sync_chains();
    h.coordinator
        .set_pending_jobs(SEPOLIA, vec![job(SEPOLIA, 7), job(SEPOLIA, 8)]);

    h.orchestrator.schedule_block(40).await;
    h.settle().await;
    assert_eq!(h.factory.attempts(), vec![(SEPOLIA, 8)]);

    h.support_with_flags(
        &[COORDINATOR, SEPOLIA],
        vec![params(SEPOLIA, 1, 10)],
        CrosschainFlags {
            is_inbound_enabled: true,
            is_outbound_enabled: false,
        },
    );
    h.orchestrator.schedule_block(41).await;
    h.settle().await;
    assert_eq!(h.factory.attempts().len(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn chain_params_are_refreshed_before_scheduling() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA], Outcome::Done));
    h.support(&[COORDINATOR, SEPOLIA], vec![params(SEPOLIA, 1, 10)]);
    h.orchestrator.sync_chains();

    let updated = params(SEPOLIA, 5, 20);
    h.support(&[COORDINATOR, SEPOLIA], vec![updated.clone()]);
    h.orchestrator.schedule_block(40).await;
    assert_eq!(h.factory.built_observer(SEPOLIA).chain_params(), updated);
    assert_eq!(
        h.orchestrator.signer(SEPOLIA).unwrap().chain_params(),
        updated
    );
}

#[tokio::test]
#[tracing_test::traced_test]
async fn the_rate_limiter_holds_back_pending_jobs() {
    let h = Harness::new(StubFactory::new(&[SEPOLIA, BSC], Outcome::Done));
    h.support(
        &[COORDINATOR, SEPOLIA, BSC],
        vec![params(SEPOLIA, 1, 10), params(BSC, 1, 10)],
    );
    h.orchestrator.sync_chains();
    // the unbounded query would see this one.
    h.coordinator.set_pending_jobs(SEPOLIA, vec![job(SEPOLIA, 1)]);
    let flags = RateLimiterFlags {
        enabled: true,
        window: 10,
        rate: 100.into(),
    };
    let input = RateLimiterInput {
        height: 40,
        jobs_missed: vec![job(BSC, 3)],
        jobs_pending: vec![job(SEPOLIA, 4), job(BSC, 5)],
        past_value: 900.into(),
        pending_value: 200.into(),
        lowest_pending_height: 35,
    };
    h.coordinator.set_rate_limiter(flags, input);

    h.orchestrator.schedule_block(40).await;
    h.settle().await;
    assert_eq!(h.factory.attempts(), vec![(BSC, 3)]);
    assert_eq!(h.metrics.rate_limiter_usage_percent.get(), 110.0);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn the_burn_rate_follows_the_operator_balance() {
    let h = Harness::new(StubFactory::new(&[], Outcome::Done));
    h.coordinator.set_operator_balance(U256::from(10_000));
    h.orchestrator.schedule_block(1).await;
    h.coordinator.set_operator_balance(U256::from(9_000));
    h.orchestrator.schedule_block(2).await;
    // 1000 burned over a 100 block window.
    assert_eq!(h.metrics.hot_key_burn_rate.get(), 10.0);

    // a top-up is not a negative burn.
    h.coordinator.set_operator_balance(U256::from(20_000));
    h.orchestrator.schedule_block(3).await;
    assert_eq!(h.metrics.hot_key_burn_rate.get(), 10.0);
}
