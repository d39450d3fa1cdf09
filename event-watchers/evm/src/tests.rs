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

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use ethers::abi::{encode, Token};
use ethers::contract::EthEvent;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Log, Transaction, TransactionReceipt, TransactionRequest,
    H256, U256, U64,
};
use webb_bridge_client::mocked::MockedCoordinator;
use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::mocked::MockedEvmClient;
use webb_event_watcher_traits::{ChainObserver, EventHandler, EventReactor};
use webb_relayer_context::{CoreContext, RestrictedAddressBook};
use webb_relayer_store::{InMemoryStore, ScanCursor, ScanCursorStore};
use webb_relayer_tss::{RecoverableSignature, TssSigner};
use webb_relayer_types::coordinator::CoordinatorMsg;
use webb_relayer_types::inbound::MessageKind;
use webb_relayer_types::outbound::{OutboundParams, ReceiveStatus};
use webb_relayer_types::tracker::InTxTracker;
use webb_relayer_types::{
    Chain, ChainKind, ChainParams, InboundEvent, JobStatus, OutboundJob,
};
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::{Error, Result};

use crate::contracts::{
    BridgeMessageFailedFilter, DepositFilter, MessageSentFilter,
    RegisterCentralSchedulerFilter, RegisterEjectionManagerFilter,
    RegisterStakeManagerFilter, StakerDelegatedFilter,
};
use crate::handlers::{
    default_handlers, ContractEventHandler, HandlerContext, RegistrationHandler,
    SharedChainParams,
};
use crate::observer::{apply_scan_override, EvmObserver, ObserverOptions};

const OPERATOR: &str = "relayer1operator";
const CHAIN_ID: i64 = 11155111;
const COORDINATOR_ID: i64 = 186;
const TSS_KEY: &str =
    "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

fn strategy_manager() -> Address {
    Address::repeat_byte(0x51)
}

fn delegation_manager() -> Address {
    Address::repeat_byte(0xde)
}

fn registry() -> Address {
    Address::repeat_byte(0x7e)
}

fn connector() -> Address {
    Address::repeat_byte(0xc0)
}

fn staker() -> Address {
    Address::repeat_byte(0x11)
}

fn chain_params() -> ChainParams {
    ChainParams {
        chain_id: CHAIN_ID,
        confirmation_count: 2,
        inbound_ticker: 1,
        outbound_ticker: 1,
        connector_contract_address: connector(),
        strategy_manager_address: strategy_manager(),
        delegation_manager_address: delegation_manager(),
        registry_router_address: registry(),
        is_supported: true,
        ..Default::default()
    }
}

/// Signs with a plain wallet standing in for the TSS.
struct WalletTss(LocalWallet);

#[async_trait::async_trait]
impl TssSigner for WalletTss {
    fn pubkey(&self) -> Result<String> {
        Err(Error::Unsupported("pubkey of a test wallet".into()))
    }

    fn evm_address(&self) -> Result<Address> {
        Ok(self.0.address())
    }

    async fn sign(
        &self,
        _digest: [u8; 32],
        _height: u64,
        _nonce: u64,
        _chain_id: i64,
    ) -> Result<RecoverableSignature> {
        Err(Error::Unsupported("keysign with a test wallet".into()))
    }
}

fn tss_wallet() -> LocalWallet {
    TSS_KEY
        .parse::<LocalWallet>()
        .unwrap()
        .with_chain_id(CHAIN_ID as u64)
}

struct Harness {
    rpc: Arc<MockedEvmClient>,
    coordinator: Arc<MockedCoordinator>,
    client: BridgeClient,
    store: Arc<InMemoryStore>,
    ctx: HandlerContext,
    observer: Arc<EvmObserver>,
}

fn harness_with(options: ObserverOptions, restricted: Vec<String>) -> Harness {
    let rpc = Arc::new(MockedEvmClient::new());
    let coordinator = Arc::new(MockedCoordinator::new());
    let client = BridgeClient::builder()
        .rpc(coordinator.clone())
        .operator(OPERATOR)
        .max_msgs_per_tx(3)
        .broadcast_retry_count(0)
        .broadcast_retry_interval(Duration::from_millis(1))
        .monitor_interval(Duration::from_millis(5))
        .monitor_retry_count(2)
        .build();
    let params: SharedChainParams =
        Arc::new(ArcSwap::from_pointee(chain_params()));
    let ctx = HandlerContext::builder()
        .rpc(rpc.clone())
        .params(params.clone())
        .chain_id(CHAIN_ID)
        .coordinator_chain_id(COORDINATOR_ID)
        .signer(OPERATOR)
        .restricted(Arc::new(RestrictedAddressBook::new(restricted)))
        .build();
    let reactor = EventReactor::new(CHAIN_ID, default_handlers(&ctx))
        .with_retry(0, Duration::from_millis(1));
    let store = Arc::new(InMemoryStore::default());
    let observer = EvmObserver::builder()
        .chain(Chain::new(CHAIN_ID, ChainKind::Evm, "sepolia"))
        .params(params)
        .rpc(rpc.clone())
        .client(client.clone())
        .core(CoreContext::new(Chain::new(
            COORDINATOR_ID,
            ChainKind::Coordinator,
            "coordinator",
        )))
        .tss(Arc::new(WalletTss(tss_wallet())))
        .store(store.clone())
        .reactor(reactor)
        .metrics(Arc::new(Metrics::new().unwrap()))
        .options(options)
        .build();
    Harness {
        rpc,
        coordinator,
        client,
        store,
        ctx,
        observer: Arc::new(observer),
    }
}

fn harness() -> Harness {
    harness_with(ObserverOptions::default(), Vec::new())
}

fn tx_hash(n: u64) -> H256 {
    H256::from_low_u64_be(0xabc0_0000 + n)
}

fn log_at(
    address: Address,
    topics: Vec<H256>,
    data: Vec<u8>,
    height: u64,
    hash: H256,
    index: u64,
) -> Log {
    Log {
        address,
        topics,
        data: Bytes::from(data),
        block_number: Some(U64::from(height)),
        transaction_hash: Some(hash),
        log_index: Some(U256::from(index)),
        removed: Some(false),
        ..Default::default()
    }
}

fn deposit_log(height: u64, hash: H256, index: u64) -> Log {
    let data = encode(&[
        Token::Address(staker()),
        Token::Address(Address::repeat_byte(0x22)),
        Token::Address(Address::repeat_byte(0x33)),
        Token::Uint(U256::from(1_000u64)),
    ]);
    log_at(
        strategy_manager(),
        vec![DepositFilter::signature()],
        data,
        height,
        hash,
        index,
    )
}

fn sent_by(hash: H256, from: Address, height: u64) -> Transaction {
    Transaction {
        hash,
        from,
        block_number: Some(U64::from(height)),
        ..Default::default()
    }
}

/// A deposit at block 103, with the chain at 107 and two confirmations.
fn seed_deposit(h: &Harness) -> H256 {
    let hash = tx_hash(1);
    h.rpc.set_block_number(107);
    h.rpc.add_log(deposit_log(103, hash, 4));
    h.rpc.add_transaction(sent_by(hash, staker(), 103));
    hash
}

#[tokio::test]
#[tracing_test::traced_test]
async fn failed_votes_do_not_move_the_cursor() {
    let h = harness();
    seed_deposit(&h);
    h.coordinator.set_chain_index(CHAIN_ID, 99);
    let start = ScanCursor {
        last_block_scanned: 99,
        last_inbound_block: 99,
    };
    h.observer.force_cursor(start);

    h.coordinator.fail_next_broadcasts(10);
    assert!(h.observer.observe_inbound().await.is_err());
    assert_eq!(h.observer.scan_cursor(), start);
    assert!(h.coordinator.broadcasts().is_empty());
    assert_eq!(h.store.get_scan_cursor(CHAIN_ID).unwrap(), None);

    h.coordinator.fail_next_broadcasts(0);
    h.observer.observe_inbound().await.unwrap();
    let blocks = h.coordinator.messages_of_kind("vote_inbound_block");
    assert_eq!(blocks.len(), 1);
    let CoordinatorMsg::VoteInboundBlock(block) = &blocks[0] else {
        panic!("expected a block vote");
    };
    assert_eq!(block.proof.prev_block_height, 99);
    assert_eq!(block.proof.block_height, 103);
    assert_eq!(block.proof.events.len(), 1);
    let expected = ScanCursor {
        last_block_scanned: 105,
        last_inbound_block: 103,
    };
    assert_eq!(h.observer.scan_cursor(), expected);
    assert_eq!(h.store.get_scan_cursor(CHAIN_ID).unwrap(), Some(expected));

    // a rescan of the same blocks finds the ballot already voted.
    let sent = h.coordinator.broadcasts().len();
    h.observer.force_cursor(start);
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.coordinator.broadcasts().len(), sent);
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 105);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn staking_votes_target_the_coordination_chain() {
    let h = harness();
    seed_deposit(&h);
    h.observer.force_cursor(ScanCursor {
        last_block_scanned: 99,
        last_inbound_block: 99,
    });
    h.observer.observe_inbound().await.unwrap();
    let votes = h.coordinator.messages_of_kind("vote_inbound");
    assert_eq!(votes.len(), 1);
    let CoordinatorMsg::VoteInbound(vote) = &votes[0] else {
        panic!("expected an inbound vote");
    };
    assert_eq!(vote.signer, OPERATOR);
    assert_eq!(vote.sender_chain_id, CHAIN_ID);
    assert_eq!(vote.receiver_chain_id, COORDINATOR_ID);
    assert_eq!(vote.in_block_height, 103);
    assert_eq!(vote.event_index, 4);
    assert_eq!(vote.receiver, format!("{:?}", staker()));
    assert!(matches!(
        vote.event,
        InboundEvent::StakerDeposited { shares, .. } if shares == U256::from(1_000u64)
    ));
}

#[tokio::test]
async fn a_rewinding_node_is_an_error() {
    let h = harness();
    h.observer.force_cursor(ScanCursor {
        last_block_scanned: 90,
        last_inbound_block: 90,
    });
    h.rpc.set_block_number(100);
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.observer.last_block(), 100);

    h.rpc.set_block_number(95);
    let err = h.observer.observe_inbound().await.unwrap_err();
    assert!(matches!(
        err,
        Error::BlockRewind {
            current: 95,
            last: 100,
            ..
        }
    ));
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 98);
}

#[tokio::test]
async fn young_chains_lack_confirmations() {
    let h = harness();
    h.rpc.set_block_number(1);
    assert!(matches!(
        h.observer.observe_inbound().await,
        Err(Error::NotEnoughConfirmations { height: 1, .. })
    ));
}

#[tokio::test]
async fn the_cursor_never_goes_back() {
    let h = harness();
    h.rpc.set_block_number(120);
    h.observer.force_cursor(ScanCursor {
        last_block_scanned: 118,
        last_inbound_block: 100,
    });
    // 118 is exactly the confirmed height, nothing to scan.
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.rpc.log_queries(), 0);
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 118);
}

#[tokio::test]
async fn scans_wait_for_the_indexed_height() {
    let h = harness();
    h.rpc.set_block_number(400);
    h.coordinator.set_chain_index(CHAIN_ID, 10);
    h.observer.force_cursor(ScanCursor {
        last_block_scanned: 200,
        last_inbound_block: 150,
    });
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.rpc.log_queries(), 0);
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 200);

    h.coordinator.set_chain_index(CHAIN_ID, 150);
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 300);
}

#[tokio::test]
async fn cursor_sources_follow_their_priority() {
    let h = harness();
    h.coordinator.set_chain_index(CHAIN_ID, 40);
    h.observer.load_scan_cursor().await.unwrap();
    assert_eq!(
        h.observer.scan_cursor(),
        ScanCursor {
            last_block_scanned: 40,
            last_inbound_block: 40,
        }
    );

    let stored = ScanCursor {
        last_block_scanned: 500,
        last_inbound_block: 480,
    };
    h.store.set_scan_cursor(CHAIN_ID, stored).unwrap();
    h.observer.load_scan_cursor().await.unwrap();
    assert_eq!(h.observer.scan_cursor(), stored);

    let forced = harness_with(
        ObserverOptions::builder().force_start_height(42).build(),
        Vec::new(),
    );
    forced.store.set_scan_cursor(CHAIN_ID, stored).unwrap();
    forced.observer.load_scan_cursor().await.unwrap();
    assert_eq!(
        forced.observer.scan_cursor(),
        ScanCursor {
            last_block_scanned: 42,
            last_inbound_block: 42,
        }
    );
}

#[test]
fn scan_overrides_replace_the_stored_cursor() {
    let stored = ScanCursor {
        last_block_scanned: 500,
        last_inbound_block: 480,
    };
    let mut cursor = stored;
    apply_scan_override(&mut cursor, " 620 ");
    assert_eq!(
        cursor,
        ScanCursor {
            last_block_scanned: 620,
            last_inbound_block: 480,
        }
    );

    let mut cursor = stored;
    apply_scan_override(&mut cursor, "soon");
    assert_eq!(cursor, stored);

    let mut cursor = stored;
    apply_scan_override(&mut cursor, "latest");
    assert_eq!(cursor, ScanCursor::default());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn restricted_stakers_are_not_voted() {
    let h = harness_with(
        ObserverOptions::default(),
        vec![format!("{:?}", staker())],
    );
    seed_deposit(&h);
    h.observer.force_cursor(ScanCursor {
        last_block_scanned: 99,
        last_inbound_block: 99,
    });
    h.observer.observe_inbound().await.unwrap();
    assert!(h.coordinator.broadcasts().is_empty());
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 105);
}

#[tokio::test]
async fn one_delegation_per_transaction() {
    let h = harness();
    let hash = tx_hash(2);
    let operator = Address::repeat_byte(0x44);
    let topics = vec![
        StakerDelegatedFilter::signature(),
        H256::from(staker()),
        H256::from(operator),
    ];
    h.rpc.add_log(log_at(delegation_manager(), topics.clone(), vec![], 101, hash, 0));
    h.rpc.add_log(log_at(delegation_manager(), topics, vec![], 101, hash, 1));
    h.rpc.add_transaction(sent_by(hash, staker(), 101));

    let handler =
        ContractEventHandler::<StakerDelegatedFilter>::new(h.ctx.clone());
    let handled = handler.handle_blocks(100, 102).await.unwrap();
    assert_eq!(handled.highest_scanned, 102);
    let votes = &handled.events[&101];
    assert_eq!(votes.len(), 1);
    assert_eq!(
        votes[0].event,
        InboundEvent::StakerDelegated {
            staker: staker(),
            operator
        }
    );
}

fn message_sent_log(height: u64, hash: H256, params: Vec<u8>) -> Log {
    let data = encode(&[
        Token::Address(Address::repeat_byte(0x66)),
        Token::Uint(U256::from(7001u64)),
        Token::Bytes(vec![0xaa; 20]),
        Token::Bytes(b"hello".to_vec()),
        Token::Uint(U256::from(5u64)),
        Token::Uint(U256::from(250_000u64)),
        Token::Bytes(params),
    ]);
    log_at(
        connector(),
        vec![MessageSentFilter::signature()],
        data,
        height,
        hash,
        0,
    )
}

#[tokio::test]
async fn messages_carry_their_kind_and_destination() {
    let h = harness();
    let origin = Address::repeat_byte(0x77);
    let (ok, unknown) = (tx_hash(3), tx_hash(4));
    h.rpc.add_log(message_sent_log(110, ok, vec![0, 0, 1]));
    h.rpc.add_log(message_sent_log(111, unknown, vec![3]));
    h.rpc.add_transaction(sent_by(ok, origin, 110));
    h.rpc.add_transaction(sent_by(unknown, origin, 111));

    let handler = ContractEventHandler::<MessageSentFilter>::new(h.ctx.clone());
    let handled = handler.handle_blocks(110, 111).await.unwrap();
    assert_eq!(handled.events.len(), 1);
    let vote = &handled.events[&110][0];
    assert_eq!(vote.receiver_chain_id, 7001);
    assert_eq!(vote.receiver, format!("0x{}", "aa".repeat(20)));
    assert_eq!(vote.gas_limit, 250_000);
    assert_eq!(vote.tx_origin, format!("{origin:?}"));
    assert_eq!(vote.sender, format!("{:?}", Address::repeat_byte(0x66)));
    assert!(matches!(
        &vote.event,
        InboundEvent::MessageSent { message_kind: MessageKind::RevertableCall, value, .. }
            if *value == U256::from(5u64)
    ));
}

fn registration_logs(height: u64, hash: H256, first_index: u64) -> [Log; 3] {
    let router = Token::Address(Address::repeat_byte(0x01));
    let scheduler = encode(&[
        router.clone(),
        Token::Address(Address::repeat_byte(0x02)),
        Token::Tuple(vec![
            Token::Bytes(vec![9; 65]),
            Token::FixedBytes(vec![8; 32]),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]),
    ]);
    let stake = encode(&[router.clone(), Token::Address(Address::repeat_byte(0x03))]);
    let ejection = encode(&[router, Token::Address(Address::repeat_byte(0x04))]);
    [
        log_at(
            registry(),
            vec![RegisterCentralSchedulerFilter::signature()],
            scheduler,
            height,
            hash,
            first_index,
        ),
        log_at(
            registry(),
            vec![RegisterStakeManagerFilter::signature()],
            stake,
            height,
            hash,
            first_index + 1,
        ),
        log_at(
            registry(),
            vec![RegisterEjectionManagerFilter::signature()],
            ejection,
            height,
            hash,
            first_index + 2,
        ),
    ]
}

#[tokio::test]
#[tracing_test::traced_test]
async fn registrations_need_all_three_parts() {
    let h = harness();
    let (complete, partial) = (tx_hash(5), tx_hash(6));
    for log in registration_logs(104, complete, 2) {
        h.rpc.add_log(log);
    }
    let [scheduler_only, _, _] = registration_logs(106, partial, 0);
    h.rpc.add_log(scheduler_only);
    h.rpc.add_transaction(sent_by(complete, staker(), 104));
    h.rpc.add_transaction(sent_by(partial, staker(), 106));

    let handler = RegistrationHandler::new(h.ctx.clone());
    let handled = handler.handle_blocks(100, 110).await.unwrap();
    assert_eq!(handled.events.len(), 1);
    let vote = &handled.events[&104][0];
    assert_eq!(vote.event_index, 2);
    let InboundEvent::ChainRegistered {
        central_scheduler,
        stake_manager,
        ejection_manager,
        approver_signature,
        ..
    } = &vote.event
    else {
        panic!("expected a registration");
    };
    assert_eq!(*central_scheduler, Address::repeat_byte(0x02));
    assert_eq!(*stake_manager, Address::repeat_byte(0x03));
    assert_eq!(*ejection_manager, Address::repeat_byte(0x04));
    assert_eq!(approver_signature.salt, H256::repeat_byte(8));
    assert!(logs_contain("Incomplete registration"));
}

#[tokio::test]
async fn tracked_inbounds_are_voted_once_confirmed() {
    let h = harness();
    let hash = tx_hash(7);
    let tx = sent_by(hash, staker(), 103);
    h.rpc.add_transaction(tx);
    h.rpc.add_receipt(TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(103)),
        status: Some(U64::one()),
        logs: vec![deposit_log(103, hash, 0)],
        ..Default::default()
    });
    h.coordinator.add_in_tx_tracker(InTxTracker {
        chain_id: CHAIN_ID,
        tx_hash: format!("{hash:?}"),
    });

    h.rpc.set_block_number(104);
    h.observer.observe_in_tx_trackers().await.unwrap();
    assert!(h.coordinator.messages_of_kind("vote_inbound").is_empty());

    h.rpc.set_block_number(105);
    h.observer.observe_in_tx_trackers().await.unwrap();
    assert_eq!(h.coordinator.messages_of_kind("vote_inbound").len(), 1);
}

fn signed_outbound(wallet: &LocalWallet, nonce: u64, height: u64) -> Transaction {
    let request: TypedTransaction = TransactionRequest::new()
        .to(connector())
        .value(1u64)
        .nonce(nonce)
        .gas(100_000u64)
        .gas_price(10u64)
        .chain_id(CHAIN_ID as u64)
        .into();
    let signature = wallet.sign_transaction_sync(&request).unwrap();
    let raw = request.rlp_signed(&signature);
    let mut tx: Transaction = ethers::utils::rlp::decode(&raw).unwrap();
    tx.block_number = Some(U64::from(height));
    tx.transaction_index = Some(U64::zero());
    tx
}

fn outbound_job(nonce: u64) -> OutboundJob {
    OutboundJob {
        index: format!("0x{nonce:064x}"),
        sender: format!("{:?}", staker()),
        sender_chain_id: COORDINATOR_ID,
        status: JobStatus::PendingOutbound,
        value: U256::one(),
        inbound_event: None,
        outbound: OutboundParams {
            receiver: format!("{:?}", connector()),
            receiver_chain_id: CHAIN_ID,
            tss_nonce: nonce,
            gas_limit: 100_000,
            gas_price: "10".into(),
            gas_priority_fee: "0".into(),
            tss_pubkey: String::new(),
        },
    }
}

fn seed_outbound(h: &Harness, tx: &Transaction, failure_logs: Vec<Log>) {
    h.rpc.add_transaction(tx.clone());
    h.rpc.add_receipt(TransactionReceipt {
        transaction_hash: tx.hash,
        transaction_index: U64::zero(),
        block_number: tx.block_number,
        status: Some(U64::one()),
        gas_used: Some(U256::from(60_000u64)),
        effective_gas_price: Some(U256::from(10u64)),
        logs: failure_logs,
        ..Default::default()
    });
}

#[tokio::test]
#[tracing_test::traced_test]
async fn outbounds_confirm_and_vote_their_result() {
    let h = harness();
    let tx = signed_outbound(&tss_wallet(), 7, 50);
    seed_outbound(&h, &tx, Vec::new());
    h.rpc.include_transaction(50, tx.hash);
    h.client
        .post_add_tx_hash_to_out_tx_tracker(CHAIN_ID, 7, &format!("{:?}", tx.hash))
        .await
        .unwrap();

    // mined, not yet confirmed: remembered as pending.
    h.rpc.set_block_number(51);
    h.observer.observe_outbound().await.unwrap();
    assert!(!h.observer.is_nonce_included(7));
    assert_eq!(h.observer.pending_gas_price(7), Some(U256::from(10u64)));

    h.rpc.set_block_number(60);
    h.observer.observe_outbound().await.unwrap();
    assert!(h.observer.is_nonce_included(7));
    assert_eq!(h.observer.pending_gas_price(7), None);

    assert_eq!(
        h.observer.is_outbound_processed(&outbound_job(8)).await.unwrap(),
        (false, false)
    );
    assert_eq!(
        h.observer.is_outbound_processed(&outbound_job(7)).await.unwrap(),
        (true, true)
    );
    let votes = h.coordinator.messages_of_kind("vote_outbound");
    assert_eq!(votes.len(), 1);
    let CoordinatorMsg::VoteOutbound(vote) = &votes[0] else {
        panic!("expected an outbound vote");
    };
    assert_eq!(vote.status, ReceiveStatus::Success);
    assert_eq!(vote.nonce, 7);
    assert_eq!(vote.out_block_height, 50);
    assert_eq!(vote.gas_used, 60_000);
    assert_eq!(vote.out_tx_hash, format!("{:?}", tx.hash));
}

#[tokio::test]
async fn confirmed_nonces_evict_lower_pending_outbounds() {
    let h = harness();
    let mut stale = signed_outbound(&tss_wallet(), 6, 50);
    stale.block_number = None;
    stale.transaction_index = None;
    seed_outbound(&h, &stale, Vec::new());
    let tx = signed_outbound(&tss_wallet(), 7, 52);
    seed_outbound(&h, &tx, Vec::new());
    h.rpc.include_transaction(52, tx.hash);
    for (nonce, hash) in [(6, stale.hash), (7, tx.hash)] {
        h.client
            .post_add_tx_hash_to_out_tx_tracker(CHAIN_ID, nonce, &format!("{hash:?}"))
            .await
            .unwrap();
    }

    h.rpc.set_block_number(53);
    h.observer.observe_outbound().await.unwrap();
    assert_eq!(h.observer.pending_gas_price(6), Some(U256::from(10u64)));
    assert_eq!(h.observer.pending_gas_price(7), Some(U256::from(10u64)));

    h.rpc.set_block_number(70);
    h.observer.observe_outbound().await.unwrap();
    assert!(h.observer.is_nonce_included(7));
    assert!(!h.observer.is_nonce_included(6));
    assert_eq!(h.observer.pending_gas_price(6), None);
    assert_eq!(h.observer.pending_gas_price(7), None);
}

#[tokio::test]
async fn connector_failures_fail_the_outbound() {
    let h = harness();
    let tx = signed_outbound(&tss_wallet(), 3, 50);
    let failure = log_at(
        connector(),
        vec![BridgeMessageFailedFilter::signature(), H256::repeat_byte(1)],
        encode(&[Token::Bytes(vec![0xbe, 0xef])]),
        50,
        tx.hash,
        0,
    );
    seed_outbound(&h, &tx, vec![failure]);
    h.rpc.include_transaction(50, tx.hash);
    h.rpc.set_block_number(60);
    h.client
        .post_add_tx_hash_to_out_tx_tracker(CHAIN_ID, 3, &format!("{:?}", tx.hash))
        .await
        .unwrap();
    h.observer.observe_outbound().await.unwrap();
    h.observer.is_outbound_processed(&outbound_job(3)).await.unwrap();

    let votes = h.coordinator.messages_of_kind("vote_outbound");
    let CoordinatorMsg::VoteOutbound(vote) = &votes[0] else {
        panic!("expected an outbound vote");
    };
    assert_eq!(vote.status, ReceiveStatus::Failed);
    assert_eq!(vote.failed_reason, "beef");
}

#[tokio::test]
async fn outbounds_not_signed_by_the_tss_are_ignored() {
    let h = harness();
    let stranger = "0123456789012345678901234567890123456789012345678901234567890123"
        .parse::<LocalWallet>()
        .unwrap()
        .with_chain_id(CHAIN_ID as u64);
    let tx = signed_outbound(&stranger, 9, 50);
    seed_outbound(&h, &tx, Vec::new());
    h.rpc.include_transaction(50, tx.hash);
    h.rpc.set_block_number(60);
    h.client
        .post_add_tx_hash_to_out_tx_tracker(CHAIN_ID, 9, &format!("{:?}", tx.hash))
        .await
        .unwrap();
    h.observer.observe_outbound().await.unwrap();
    assert!(!h.observer.is_nonce_included(9));
}

#[tokio::test]
async fn outbounds_must_sit_in_their_block() {
    let h = harness();
    let tx = signed_outbound(&tss_wallet(), 4, 50);
    seed_outbound(&h, &tx, Vec::new());
    h.rpc.include_transaction(50, tx_hash(99));
    h.rpc.set_block_number(60);
    h.client
        .post_add_tx_hash_to_out_tx_tracker(CHAIN_ID, 4, &format!("{:?}", tx.hash))
        .await
        .unwrap();
    h.observer.observe_outbound().await.unwrap();
    assert!(!h.observer.is_nonce_included(4));
}

#[tokio::test]
async fn stopped_observers_end_their_watches() {
    let h = harness();
    h.coordinator.set_chain_index(CHAIN_ID, 5);
    h.observer.clone().start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.observer.stop();
    assert!(h.observer.is_stopped());
    assert_eq!(h.observer.scan_cursor().last_block_scanned, 5);
}
