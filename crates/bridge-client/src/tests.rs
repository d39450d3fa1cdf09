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

use ethers::types::{Address, U256};
use webb_relayer_context::CoreContext;
use webb_relayer_types::chain::ChainParams;
use webb_relayer_types::inbound::{
    BlockProof, InboundBlockVote, InboundEvent, InboundVote,
};
use webb_relayer_types::keygen::TssRecord;
use webb_relayer_types::{Chain, ChainKind};

use crate::mocked::MockedCoordinator;
use crate::updater::update_core_context;
use crate::BridgeClient;

const OPERATOR: &str = "relayer1operator";

fn client(mock: &Arc<MockedCoordinator>) -> BridgeClient {
    BridgeClient::builder()
        .rpc(mock.clone())
        .operator(OPERATOR)
        .max_msgs_per_tx(3)
        .broadcast_retry_count(2)
        .broadcast_retry_interval(Duration::from_millis(1))
        .monitor_interval(Duration::from_millis(5))
        .monitor_retry_count(20)
        .build()
}

fn vote(index: u64) -> InboundVote {
    InboundVote {
        signer: OPERATOR.into(),
        sender: format!("{:?}", Address::repeat_byte(1)),
        sender_chain_id: 11155111,
        tx_origin: format!("{:?}", Address::repeat_byte(1)),
        receiver: String::new(),
        receiver_chain_id: 186,
        in_tx_hash: format!("0x{index:064x}"),
        in_block_height: 103,
        gas_limit: 0,
        event_index: index,
        event: InboundEvent::StakerDelegated {
            staker: Address::repeat_byte(1),
            operator: Address::repeat_byte(2),
        },
    }
}

async fn wait_for_broadcasts(mock: &MockedCoordinator, count: usize) {
    for _ in 0..200 {
        if mock.broadcasts().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} broadcasts, got {}", mock.broadcasts().len());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn voting_twice_broadcasts_once() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let votes = vec![vote(1)];

    let first = client.post_vote_inbound_events(10, 0, &votes).await.unwrap();
    assert!(first.is_broadcast());
    let second = client.post_vote_inbound_events(10, 0, &votes).await.unwrap();
    assert!(!second.is_broadcast());
    assert_eq!(first.ballot, second.ballot);
    assert_eq!(mock.broadcasts().len(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn block_votes_are_batched() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let events: Vec<_> = (1..=5).map(vote).collect();
    let block = InboundBlockVote {
        signer: OPERATOR.into(),
        proof: BlockProof::new(11155111, 99, 103, &events).unwrap(),
    };

    let receipts = client
        .post_vote_inbound_block(10, 0, &block, &events)
        .await
        .unwrap();
    assert_eq!(receipts.len(), 3);
    let sizes: Vec<_> =
        mock.broadcasts().iter().map(|tx| tx.msgs.len()).collect();
    // the proof plus two events, then two events, then the last one.
    assert_eq!(sizes, vec![3, 2, 1]);
    assert_eq!(mock.broadcasts()[0].msgs[0].kind(), "vote_inbound_block");

    let again = client
        .post_vote_inbound_block(10, 0, &block, &events)
        .await
        .unwrap();
    assert_eq!(again.len(), 3);
    assert!(again.iter().all(|r| !r.is_broadcast()));
    assert_eq!(again[0].ballot, receipts[0].ballot);
    assert_eq!(mock.broadcasts().len(), 3);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn a_failed_follow_up_chunk_is_sent_on_the_next_attempt() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let events: Vec<_> = (1..=5).map(vote).collect();
    let block = InboundBlockVote {
        signer: OPERATOR.into(),
        proof: BlockProof::new(11155111, 99, 103, &events).unwrap(),
    };

    // the proof lands, every attempt at the second chunk fails.
    mock.fail_broadcasts_after(1, 100);
    assert!(client
        .post_vote_inbound_block(10, 0, &block, &events)
        .await
        .is_err());
    assert_eq!(mock.messages_of_kind("vote_inbound").len(), 2);

    mock.fail_next_broadcasts(0);
    let receipts = client
        .post_vote_inbound_block(10, 0, &block, &events)
        .await
        .unwrap();
    assert_eq!(receipts.len(), 3);
    assert!(!receipts[0].is_broadcast());
    assert!(receipts[1..].iter().all(|r| r.is_broadcast()));
    assert_eq!(mock.messages_of_kind("vote_inbound").len(), 5);
    assert_eq!(mock.messages_of_kind("vote_inbound_block").len(), 1);

    // nothing is left to send.
    client
        .post_vote_inbound_block(10, 0, &block, &events)
        .await
        .unwrap();
    assert_eq!(mock.broadcasts().len(), 3);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn sequence_mismatch_resets_the_local_sequence() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);

    client
        .post_gas_price(11155111, U256::from(100u64), "100", 7)
        .await
        .unwrap();
    assert_eq!(mock.broadcasts()[0].sequence, 0);

    // another process used the account in the same block.
    mock.set_sequence(9);
    client
        .post_gas_price(11155111, U256::from(101u64), "100", 8)
        .await
        .unwrap();
    let broadcasts = mock.broadcasts();
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(broadcasts[1].sequence, 9);
    assert!(logs_contain("Reset the account sequence"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn failed_broadcasts_leave_the_ballot_open() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let votes = vec![vote(3)];

    mock.fail_next_broadcasts(10);
    assert!(client.post_vote_inbound_events(10, 0, &votes).await.is_err());
    let ballot = votes[0].digest().unwrap();
    assert!(!client.has_voted(&ballot, OPERATOR).await.unwrap());

    mock.fail_next_broadcasts(0);
    let receipt = client.post_vote_inbound_events(10, 0, &votes).await.unwrap();
    assert!(receipt.is_broadcast());
    assert!(client.has_voted(&ballot, OPERATOR).await.unwrap());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn out_of_gas_votes_are_resent_once() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let votes = vec![vote(4)];

    mock.push_execution_log("out of gas in location: WritePerByte");
    client.post_vote_inbound_events(10, 99, &votes).await.unwrap();
    wait_for_broadcasts(&mock, 2).await;

    let broadcasts = mock.broadcasts();
    assert_eq!(broadcasts[0].gas_limit, 10);
    assert_eq!(broadcasts[1].gas_limit, 99);
    let ballot = votes[0].digest().unwrap();
    assert!(client.has_voted(&ballot, OPERATOR).await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.broadcasts().len(), 2);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn tracker_reports_skip_known_hashes() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let hash = format!("0x{:064X}", 0xabcdu64);

    let first = client
        .post_add_tx_hash_to_out_tx_tracker(11155111, 5, &hash)
        .await
        .unwrap();
    assert!(!first.is_empty());
    let second = client
        .post_add_tx_hash_to_out_tx_tracker(11155111, 5, &hash.to_lowercase())
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(mock.broadcasts().len(), 1);
}

#[tokio::test]
async fn core_context_keeps_supported_configured_chains() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    for (chain_id, is_supported) in [(1, true), (2, false), (3, true)] {
        mock.set_chain_params(ChainParams {
            chain_id,
            is_supported,
            ..Default::default()
        });
    }
    mock.set_supported_chains(vec![
        Chain::new(186, ChainKind::Coordinator, "coordinator"),
        Chain::new(1, ChainKind::Evm, "eth"),
    ]);
    mock.set_current_tss(Some(TssRecord {
        tss_pubkey: "tsspub1".into(),
        keygen_height: 10,
    }));

    let core = CoreContext::new(Chain::new(186, ChainKind::Coordinator, "c"));
    update_core_context(&client, &core, |id| id != 3).await.unwrap();

    assert!(core.chain_params(1).is_some());
    assert!(core.chain_params(2).is_none());
    assert!(core.chain_params(3).is_none());
    assert_eq!(core.current_tss_pubkey(), "tsspub1");
    assert_eq!(core.external_chains().len(), 1);
}

#[tokio::test]
async fn waits_for_the_first_blocks() {
    let mock = Arc::new(MockedCoordinator::new());
    let client = client(&mock);
    let bumper = {
        let mock = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            mock.set_block_height(5);
        })
    };
    // the retry interval is a millisecond, fifteen polls are plenty.
    let res = client.wait_for_blocks().await;
    bumper.await.unwrap();
    match res {
        Ok(height) => assert_eq!(height, 5),
        // the bump may land after the last poll on a slow machine.
        Err(_) => assert_eq!(client.block_height().await.unwrap(), 5),
    }
}
