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

use ethers::types::U256;
use futures::TryFutureExt;
use regex::Regex;
use tokio::sync::Mutex;
use webb_relayer_config::CoordinatorConfig;
use webb_relayer_types::coordinator::{
    AddToOutTxTracker, BlameVote, CoordinatorMsg, FeemarketParams,
    GasPriceVote, OutboundVote, RechargeToken, RechargeVote, TssVote,
    TxEnvelope,
};
use webb_relayer_types::inbound::{InboundBlockVote, InboundVote};
use webb_relayer_types::keygen::{Blame, KeygenRecord, TssRecord};
use webb_relayer_types::outbound::ReceiveStatus;
use webb_relayer_types::tracker::OutTxTracker;
use webb_relayer_types::{ChainId, ChainParams};
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::retry::ConstantWithMaxRetryCount;
use webb_relayer_utils::{probe, Error, Result};

use crate::constants::*;
use crate::monitor::{Resend, VoteKind};
use crate::CoordinatorRpc;

/// Account number and sequence of the operator, with the coordination
/// height they were last refreshed at.
#[derive(Debug, Default)]
pub(crate) struct AccountState {
    block_height: i64,
    account_number: u64,
    sequence: u64,
}

/// What a vote call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteReceipt {
    /// Hash of the vote transaction, empty when nothing was broadcast.
    pub tx_hash: String,
    /// Ballot the vote is for.
    pub ballot: String,
}

impl VoteReceipt {
    /// Whether a transaction was actually sent.
    pub fn is_broadcast(&self) -> bool {
        !self.tx_hash.is_empty()
    }
}

/// Client of the coordination chain.
///
/// Cloning is cheap, every clone shares the same account sequence. The
/// sequence is only touched while a broadcast is in flight, under one lock.
#[derive(Clone, typed_builder::TypedBuilder)]
pub struct BridgeClient {
    pub(crate) rpc: Arc<dyn CoordinatorRpc>,
    /// Operator account the relayer votes with.
    #[builder(setter(into))]
    pub(crate) operator: String,
    /// Messages packed into one transaction.
    #[builder(default = 13)]
    pub(crate) max_msgs_per_tx: usize,
    #[builder(default = 5)]
    pub(crate) broadcast_retry_count: usize,
    #[builder(default = Duration::from_secs(5))]
    pub(crate) broadcast_retry_interval: Duration,
    #[builder(default = MONITOR_INTERVAL)]
    pub(crate) monitor_interval: Duration,
    #[builder(default = MONITOR_RETRY_COUNT)]
    pub(crate) monitor_retry_count: usize,
    #[builder(default, setter(strip_option))]
    pub(crate) metrics: Option<Arc<Metrics>>,
    #[builder(setter(skip), default)]
    account: Arc<Mutex<AccountState>>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("operator", &self.operator)
            .field("max_msgs_per_tx", &self.max_msgs_per_tx)
            .finish_non_exhaustive()
    }
}

/// Fee paid for `gas_limit` under the given fee market.
///
/// System transactions pay a reduced share of the base gas price, plus 50%
/// headroom, and never less than one unit above the reduced minimum price.
pub fn compute_fee(gas_limit: u64, params: &FeemarketParams) -> U256 {
    let base = match params.base_fee {
        0 => DEFAULT_BASE_GAS_PRICE,
        fee => fee,
    };
    let adjusted = base as f64 * GAS_PRICE_REDUCTION_RATE * GAS_PRICE_BUFFER;
    let floor = params.min_gas_price * GAS_PRICE_REDUCTION_RATE;
    let price = if adjusted <= floor { floor + 1.0 } else { adjusted };
    U256::from(gas_limit) * U256::from(price.ceil() as u128)
}

fn parse_expected_sequence(raw_log: &str) -> Result<u64> {
    let re =
        Regex::new(r"account sequence mismatch, expected ([0-9]*), got ([0-9]*)")
            .map_err(|_| Error::Generic("invalid sequence mismatch pattern"))?;
    let caps = re.captures(raw_log).ok_or_else(|| {
        Error::Rpc(format!(
            "invalid sequence mismatch error format: {raw_log}"
        ))
    })?;
    caps[1].parse::<u64>().map_err(|e| {
        Error::Rpc(format!("cannot parse expected sequence {}: {e}", &caps[1]))
    })
}

impl BridgeClient {
    /// Creates a client paced by the coordinator section of the config.
    pub fn from_config(
        config: &CoordinatorConfig,
        rpc: Arc<dyn CoordinatorRpc>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::builder()
            .rpc(rpc)
            .operator(config.operator_address.clone())
            .max_msgs_per_tx(config.max_msgs_per_tx)
            .broadcast_retry_count(config.broadcast_retry_count)
            .broadcast_retry_interval(Duration::from_secs(
                config.broadcast_retry_interval_secs,
            ))
            .metrics(metrics)
            .build()
    }

    /// The raw query surface.
    pub fn rpc(&self) -> &Arc<dyn CoordinatorRpc> {
        &self.rpc
    }

    /// Operator account the relayer votes with.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Latest coordination block height.
    pub async fn block_height(&self) -> Result<i64> {
        self.rpc.block_height().await
    }

    /// Parameters of every chain known to the coordination chain.
    pub async fn chain_params(&self) -> Result<Vec<ChainParams>> {
        self.rpc.chain_params().await
    }

    /// Latest keygen record.
    pub async fn keygen(&self) -> Result<Option<KeygenRecord>> {
        self.rpc.keygen().await
    }

    /// TSS currently in use.
    pub async fn current_tss(&self) -> Result<Option<TssRecord>> {
        self.rpc.current_tss().await
    }

    /// Every outbound tracker of `chain_id`.
    pub async fn all_out_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutTxTracker>> {
        self.rpc.all_out_tx_trackers(chain_id).await
    }

    /// Whether `voter` already voted on `ballot`.
    pub async fn has_voted(&self, ballot: &str, voter: &str) -> Result<bool> {
        self.rpc.has_voted(ballot, voter).await
    }

    /// Waits until the coordination chain has produced its first blocks.
    pub async fn wait_for_blocks(&self) -> Result<i64> {
        let backoff = ConstantWithMaxRetryCount::new(
            self.broadcast_retry_interval,
            WAIT_FOR_BLOCKS_RETRY_COUNT,
        );
        backoff::future::retry(backoff, || async {
            match self.rpc.block_height().await {
                Ok(height) if height > 1 => Ok(height),
                Ok(height) => {
                    tracing::debug!(height, "Waiting for the first blocks");
                    Err(backoff::Error::transient(Error::Generic(
                        "coordination chain has not produced blocks yet",
                    )))
                }
                Err(e) => Err(backoff::Error::transient(e)),
            }
        })
        .await
    }

    /// Sends `msgs` in one transaction. The sequence is bumped only when the
    /// node accepted the transaction, and reset from the error when the node
    /// reports a sequence mismatch.
    #[tracing::instrument(skip_all, fields(gas_limit = gas_limit, msgs = msgs.len()))]
    pub(crate) async fn broadcast(
        &self,
        gas_limit: u64,
        msgs: &[CoordinatorMsg],
    ) -> Result<String> {
        let height = self.rpc.block_height().await?;
        let params = self.rpc.feemarket_params().await?;
        let fee = compute_fee(gas_limit, &params);

        let mut account = self.account.lock().await;
        if height > account.block_height {
            let info = self.rpc.account(&self.operator).await?;
            account.block_height = height;
            account.account_number = info.account_number;
            if account.sequence < info.sequence {
                account.sequence = info.sequence;
            }
        }
        let tx = TxEnvelope {
            msgs: msgs.to_vec(),
            gas_limit,
            fee,
            account_number: account.account_number,
            sequence: account.sequence,
        };
        let res = self.rpc.broadcast_tx_sync(tx).await?;
        if res.code > 0 {
            if res.code == SEQUENCE_MISMATCH_CODE {
                let expected = parse_expected_sequence(&res.raw_log)?;
                tracing::warn!(
                    from = account.sequence,
                    to = expected,
                    "Reset the account sequence from the mismatch error"
                );
                account.sequence = expected;
            }
            return Err(Error::BroadcastRejected {
                code: res.code,
                raw_log: res.raw_log,
            });
        }
        account.sequence += 1;
        drop(account);

        if let Some(metrics) = &self.metrics {
            for msg in msgs {
                metrics.votes_broadcast.with_label_values(&[msg.kind()]).inc();
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::BridgeClient,
            tx_hash = %res.tx_hash,
            msg_kind = msgs.first().map(CoordinatorMsg::kind).unwrap_or_default(),
            msgs = msgs.len(),
        );
        Ok(res.tx_hash)
    }

    pub(crate) async fn broadcast_with_retry(
        &self,
        gas_limit: u64,
        msgs: &[CoordinatorMsg],
    ) -> Result<String> {
        let backoff = ConstantWithMaxRetryCount::new(
            self.broadcast_retry_interval,
            self.broadcast_retry_count,
        );
        backoff::future::retry(backoff, || {
            self.broadcast(gas_limit, msgs).map_err(|e| {
                tracing::warn!(%e, "Broadcast failed");
                backoff::Error::transient(e)
            })
        })
        .await
    }

    /// Votes on single inbound events, in one transaction.
    ///
    /// The ballot of the first vote decides whether the call is a no-op.
    #[tracing::instrument(skip_all, fields(votes = votes.len()))]
    pub async fn post_vote_inbound_events(
        &self,
        gas_limit: u64,
        retry_gas_limit: u64,
        votes: &[InboundVote],
    ) -> Result<VoteReceipt> {
        let Some(first) = votes.first() else {
            return Ok(VoteReceipt::default());
        };
        let ballot = first.digest()?;
        if self.has_voted(&ballot, &first.signer).await? {
            tracing::debug!(%ballot, "Already voted");
            return Ok(VoteReceipt {
                tx_hash: String::new(),
                ballot,
            });
        }
        let msgs: Vec<_> = votes
            .iter()
            .cloned()
            .map(CoordinatorMsg::VoteInbound)
            .collect();
        let tx_hash = self.broadcast_with_retry(gas_limit, &msgs).await?;
        tracing::info!(
            %tx_hash,
            %ballot,
            block = first.in_block_height,
            "Posted inbound votes"
        );
        self.spawn_monitor(
            tx_hash.clone(),
            VoteKind::Inbound,
            Resend::new(retry_gas_limit, &ballot, &first.signer, msgs),
        );
        Ok(VoteReceipt { tx_hash, ballot })
    }

    /// Votes on a block proof together with the events it lists.
    ///
    /// The first transaction carries the proof and up to
    /// `max_msgs_per_tx - 1` events, the rest follow in transactions of
    /// `max_msgs_per_tx - 1` events each.
    #[tracing::instrument(
        skip_all,
        fields(
            chain_id = block.proof.chain_id,
            height = block.proof.block_height,
            events = events.len(),
        )
    )]
    pub async fn post_vote_inbound_block(
        &self,
        gas_limit: u64,
        retry_gas_limit: u64,
        block: &InboundBlockVote,
        events: &[InboundVote],
    ) -> Result<Vec<VoteReceipt>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let ballot = block.digest()?;
        let batch = self.max_msgs_per_tx.saturating_sub(1).max(1);
        let first = events.len().min(batch);
        let mut receipts = Vec::with_capacity(1 + events.len() / batch);
        if self.has_voted(&ballot, &block.signer).await? {
            // the follow-up chunks may not have landed, each one is guarded
            // by its own ballot below.
            tracing::debug!(%ballot, "Block proof already voted");
            receipts.push(VoteReceipt {
                tx_hash: String::new(),
                ballot,
            });
        } else {
            let mut msgs = Vec::with_capacity(first + 1);
            msgs.push(CoordinatorMsg::VoteInboundBlock(block.clone()));
            msgs.extend(
                events[..first]
                    .iter()
                    .cloned()
                    .map(CoordinatorMsg::VoteInbound),
            );
            let tx_hash = self.broadcast_with_retry(gas_limit, &msgs).await?;
            tracing::info!(
                %tx_hash,
                %ballot,
                left = events.len() - first,
                "Posted block proof"
            );
            self.spawn_monitor(
                tx_hash.clone(),
                VoteKind::InboundBlock,
                Resend::new(retry_gas_limit, &ballot, &block.signer, msgs),
            );
            receipts.push(VoteReceipt { tx_hash, ballot });
        }

        for chunk in events[first..].chunks(batch) {
            let receipt = self
                .post_vote_inbound_events(gas_limit, retry_gas_limit, chunk)
                .await?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// Votes on the result of an outbound transaction.
    ///
    /// A failed outbound is resent once with the revert gas limit when the
    /// vote runs out of gas.
    pub async fn post_vote_outbound(
        &self,
        vote: OutboundVote,
    ) -> Result<VoteReceipt> {
        let retry_gas_limit = match vote.status {
            ReceiveStatus::Failed => POST_VOTE_OUTBOUND_REVERT_GAS_LIMIT,
            ReceiveStatus::Success => 0,
        };
        self.post_vote_outbound_with_gas(
            POST_VOTE_OUTBOUND_GAS_LIMIT,
            retry_gas_limit,
            vote,
        )
        .await
    }

    /// Votes on the result of an outbound transaction with explicit limits.
    #[tracing::instrument(
        skip_all,
        fields(chain_id = vote.chain_id, nonce = vote.nonce)
    )]
    pub async fn post_vote_outbound_with_gas(
        &self,
        gas_limit: u64,
        retry_gas_limit: u64,
        vote: OutboundVote,
    ) -> Result<VoteReceipt> {
        let ballot = vote.digest()?;
        if self.has_voted(&ballot, &vote.signer).await? {
            return Ok(VoteReceipt {
                tx_hash: String::new(),
                ballot,
            });
        }
        let signer = vote.signer.clone();
        let msgs = vec![CoordinatorMsg::VoteOutbound(vote)];
        let tx_hash = self.broadcast_with_retry(gas_limit, &msgs).await?;
        tracing::info!(%tx_hash, %ballot, "Posted outbound vote");
        self.spawn_monitor(
            tx_hash.clone(),
            VoteKind::Outbound,
            Resend::new(retry_gas_limit, &ballot, &signer, msgs),
        );
        Ok(VoteReceipt { tx_hash, ballot })
    }

    /// Votes on the outcome of a keygen ceremony.
    pub async fn post_vote_tss(
        &self,
        tss_pubkey: &str,
        keygen_height: i64,
        status: ReceiveStatus,
    ) -> Result<VoteReceipt> {
        let vote = TssVote {
            signer: self.operator.clone(),
            tss_pubkey: tss_pubkey.to_owned(),
            keygen_height,
            status,
        };
        let ballot = vote.digest()?;
        if self.has_voted(&ballot, &vote.signer).await? {
            return Ok(VoteReceipt {
                tx_hash: String::new(),
                ballot,
            });
        }
        let tx_hash = self
            .broadcast_with_retry(
                POST_TSS_GAS_LIMIT,
                &[CoordinatorMsg::VoteTss(vote)],
            )
            .await?;
        Ok(VoteReceipt { tx_hash, ballot })
    }

    /// Posts the blame of a failed ceremony.
    pub async fn post_blame_data(
        &self,
        blame: Blame,
        chain_id: ChainId,
        index: &str,
    ) -> Result<String> {
        let msg = CoordinatorMsg::Blame(BlameVote {
            signer: self.operator.clone(),
            chain_id,
            index: index.to_owned(),
            blame,
        });
        self.broadcast_with_retry(POST_BLAME_DATA_GAS_LIMIT, &[msg])
            .await
    }

    /// Posts the gas price of an external chain.
    pub async fn post_gas_price(
        &self,
        chain_id: ChainId,
        price: U256,
        supply: &str,
        block_number: u64,
    ) -> Result<String> {
        let msg = CoordinatorMsg::GasPrice(GasPriceVote {
            signer: self.operator.clone(),
            chain_id,
            price,
            supply: supply.to_owned(),
            block_number,
        });
        self.broadcast_with_retry(POST_GAS_PRICE_GAS_LIMIT, &[msg])
            .await
    }

    /// Reports an outbound transaction hash to the tracker of `nonce`.
    ///
    /// Returns an empty hash when the tracker already holds `tx_hash`.
    /// There is no retry here, callers own their retry window.
    pub async fn post_add_tx_hash_to_out_tx_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx_hash: &str,
    ) -> Result<String> {
        if let Ok(Some(tracker)) =
            self.rpc.out_tx_tracker(chain_id, nonce).await
        {
            if tracker.contains(tx_hash) {
                return Ok(String::new());
            }
        }
        let msg = CoordinatorMsg::AddToOutTxTracker(AddToOutTxTracker {
            signer: self.operator.clone(),
            chain_id,
            nonce,
            tx_hash: tx_hash.to_owned(),
        });
        self.broadcast(ADD_TX_HASH_TO_OUT_TX_TRACKER_GAS_LIMIT, &[msg])
            .await
    }

    /// Votes to top up a TSS balance on `chain_id`.
    pub async fn post_vote_recharge(
        &self,
        chain_id: ChainId,
        token: RechargeToken,
        vote_index: u64,
    ) -> Result<VoteReceipt> {
        let vote = RechargeVote {
            signer: self.operator.clone(),
            chain_id,
            token,
            vote_index,
        };
        let ballot = vote.digest()?;
        if self.has_voted(&ballot, &vote.signer).await? {
            return Ok(VoteReceipt {
                tx_hash: String::new(),
                ballot,
            });
        }
        let tx_hash = self
            .broadcast_with_retry(
                POST_RECHARGE_GAS_LIMIT,
                &[CoordinatorMsg::VoteRecharge(vote)],
            )
            .await?;
        Ok(VoteReceipt { tx_hash, ballot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_uses_the_reduced_base_price() {
        let params = FeemarketParams {
            base_fee: 2_000_000,
            min_gas_price: 0.0,
        };
        // 2_000_000 * 0.01 * 1.5 = 30_000
        assert_eq!(compute_fee(10, &params), U256::from(300_000u64));
    }

    #[test]
    fn fee_falls_back_to_the_default_base_price() {
        let params = FeemarketParams {
            base_fee: 0,
            min_gas_price: 0.0,
        };
        assert_eq!(compute_fee(1, &params), U256::from(15_000u64));
    }

    #[test]
    fn fee_never_goes_under_the_minimum_price() {
        let params = FeemarketParams {
            base_fee: 100,
            min_gas_price: 1_000_000.0,
        };
        // floor = 10_000, price = 10_001
        assert_eq!(compute_fee(2, &params), U256::from(20_002u64));
    }

    #[test]
    fn expected_sequence_is_parsed_from_the_log() {
        let log = "account sequence mismatch, expected 42, got 40: incorrect account sequence";
        assert_eq!(parse_expected_sequence(log).unwrap(), 42);
        assert!(parse_expected_sequence("out of gas").is_err());
    }
}
