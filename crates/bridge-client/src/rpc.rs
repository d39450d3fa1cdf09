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

use ethers::types::U256;
use webb_relayer_types::chain::{ChainIndex, CrosschainFlags};
use webb_relayer_types::coordinator::{
    AccountInfo, FeemarketParams, RechargeToken, TxEnvelope, TxResponse,
    TxResult,
};
use webb_relayer_types::keygen::{KeygenRecord, TssRecord};
use webb_relayer_types::rate_limit::{RateLimiterFlags, RateLimiterInput};
use webb_relayer_types::tracker::{InTxTracker, OutTxTracker};
use webb_relayer_types::{Chain, ChainId, ChainParams, OutboundJob};

/// The raw query and broadcast surface of the coordination chain.
///
/// Implementations do no retries and keep no state, [`BridgeClient`]
/// does both.
///
/// [`BridgeClient`]: crate::BridgeClient
#[async_trait::async_trait]
pub trait CoordinatorRpc: Send + Sync + 'static {
    /// Latest block height.
    async fn block_height(&self) -> webb_relayer_utils::Result<i64>;

    /// Account number and sequence of `address`.
    async fn account(
        &self,
        address: &str,
    ) -> webb_relayer_utils::Result<AccountInfo>;

    /// Current fee market parameters.
    async fn feemarket_params(
        &self,
    ) -> webb_relayer_utils::Result<FeemarketParams>;

    /// Whether `voter` already voted on `ballot`.
    async fn has_voted(
        &self,
        ballot: &str,
        voter: &str,
    ) -> webb_relayer_utils::Result<bool>;

    /// Parameters of every chain known to the coordination chain.
    async fn chain_params(&self)
        -> webb_relayer_utils::Result<Vec<ChainParams>>;

    /// Chains currently supported.
    async fn supported_chains(&self) -> webb_relayer_utils::Result<Vec<Chain>>;

    /// Latest keygen record, if a keygen was ever requested.
    async fn keygen(&self) -> webb_relayer_utils::Result<Option<KeygenRecord>>;

    /// TSS currently in use.
    async fn current_tss(&self) -> webb_relayer_utils::Result<Option<TssRecord>>;

    /// Global inbound/outbound switches.
    async fn crosschain_flags(
        &self,
    ) -> webb_relayer_utils::Result<CrosschainFlags>;

    /// Rate limiter configuration.
    async fn rate_limiter_flags(
        &self,
    ) -> webb_relayer_utils::Result<RateLimiterFlags>;

    /// Pending jobs of every chain as seen by the rate limiter.
    async fn rate_limiter_input(
        &self,
        window: i64,
    ) -> webb_relayer_utils::Result<RateLimiterInput>;

    /// Pending outbound jobs of `chain_id`, ascending by nonce.
    async fn pending_jobs(
        &self,
        chain_id: ChainId,
    ) -> webb_relayer_utils::Result<Vec<OutboundJob>>;

    /// The job holding `nonce` on `chain_id`.
    async fn job_by_nonce(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> webb_relayer_utils::Result<Option<OutboundJob>>;

    /// Outbound tracker of one nonce.
    async fn out_tx_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> webb_relayer_utils::Result<Option<OutTxTracker>>;

    /// Every outbound tracker of `chain_id`, ascending by nonce.
    async fn all_out_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> webb_relayer_utils::Result<Vec<OutTxTracker>>;

    /// Inbound trackers of `chain_id`.
    async fn in_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> webb_relayer_utils::Result<Vec<InTxTracker>>;

    /// Highest block of `chain_id` indexed by the coordination chain.
    async fn chain_index(
        &self,
        chain_id: ChainId,
    ) -> webb_relayer_utils::Result<Option<ChainIndex>>;

    /// Balance of the operator account.
    async fn operator_balance(
        &self,
        address: &str,
    ) -> webb_relayer_utils::Result<U256>;

    /// Index of the last recharge operation of `token` on `chain_id`.
    async fn recharge_index(
        &self,
        chain_id: ChainId,
        token: RechargeToken,
    ) -> webb_relayer_utils::Result<u64>;

    /// Signs and broadcasts `tx`, waiting for the check but not for inclusion.
    async fn broadcast_tx_sync(
        &self,
        tx: TxEnvelope,
    ) -> webb_relayer_utils::Result<TxResponse>;

    /// Execution result of `tx_hash`, `None` until it is included.
    async fn query_tx_result(
        &self,
        tx_hash: &str,
    ) -> webb_relayer_utils::Result<Option<TxResult>>;
}
