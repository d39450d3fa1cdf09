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

use std::collections::{HashMap, HashSet, VecDeque};

use ethers::types::U256;
use parking_lot::Mutex;
use webb_relayer_types::chain::{ChainIndex, CrosschainFlags};
use webb_relayer_types::coordinator::{
    AccountInfo, CoordinatorMsg, FeemarketParams, RechargeToken, TxEnvelope,
    TxResponse, TxResult,
};
use webb_relayer_types::keygen::{KeygenRecord, TssRecord};
use webb_relayer_types::rate_limit::{RateLimiterFlags, RateLimiterInput};
use webb_relayer_types::tracker::{InTxTracker, OutTxTracker, TxHashEntry};
use webb_relayer_types::{Chain, ChainId, ChainParams, OutboundJob};
use webb_relayer_utils::{Error, Result};

use crate::constants::SEQUENCE_MISMATCH_CODE;
use crate::CoordinatorRpc;

#[derive(Debug, Default)]
struct State {
    height: i64,
    account: AccountInfo,
    feemarket: FeemarketParams,
    votes: HashSet<(String, String)>,
    chain_params: Vec<ChainParams>,
    chains: Vec<Chain>,
    keygen: Option<KeygenRecord>,
    tss: Option<TssRecord>,
    flags: CrosschainFlags,
    rate_limiter_flags: RateLimiterFlags,
    rate_limiter_input: RateLimiterInput,
    pending: HashMap<ChainId, Vec<OutboundJob>>,
    out_trackers: HashMap<(ChainId, u64), OutTxTracker>,
    in_trackers: HashMap<ChainId, Vec<InTxTracker>>,
    chain_index: HashMap<ChainId, ChainIndex>,
    operator_balance: U256,
    recharge_index: HashMap<(ChainId, RechargeToken), u64>,
    broadcasts: Vec<TxEnvelope>,
    results: HashMap<String, TxResult>,
    next_raw_logs: VecDeque<String>,
    failing_broadcasts: usize,
    passing_broadcasts: usize,
    tx_counter: u64,
}

/// An in-memory coordination chain.
///
/// Accepted votes are recorded per ballot and voter, so `has_voted` flips
/// to `true` exactly like on the real chain. Broadcasts check the account
/// sequence and answer a mismatch with code 32.
#[derive(Debug)]
pub struct MockedCoordinator {
    state: Mutex<State>,
}

impl Default for MockedCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockedCoordinator {
    /// A chain at height 1 with the default feature flags.
    pub fn new() -> Self {
        let state = State {
            height: 1,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Sets the block height.
    pub fn set_block_height(&self, height: i64) {
        self.state.lock().height = height;
    }

    /// Moves one block forward.
    pub fn advance_block(&self) -> i64 {
        let mut state = self.state.lock();
        state.height += 1;
        state.height
    }

    /// Changes the operator sequence behind the client's back.
    pub fn set_sequence(&self, sequence: u64) {
        self.state.lock().account.sequence = sequence;
    }

    /// Sets the fee market.
    pub fn set_feemarket(&self, params: FeemarketParams) {
        self.state.lock().feemarket = params;
    }

    /// Sets the parameters of one chain, replacing the old ones.
    pub fn set_chain_params(&self, params: ChainParams) {
        let mut state = self.state.lock();
        state.chain_params.retain(|p| p.chain_id != params.chain_id);
        state.chain_params.push(params);
    }

    /// Sets the supported chains.
    pub fn set_supported_chains(&self, chains: Vec<Chain>) {
        self.state.lock().chains = chains;
    }

    /// Sets the keygen record.
    pub fn set_keygen(&self, keygen: Option<KeygenRecord>) {
        self.state.lock().keygen = keygen;
    }

    /// Sets the current TSS.
    pub fn set_current_tss(&self, tss: Option<TssRecord>) {
        self.state.lock().tss = tss;
    }

    /// Sets the global switches.
    pub fn set_crosschain_flags(&self, flags: CrosschainFlags) {
        self.state.lock().flags = flags;
    }

    /// Sets the rate limiter configuration and its input.
    pub fn set_rate_limiter(
        &self,
        flags: RateLimiterFlags,
        input: RateLimiterInput,
    ) {
        let mut state = self.state.lock();
        state.rate_limiter_flags = flags;
        state.rate_limiter_input = input;
    }

    /// Sets the pending jobs of a chain. They are served ascending by nonce.
    pub fn set_pending_jobs(&self, chain_id: ChainId, mut jobs: Vec<OutboundJob>) {
        jobs.sort_by_key(OutboundJob::nonce);
        self.state.lock().pending.insert(chain_id, jobs);
    }

    /// Adds an inbound tracker.
    pub fn add_in_tx_tracker(&self, tracker: InTxTracker) {
        self.state
            .lock()
            .in_trackers
            .entry(tracker.chain_id)
            .or_default()
            .push(tracker);
    }

    /// Sets the indexed height of a chain.
    pub fn set_chain_index(&self, chain_id: ChainId, curr_height: u64) {
        self.state.lock().chain_index.insert(
            chain_id,
            ChainIndex {
                chain_id,
                curr_height,
            },
        );
    }

    /// Sets the operator balance.
    pub fn set_operator_balance(&self, balance: U256) {
        self.state.lock().operator_balance = balance;
    }

    /// Sets the last recharge index of a token.
    pub fn set_recharge_index(
        &self,
        chain_id: ChainId,
        token: RechargeToken,
        index: u64,
    ) {
        self.state
            .lock()
            .recharge_index
            .insert((chain_id, token), index);
    }

    /// Makes the next `count` broadcasts fail as if the node was unreachable.
    pub fn fail_next_broadcasts(&self, count: usize) {
        self.fail_broadcasts_after(0, count);
    }

    /// Lets `passing` broadcasts through, then fails the next `count`.
    pub fn fail_broadcasts_after(&self, passing: usize, count: usize) {
        let mut state = self.state.lock();
        state.passing_broadcasts = passing;
        state.failing_broadcasts = count;
    }

    /// Execution log of the next accepted transaction. The messages of a
    /// transaction with a non empty log are not applied.
    pub fn push_execution_log(&self, raw_log: impl Into<String>) {
        self.state.lock().next_raw_logs.push_back(raw_log.into());
    }

    /// Every accepted transaction, in order.
    pub fn broadcasts(&self) -> Vec<TxEnvelope> {
        self.state.lock().broadcasts.clone()
    }

    /// Every accepted message of the given kind, in order.
    pub fn messages_of_kind(&self, kind: &str) -> Vec<CoordinatorMsg> {
        self.state
            .lock()
            .broadcasts
            .iter()
            .flat_map(|tx| tx.msgs.iter())
            .filter(|m| m.kind() == kind)
            .cloned()
            .collect()
    }

    fn apply(state: &mut State, msg: &CoordinatorMsg) -> Result<()> {
        if let Some(ballot) = msg.ballot_digest()? {
            state.votes.insert((ballot, msg.signer().to_owned()));
        }
        if let CoordinatorMsg::AddToOutTxTracker(m) = msg {
            let tracker = state
                .out_trackers
                .entry((m.chain_id, m.nonce))
                .or_insert_with(|| OutTxTracker {
                    chain_id: m.chain_id,
                    nonce: m.nonce,
                    hash_list: Vec::new(),
                });
            if !tracker.contains(&m.tx_hash) {
                tracker.hash_list.push(TxHashEntry {
                    tx_hash: m.tx_hash.clone(),
                    reporter: m.signer.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CoordinatorRpc for MockedCoordinator {
    async fn block_height(&self) -> Result<i64> {
        Ok(self.state.lock().height)
    }

    async fn account(&self, _address: &str) -> Result<AccountInfo> {
        Ok(self.state.lock().account)
    }

    async fn feemarket_params(&self) -> Result<FeemarketParams> {
        Ok(self.state.lock().feemarket)
    }

    async fn has_voted(&self, ballot: &str, voter: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .votes
            .contains(&(ballot.to_owned(), voter.to_owned())))
    }

    async fn chain_params(&self) -> Result<Vec<ChainParams>> {
        Ok(self.state.lock().chain_params.clone())
    }

    async fn supported_chains(&self) -> Result<Vec<Chain>> {
        Ok(self.state.lock().chains.clone())
    }

    async fn keygen(&self) -> Result<Option<KeygenRecord>> {
        Ok(self.state.lock().keygen.clone())
    }

    async fn current_tss(&self) -> Result<Option<TssRecord>> {
        Ok(self.state.lock().tss.clone())
    }

    async fn crosschain_flags(&self) -> Result<CrosschainFlags> {
        Ok(self.state.lock().flags)
    }

    async fn rate_limiter_flags(&self) -> Result<RateLimiterFlags> {
        Ok(self.state.lock().rate_limiter_flags.clone())
    }

    async fn rate_limiter_input(
        &self,
        _window: i64,
    ) -> Result<RateLimiterInput> {
        Ok(self.state.lock().rate_limiter_input.clone())
    }

    async fn pending_jobs(&self, chain_id: ChainId) -> Result<Vec<OutboundJob>> {
        Ok(self
            .state
            .lock()
            .pending
            .get(&chain_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn job_by_nonce(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> Result<Option<OutboundJob>> {
        Ok(self
            .state
            .lock()
            .pending
            .get(&chain_id)
            .and_then(|jobs| jobs.iter().find(|j| j.nonce() == nonce))
            .cloned())
    }

    async fn out_tx_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> Result<Option<OutTxTracker>> {
        Ok(self.state.lock().out_trackers.get(&(chain_id, nonce)).cloned())
    }

    async fn all_out_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutTxTracker>> {
        let mut trackers: Vec<_> = self
            .state
            .lock()
            .out_trackers
            .values()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect();
        trackers.sort_by_key(|t| t.nonce);
        Ok(trackers)
    }

    async fn in_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<InTxTracker>> {
        Ok(self
            .state
            .lock()
            .in_trackers
            .get(&chain_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn chain_index(
        &self,
        chain_id: ChainId,
    ) -> Result<Option<ChainIndex>> {
        Ok(self.state.lock().chain_index.get(&chain_id).copied())
    }

    async fn operator_balance(&self, _address: &str) -> Result<U256> {
        Ok(self.state.lock().operator_balance)
    }

    async fn recharge_index(
        &self,
        chain_id: ChainId,
        token: RechargeToken,
    ) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .recharge_index
            .get(&(chain_id, token))
            .copied()
            .unwrap_or_default())
    }

    async fn broadcast_tx_sync(&self, tx: TxEnvelope) -> Result<TxResponse> {
        let mut state = self.state.lock();
        if state.passing_broadcasts > 0 {
            state.passing_broadcasts -= 1;
        } else if state.failing_broadcasts > 0 {
            state.failing_broadcasts -= 1;
            return Err(Error::Rpc("connection refused".into()));
        }
        if tx.sequence != state.account.sequence {
            return Ok(TxResponse {
                code: SEQUENCE_MISMATCH_CODE,
                tx_hash: String::new(),
                raw_log: format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    state.account.sequence, tx.sequence
                ),
            });
        }
        state.account.sequence += 1;
        state.tx_counter += 1;
        let tx_hash = format!("0x{:064x}", state.tx_counter);
        let raw_log = state.next_raw_logs.pop_front().unwrap_or_default();
        if raw_log.is_empty() {
            for msg in &tx.msgs {
                Self::apply(&mut state, msg)?;
            }
        }
        let code = u32::from(!raw_log.is_empty());
        state
            .results
            .insert(tx_hash.clone(), TxResult { code, raw_log });
        state.broadcasts.push(tx);
        Ok(TxResponse {
            code: 0,
            tx_hash,
            raw_log: String::new(),
        })
    }

    async fn query_tx_result(&self, tx_hash: &str) -> Result<Option<TxResult>> {
        Ok(self.state.lock().results.get(tx_hash).cloned())
    }
}
