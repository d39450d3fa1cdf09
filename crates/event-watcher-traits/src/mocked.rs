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

use std::collections::{HashMap, VecDeque};

use ethers::types::{
    Address, Block, Bytes, Filter, Log, Transaction, TransactionReceipt,
    ValueOrArray, H256, U256, U64,
};
use parking_lot::Mutex;
use webb_relayer_utils::{Error, Result};

use crate::rpc::EvmRpcClient;

#[derive(Debug, Default)]
struct State {
    height: u64,
    timestamps: HashMap<u64, u64>,
    block_txs: HashMap<u64, Vec<H256>>,
    logs: Vec<Log>,
    txs: HashMap<H256, Transaction>,
    receipts: HashMap<H256, TransactionReceipt>,
    balances: HashMap<Address, U256>,
    gas_price: U256,
    call_results: HashMap<Address, Bytes>,
    send_errors: VecDeque<String>,
    sent: Vec<Bytes>,
    failing_log_queries: usize,
    log_queries: usize,
}

/// An in-memory EVM chain for tests and local runs.
///
/// Blocks exist up to the configured height; their timestamps default to
/// twelve seconds per block unless set.
#[derive(Debug, Default)]
pub struct MockedEvmClient {
    state: Mutex<State>,
}

impl MockedEvmClient {
    /// An empty chain at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latest height. Lowering it simulates a rewinding node.
    pub fn set_block_number(&self, height: u64) {
        self.state.lock().height = height;
    }

    /// Sets the timestamp of one block.
    pub fn set_block_timestamp(&self, height: u64, timestamp: u64) {
        self.state.lock().timestamps.insert(height, timestamp);
    }

    /// Appends `hash` to the transactions of block `height`.
    pub fn include_transaction(&self, height: u64, hash: H256) {
        self.state
            .lock()
            .block_txs
            .entry(height)
            .or_default()
            .push(hash);
    }

    /// Adds a log, returned by every matching log query.
    pub fn add_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    /// Adds a transaction.
    pub fn add_transaction(&self, tx: Transaction) {
        self.state.lock().txs.insert(tx.hash, tx);
    }

    /// Adds a receipt.
    pub fn add_receipt(&self, receipt: TransactionReceipt) {
        self.state
            .lock()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    /// Sets the native balance of `address`.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    /// Sets the suggested gas price.
    pub fn set_gas_price(&self, price: U256) {
        self.state.lock().gas_price = price;
    }

    /// Sets what an `eth_call` to `to` returns.
    pub fn set_call_result(&self, to: Address, result: Bytes) {
        self.state.lock().call_results.insert(to, result);
    }

    /// The next raw transaction send fails with `message`.
    pub fn push_send_error(&self, message: impl Into<String>) {
        self.state.lock().send_errors.push_back(message.into());
    }

    /// Makes the next `count` log queries fail.
    pub fn fail_next_log_queries(&self, count: usize) {
        self.state.lock().failing_log_queries = count;
    }

    /// Every raw transaction accepted so far.
    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.state.lock().sent.clone()
    }

    /// Number of log queries served or failed.
    pub fn log_queries(&self) -> usize {
        self.state.lock().log_queries
    }
}

fn filter_matches(filter: &Filter, log: &Log) -> bool {
    let height = match log.block_number {
        Some(height) => height,
        None => return false,
    };
    if filter.get_from_block().map_or(false, |from| height < from) {
        return false;
    }
    if filter.get_to_block().map_or(false, |to| height > to) {
        return false;
    }
    let address_matches = match &filter.address {
        None => true,
        Some(ValueOrArray::Value(address)) => *address == log.address,
        Some(ValueOrArray::Array(addresses)) => addresses.contains(&log.address),
    };
    let topic_matches = match &filter.topics[0] {
        None => true,
        Some(ValueOrArray::Value(topic)) => {
            topic.is_none() || log.topics.first() == topic.as_ref()
        }
        Some(ValueOrArray::Array(topics)) => topics
            .iter()
            .flatten()
            .any(|t| log.topics.first() == Some(t)),
    };
    address_matches && topic_matches
}

#[async_trait::async_trait]
impl EvmRpcClient for MockedEvmClient {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.lock().height)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<Block<H256>>> {
        let state = self.state.lock();
        if number > state.height {
            return Ok(None);
        }
        let timestamp = state
            .timestamps
            .get(&number)
            .copied()
            .unwrap_or(number * 12);
        Ok(Some(Block {
            number: Some(U64::from(number)),
            hash: Some(H256::from_low_u64_be(number)),
            timestamp: U256::from(timestamp),
            transactions: state
                .block_txs
                .get(&number)
                .cloned()
                .unwrap_or_default(),
            ..Default::default()
        }))
    }

    async fn transaction_by_hash(
        &self,
        hash: H256,
    ) -> Result<Option<Transaction>> {
        Ok(self.state.lock().txs.get(&hash).cloned())
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn balance_at(&self, address: Address) -> Result<U256> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        Ok(self.state.lock().gas_price)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let mut state = self.state.lock();
        if let Some(message) = state.send_errors.pop_front() {
            return Err(Error::Rpc(message));
        }
        let hash = H256::from(ethers::utils::keccak256(&raw));
        state.sent.push(raw);
        Ok(hash)
    }

    async fn call_contract(&self, to: Address, _data: Bytes) -> Result<Bytes> {
        self.state
            .lock()
            .call_results
            .get(&to)
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("execution reverted: no code at {to:?}")))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let mut state = self.state.lock();
        state.log_queries += 1;
        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(Error::Rpc("request timed out".into()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| filter_matches(filter, log))
            .cloned()
            .collect())
    }
}
