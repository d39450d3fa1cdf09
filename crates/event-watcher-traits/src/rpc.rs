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

use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Block, BlockId, BlockNumber, Bytes, Filter, Log, Transaction,
    TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use webb_relayer_utils::{Error, Result};

/// The calls the observers and signers make to an external EVM chain.
///
/// Implemented for every ethers [`Provider`], and by
/// [`MockedEvmClient`](crate::mocked::MockedEvmClient) in tests.
#[async_trait::async_trait]
pub trait EvmRpcClient: Send + Sync + 'static {
    /// Latest block height.
    async fn block_number(&self) -> Result<u64>;

    /// Block at `number`, with transaction hashes only.
    async fn block_by_number(&self, number: u64) -> Result<Option<Block<H256>>>;

    /// Transaction by hash.
    async fn transaction_by_hash(&self, hash: H256)
        -> Result<Option<Transaction>>;

    /// Receipt by transaction hash.
    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>>;

    /// Native balance of `address` at the latest block.
    async fn balance_at(&self, address: Address) -> Result<U256>;

    /// Suggested gas price.
    async fn suggest_gas_price(&self) -> Result<U256>;

    /// Sends a signed transaction. Errors keep the node's message, signers
    /// classify them by text.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// `eth_call` against the latest block.
    async fn call_contract(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Logs matching `filter`.
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

#[async_trait::async_trait]
impl<P> EvmRpcClient for Provider<P>
where
    P: JsonRpcClient + 'static,
{
    async fn block_number(&self) -> Result<u64> {
        Ok(self.get_block_number().await?.as_u64())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<Block<H256>>> {
        let id = BlockId::Number(BlockNumber::Number(U64::from(number)));
        Ok(self.get_block(id).await?)
    }

    async fn transaction_by_hash(
        &self,
        hash: H256,
    ) -> Result<Option<Transaction>> {
        Ok(self.get_transaction(hash).await?)
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        Ok(self.get_transaction_receipt(hash).await?)
    }

    async fn balance_at(&self, address: Address) -> Result<U256> {
        Ok(self.get_balance(address, None).await?)
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        Ok(self.get_gas_price().await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = Middleware::send_raw_transaction(self, raw)
            .await
            .map_err(Error::rpc)?;
        Ok(*pending)
    }

    async fn call_contract(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction =
            TransactionRequest::new().to(to).data(data).into();
        Ok(self.call(&tx, None).await?)
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        Ok(self.get_logs(filter).await?)
    }
}
