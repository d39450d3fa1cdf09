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

use std::time::Duration;

use ethers::types::U256;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use webb_relayer_types::chain::{ChainIndex, CrosschainFlags};
use webb_relayer_types::coordinator::{
    AccountInfo, FeemarketParams, RechargeToken, TxEnvelope, TxResponse,
    TxResult,
};
use webb_relayer_types::keygen::{KeygenRecord, TssRecord};
use webb_relayer_types::rate_limit::{RateLimiterFlags, RateLimiterInput};
use webb_relayer_types::tracker::{InTxTracker, OutTxTracker};
use webb_relayer_types::{Chain, ChainId, ChainParams, OutboundJob};
use webb_relayer_utils::Result;

use crate::CoordinatorRpc;

const API_PREFIX: &str = "relayer/v1";

#[derive(Deserialize)]
struct Height {
    height: i64,
}

#[derive(Deserialize)]
struct Voted {
    has_voted: bool,
}

#[derive(Deserialize)]
struct Balance {
    balance: U256,
}

#[derive(Deserialize)]
struct Index {
    index: u64,
}

/// Talks to the REST gateway of a coordination chain node.
///
/// Every route lives under `relayer/v1/`, relative to the configured
/// endpoint. Routes answering `404` map to `None` where the trait returns
/// an `Option`.
#[derive(Debug, Clone)]
pub struct RestCoordinatorRpc {
    client: reqwest::Client,
    base: url::Url,
}

impl RestCoordinatorRpc {
    /// Creates a client for the gateway at `endpoint`.
    pub fn new(endpoint: url::Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base: endpoint,
        })
    }

    fn url(&self, route: &str) -> Result<url::Url> {
        Ok(self.base.join(&format!("{API_PREFIX}/{route}"))?)
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T> {
        let res = self
            .client
            .get(self.url(route)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    async fn get_opt<T: DeserializeOwned>(
        &self,
        route: &str,
    ) -> Result<Option<T>> {
        let res = self.client.get(self.url(route)?).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(res.error_for_status()?.json().await?))
    }
}

fn token_route(token: RechargeToken) -> &'static str {
    match token {
        RechargeToken::BridgeToken => "bridge_token",
        RechargeToken::GasToken => "gas_token",
    }
}

#[async_trait::async_trait]
impl CoordinatorRpc for RestCoordinatorRpc {
    async fn block_height(&self) -> Result<i64> {
        Ok(self.get::<Height>("block_height").await?.height)
    }

    async fn account(&self, address: &str) -> Result<AccountInfo> {
        self.get(&format!("accounts/{address}")).await
    }

    async fn feemarket_params(&self) -> Result<FeemarketParams> {
        self.get("feemarket").await
    }

    async fn has_voted(&self, ballot: &str, voter: &str) -> Result<bool> {
        let voted: Voted =
            self.get(&format!("ballots/{ballot}/voters/{voter}")).await?;
        Ok(voted.has_voted)
    }

    async fn chain_params(&self) -> Result<Vec<ChainParams>> {
        self.get("chain_params").await
    }

    async fn supported_chains(&self) -> Result<Vec<Chain>> {
        self.get("supported_chains").await
    }

    async fn keygen(&self) -> Result<Option<KeygenRecord>> {
        self.get_opt("keygen").await
    }

    async fn current_tss(&self) -> Result<Option<TssRecord>> {
        self.get_opt("tss").await
    }

    async fn crosschain_flags(&self) -> Result<CrosschainFlags> {
        self.get("crosschain_flags").await
    }

    async fn rate_limiter_flags(&self) -> Result<RateLimiterFlags> {
        self.get("rate_limiter/flags").await
    }

    async fn rate_limiter_input(&self, window: i64) -> Result<RateLimiterInput> {
        self.get(&format!("rate_limiter/input?window={window}"))
            .await
    }

    async fn pending_jobs(&self, chain_id: ChainId) -> Result<Vec<OutboundJob>> {
        self.get(&format!("chains/{chain_id}/pending_jobs")).await
    }

    async fn job_by_nonce(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> Result<Option<OutboundJob>> {
        self.get_opt(&format!("chains/{chain_id}/jobs/{nonce}"))
            .await
    }

    async fn out_tx_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
    ) -> Result<Option<OutTxTracker>> {
        self.get_opt(&format!("chains/{chain_id}/out_tx_trackers/{nonce}"))
            .await
    }

    async fn all_out_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OutTxTracker>> {
        self.get(&format!("chains/{chain_id}/out_tx_trackers"))
            .await
    }

    async fn in_tx_trackers(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<InTxTracker>> {
        self.get(&format!("chains/{chain_id}/in_tx_trackers")).await
    }

    async fn chain_index(
        &self,
        chain_id: ChainId,
    ) -> Result<Option<ChainIndex>> {
        self.get_opt(&format!("chains/{chain_id}/index")).await
    }

    async fn operator_balance(&self, address: &str) -> Result<U256> {
        let balance: Balance =
            self.get(&format!("balances/{address}")).await?;
        Ok(balance.balance)
    }

    async fn recharge_index(
        &self,
        chain_id: ChainId,
        token: RechargeToken,
    ) -> Result<u64> {
        let index: Index = self
            .get(&format!("chains/{chain_id}/recharge/{}", token_route(token)))
            .await?;
        Ok(index.index)
    }

    async fn broadcast_tx_sync(&self, tx: TxEnvelope) -> Result<TxResponse> {
        let res = self
            .client
            .post(self.url("txs")?)
            .json(&tx)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    async fn query_tx_result(&self, tx_hash: &str) -> Result<Option<TxResult>> {
        self.get_opt(&format!("txs/{tx_hash}")).await
    }
}
