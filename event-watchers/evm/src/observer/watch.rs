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
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::U256;
use webb_relayer_context::Shutdown;
use webb_relayer_types::coordinator::RechargeToken;
use webb_relayer_types::ChainParams;
use webb_relayer_utils::{Error, Result};

use super::EvmObserver;
use crate::contracts::{BalanceOfCall, BalanceOfReturn};

const RPC_STATUS_INTERVAL_SECS: u64 = 60;

/// One periodic task of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Watch {
    /// Scan of confirmed blocks.
    Inbound,
    /// Inbound transactions reported by hand.
    InTxTracker,
    /// Confirmation of tracked outbound transactions.
    Outbound,
    /// Gas price posts.
    GasPrice,
    /// Freshness of the RPC.
    RpcStatus,
    /// TSS balance of the bridged token.
    BridgeToken,
    /// TSS balance of the gas token.
    GasToken,
}

impl Watch {
    /// Every watch, in start order.
    pub const ALL: [Watch; 7] = [
        Watch::Inbound,
        Watch::InTxTracker,
        Watch::Outbound,
        Watch::GasPrice,
        Watch::RpcStatus,
        Watch::BridgeToken,
        Watch::GasToken,
    ];

    /// Name used in the logs.
    pub fn name(self) -> &'static str {
        match self {
            Watch::Inbound => "inbound",
            Watch::InTxTracker => "in_tx_tracker",
            Watch::Outbound => "outbound",
            Watch::GasPrice => "gas_price",
            Watch::RpcStatus => "rpc_status",
            Watch::BridgeToken => "bridge_token_balance",
            Watch::GasToken => "gas_token_balance",
        }
    }

    /// Time between two ticks, never under a second.
    pub fn interval(self, params: &ChainParams) -> Duration {
        let secs = match self {
            Watch::Inbound | Watch::InTxTracker => params.inbound_ticker,
            Watch::Outbound => params.outbound_ticker,
            Watch::GasPrice => params.gas_price_ticker,
            Watch::RpcStatus => RPC_STATUS_INTERVAL_SECS,
            Watch::BridgeToken | Watch::GasToken => params.balance_ticker,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Applies `multiplier` to `price`, with a precision of a thousandth.
pub fn scale_gas_price(price: U256, multiplier: f64) -> U256 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return price;
    }
    let permille = (multiplier * 1000.0).round() as u64;
    price
        .checked_mul(U256::from(permille))
        .map(|scaled| scaled / U256::from(1000u64))
        .unwrap_or(price)
}

fn balance_as_f64(balance: U256) -> f64 {
    if balance > U256::from(u128::MAX) {
        f64::MAX
    } else {
        balance.as_u128() as f64
    }
}

impl EvmObserver {
    fn watch_enabled(&self, watch: Watch, params: &ChainParams) -> bool {
        match watch {
            Watch::Inbound | Watch::InTxTracker => {
                self.core.is_inbound_observation_enabled(params)
            }
            Watch::Outbound => self.core.is_outbound_observation_enabled(params),
            _ => params.is_supported,
        }
    }

    /// Runs one tick of `watch`.
    pub async fn tick(&self, watch: Watch) -> Result<()> {
        match watch {
            Watch::Inbound => self.observe_inbound().await,
            Watch::InTxTracker => self.observe_in_tx_trackers().await,
            Watch::Outbound => self.observe_outbound().await,
            Watch::GasPrice => self.post_gas_price().await,
            Watch::RpcStatus => self.check_rpc_status().await,
            Watch::BridgeToken => {
                self.check_balance(RechargeToken::BridgeToken).await
            }
            Watch::GasToken => self.check_balance(RechargeToken::GasToken).await,
        }
    }

    pub(crate) async fn watch_loop(self: Arc<Self>, watch: Watch) {
        let mut shutdown = Shutdown::new(self.stop.subscribe());
        while !self.is_stopped() {
            let interval = watch.interval(&self.params());
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if !self.watch_enabled(watch, &self.params()) {
                tracing::trace!(chain = %self.chain, watch = watch.name(), "Watch disabled");
                continue;
            }
            if let Err(e) = self.tick(watch).await {
                tracing::error!(
                    %e,
                    chain = %self.chain,
                    watch = watch.name(),
                    "Watch tick failed"
                );
            }
        }
        tracing::debug!(chain = %self.chain, watch = watch.name(), "Watch stopped");
    }

    /// Posts the suggested gas price, scaled by the configured multiplier.
    pub async fn post_gas_price(&self) -> Result<()> {
        let suggested = self.rpc.suggest_gas_price().await?;
        let price = scale_gas_price(suggested, self.options.gas_price_multiplier);
        let height = self.rpc.block_number().await?;
        let tx_hash = self
            .client
            .post_gas_price(self.chain.id, price, "100", height)
            .await?;
        tracing::debug!(chain = %self.chain, %price, height, %tx_hash, "Posted gas price");
        Ok(())
    }

    /// Reports how old the latest block of the RPC is.
    pub async fn check_rpc_status(&self) -> Result<()> {
        let height = self.rpc.block_number().await?;
        let block = self
            .rpc
            .block_by_number(height)
            .await?
            .ok_or(Error::Generic("latest block not found"))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let age = now.saturating_sub(block.timestamp.low_u64());
        let healthy = age <= self.options.rpc_latency_alert.as_secs();
        let label = self.chain_label();
        self.metrics
            .rpc_latency_seconds
            .with_label_values(&[&label])
            .set(age as f64);
        self.metrics
            .rpc_up
            .with_label_values(&[&label])
            .set(i64::from(healthy));
        if !healthy {
            tracing::warn!(chain = %self.chain, height, age, "RPC is lagging");
        }
        Ok(())
    }

    /// Votes a recharge when a TSS balance fell under its threshold.
    pub async fn check_balance(&self, token: RechargeToken) -> Result<()> {
        let params = self.params();
        let tss = self.tss.evm_address()?;
        let (balance, enabled, threshold, label) = match token {
            RechargeToken::BridgeToken => {
                if params.bridge_token_address.is_zero() {
                    return Ok(());
                }
                let data = BalanceOfCall { account: tss }.encode();
                let raw = self
                    .rpc
                    .call_contract(params.bridge_token_address, data.into())
                    .await?;
                let BalanceOfReturn(balance) =
                    BalanceOfReturn::decode(raw).map_err(Error::rpc)?;
                (
                    balance,
                    params.bridge_token_recharge_enabled,
                    params.bridge_token_recharge_threshold,
                    "bridge",
                )
            }
            RechargeToken::GasToken => (
                self.rpc.balance_at(tss).await?,
                params.gas_token_recharge_enabled,
                params.gas_token_recharge_threshold,
                "gas",
            ),
        };
        self.metrics
            .token_balance
            .with_label_values(&[&self.chain_label(), label])
            .set(balance_as_f64(balance));
        if !enabled || balance >= threshold {
            return Ok(());
        }
        let index = self
            .client
            .rpc()
            .recharge_index(self.chain.id, token)
            .await?;
        let receipt = self
            .client
            .post_vote_recharge(self.chain.id, token, index + 1)
            .await?;
        tracing::info!(
            chain = %self.chain,
            token = label,
            %balance,
            %threshold,
            broadcast = receipt.is_broadcast(),
            "Voted TSS recharge"
        );
        Ok(())
    }
}
