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

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Numeric chain identifier, as assigned by the coordination chain.
pub type ChainId = i64;

/// The family a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// An EVM compatible chain.
    Evm,
    /// The coordination chain itself.
    Coordinator,
    /// Anything the relayer has no observer for.
    Other,
}

/// Immutable chain descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    /// Chain id.
    pub id: ChainId,
    /// Chain family.
    pub kind: ChainKind,
    /// Display name.
    pub name: String,
}

impl Chain {
    /// Creates a new chain descriptor.
    pub fn new(id: ChainId, kind: ChainKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }

    /// Whether this is an EVM chain.
    pub fn is_evm(&self) -> bool {
        self.kind == ChainKind::Evm
    }

    /// Whether this is the coordination chain.
    pub fn is_coordinator(&self) -> bool {
        self.kind == ChainKind::Coordinator
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Per chain parameters owned by the coordination chain.
///
/// Observers and signers keep a cached copy and compare by value to decide
/// whether a refresh is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// The chain these parameters belong to.
    pub chain_id: ChainId,
    /// Blocks an event has to be buried under before it is voted.
    pub confirmation_count: u64,
    /// Seconds between two gas price posts.
    pub gas_price_ticker: u64,
    /// Seconds between two inbound scans.
    pub inbound_ticker: u64,
    /// Seconds between two outbound tracker passes.
    pub outbound_ticker: u64,
    /// Seconds between two TSS balance checks.
    pub balance_ticker: u64,
    /// Default retry interval, in coordination blocks, of an outbound job.
    pub outbound_schedule_interval: i64,
    /// Number of pending jobs considered per scheduling tick.
    pub outbound_schedule_lookahead: i64,
    /// The connector contract that emits and receives cross-chain messages.
    pub connector_contract_address: Address,
    /// Strategy manager of the restaking protocol.
    pub strategy_manager_address: Address,
    /// Delegation manager of the restaking protocol.
    pub delegation_manager_address: Address,
    /// Registry router used to register services with the coordination chain.
    pub registry_router_address: Address,
    /// The bridged ERC20 token.
    pub bridge_token_address: Address,
    /// First block an observer scans when it has no cursor yet.
    pub start_block_height: u64,
    /// Whether the chain is supported at all.
    pub is_supported: bool,
    /// Whether the TSS bridge token balance is topped up automatically.
    pub bridge_token_recharge_enabled: bool,
    /// Bridge token balance under which a recharge is voted.
    pub bridge_token_recharge_threshold: U256,
    /// Whether the TSS gas token balance is topped up automatically.
    pub gas_token_recharge_enabled: bool,
    /// Gas token balance under which a recharge is voted.
    pub gas_token_recharge_threshold: U256,
}

/// Coordination chain wide switches for inbound and outbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosschainFlags {
    /// Whether inbound events are voted.
    pub is_inbound_enabled: bool,
    /// Whether outbound jobs are processed.
    pub is_outbound_enabled: bool,
}

impl Default for CrosschainFlags {
    fn default() -> Self {
        Self {
            is_inbound_enabled: true,
            is_outbound_enabled: true,
        }
    }
}

/// The highest external block the coordination chain has indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIndex {
    /// Chain id.
    pub chain_id: ChainId,
    /// Indexed height.
    pub curr_height: u64,
}
