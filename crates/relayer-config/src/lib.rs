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

#![warn(missing_docs)]

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! The relayer configuration module is responsible for configuring the relayer.
//! Possible configuration include:
//! * `port`: The port the metrics endpoint will listen on. Defaults to 9955
//! * `coordinator`: how to reach the coordination chain and how to pace
//!   the transactions sent to it.
//! * `evm`: EVM based networks observed and signed for.
//! * `tss`: the threshold signing backend.
//! * `compliance`: restricted addresses and the audit log.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the optional fields.
pub mod defaults;
/// EVM configuration
pub mod evm;
/// Utils for processing configuration
pub mod utils;

use evm::EvmChainConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use webb_relayer_types::private_key::PrivateKey;
use webb_relayer_types::ChainId;

/// RelayerConfig is the configuration for the bridge relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// Metrics endpoint port number
    ///
    /// default to 9955
    #[serde(default = "defaults::relayer_port", skip_serializing)]
    pub port: u16,
    /// The coordination chain.
    pub coordinator: CoordinatorConfig,
    /// EVM based networks and the configuration.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub evm: HashMap<String, EvmChainConfig>,
    /// Threshold signing configuration.
    #[serde(default)]
    pub tss: TssConfig,
    /// Compliance configuration.
    #[serde(default)]
    pub compliance: ComplianceConfig,
}

impl RelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> webb_relayer_utils::Result<()> {
        if self.coordinator.max_msgs_per_tx < 2 {
            return Err(webb_relayer_utils::Error::Generic(
                "coordinator.max-msgs-per-tx must be at least 2",
            ));
        }
        let all_reachable = self
            .evm
            .values()
            .filter(|c| c.enabled)
            .all(|c| !c.http_endpoints.is_empty());
        all_reachable.then_some(()).ok_or(
            webb_relayer_utils::Error::Generic(
                "every enabled evm chain needs at least one http endpoint",
            ),
        )
    }

    /// The configuration of one EVM chain, looked up by chain id.
    pub fn evm_chain(&self, chain_id: ChainId) -> Option<&EvmChainConfig> {
        self.evm.values().find(|c| c.chain_id == chain_id)
    }
}

/// How to reach and pace the coordination chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Chain id of the coordination chain.
    pub chain_id: ChainId,
    /// Display name.
    pub name: String,
    /// REST gateway of the coordination chain node.
    #[serde(skip_serializing)]
    pub endpoint: url::Url,
    /// Operator account voting on behalf of this relayer.
    pub operator_address: String,
    /// Messages packed into one transaction when voting block proofs.
    #[serde(default = "defaults::max_msgs_per_tx")]
    pub max_msgs_per_tx: usize,
    /// Average block time, in seconds.
    #[serde(default = "defaults::block_time_secs")]
    pub block_time_secs: u64,
    /// How often the coordination chain snapshot is refreshed, in seconds.
    #[serde(default = "defaults::context_update_interval_secs")]
    pub context_update_interval_secs: u64,
    /// Broadcast attempts before giving up.
    #[serde(default = "defaults::broadcast_retry_count")]
    pub broadcast_retry_count: usize,
    /// Seconds between two broadcast attempts.
    #[serde(default = "defaults::broadcast_retry_interval_secs")]
    pub broadcast_retry_interval_secs: u64,
}

/// TssConfig is the configuration of the threshold signing backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TssConfig {
    /// Key share of the local signing backend.
    ///
    /// The format is the same as any other private key:
    /// a `0x` prefixed hex string or `$ENV_VAR` holding one.
    /// When missing, a fresh share is generated by every ceremony.
    #[serde(skip_serializing, default)]
    pub private_key: Option<PrivateKey>,
    /// How often the keygen record is polled, in milliseconds.
    #[serde(default = "defaults::keygen_poll_interval_ms")]
    pub keygen_poll_interval_ms: u64,
    /// Whether a test keysign runs after a successful keygen.
    #[serde(default = "defaults::test_keysign")]
    pub test_keysign: bool,
}

impl Default for TssConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            keygen_poll_interval_ms: defaults::keygen_poll_interval_ms(),
            test_keysign: defaults::test_keysign(),
        }
    }
}

/// ComplianceConfig lists the addresses the relayer refuses to serve.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComplianceConfig {
    /// File the compliance audit log is appended to.
    pub log_path: Option<PathBuf>,
    /// Restricted addresses, lower-cased while loading.
    #[serde(default)]
    pub restricted_addresses: Vec<String>,
}
