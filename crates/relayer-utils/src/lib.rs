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

//! # Relayer Utils Module 🕸️
//!
//! Errors, retry policies, probes and metrics shared by every crate of the
//! bridge relayer.

#![warn(missing_docs)]

/// Metrics functionality
pub mod metric;
/// Multi provider for ethers.
pub mod multi_provider;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

use ethers::providers::{Http, Provider, RetryClient};
use multi_provider::MultiProvider;

/// The ethers provider used to talk to every external EVM chain.
pub type EthersClient = Provider<RetryClient<MultiProvider<Http>>>;

/// An enum of all possible errors that could be encountered during the execution of the
/// bridge relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Hex decoding error.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Signature recovery or parsing error.
    #[error(transparent)]
    Signature(#[from] ethers::types::SignatureError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Prometheus registration error.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Chain not found or not enabled.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The chain id of the chain.
        chain_id: i64,
    },
    /// Missing Secrets in the config, like the TSS private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// The external chain reported a height lower than what we already saw.
    #[error(
        "Chain {} rewound: current height {} is lower than last seen {}",
        chain_id,
        current,
        last
    )]
    BlockRewind {
        /// The chain id of the chain.
        chain_id: i64,
        /// The height reported now.
        current: u64,
        /// The highest height reported before.
        last: u64,
    },
    /// Not enough blocks on the chain to satisfy the confirmation depth.
    #[error(
        "Chain {} at height {} is below the confirmation depth {}",
        chain_id,
        height,
        confirmations
    )]
    NotEnoughConfirmations {
        /// The chain id of the chain.
        chain_id: i64,
        /// The current chain height.
        height: u64,
        /// The required confirmation depth.
        confirmations: u64,
    },
    /// An RPC call failed. The message is kept verbatim since callers
    /// classify broadcast errors by their text.
    #[error("RPC error: {}", _0)]
    Rpc(String),
    /// The coordination chain rejected a transaction.
    #[error("Broadcast rejected with code {}: {}", code, raw_log)]
    BroadcastRejected {
        /// The ABCI response code.
        code: u32,
        /// The raw log returned by the node.
        raw_log: String,
    },
    /// The outbound job could not be turned into a transaction.
    #[error("Invalid outbound job: {}", _0)]
    InvalidOutbound(String),
    /// Gas parameters are not usable.
    #[error("Invalid gas: {}", _0)]
    InvalidGas(String),
    /// The keygen ceremony failed.
    #[error("Keygen failed: {}", _0)]
    KeygenFailed(String),
    /// No TSS key is available yet.
    #[error("TSS key is not ready")]
    TssNotReady,
    /// The requested operation is not supported.
    #[error("Unsupported: {}", _0)]
    Unsupported(String),
    /// a backgorund task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// a backgorund task failed and stopped Abnormally.
    #[error("Task Stopped Apnormally")]
    TaskStoppedAbnormally,
    /// Provider not found error.
    #[error("Provider not found for index {0}")]
    ProviderNotFound(usize),
}

impl Error {
    /// Wraps any displayable RPC failure, keeping its message.
    pub fn rpc(e: impl std::fmt::Display) -> Self {
        Error::Rpc(e.to_string())
    }
}

/// A type alias for the result for the relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
