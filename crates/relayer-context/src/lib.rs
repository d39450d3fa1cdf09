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
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.
use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Provider, RetryClientBuilder};
use tokio::sync::broadcast;

use webb_relayer_store::SledStore;
use webb_relayer_types::{Chain, ChainKind};
use webb_relayer_utils::metric::{self, Metrics};
use webb_relayer_utils::multi_provider::MultiProvider;
use webb_relayer_utils::EthersClient;

/// Restricted address book and the compliance audit log.
pub mod compliance;
/// Hot-swappable snapshot of the coordination chain state.
pub mod core;
/// Retry policy of the external chain RPC clients.
pub mod retry_policy;

pub use self::compliance::RestrictedAddressBook;
pub use self::core::{CoreContext, CoreSnapshot};

/// RelayerContext contains Relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: webb_relayer_config::RelayerConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// When a task is spawned, it is passed a broadcast receiver handle.
    /// When a graceful shutdown is initiated, a `()` value is sent via the
    /// broadcast::Sender. Each task receives it at its next suspension point,
    /// reaches a safe terminal state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relayer
    pub metrics: Arc<metric::Metrics>,
    store: SledStore,
    core: CoreContext,
    restricted: Arc<RestrictedAddressBook>,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: webb_relayer_config::RelayerConfig,
        store: SledStore,
    ) -> webb_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        let coordinator = Chain::new(
            config.coordinator.chain_id,
            ChainKind::Coordinator,
            config.coordinator.name.clone(),
        );
        let core = CoreContext::new(coordinator);
        let restricted = Arc::new(RestrictedAddressBook::new(
            config.compliance.restricted_addresses.iter(),
        ));
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
            store,
            core,
            restricted,
        })
    }
    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }
    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }
    /// Returns a new EVM provider for the given chain, spreading requests
    /// over every configured endpoint and retrying rate limited ones.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - The chain id.
    pub fn evm_provider(
        &self,
        chain_id: webb_relayer_types::ChainId,
    ) -> webb_relayer_utils::Result<Arc<EthersClient>> {
        let chain_config = self.config.evm_chain(chain_id).ok_or(
            webb_relayer_utils::Error::ChainNotFound { chain_id },
        )?;
        let endpoints = chain_config
            .http_endpoints
            .iter()
            .map(|url| Http::new(url.clone()))
            .collect::<Vec<_>>();
        let multi_provider = MultiProvider::new(Arc::new(endpoints));
        let client = RetryClientBuilder::default()
            .timeout_retries(3)
            .rate_limit_retries(10)
            .initial_backoff(Duration::from_millis(500))
            .build(multi_provider, retry_policy::HttpRetryPolicy::boxed()?);
        let provider =
            Provider::new(client).interval(Duration::from_millis(500));
        Ok(Arc::new(provider))
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// Returns the coordination chain snapshot.
    pub fn core(&self) -> &CoreContext {
        &self.core
    }

    /// Returns the restricted address book.
    pub fn restricted_addresses(&self) -> Arc<RestrictedAddressBook> {
        self.restricted.clone()
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
