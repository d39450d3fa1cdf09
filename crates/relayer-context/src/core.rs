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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use webb_relayer_types::chain::CrosschainFlags;
use webb_relayer_types::keygen::KeygenRecord;
use webb_relayer_types::{Chain, ChainId, ChainParams};

/// What the relayer currently knows about the coordination chain.
#[derive(Debug, Clone, Default)]
pub struct CoreSnapshot {
    /// Latest keygen record.
    pub keygen: Option<KeygenRecord>,
    /// Chains supported by the coordination chain.
    pub chains: Vec<Chain>,
    /// Parameters of the chains this relayer is configured for.
    pub chain_params: HashMap<ChainId, ChainParams>,
    /// Public key of the TSS in use.
    pub current_tss_pubkey: String,
    /// Global inbound/outbound switches.
    pub crosschain_flags: CrosschainFlags,
}

/// Hot-swappable, lock guarded view of the coordination chain state.
///
/// Cloning is cheap and every clone sees the same snapshot. Readers get
/// copies, the lock is never held across an await.
#[derive(Debug, Clone)]
pub struct CoreContext {
    coordinator: Chain,
    inner: Arc<RwLock<CoreSnapshot>>,
}

impl CoreContext {
    /// Creates an empty context for the given coordination chain.
    pub fn new(coordinator: Chain) -> Self {
        Self {
            coordinator,
            inner: Default::default(),
        }
    }

    /// The coordination chain.
    pub fn coordinator(&self) -> &Chain {
        &self.coordinator
    }

    /// Latest keygen record.
    pub fn keygen(&self) -> Option<KeygenRecord> {
        self.inner.read().keygen.clone()
    }

    /// Every chain supported by the coordination chain.
    pub fn enabled_chains(&self) -> Vec<Chain> {
        self.inner.read().chains.clone()
    }

    /// Supported chains other than the coordination chain itself.
    pub fn external_chains(&self) -> Vec<Chain> {
        self.inner
            .read()
            .chains
            .iter()
            .filter(|c| c.id != self.coordinator.id && !c.is_coordinator())
            .cloned()
            .collect()
    }

    /// Parameters of `chain_id`, when the chain is configured.
    pub fn chain_params(&self, chain_id: ChainId) -> Option<ChainParams> {
        self.inner.read().chain_params.get(&chain_id).cloned()
    }

    /// Public key of the TSS in use.
    pub fn current_tss_pubkey(&self) -> String {
        self.inner.read().current_tss_pubkey.clone()
    }

    /// Global inbound/outbound switches.
    pub fn crosschain_flags(&self) -> CrosschainFlags {
        self.inner.read().crosschain_flags
    }

    /// Whether inbound events of a chain with `params` should be voted.
    pub fn is_inbound_observation_enabled(&self, params: &ChainParams) -> bool {
        params.is_supported && self.crosschain_flags().is_inbound_enabled
    }

    /// Whether outbound jobs of a chain with `params` should be processed.
    pub fn is_outbound_observation_enabled(
        &self,
        params: &ChainParams,
    ) -> bool {
        params.is_supported && self.crosschain_flags().is_outbound_enabled
    }

    /// Replaces the snapshot.
    ///
    /// Only parameters of chains in `configured` are kept. Changes of the
    /// supported chain set and of the TSS key are logged.
    pub fn update(
        &self,
        mut snapshot: CoreSnapshot,
        configured: impl Fn(ChainId) -> bool,
    ) {
        snapshot.chain_params.retain(|id, _| configured(*id));
        let mut guard = self.inner.write();
        let old_ids: Vec<_> = guard.chains.iter().map(|c| c.id).collect();
        let new_ids: Vec<_> = snapshot.chains.iter().map(|c| c.id).collect();
        if !guard.chains.is_empty() && old_ids != new_ids {
            tracing::warn!(
                ?old_ids,
                ?new_ids,
                "Supported chains changed on the coordination chain"
            );
        }
        if !guard.current_tss_pubkey.is_empty()
            && guard.current_tss_pubkey != snapshot.current_tss_pubkey
        {
            tracing::warn!(
                old = %guard.current_tss_pubkey,
                new = %snapshot.current_tss_pubkey,
                "TSS pubkey changed"
            );
        }
        *guard = snapshot;
    }
}
