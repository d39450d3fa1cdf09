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

use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::signers::LocalWallet;
use ethers::types::H256;
use parking_lot::RwLock;
use typed_builder::TypedBuilder;
use webb_relayer_store::KeyShareStore;
use webb_relayer_types::keygen::{Blame, KeygenRecord};
use webb_relayer_types::private_key::PrivateKey;
use webb_relayer_utils::{Error, Result};

use crate::RecoverableSignature;

/// What a keygen ceremony ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeygenOutcome {
    /// A key was generated, this node holds a share of it.
    Generated {
        /// Uncompressed public key of the new key.
        pubkey: String,
    },
    /// The ceremony failed, with the participants to blame.
    Failed(Blame),
}

/// The multi-party protocol behind the TSS key.
///
/// Implementations keep their key shares themselves; the relayer only
/// refers to keys by public key.
#[async_trait::async_trait]
pub trait KeygenCeremony: std::fmt::Debug + Send + Sync + 'static {
    /// Runs one keygen ceremony for `request`.
    async fn keygen(&self, request: &KeygenRecord) -> Result<KeygenOutcome>;

    /// Signs `digest` with the key of `pubkey`.
    async fn keysign(
        &self,
        pubkey: &str,
        digest: [u8; 32],
    ) -> Result<RecoverableSignature>;

    /// Whether this node holds a share of `pubkey`.
    fn has_key(&self, pubkey: &str) -> Result<bool>;
}

/// A single-party ceremony: the whole key lives on this node.
///
/// Meant for development networks and tests. With a configured private key
/// every ceremony yields the same key, otherwise a fresh one is drawn.
#[derive(TypedBuilder)]
pub struct LocalKeygenCeremony {
    store: Arc<dyn KeyShareStore>,
    #[builder(default, setter(strip_option))]
    private_key: Option<PrivateKey>,
    #[builder(default, setter(skip))]
    wallets: RwLock<HashMap<String, LocalWallet>>,
}

impl std::fmt::Debug for LocalKeygenCeremony {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeygenCeremony")
            .field("store", &self.store)
            .field("keys", &self.wallets.read().len())
            .finish()
    }
}

pub(crate) fn wallet_pubkey(wallet: &LocalWallet) -> String {
    let point = wallet
        .signer()
        .verifying_key()
        .as_affine()
        .to_encoded_point(false);
    format!("0x{}", hex::encode(point.as_bytes()))
}

impl LocalKeygenCeremony {
    fn wallet(&self, pubkey: &str) -> Result<LocalWallet> {
        if let Some(wallet) = self.wallets.read().get(pubkey) {
            return Ok(wallet.clone());
        }
        let share = self
            .store
            .get_key_share(pubkey)?
            .ok_or(Error::TssNotReady)?;
        let wallet = LocalWallet::from_bytes(&share)?;
        self.wallets
            .write()
            .insert(pubkey.to_owned(), wallet.clone());
        Ok(wallet)
    }
}

#[async_trait::async_trait]
impl KeygenCeremony for LocalKeygenCeremony {
    async fn keygen(&self, request: &KeygenRecord) -> Result<KeygenOutcome> {
        let wallet = match &self.private_key {
            Some(key) => key.to_wallet()?,
            None => LocalWallet::new(&mut rand::thread_rng()),
        };
        let pubkey = wallet_pubkey(&wallet);
        self.store
            .insert_key_share(&pubkey, wallet.signer().to_bytes().as_slice())?;
        tracing::debug!(
            %pubkey,
            height = request.block_number,
            grantees = request.grantee_pubkeys.len(),
            "Generated a local key"
        );
        self.wallets.write().insert(pubkey.clone(), wallet);
        Ok(KeygenOutcome::Generated { pubkey })
    }

    async fn keysign(
        &self,
        pubkey: &str,
        digest: [u8; 32],
    ) -> Result<RecoverableSignature> {
        let wallet = self.wallet(pubkey)?;
        let signature = wallet.sign_hash(H256::from(digest))?;
        let recovery_id = signature
            .v
            .checked_sub(27)
            .and_then(|id| u8::try_from(id).ok())
            .ok_or(Error::Generic("unexpected recovery id from the wallet"))?;
        let mut out = [0u8; 65];
        signature.r.to_big_endian(&mut out[..32]);
        signature.s.to_big_endian(&mut out[32..64]);
        out[64] = recovery_id;
        Ok(out)
    }

    fn has_key(&self, pubkey: &str) -> Result<bool> {
        if self.wallets.read().contains_key(pubkey) {
            return Ok(true);
        }
        Ok(self.store.get_key_share(pubkey)?.is_some())
    }
}
