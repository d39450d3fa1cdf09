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

//! # Relayer TSS Module 🕸️
//!
//! The threshold key of the relayer fleet.
//!
//! ## Overview
//!
//! A [`KeygenCeremony`] backend runs the multi-party protocol, [`Tss`] holds
//! the key it produced and hands out signatures to every outbound signer,
//! and [`generate_tss`] drives the keygen requests of the coordination chain
//! until a key is available.

#![warn(missing_docs)]

mod ceremony;
mod keygen;

pub use ceremony::{KeygenCeremony, KeygenOutcome, LocalKeygenCeremony};
pub use keygen::{generate_tss, keygen_blame_index, KeygenOptions};

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ethers::types::{Address, Signature, H256, U256};
use webb_relayer_types::keygen::TssRecord;
use webb_relayer_types::ChainId;
use webb_relayer_utils::{probe, Error, Result};

/// A keysign result: `r ‖ s ‖ recovery id`.
pub type RecoverableSignature = [u8; 65];

/// The key produced by one successful keygen ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TssKey {
    /// Uncompressed secp256k1 public key, `0x04` prefixed hex.
    pub pubkey: String,
    /// EVM address of the key.
    pub address: Address,
    /// Public keys of the ceremony participants.
    pub signers: Vec<String>,
    /// Coordination block of the ceremony.
    pub keygen_height: i64,
}

impl TssKey {
    /// Builds the key, deriving its EVM address from `pubkey`.
    pub fn new(
        pubkey: impl Into<String>,
        signers: Vec<String>,
        keygen_height: i64,
    ) -> Result<Self> {
        let pubkey = pubkey.into();
        let address = pubkey_to_address(&pubkey)?;
        Ok(Self {
            pubkey,
            address,
            signers,
            keygen_height,
        })
    }
}

/// Derives the EVM address of an uncompressed secp256k1 public key.
pub fn pubkey_to_address(pubkey: &str) -> Result<Address> {
    let bytes = hex::decode(pubkey.trim_start_matches("0x"))?;
    match bytes.split_first() {
        Some((0x04, point)) if point.len() == 64 => {
            let hash = ethers::utils::keccak256(point);
            Ok(Address::from_slice(&hash[12..]))
        }
        _ => Err(Error::Generic(
            "tss pubkey must be an uncompressed secp256k1 point",
        )),
    }
}

/// Recovers the address that produced `signature` over `digest`.
pub fn recover_signer(
    digest: [u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address> {
    let signature = Signature {
        r: U256::from_big_endian(&signature[..32]),
        s: U256::from_big_endian(&signature[32..64]),
        v: u64::from(signature[64]) + 27,
    };
    Ok(signature.recover(H256::from(digest))?)
}

/// The signing capability shared by every outbound signer.
#[async_trait::async_trait]
pub trait TssSigner: Send + Sync + 'static {
    /// Public key of the current TSS key.
    fn pubkey(&self) -> Result<String>;

    /// EVM address of the current TSS key.
    fn evm_address(&self) -> Result<Address>;

    /// Signs a 32 byte digest. `height`, `nonce` and `chain_id` identify
    /// the outbound being signed.
    async fn sign(
        &self,
        digest: [u8; 32],
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> Result<RecoverableSignature>;
}

/// The TSS key of this relayer and the backend that signs with it.
///
/// Reads of the key are lock free. Signing is serialized, the backend
/// cannot run two keysign rounds at once.
pub struct Tss {
    key: ArcSwapOption<TssKey>,
    ceremony: Arc<dyn KeygenCeremony>,
    signing: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Tss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tss")
            .field("key", &self.key.load_full())
            .field("ceremony", &self.ceremony)
            .finish()
    }
}

impl Tss {
    /// A TSS without a key yet.
    pub fn new(ceremony: Arc<dyn KeygenCeremony>) -> Self {
        Self {
            key: ArcSwapOption::empty(),
            ceremony,
            signing: tokio::sync::Mutex::new(()),
        }
    }

    /// The current key, if any.
    pub fn key(&self) -> Option<Arc<TssKey>> {
        self.key.load_full()
    }

    /// The backend running ceremonies for this TSS.
    pub fn ceremony(&self) -> &Arc<dyn KeygenCeremony> {
        &self.ceremony
    }

    /// Replaces the key wholesale.
    pub fn set_key(&self, key: TssKey) -> Arc<TssKey> {
        let key = Arc::new(key);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Tss,
            pubkey = %key.pubkey,
            address = ?key.address,
            keygen_height = key.keygen_height,
        );
        self.key.store(Some(key.clone()));
        key
    }

    /// Loads the key of `record` from the shares kept by the backend.
    ///
    /// Returns `false` when this node holds no share of that key.
    pub fn rehydrate(&self, record: &TssRecord) -> Result<bool> {
        if !self.ceremony.has_key(&record.tss_pubkey)? {
            return Ok(false);
        }
        let key =
            TssKey::new(record.tss_pubkey.clone(), Vec::new(), record.keygen_height)?;
        tracing::info!(pubkey = %key.pubkey, "Loaded the TSS key from the local share");
        self.set_key(key);
        Ok(true)
    }

    /// Signs a fixed message with the current key and checks the recovered
    /// signer.
    pub async fn test_keysign(&self) -> Result<()> {
        let digest = ethers::utils::keccak256(b"bridge relayer test keysign");
        let signature = self.sign(digest, 0, 0, 0).await?;
        let expected = self.evm_address()?;
        let recovered = recover_signer(digest, &signature)?;
        if recovered != expected {
            return Err(Error::KeygenFailed(format!(
                "test keysign recovered {recovered:?}, expected {expected:?}"
            )));
        }
        tracing::info!(address = ?expected, "Test keysign succeeded");
        Ok(())
    }
}

#[async_trait::async_trait]
impl TssSigner for Tss {
    fn pubkey(&self) -> Result<String> {
        self.key()
            .map(|k| k.pubkey.clone())
            .ok_or(Error::TssNotReady)
    }

    fn evm_address(&self) -> Result<Address> {
        self.key().map(|k| k.address).ok_or(Error::TssNotReady)
    }

    #[tracing::instrument(skip(self, digest))]
    async fn sign(
        &self,
        digest: [u8; 32],
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> Result<RecoverableSignature> {
        let key = self.key().ok_or(Error::TssNotReady)?;
        let _round = self.signing.lock().await;
        let signature = self.ceremony.keysign(&key.pubkey, digest).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Tss,
            keysign = true,
            chain_id,
            nonce,
            digest = %hex::encode(digest),
        );
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::Signer;
    use webb_relayer_store::InMemoryStore;
    use webb_relayer_types::keygen::{KeygenRecord, KeygenStatus};

    fn local_ceremony() -> Arc<LocalKeygenCeremony> {
        Arc::new(
            LocalKeygenCeremony::builder()
                .store(Arc::new(InMemoryStore::default()))
                .build(),
        )
    }

    fn request() -> KeygenRecord {
        KeygenRecord {
            status: KeygenStatus::Pending,
            block_number: 10,
            grantee_pubkeys: vec!["node-a".into()],
        }
    }

    #[test]
    fn address_is_derived_from_the_pubkey() {
        let wallet: ethers::signers::LocalWallet =
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
                .parse()
                .unwrap();
        let pubkey = crate::ceremony::wallet_pubkey(&wallet);
        assert!(pubkey.starts_with("0x04"));
        assert_eq!(pubkey_to_address(&pubkey).unwrap(), wallet.address());
        assert!(pubkey_to_address("0x02abcd").is_err());
    }

    #[tokio::test]
    async fn signing_needs_a_key() {
        let tss = Tss::new(local_ceremony());
        assert!(matches!(
            tss.sign([1u8; 32], 1, 1, 1).await,
            Err(Error::TssNotReady)
        ));
        assert!(tss.evm_address().is_err());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn signatures_recover_to_the_tss_address() {
        let tss = Tss::new(local_ceremony());
        let KeygenOutcome::Generated { pubkey } =
            tss.ceremony().keygen(&request()).await.unwrap()
        else {
            panic!("local keygen failed");
        };
        tss.set_key(TssKey::new(pubkey, vec![], 10).unwrap());
        tss.test_keysign().await.unwrap();

        let digest = [7u8; 32];
        let signature = tss.sign(digest, 12, 3, 11155111).await.unwrap();
        assert!(signature[64] <= 1);
        assert_eq!(
            recover_signer(digest, &signature).unwrap(),
            tss.evm_address().unwrap()
        );
    }

    #[tokio::test]
    async fn rehydrates_only_known_keys() {
        let ceremony = local_ceremony();
        let KeygenOutcome::Generated { pubkey } =
            ceremony.keygen(&request()).await.unwrap()
        else {
            panic!("local keygen failed");
        };
        let tss = Tss::new(ceremony);
        let unknown = TssRecord {
            tss_pubkey: format!("0x04{}", "11".repeat(64)),
            keygen_height: 3,
        };
        assert!(!tss.rehydrate(&unknown).unwrap());
        assert!(tss.key().is_none());

        let known = TssRecord {
            tss_pubkey: pubkey.clone(),
            keygen_height: 10,
        };
        assert!(tss.rehydrate(&known).unwrap());
        assert_eq!(tss.pubkey().unwrap(), pubkey);
    }
}
