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

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps the scan cursor of every observed chain and the
//! key shares produced by local keygen ceremonies, so a restarted relayer
//! resumes where it stopped.

#![warn(missing_docs)]

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use webb_relayer_types::ChainId;
use webb_relayer_utils::Result;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// Where an observer stands on its chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    /// Highest block whose events were fully handled.
    pub last_block_scanned: u64,
    /// Highest block whose proof was voted.
    pub last_inbound_block: u64,
}

/// ScanCursorStore persists one [`ScanCursor`] per chain.
///
/// There is a single row per chain and every write overwrites it.
pub trait ScanCursorStore: Debug + Send + Sync + 'static {
    /// Reads the cursor of `chain_id`, if one was ever saved.
    fn get_scan_cursor(&self, chain_id: ChainId) -> Result<Option<ScanCursor>>;

    /// Overwrites the cursor of `chain_id`.
    fn set_scan_cursor(&self, chain_id: ChainId, cursor: ScanCursor)
        -> Result<()>;
}

/// KeyShareStore keeps the secret shares generated by keygen ceremonies,
/// indexed by the resulting public key.
pub trait KeyShareStore: Debug + Send + Sync + 'static {
    /// Saves the share of `pubkey`.
    fn insert_key_share(&self, pubkey: &str, share: &[u8]) -> Result<()>;

    /// Loads the share of `pubkey`.
    fn get_key_share(&self, pubkey: &str) -> Result<Option<Vec<u8>>>;

    /// Public keys of every share stored.
    fn key_share_pubkeys(&self) -> Result<Vec<String>>;
}

