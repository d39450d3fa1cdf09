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
use webb_relayer_types::ChainId;

use super::{KeyShareStore, ScanCursor, ScanCursorStore};

/// InMemoryStore is a store that keeps the relayer state in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    scan_cursors: Arc<RwLock<HashMap<ChainId, ScanCursor>>>,
    key_shares: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl ScanCursorStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_scan_cursor(
        &self,
        chain_id: ChainId,
    ) -> crate::Result<Option<ScanCursor>> {
        Ok(self.scan_cursors.read().get(&chain_id).copied())
    }

    #[tracing::instrument(skip(self))]
    fn set_scan_cursor(
        &self,
        chain_id: ChainId,
        cursor: ScanCursor,
    ) -> crate::Result<()> {
        self.scan_cursors.write().insert(chain_id, cursor);
        Ok(())
    }
}

impl KeyShareStore for InMemoryStore {
    fn insert_key_share(&self, pubkey: &str, share: &[u8]) -> crate::Result<()> {
        self.key_shares
            .write()
            .insert(pubkey.to_owned(), share.to_vec());
        Ok(())
    }

    fn get_key_share(&self, pubkey: &str) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.key_shares.read().get(pubkey).cloned())
    }

    fn key_share_pubkeys(&self) -> crate::Result<Vec<String>> {
        Ok(self.key_shares.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_state() {
        let store = InMemoryStore::default();
        let other = store.clone();
        let cursor = ScanCursor {
            last_block_scanned: 7,
            last_inbound_block: 5,
        };
        store.set_scan_cursor(3, cursor).unwrap();
        assert_eq!(other.get_scan_cursor(3).unwrap(), Some(cursor));
    }
}
