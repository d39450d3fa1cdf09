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

use std::path::Path;

use webb_relayer_types::ChainId;

use super::{KeyShareStore, ScanCursor, ScanCursorStore};

const SCAN_CURSORS: &str = "scan_cursors";
const KEY_SHARES: &str = "tss_key_shares";

/// SledStore is a store that keeps the relayer state in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }
    /// Creates a temporary SledStore.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }
}

fn chain_key(chain_id: ChainId) -> [u8; 8] {
    chain_id.to_be_bytes()
}

impl ScanCursorStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn get_scan_cursor(
        &self,
        chain_id: ChainId,
    ) -> crate::Result<Option<ScanCursor>> {
        let tree = self.db.open_tree(SCAN_CURSORS)?;
        match tree.get(chain_key(chain_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_scan_cursor(
        &self,
        chain_id: ChainId,
        cursor: ScanCursor,
    ) -> crate::Result<()> {
        let tree = self.db.open_tree(SCAN_CURSORS)?;
        let value = serde_json::to_vec(&cursor)?;
        tree.insert(chain_key(chain_id), value)?;
        tree.flush()?;
        Ok(())
    }
}

impl KeyShareStore for SledStore {
    #[tracing::instrument(skip(self, share))]
    fn insert_key_share(&self, pubkey: &str, share: &[u8]) -> crate::Result<()> {
        let tree = self.db.open_tree(KEY_SHARES)?;
        tree.insert(pubkey.as_bytes(), share)?;
        tree.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn get_key_share(&self, pubkey: &str) -> crate::Result<Option<Vec<u8>>> {
        let tree = self.db.open_tree(KEY_SHARES)?;
        Ok(tree.get(pubkey.as_bytes())?.map(|v| v.to_vec()))
    }

    fn key_share_pubkeys(&self) -> crate::Result<Vec<String>> {
        let tree = self.db.open_tree(KEY_SHARES)?;
        tree.iter()
            .keys()
            .map(|k| {
                let k = k?;
                Ok(String::from_utf8_lossy(&k).into_owned())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_cursor_is_overwritten_per_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        assert_eq!(store.get_scan_cursor(1).unwrap(), None);

        let first = ScanCursor {
            last_block_scanned: 20,
            last_inbound_block: 18,
        };
        store.set_scan_cursor(1, first).unwrap();
        let second = ScanCursor {
            last_block_scanned: 25,
            last_inbound_block: 25,
        };
        store.set_scan_cursor(1, second).unwrap();

        assert_eq!(store.get_scan_cursor(1).unwrap(), Some(second));
        assert_eq!(store.get_scan_cursor(2).unwrap(), None);
        let tree = store.db.open_tree(SCAN_CURSORS).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn key_shares_are_listed_by_pubkey() {
        let store = SledStore::temporary().unwrap();
        store.insert_key_share("pk-a", &[1, 2, 3]).unwrap();
        store.insert_key_share("pk-b", &[4]).unwrap();
        assert_eq!(store.get_key_share("pk-a").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get_key_share("pk-c").unwrap(), None);
        let mut keys = store.key_share_pubkeys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["pk-a".to_string(), "pk-b".to_string()]);
    }
}
