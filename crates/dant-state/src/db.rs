use dant_core::error::DantError;
use dant_system::System;
use std::path::Path;
use tracing::debug;

const LATEST_KEY: &str = "latest_snapshot";

/// Snapshot store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   snapshots: utf8 name bytes → bincode(System)
///   meta:      utf8 key bytes  → raw bytes
pub struct StateDb {
    _db: sled::Db,
    snapshots: sled::Tree,
    meta: sled::Tree,
}

impl StateDb {
    /// Open or create the snapshot database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DantError> {
        let db = sled::open(path).map_err(|e| DantError::Storage(e.to_string()))?;
        let snapshots = db.open_tree("snapshots").map_err(|e| DantError::Storage(e.to_string()))?;
        let meta      = db.open_tree("meta").map_err(|e| DantError::Storage(e.to_string()))?;
        Ok(Self { _db: db, snapshots, meta })
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    /// Store `system` under `name` and mark it as the latest snapshot.
    pub fn put_system(&self, name: &str, system: &System) -> Result<(), DantError> {
        let bytes = bincode::serialize(system)
            .map_err(|e| DantError::Serialization(e.to_string()))?;
        let len = bytes.len();
        self.snapshots
            .insert(name.as_bytes(), bytes)
            .map_err(|e| DantError::Storage(e.to_string()))?;
        self.put_meta(LATEST_KEY, name.as_bytes())?;
        debug!(name, bytes = len, "snapshot stored");
        Ok(())
    }

    pub fn get_system(&self, name: &str) -> Result<Option<System>, DantError> {
        match self.snapshots.get(name.as_bytes()).map_err(|e| DantError::Storage(e.to_string()))? {
            Some(bytes) => {
                let sys = bincode::deserialize(&bytes)
                    .map_err(|e| DantError::Serialization(e.to_string()))?;
                Ok(Some(sys))
            }
            None => Ok(None),
        }
    }

    /// Snapshot names in key order.
    pub fn list_snapshots(&self) -> Result<Vec<String>, DantError> {
        let mut names = Vec::new();
        for item in self.snapshots.iter().keys() {
            let key = item.map_err(|e| DantError::Storage(e.to_string()))?;
            let name = String::from_utf8(key.to_vec())
                .map_err(|e| DantError::Serialization(e.to_string()))?;
            names.push(name);
        }
        Ok(names)
    }

    /// Name of the most recently stored snapshot.
    pub fn latest_snapshot(&self) -> Result<Option<String>, DantError> {
        match self.get_meta(LATEST_KEY)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| DantError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), DantError> {
        self.meta
            .insert(key.as_bytes(), value)
            .map_err(|e| DantError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, DantError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| DantError::Storage(e.to_string()))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), DantError> {
        self._db.flush().map_err(|e| DantError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dant_core::constants::WAD;
    use dant_core::types::AccountId;
    use dant_rewards::PolicyKind;
    use dant_system::SystemParams;

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("dant_state_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    fn staked_system() -> System {
        let mut sys = System::deploy(SystemParams::default()).unwrap();
        let user = AccountId::from_label("alice");
        sys.fund(user, 500 * WAD).unwrap();
        sys.approve(user, PolicyKind::OpenEnded, 500 * WAD).unwrap();
        sys.stake(PolicyKind::OpenEnded, user, 500 * WAD, sys.tree.tree_root(), 1_000).unwrap();
        sys.unstake(PolicyKind::OpenEnded, user, 100 * WAD, 2_000).unwrap();
        sys
    }

    #[test]
    fn snapshot_round_trip() {
        let db = temp_db("round_trip");
        let sys = staked_system();
        db.put_system("after-unstake", &sys).unwrap();
        db.flush().unwrap();

        let loaded = db.get_system("after-unstake").unwrap().expect("snapshot present");
        assert_eq!(loaded, sys);
        loaded.audit().unwrap();
        assert!(db.get_system("missing").unwrap().is_none());
    }

    #[test]
    fn lists_snapshots_and_tracks_latest() {
        let db = temp_db("listing");
        assert_eq!(db.latest_snapshot().unwrap(), None);
        let sys = staked_system();
        db.put_system("b", &sys).unwrap();
        db.put_system("a", &sys).unwrap();
        assert_eq!(db.list_snapshots().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(db.latest_snapshot().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = std::env::temp_dir().join("dant_state_test_reopen");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let db = StateDb::open(&dir).unwrap();
            db.put_system("s", &staked_system()).unwrap();
            db.flush().unwrap();
        }
        let db = StateDb::open(&dir).unwrap();
        assert!(db.get_system("s").unwrap().is_some());
    }
}
