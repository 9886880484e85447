//! JSON snapshot persistence for the document arena.
//!
//! The CLI entry points operate on a file-backed snapshot: load, run the
//! sweep, write back. Snapshots are plain serde JSON of [`Arena`].

use std::fs;
use std::path::Path;

use devisio_core::{EngineError, EngineResult};

use super::in_memory::{Arena, InMemoryStore};

/// Load a store from a snapshot file.
pub fn load(path: &Path) -> EngineResult<InMemoryStore> {
    let data = fs::read_to_string(path)
        .map_err(|e| EngineError::store(format!("read {}: {e}", path.display())))?;
    let arena: Arena = serde_json::from_str(&data)
        .map_err(|e| EngineError::store(format!("parse {}: {e}", path.display())))?;
    Ok(InMemoryStore::from_arena(arena))
}

/// Load a store from a snapshot file, starting empty if the file is missing.
pub fn load_or_default(path: &Path) -> EngineResult<InMemoryStore> {
    if path.exists() {
        load(path)
    } else {
        Ok(InMemoryStore::new())
    }
}

/// Write the store's current arena back to a snapshot file.
pub fn save(store: &InMemoryStore, path: &Path) -> EngineResult<()> {
    let arena = store.arena()?;
    let data = serde_json::to_string_pretty(&arena)
        .map_err(|e| EngineError::store(format!("serialize snapshot: {e}")))?;
    fs::write(path, data)
        .map_err(|e| EngineError::store(format!("write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStore;
    use chrono::Utc;
    use devisio_parties::Client;

    #[test]
    fn snapshot_round_trips_through_a_file() {
        let dir = std::env::temp_dir().join(format!("devisio-snap-{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.json");

        let store = InMemoryStore::new();
        let client = Client::new("Dupont SARL", Utc::now()).unwrap();
        store.put_client(client.clone()).unwrap();

        save(&store, &path).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded.client(client.id).unwrap(), client);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_snapshot_starts_empty() {
        let path = std::env::temp_dir().join("devisio-definitely-missing.json");
        let store = load_or_default(&path).unwrap();
        assert!(store.quotes().unwrap().is_empty());
    }
}
