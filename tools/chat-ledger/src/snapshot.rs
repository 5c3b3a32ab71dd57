use std::io::Write;
use std::path::Path;

use chainchat_common::ChatStore;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::LedgerError;

/// Load the committed store. A missing file is an empty ledger.
pub fn load(path: &Path) -> Result<ChatStore, LedgerError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot, starting empty ledger");
            return Ok(ChatStore::default());
        }
        Err(e) => return Err(LedgerError::io(path, e)),
    };
    let store: ChatStore = serde_json::from_slice(&bytes).map_err(|source| LedgerError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    store
        .validate()
        .map_err(|source| LedgerError::InvalidSnapshot {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        path = %path.display(),
        users = store.registry().len(),
        messages = store.message_count(),
        "loaded snapshot"
    );
    Ok(store)
}

/// Replace the snapshot atomically: write a sibling temp file, then rename.
pub fn save(path: &Path, store: &ChatStore) -> Result<(), LedgerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

    let data = serde_json::to_vec_pretty(store).map_err(|source| LedgerError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LedgerError::io(dir, e))?;
    tmp.write_all(&data)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| LedgerError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| LedgerError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = data.len(), "saved snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.message_count(), 0);
        assert!(store.registry().is_empty());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        save(&path, &ChatStore::default()).unwrap();
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), ChatStore::default());
    }

    #[test]
    fn garbage_is_reported_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(load(&path), Err(LedgerError::Corrupt { .. })));
    }
}
