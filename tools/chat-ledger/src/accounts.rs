use std::path::{Path, PathBuf};

use chainchat_common::CallerId;
use ed25519_dalek::SigningKey;
use tracing::info;

use crate::error::LedgerError;

fn key_path(dir: &Path, label: &str) -> Result<PathBuf, LedgerError> {
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(LedgerError::InvalidAccountLabel(label.to_string()));
    }
    Ok(dir.join(format!("{label}.key")))
}

/// Load the signing key stored for `label`.
pub fn load(dir: &Path, label: &str) -> Result<Option<SigningKey>, LedgerError> {
    let path = key_path(dir, label)?;
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LedgerError::io(&path, e)),
    };
    let seed: [u8; 32] = hex::decode(text.trim())
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| LedgerError::InvalidAccountKey { path: path.clone() })?;
    Ok(Some(SigningKey::from_bytes(&seed)))
}

/// Load the key for `label`, generating and storing a fresh one on first use.
pub fn load_or_create(dir: &Path, label: &str) -> Result<SigningKey, LedgerError> {
    if let Some(key) = load(dir, label)? {
        return Ok(key);
    }
    let path = key_path(dir, label)?;
    std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;
    let key = SigningKey::generate(&mut rand::rngs::OsRng);
    std::fs::write(&path, hex::encode(key.to_bytes())).map_err(|e| LedgerError::io(&path, e))?;
    info!(
        account = label,
        caller = %CallerId(key.verifying_key()),
        "created account key"
    );
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_reload_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let created = load_or_create(dir.path(), "alice").unwrap();
        let loaded = load_or_create(dir.path(), "alice").unwrap();
        assert_eq!(created.to_bytes(), loaded.to_bytes());
        assert!(dir.path().join("alice.key").exists());
    }

    #[test]
    fn distinct_labels_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = load_or_create(dir.path(), "alice").unwrap();
        let b = load_or_create(dir.path(), "bob").unwrap();
        assert_ne!(a.verifying_key(), b.verifying_key());
    }

    #[test]
    fn unknown_label_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), "nobody").unwrap().is_none());
    }

    #[test]
    fn path_like_labels_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for label in ["", "../etc", "a/b", "x y"] {
            assert!(matches!(
                load_or_create(dir.path(), label),
                Err(LedgerError::InvalidAccountLabel(_))
            ));
        }
    }

    #[test]
    fn malformed_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("carol.key"), "beef").unwrap();
        assert!(matches!(
            load(dir.path(), "carol"),
            Err(LedgerError::InvalidAccountKey { .. })
        ));
    }
}
