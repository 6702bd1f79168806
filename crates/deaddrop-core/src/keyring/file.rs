use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use deaddrop_proto::UserId;
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use super::KeyStore;
use crate::error::KeyringError;

const SECURE_DIR: &str = "secure";
const LEGACY_DIR: &str = "legacy";

/// Key store backed by per-user files under a root directory.
///
/// Layout is `<root>/secure/<user_id>.key` for the current slot and
/// `<root>/legacy/<user_id>.key` for the location migration drains. Writes
/// are atomic: material lands in a temp file opened with mode 0600, is
/// fsynced, then renamed over the destination, so a crash never leaves a
/// half-written key where a whole one used to be.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    root: Arc<PathBuf>,
}

impl FileKeyStore {
    /// Store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Arc::new(root.into()) }
    }

    fn slot_path(&self, dir: &str, user_id: UserId) -> PathBuf {
        self.root.join(dir).join(format!("{user_id}.key"))
    }

    fn load_slot(&self, path: &Path) -> Result<Option<Zeroizing<String>>, KeyringError> {
        match fs::read_to_string(path) {
            Ok(material) => Ok(Some(Zeroizing::new(material))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_error("read key file", path, &err)),
        }
    }

    fn remove_slot(&self, path: &Path) -> Result<(), KeyringError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error("remove key file", path, &err)),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn save(&self, user_id: UserId, material: &str) -> Result<(), KeyringError> {
        let path = self.slot_path(SECURE_DIR, user_id);
        let Some(parent) = path.parent() else {
            return Err(KeyringError::Storage { reason: "key path has no parent".to_owned() });
        };
        fs::create_dir_all(parent)
            .map_err(|err| storage_error("create key directory", parent, &err))?;

        let temp_path = path.with_extension("key.tmp");

        let mut options = OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp_path)
            .map_err(|err| storage_error("create temp key file", &temp_path, &err))?;
        file.write_all(material.as_bytes())
            .map_err(|err| storage_error("write key file", &temp_path, &err))?;
        file.sync_all().map_err(|err| storage_error("fsync key file", &temp_path, &err))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .map_err(|err| storage_error("move key file into place", &path, &err))?;

        // Rename preserves the temp mode, but tighten a pre-existing
        // destination that was created looser
        #[cfg(unix)]
        {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|err| storage_error("restrict key file permissions", &path, &err))?;
        }

        Ok(())
    }

    fn load(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError> {
        self.load_slot(&self.slot_path(SECURE_DIR, user_id))
    }

    fn remove(&self, user_id: UserId) -> Result<(), KeyringError> {
        self.remove_slot(&self.slot_path(SECURE_DIR, user_id))
    }

    fn load_legacy(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError> {
        self.load_slot(&self.slot_path(LEGACY_DIR, user_id))
    }

    fn remove_legacy(&self, user_id: UserId) -> Result<(), KeyringError> {
        self.remove_slot(&self.slot_path(LEGACY_DIR, user_id))
    }
}

fn storage_error(context: &str, path: &Path, err: &io::Error) -> KeyringError {
    KeyringError::Storage { reason: format!("{context} {}: {err}", path.display()) }
}
