use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::ContainerRecord;
use crate::traits::ContainerStore;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Extension of record files.
const RECORD_EXT: &str = "rec";

/// Extension of the empty marker left by `retire`.
const TOMBSTONE_EXT: &str = "tomb";

/// File-per-container store.
///
/// Each container is one file named after the hex encoding of its id. On-disk
/// format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized ContainerRecord)]
/// ```
///
/// Records are written to a temporary file in the same directory, synced,
/// and renamed into place, so a reader sees either the old or the new unit.
/// Inserts use a no-clobber rename, which makes the filesystem the
/// uniqueness point for container ids. Retired ids keep an empty
/// `<hex>.tomb` marker that blocks later inserts.
pub struct FileContainerStore {
    dir: PathBuf,
    /// Serializes read-check-write sequences (revision checks, deletes).
    write_lock: Mutex<()>,
}

impl FileContainerStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "container store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXT}", hex::encode(id.as_bytes())))
    }

    fn tombstone_for(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{TOMBSTONE_EXT}", hex::encode(id.as_bytes())))
    }

    fn id_from_path(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn frame(record: &ContainerRecord) -> StoreResult<Vec<u8>> {
        let payload = record.encode()?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("record exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    fn unframe(path: &Path, bytes: &[u8]) -> StoreResult<ContainerRecord> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        if bytes.len() < HEADER_SIZE {
            return Err(corrupt(format!("truncated header ({} bytes)", bytes.len())));
        }
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let expected_crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != length {
            return Err(corrupt(format!(
                "length mismatch: header {length}, payload {}",
                payload.len()
            )));
        }
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(corrupt(format!(
                "CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
            )));
        }
        ContainerRecord::decode(payload)
    }

    fn read_path(path: &Path) -> StoreResult<Option<ContainerRecord>> {
        match fs::read(path) {
            Ok(bytes) => Self::unframe(path, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the framed record to a synced temp file in the store directory.
    fn stage(&self, record: &ContainerRecord) -> StoreResult<NamedTempFile> {
        let bytes = Self::frame(record)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

impl ContainerStore for FileContainerStore {
    fn read(&self, id: &str) -> StoreResult<Option<ContainerRecord>> {
        Self::read_path(&self.path_for(id))
    }

    fn insert(&self, record: &ContainerRecord) -> StoreResult<()> {
        let path = self.path_for(record.id());
        let tmp = self.stage(record)?;
        let _guard = self.lock()?;
        if self.tombstone_for(record.id()).exists() {
            return Err(StoreError::AlreadyExists(record.id().to_string()));
        }
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(id = record.id(), "record inserted");
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(record.id().to_string()))
            }
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }

    fn update(&self, record: &ContainerRecord, expected_revision: u64) -> StoreResult<()> {
        let path = self.path_for(record.id());
        let tmp = self.stage(record)?;
        let _guard = self.lock()?;
        let current = Self::read_path(&path)?
            .ok_or_else(|| StoreError::NotFound(record.id().to_string()))?;
        if current.revision != expected_revision {
            return Err(StoreError::RevisionMismatch {
                id: record.id().to_string(),
                expected: expected_revision,
                actual: current.revision,
            });
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(id = record.id(), revision = record.revision, "record updated");
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.lock()?;
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn retire(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.lock()?;
        // The marker goes down first so a crash between the two steps
        // still leaves the id reserved.
        let marker = fs::File::create(self.tombstone_for(id))?;
        marker.sync_all()?;
        let existed = match fs::remove_file(self.path_for(id)) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        debug!(id, "record retired");
        Ok(existed)
    }

    fn is_retired(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tombstone_for(id).is_file())
    }

    fn ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            match Self::id_from_path(&path) {
                Some(id) => ids.push(id),
                None if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) => {
                    warn!(path = %path.display(), "skipping record with undecodable name");
                }
                None => {}
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }
}

impl std::fmt::Debug for FileContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContainerStore")
            .field("dir", &self.dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ldp_container::Container;
    use ldp_types::{ContainerType, MemberType};

    fn record(id: &str, parent: &str) -> ContainerRecord {
        let c = Container::new(id, parent, ContainerType::Basic, DateTime::<Utc>::UNIX_EPOCH)
            .unwrap();
        ContainerRecord::new(&c)
    }

    fn temp_store() -> (tempfile::TempDir, FileContainerStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContainerStore::open(dir.path().join("containers")).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_read_survives_reopen() {
        let (dir, store) = temp_store();
        store.insert(&record("photos", "root")).unwrap();

        let reopened = FileContainerStore::open(dir.path().join("containers")).unwrap();
        let read = reopened.read("photos").unwrap().expect("should exist");
        assert_eq!(read.parent_id(), "root");
        assert!(reopened.exists("photos").unwrap());
    }

    #[test]
    fn insert_is_create_only() {
        let (_dir, store) = temp_store();
        store.insert(&record("a", "")).unwrap();
        assert!(matches!(
            store.insert(&record("a", "")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_and_revision_check() {
        let (_dir, store) = temp_store();
        let first = record("a", "");
        store.insert(&first).unwrap();

        let mut c = first.to_container().unwrap();
        c.add_member("m1", MemberType::Resource, DateTime::<Utc>::UNIX_EPOCH)
            .unwrap();
        store.update(&first.next(&c), 1).unwrap();
        assert!(matches!(
            store.update(&first.next(&c), 1),
            Err(StoreError::RevisionMismatch { actual: 2, .. })
        ));
        assert_eq!(store.read("a").unwrap().unwrap().revision, 2);
    }

    #[test]
    fn ids_decode_arbitrary_characters() {
        let (_dir, store) = temp_store();
        for id in ["b", "a b", "ünïcode", "with.dots"] {
            store.insert(&record(id, "")).unwrap();
        }
        assert_eq!(
            store.ids().unwrap(),
            vec!["a b", "b", "with.dots", "ünïcode"]
        );
    }

    #[test]
    fn delete_removes_file() {
        let (_dir, store) = temp_store();
        store.insert(&record("gone", "")).unwrap();
        assert!(store.delete("gone").unwrap());
        assert!(!store.delete("gone").unwrap());
        assert!(store.read("gone").unwrap().is_none());
    }

    #[test]
    fn tombstone_blocks_reinsert_after_reopen() {
        let (dir, store) = temp_store();
        store.insert(&record("albums", "")).unwrap();
        assert!(store.retire("albums").unwrap());
        assert!(store.read("albums").unwrap().is_none());

        let reopened = FileContainerStore::open(dir.path().join("containers")).unwrap();
        assert!(reopened.is_retired("albums").unwrap());
        assert!(matches!(
            reopened.insert(&record("albums", "")),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(reopened.ids().unwrap().is_empty());
        assert!(!reopened.is_retired("gone").unwrap());
    }

    #[test]
    fn corrupt_file_is_detected() {
        let (_dir, store) = temp_store();
        store.insert(&record("c", "")).unwrap();
        let path = store.path_for("c");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(store.read("c"), Err(StoreError::Corrupt { .. })));
    }
}
