//! Session store: groups the outputs of one batch under a single identifier.
//!
//! The core only needs `create_session`, `write` and `read`; `list` serves hosts that
//! enumerate a batch's outputs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Timestamp-derived batch identifier: `batch_<unix-millis>_<8 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("batch_{millis}_{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids that are safe to use as a single path component.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Storage for batch outputs.
pub trait SessionStore: Send + Sync {
    /// Opens a fresh, empty session.
    fn create_session(&self) -> Result<SessionId, SessionError>;

    /// Writes (or replaces) entry `name` of `session`.
    fn write(&self, session: &SessionId, name: &str, bytes: &[u8]) -> Result<(), SessionError>;

    /// Reads entry `name`; `Ok(None)` when the session exists but the entry does not.
    fn read(&self, session: &SessionId, name: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Entry names of `session`, sorted.
    fn list(&self, session: &SessionId) -> Result<Vec<String>, SessionError>;
}

/// Entry names must be a single plain path component.
pub fn validate_entry_name(name: &str) -> Result<(), SessionError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ============================================================================
// Filesystem store
// ============================================================================

/// One directory per session under `root`.
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &SessionId) -> Result<PathBuf, SessionError> {
        if !session.is_well_formed() {
            return Err(SessionError::UnknownSession(session.clone()));
        }
        let dir = self.root.join(session.as_str());
        if !dir.is_dir() {
            return Err(SessionError::UnknownSession(session.clone()));
        }
        Ok(dir)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SessionError + '_ {
    move |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SessionStore for FsSessionStore {
    fn create_session(&self) -> Result<SessionId, SessionError> {
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        loop {
            let id = SessionId::generate();
            let dir = self.root.join(id.as_str());
            match fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::debug!(session = %id, dir = %dir.display(), "Session created");
                    return Ok(id);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(io_error(&dir)(err)),
            }
        }
    }

    fn write(&self, session: &SessionId, name: &str, bytes: &[u8]) -> Result<(), SessionError> {
        validate_entry_name(name)?;
        let path = self.session_dir(session)?.join(name);
        fs::write(&path, bytes).map_err(io_error(&path))
    }

    fn read(&self, session: &SessionId, name: &str) -> Result<Option<Vec<u8>>, SessionError> {
        validate_entry_name(name)?;
        let path = self.session_dir(session)?.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    fn list(&self, session: &SessionId) -> Result<Vec<String>, SessionError> {
        let dir = self.session_dir(session)?;
        let mut names: Vec<String> = fs::read_dir(&dir)
            .map_err(io_error(&dir))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, BTreeMap<String, Vec<u8>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Total entries written across all sessions.
    pub fn entry_count(&self) -> usize {
        self.sessions.lock().values().map(BTreeMap::len).sum()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self) -> Result<SessionId, SessionError> {
        let mut sessions = self.sessions.lock();
        loop {
            let id = SessionId::generate();
            if !sessions.contains_key(&id) {
                sessions.insert(id.clone(), BTreeMap::new());
                return Ok(id);
            }
        }
    }

    fn write(&self, session: &SessionId, name: &str, bytes: &[u8]) -> Result<(), SessionError> {
        validate_entry_name(name)?;
        let mut sessions = self.sessions.lock();
        let entries = sessions
            .get_mut(session)
            .ok_or_else(|| SessionError::UnknownSession(session.clone()))?;
        entries.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, session: &SessionId, name: &str) -> Result<Option<Vec<u8>>, SessionError> {
        validate_entry_name(name)?;
        let sessions = self.sessions.lock();
        let entries = sessions
            .get(session)
            .ok_or_else(|| SessionError::UnknownSession(session.clone()))?;
        Ok(entries.get(name).cloned())
    }

    fn list(&self, session: &SessionId) -> Result<Vec<String>, SessionError> {
        let sessions = self.sessions.lock();
        let entries = sessions
            .get(session)
            .ok_or_else(|| SessionError::UnknownSession(session.clone()))?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &dyn SessionStore) {
        let a = store.create_session().unwrap();
        let b = store.create_session().unwrap();
        assert_ne!(a, b);

        store.write(&a, "processed_x.png", b"one").unwrap();
        store.write(&a, "panorama.jpg", b"two").unwrap();
        store.write(&a, "processed_x.png", b"three").unwrap();

        assert_eq!(
            store.read(&a, "processed_x.png").unwrap().as_deref(),
            Some(&b"three"[..])
        );
        assert_eq!(store.read(&a, "missing.png").unwrap(), None);
        assert_eq!(store.read(&b, "panorama.jpg").unwrap(), None);
        assert_eq!(
            store.list(&a).unwrap(),
            vec!["panorama.jpg".to_string(), "processed_x.png".to_string()]
        );
        assert!(store.list(&b).unwrap().is_empty());

        assert!(matches!(
            store.write(&a, "../escape.png", b""),
            Err(SessionError::InvalidName(_))
        ));
        assert!(matches!(
            store.read(&SessionId::from("batch_0_deadbeef"), "x.png"),
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "batch");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(id.is_well_formed());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let ids: std::collections::HashSet<SessionId> =
            (0..200).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_validate_entry_name() {
        assert!(validate_entry_name("processed_a.jpg").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(validate_entry_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        exercise_store(&store);
        assert_eq!(store.session_count(), 2);
        assert_eq!(store.entry_count(), 2);
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path().join("sessions"));
        exercise_store(&store);
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 2);
    }

    #[test]
    fn test_fs_store_rejects_traversal_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());
        assert!(matches!(
            store.list(&SessionId::from("..")),
            Err(SessionError::UnknownSession(_))
        ));
    }
}
