use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::provider::Session;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt session file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable home of the client's credential pair.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, SessionError>;

    fn save(&self, session: &Session) -> Result<(), SessionError>;

    /// Remove both tokens. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}

/// JSON file, readable only by the owner on unix.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(session)?;

        // Staged owner-only beside the target, then renamed over it
        let staging = self.path.with_extension("json.tmp");
        match fs::remove_file(&staging) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&staging)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionError> {
        Ok(self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        *self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tag: &str) -> Session {
        Session {
            access_token: format!("at-{}", tag),
            refresh_token: format!("rt-{}", tag),
            expires_in: Some(3600),
            token_type: Some("bearer".into()),
        }
    }

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("urecover-session-{}", uuid::Uuid::new_v4()))
            .join("session.json")
    }

    #[test]
    fn file_store_round_trip_and_clear() {
        let store = FileSessionStore::new(scratch_path());
        assert!(store.load().unwrap().is_none());

        store.save(&session("1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(session("1")));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let store = FileSessionStore::new(scratch_path());
        store.save(&session("1")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn save_replaces_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::new(path.clone());
        store.save(&session("2")).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.load().unwrap(), Some(session("2")));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let store = FileSessionStore::new(path);
        assert!(matches!(store.load(), Err(SessionError::Corrupt(_))));
    }

    #[test]
    fn memory_store_replaces_pair() {
        let store = MemorySessionStore::with_session(session("1"));
        store.save(&session("2")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().refresh_token, "rt-2");
    }
}
