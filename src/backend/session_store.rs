use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::BackendError;
use crate::auth::Session;

/// Where the backend client keeps its session between runs.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, BackendError>;
    fn save(&self, session: &Session) -> Result<(), BackendError>;
    fn clear(&self) -> Result<(), BackendError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.inner.lock().map_err(poisoned)?.clone())
    }

    fn save(&self, session: &Session) -> Result<(), BackendError> {
        *self.inner.lock().map_err(poisoned)? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        *self.inner.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

/// JSON file holding the current session.
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
    fn load(&self) -> Result<Option<Session>, BackendError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(io_error)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let session = serde_json::from_str(&content)
            .map_err(|e| BackendError::Decode(format!("session file {}: {}", self.path.display(), e)))?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        fs::write(&self.path, content).map_err(io_error)
    }

    fn clear(&self) -> Result<(), BackendError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

fn io_error(err: std::io::Error) -> BackendError {
    BackendError::Network(format!("session storage: {}", err))
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> BackendError {
    BackendError::Network("session storage lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{User, UserMetadata};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            token_type: "bearer".into(),
            expires_in: Some(3600),
            expires_at: None,
            user: User {
                id: Uuid::new_v4(),
                email: Some("kim@example.com".into()),
                user_metadata: UserMetadata::default(),
            },
        }
    }

    #[test]
    fn file_store_persists_and_clears() {
        let dir = std::env::temp_dir().join(format!("promptdeck-test-{}", Uuid::new_v4().simple()));
        let store = FileSessionStore::new(dir.join("session.json"));

        assert_eq!(store.load().unwrap(), None);
        let saved = session();
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine
        store.clear().unwrap();

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySessionStore::new();
        store.save(&session()).unwrap();
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
