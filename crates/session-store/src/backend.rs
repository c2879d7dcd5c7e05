//! Storage backends for a single credential scope
//!
//! A backend holds at most one token. `MemoryBackend` is the ephemeral
//! scope; `FileBackend` is the durable scope and persists a small JSON
//! document with atomic temp-file + rename writes.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Key-value slot for one persistence scope.
///
/// `load` must be cheap and side-effect free; the request pipeline calls it
/// before every outbound request.
pub trait ScopeBackend: Send + Sync {
    /// Short name for logging ("durable", "ephemeral", ...).
    fn name(&self) -> &str;

    /// Current token, if any.
    fn load(&self) -> Option<String>;

    /// Replace the stored token.
    fn save(&self, token: &str) -> Result<()>;

    /// Remove the stored token. Clearing an empty slot is not an error.
    fn clear(&self) -> Result<()>;
}

/// In-process slot. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeBackend for MemoryBackend {
    fn name(&self) -> &str {
        "ephemeral"
    }

    fn load(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.slot.lock() = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.slot.lock().take();
        Ok(())
    }
}

/// On-disk representation of the durable scope.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// JSON-file slot for the durable scope.
///
/// The file is read once when the backend is opened and cached in memory;
/// every mutation updates the cache first and then rewrites or removes the
/// file. A missing file is an empty scope.
pub struct FileBackend {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl FileBackend {
    /// Open the durable scope at `path`.
    ///
    /// An unreadable or corrupt file is logged and treated as empty so a bad
    /// file never blocks startup; the next write replaces it.
    pub fn open(path: PathBuf) -> Self {
        let cached = match read_token(&path) {
            Ok(Some(token)) => {
                info!(path = %path.display(), "loaded durable credential");
                Some(token)
            }
            Ok(None) => {
                debug!(path = %path.display(), "no durable credential on disk");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable durable credential");
                None
            }
        };
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScopeBackend for FileBackend {
    fn name(&self) -> &str {
        "durable"
    }

    fn load(&self) -> Option<String> {
        self.cached.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut cached = self.cached.lock();
        *cached = Some(token.to_owned());
        write_atomic(
            &self.path,
            &StoredToken {
                access_token: token.to_owned(),
            },
        )
    }

    fn clear(&self) -> Result<()> {
        let mut cached = self.cached.lock();
        cached.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed durable credential");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
        }
    }
}

fn read_token(path: &Path) -> Result<Option<String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
    };
    let stored: StoredToken = serde_json::from_str(&contents)
        .map_err(|e| Error::Parse(format!("parsing credential file: {e}")))?;
    if stored.access_token.is_empty() {
        return Ok(None);
    }
    Ok(Some(stored.access_token))
}

/// Write the token file atomically with 0600 permissions on unix.
fn write_atomic(path: &Path, data: &StoredToken) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credential.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp_path, perms)
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted durable credential");
    Ok(())
}
