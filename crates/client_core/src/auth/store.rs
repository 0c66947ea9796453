use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use shared::domain::Session;

use crate::error::AuthError;

/// Persists the current session as JSON so it survives restarts.
#[derive(Debug, Clone)]
pub struct SessionFileStore {
    path: PathBuf,
}

impl SessionFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AuthError::Storage(format!(
                    "failed to read '{}': {err}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&raw).map(Some).map_err(|err| {
            AuthError::Storage(format!(
                "malformed session file '{}': {err}",
                self.path.display()
            ))
        })
    }

    pub fn save(&self, session: &Session) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AuthError::Storage(format!(
                    "failed to create session directory '{}': {err}",
                    parent.display()
                ))
            })?;
        }
        let serialized = serde_json::to_string_pretty(session)
            .map_err(|err| AuthError::Storage(err.to_string()))?;
        write_private(&self.path, serialized.as_bytes()).map_err(|err| {
            AuthError::Storage(format!(
                "failed to write '{}': {err}",
                self.path.display()
            ))
        })
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Storage(format!(
                "failed to remove '{}': {err}",
                self.path.display()
            ))),
        }
    }
}

/// Writes `contents` readable by the owner only, since the file holds tokens.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // The creation mode does not apply to a file that already exists.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}
