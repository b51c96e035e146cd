// Credential storage for the application-only bearer token

use crate::error::{Result, StoreError};
use nucoll_client::BearerToken;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "~/.nucoll";

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, or `None` when no usable token has been saved yet.
    pub fn load(&self) -> Result<Option<BearerToken>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let token: BearerToken = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if token.token_type.is_empty() || token.access_token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Write the token readable by the owner only.
    pub fn save(&self, token: &BearerToken) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let json = serde_json::to_string(token).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!("credentials stored in {}", self.path.display());
        Ok(())
    }
}
