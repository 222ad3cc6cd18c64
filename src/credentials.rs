use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Bearer credential for the source API together with its hard expiry.
/// The persisted copy lives in a [`CredentialStore`]; the token manager is
/// the only component that reads or writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable keeper of the one source-API credential. Implementations are
/// either durable (file-backed) or absent entirely; callers stay agnostic.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn store(&self, credential: &Credential) -> Result<()>;
}

/// File-backed store: one JSON document at a fixed path, replaced atomically
/// on every renewal.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read credential file {}", self.path.display())
                })
            }
        };
        let credential = serde_json::from_str(&contents)
            .with_context(|| format!("invalid credential file {}", self.path.display()))?;
        Ok(Some(credential))
    }

    fn store(&self, credential: &Credential) -> Result<()> {
        // Write-then-rename so a crash mid-write never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(credential)
            .context("failed to encode credential")?;
        fs::write(&tmp, payload)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
