//! Durable cursor file.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use {vkbridge_common::Result, vkbridge_longpoll::CursorHandler};

#[derive(Serialize, Deserialize)]
struct CursorFile {
    ts: u64,
}

/// Keeps the last delivered cursor in a small JSON file (`{"ts": N}`).
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored cursor, or 0 when nothing was stored yet.
    pub async fn load(&self) -> Result<u64> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let file: CursorFile = serde_json::from_slice(&raw)?;
        Ok(file.ts)
    }

    /// Replace the stored cursor. Readers see the old or the new file, never
    /// a partial one.
    pub async fn save(&self, cursor: u64) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&CursorFile { ts: cursor })?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(cursor, path = %self.path.display(), "cursor saved");
        Ok(())
    }
}

#[async_trait]
impl CursorHandler for FileCursorStore {
    async fn cursor_advanced(&self, cursor: u64) -> anyhow::Result<()> {
        self.save(cursor).await?;
        Ok(())
    }
}
