//! JSON file state store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::traits::{PersistedAgent, StateStore};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    saved_at: DateTime<Utc>,
    agents: Vec<PersistedAgent>,
}

pub struct JsonFileStateStore {
    path: PathBuf,
    persist_lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn save(&self, agents: &[PersistedAgent]) -> Result<()> {
        let _guard = self.persist_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state dir {}", parent.display()))?;
        }

        let file = StateFile {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            agents: agents.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&file).context("Failed to serialize agent state")?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to finalize {}", self.path.display()))?;

        log::debug!("Persisted {} agents to {}", agents.len(), self.path.display());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PersistedAgent>> {
        let _guard = self.persist_lock.lock().await;

        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let file: StateFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        if file.version != FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported state file version {} in {}",
                file.version,
                self.path.display()
            );
        }
        Ok(file.agents)
    }
}
