use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::average::AverageOptions;
use crate::core::SubsystemId;

/// Recording-related settings persisted with the averaging setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingOptions {
    pub enabled: bool,
    pub prefix: String,
    pub max_file_size: u64,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "RTI".to_string(),
            max_file_size: 16 * 1024 * 1024,
        }
    }
}

/// Everything the configuration view persists for one subsystem: the two
/// independent averaging configurations plus recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageSetup {
    pub subsystem: SubsystemId,
    pub lta: AverageOptions,
    pub sta: AverageOptions,
    pub recording: RecordingOptions,
}

impl AverageSetup {
    pub fn new(subsystem: SubsystemId) -> Self {
        Self {
            subsystem,
            lta: AverageOptions::default(),
            sta: AverageOptions::default(),
            recording: RecordingOptions::default(),
        }
    }
}

/// Persists averaging setups to disk, one JSON file per subsystem.
pub struct SetupStorage {
    storage_dir: PathBuf,
}

impl SetupStorage {
    /// Create a storage manager, creating the directory if needed.
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&storage_dir)
            .context("failed to create setup storage directory")?;
        Ok(Self { storage_dir })
    }

    pub fn save(&self, setup: &AverageSetup) -> Result<()> {
        let path = self.setup_path(setup.subsystem);
        let json =
            serde_json::to_string_pretty(setup).context("failed to serialize average setup")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write setup to {path:?}"))?;
        Ok(())
    }

    pub fn load(&self, subsystem: SubsystemId) -> Result<AverageSetup> {
        let path = self.setup_path(subsystem);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read setup from {path:?}"))?;
        let setup = serde_json::from_str(&json).context("failed to deserialize average setup")?;
        Ok(setup)
    }

    /// Load the setup for a subsystem, falling back to defaults when none
    /// has been saved yet.
    pub fn load_or_default(&self, subsystem: SubsystemId) -> AverageSetup {
        self.load(subsystem)
            .unwrap_or_else(|_| AverageSetup::new(subsystem))
    }

    pub fn delete(&self, subsystem: SubsystemId) -> Result<()> {
        let path = self.setup_path(subsystem);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete setup at {path:?}"))?;
        }
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<AverageSetup>> {
        let mut setups = Vec::new();
        if !self.storage_dir.exists() {
            return Ok(setups);
        }

        for entry in fs::read_dir(&self.storage_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let json = fs::read_to_string(&path)?;
                if let Ok(setup) = serde_json::from_str::<AverageSetup>(&json) {
                    setups.push(setup);
                }
            }
        }

        Ok(setups)
    }

    fn setup_path(&self, subsystem: SubsystemId) -> PathBuf {
        self.storage_dir.join(format!("{subsystem}.json"))
    }
}
