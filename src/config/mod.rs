// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Editor configuration.
//!
//! Settings are read from YAML or TOML, chosen by file extension. Every
//! field has a default so partial files are fine.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::history::{DEFAULT_COALESCE_WINDOW, GzipCodec, PlainCodec, SnapshotCodec, UndoHistory};

/// Timeline editor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditorConfig {
    /// Snap grid in subdivisions per beat
    #[serde(default = "default_snap_grid")]
    pub snap_grid: f64,
    /// Same-kind undo saves closer together than this are coalesced
    #[serde(default = "default_coalesce_window_secs")]
    pub coalesce_window_secs: f64,
    /// Gzip undo snapshots
    #[serde(default = "default_compress_undo")]
    pub compress_undo: bool,
    /// Maximum undo points kept (0 = unlimited)
    #[serde(default)]
    pub history_limit: usize,
    /// Log level for the command line tool
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_snap_grid() -> f64 {
    4.0
}
fn default_coalesce_window_secs() -> f64 {
    10.0
}
fn default_compress_undo() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_grid: default_snap_grid(),
            coalesce_window_secs: default_coalesce_window_secs(),
            compress_undo: default_compress_undo(),
            history_limit: 0,
            log_level: default_log_level(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a `.yaml`/`.yml` or `.toml` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            other => bail!("Unsupported config format {:?} for {:?}", other, path),
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")?;
        config.validate()
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML configuration")?;
        config.validate()
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    fn validate(self) -> Result<Self> {
        if !(self.snap_grid > 0.0 && self.snap_grid.is_finite()) {
            bail!("snap_grid must be positive, got {}", self.snap_grid);
        }
        if !(self.coalesce_window_secs >= 0.0 && self.coalesce_window_secs.is_finite()) {
            bail!(
                "coalesce_window_secs must be finite and not negative, got {}",
                self.coalesce_window_secs
            );
        }
        Ok(self)
    }

    /// Coalescing window as a duration
    pub fn coalesce_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.coalesce_window_secs).unwrap_or(DEFAULT_COALESCE_WINDOW)
    }

    /// Undo history configured from these settings
    pub fn build_history(&self) -> UndoHistory {
        let codec: Box<dyn SnapshotCodec> = if self.compress_undo {
            Box::new(GzipCodec::default())
        } else {
            Box::new(PlainCodec)
        };
        UndoHistory::new(codec)
            .with_coalesce_window(self.coalesce_window())
            .with_limit(self.history_limit)
    }
}
