//! Run configuration, stored as RON.
//!
//! Every field has a default, so a partial file is valid and a missing file
//! is created with the defaults on first use.

use crate::error::Result;
use crate::paradigm::TimeUnit;
use crate::tracker::TrackerSettings;

use log::info;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, path::PathBuf, time::Duration};

/// Everything the paradigm controller needs besides the paradigm itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Event thread clock checks per second.
    pub sampling_rate: f64,
    /// Hard stop for the whole schedule, in seconds.
    pub max_duration: Option<f64>,
    /// Unit of the time columns in paradigm files.
    pub time_unit: TimeUnit,
    /// PWM value per hardware name, for rows without a value.
    pub pwm: BTreeMap<String, f64>,
    pub baud_rate: u32,
    /// Serial device used when none is given on the command line.
    pub port: Option<PathBuf>,
    /// Time the board needs to boot after the port is opened, in ms.
    pub settle_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 10.0,
            max_duration: None,
            time_unit: TimeUnit::Minutes,
            pwm: BTreeMap::new(),
            baud_rate: 57600,
            port: None,
            settle_ms: 2000,
        }
    }
}

impl ControllerConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Where the tracker's frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Directory of image files, played back in name order.
    pub dir: Option<PathBuf>,
    /// Playback rate of image sequences.
    pub fps: f64,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self { dir: None, fps: 30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub dir: PathBuf,
    /// File name prefix of every table of a run.
    pub prefix: String,
    /// Rows kept in memory before they are appended to disk.
    pub max_rows_cached: usize,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            prefix: "learnmem".to_owned(),
            max_rows_cached: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub tracker: TrackerSettings,
    pub frames: FramesConfig,
    pub results: ResultsConfig,
}

impl Config {
    /// Parse a configuration from RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }

    /// Read `path`, or write the defaults there if it does not exist yet.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let config = Self::from_ron(&text)?;
            info!("Configuration read from {}", path.display());
            return Ok(config);
        }

        let config = Self::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, config.to_ron()?)?;
        info!("Default configuration written to {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LearnMemError;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("learnmem.ron");

        let created = Config::load_or_create(&path).unwrap();
        assert_eq!(created, Config::default());
        assert!(path.exists());

        let reread = Config::load_or_create(&path).unwrap();
        assert_eq!(reread, created);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_ron(
            r#"(
                controller: (sampling_rate: 50.0, pwm: {"LED": 0.25}),
                tracker: (targets: 12, columns: 4, fly: (min_area: 5, max_area: 90)),
                frames: (fps: 25.0),
            )"#,
        )
        .unwrap();
        assert_eq!(config.controller.sampling_rate, 50.0);
        assert_eq!(config.controller.pwm["LED"], 0.25);
        assert_eq!(config.controller.baud_rate, 57600);
        assert_eq!(config.tracker.targets, 12);
        assert_eq!(config.tracker.columns, 4);
        assert_eq!(config.tracker.fly.max_area, 90);
        assert_eq!(config.tracker.fly.min_length, 3.0);
        assert_eq!(config.tracker.warmup_frames, 10);
        assert_eq!(config.frames.fps, 25.0);
        assert_eq!(config.frames.dir, None);
        assert_eq!(config.results, ResultsConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(matches!(
            Config::from_ron("(controller: (sampling_rate: \"fast\"))"),
            Err(LearnMemError::RonDeserialize(_))
        ));
    }
}
