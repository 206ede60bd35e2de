use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::capture::{CaptureRequest, CaptureSettings as ManagerSettings};
use crate::detect::DetectionMode;
use crate::sensing::SensingTiming;
use crate::session::SessionConfig;

pub const DEBUG_ENV: &str = "EXAMGUARD_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct DetectionSettings {
    pub strategy: DetectionMode,
    pub interval_ms: u64,
    pub stub_probability: f64,
    pub rotation_threshold_deg: f32,
    pub tick_timeout_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            strategy: DetectionMode::Stub,
            interval_ms: 2_000,
            stub_probability: 0.03,
            rotation_threshold_deg: 30.0,
            tick_timeout_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct CaptureSettings {
    pub health_interval_ms: u64,
    pub max_recovery_attempts: u32,
    pub bind_timeout_ms: u64,
    pub fail_on_loss: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            health_interval_ms: 2_000,
            max_recovery_attempts: 3,
            bind_timeout_ms: 3_000,
            fail_on_loss: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct ProctorSettings {
    pub violation_threshold: u32,
    pub detection: DetectionSettings,
    pub capture: CaptureSettings,
}

impl Default for ProctorSettings {
    fn default() -> Self {
        Self {
            violation_threshold: 1,
            detection: DetectionSettings::default(),
            capture: CaptureSettings::default(),
        }
    }
}

impl ProctorSettings {
    pub fn capture_manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            preferred: CaptureRequest::preferred(),
            max_recovery_attempts: self.capture.max_recovery_attempts,
            bind_timeout: Duration::from_millis(self.capture.bind_timeout_ms),
            ..ManagerSettings::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let debug_mode = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        SessionConfig {
            violation_threshold: self.violation_threshold.max(1),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
            sensing: SensingTiming {
                detection_interval: Duration::from_millis(self.detection.interval_ms.max(1)),
                tick_timeout: Duration::from_millis(self.detection.tick_timeout_ms.max(1)),
                health_interval: Duration::from_millis(self.capture.health_interval_ms.max(1)),
            },
            fail_on_capture_loss: self.capture.fail_on_loss,
            ..SessionConfig::default()
        }
    }
}

/// `settings.json` in the data directory, loaded once and written back on update.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ProctorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring malformed settings at {}: {err}", path.display());
                ProctorSettings::default()
            })
        } else {
            ProctorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ProctorSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProctorSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self) -> ProctorSettings {
        self.read().clone()
    }

    pub fn set_violation_threshold(&self, threshold: u32) -> Result<()> {
        let mut guard = self.write();
        guard.violation_threshold = threshold.max(1);
        self.persist(&guard)
    }

    pub fn set_detection_strategy(&self, strategy: DetectionMode) -> Result<()> {
        let mut guard = self.write();
        guard.detection.strategy = strategy;
        self.persist(&guard)
    }

    fn persist(&self, data: &ProctorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.get();
        assert_eq!(settings.violation_threshold, 1);
        assert_eq!(settings.detection.strategy, DetectionMode::Stub);
        assert_eq!(settings.detection.interval_ms, 2_000);
        assert!(settings.capture.fail_on_loss);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "violation_threshold": 3, "detection": { "strategy": "heuristic" } }"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.violation_threshold, 3);
        assert_eq!(settings.detection.strategy, DetectionMode::Heuristic);
        assert_eq!(settings.detection.tick_timeout_ms, 1_500);
        assert_eq!(settings.capture.max_recovery_attempts, 3);
    }

    #[test]
    fn updates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_violation_threshold(0).unwrap();
        store.set_detection_strategy(DetectionMode::Model).unwrap();

        let reopened = SettingsStore::new(path).unwrap().get();
        assert_eq!(reopened.violation_threshold, 1);
        assert_eq!(reopened.detection.strategy, DetectionMode::Model);
    }

    #[test]
    fn session_config_reflects_settings() {
        let mut settings = ProctorSettings::default();
        settings.violation_threshold = 2;
        settings.detection.interval_ms = 500;
        settings.capture.fail_on_loss = false;

        let config = settings.session_config();
        assert_eq!(config.violation_threshold, 2);
        assert_eq!(config.sensing.detection_interval, Duration::from_millis(500));
        assert!(!config.fail_on_capture_loss);
        assert_eq!(settings.capture_manager_settings().max_recovery_attempts, 3);
    }
}
