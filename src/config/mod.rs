//! Session configuration.
//!
//! The loading pipeline is deliberately small: read the YAML file,
//! deserialize with serde defaults, validate. Validation collects every
//! issue before failing so a bad file is reported in one pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, Severity, ValidationIssue};

// ============================================================================
// Schema
// ============================================================================

/// Top-level session configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Spawner timing and placement.
    pub spawn: SpawnSettings,
    /// Shield cooldown gate.
    pub shield: ShieldSettings,
    /// Resource keys the built-in phases load.
    pub assets: AssetKeys,
    /// Where the session record is persisted.
    pub record_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spawn: SpawnSettings::default(),
            shield: ShieldSettings::default(),
            assets: AssetKeys::default(),
            record_path: PathBuf::from("saves/session.json"),
        }
    }
}

/// Spawner timing and placement settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpawnSettings {
    /// Delay between spawn attempts, in milliseconds.
    pub interval_ms: u64,
    /// Minimum distance between a spawn point and the player.
    pub min_player_distance: f32,
    /// Half-extent of the square spawn arena, centered on the origin.
    pub arena_half_extent: f32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            min_player_distance: 9.0,
            arena_half_extent: 10.0,
        }
    }
}

impl SpawnSettings {
    /// Spawn interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Shield cooldown settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShieldSettings {
    /// Time the shield stays down after absorbing a hit, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for ShieldSettings {
    fn default() -> Self {
        Self { cooldown_ms: 3_000 }
    }
}

impl ShieldSettings {
    /// Cooldown as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Resource keys loaded by the built-in phases.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetKeys {
    /// Main menu panel.
    pub main_menu: String,
    /// Menu backdrop stage.
    pub menu_stage: String,
    /// In-game HUD panel.
    pub game_hud: String,
    /// Active-play stage.
    pub play_stage: String,
}

impl Default for AssetKeys {
    fn default() -> Self {
        Self {
            main_menu: "MainMenu".to_string(),
            menu_stage: "MenuStage".to_string(),
            game_hud: "GameHud".to_string(),
            play_stage: "PlayStage".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl SessionConfig {
    /// Loads and validates a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if the file does not exist,
    /// [`ConfigError::Parse`] on malformed YAML and
    /// [`ConfigError::Validation`] when any error-severity issue is found.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ConfigError::MissingFile {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            }
        })?;

        let config: Self = serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        config.validated(&path.display().to_string())?;
        debug!(path = %path.display(), "session configuration loaded");
        Ok(config)
    }

    /// Validates the configuration, failing on any error-severity issue.
    ///
    /// Warnings are logged and do not fail validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing every issue found.
    pub fn validated(&self, origin: &str) -> Result<(), ConfigError> {
        let issues = self.validate();

        for issue in issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
        {
            tracing::warn!(%issue, "configuration warning");
        }

        if issues.iter().any(|i| i.severity == Severity::Error) {
            return Err(ConfigError::Validation {
                path: origin.to_string(),
                issues,
            });
        }
        Ok(())
    }

    /// Collects validation issues without failing.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.spawn.interval_ms == 0 {
            issues.push(ValidationIssue {
                path: "spawn.interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
                severity: Severity::Error,
            });
        }
        if self.spawn.arena_half_extent <= 0.0 {
            issues.push(ValidationIssue {
                path: "spawn.arena_half_extent".to_string(),
                message: "must be positive".to_string(),
                severity: Severity::Error,
            });
        }
        if self.spawn.min_player_distance < 0.0 {
            issues.push(ValidationIssue {
                path: "spawn.min_player_distance".to_string(),
                message: "must not be negative".to_string(),
                severity: Severity::Error,
            });
        }
        // The arena diagonal bounds the distance any roll can reach; beyond
        // it every attempt falls back to an unconstrained point.
        let diagonal = 2.0 * self.spawn.arena_half_extent * std::f32::consts::SQRT_2;
        if self.spawn.min_player_distance > diagonal {
            issues.push(ValidationIssue {
                path: "spawn.min_player_distance".to_string(),
                message: format!("exceeds the arena diagonal ({diagonal:.1}); distance cannot be honored"),
                severity: Severity::Warning,
            });
        }
        if self.shield.cooldown_ms == 0 {
            issues.push(ValidationIssue {
                path: "shield.cooldown_ms".to_string(),
                message: "cooldown of zero makes the shield effectively always up".to_string(),
                severity: Severity::Warning,
            });
        }
        for (path, key) in [
            ("assets.main_menu", &self.assets.main_menu),
            ("assets.menu_stage", &self.assets.menu_stage),
            ("assets.game_hud", &self.assets.game_hud),
            ("assets.play_stage", &self.assets.play_stage),
        ] {
            if key.is_empty() {
                issues.push(ValidationIssue {
                    path: path.to_string(),
                    message: "asset key must not be empty".to_string(),
                    severity: Severity::Error,
                });
            }
        }
        if self.record_path.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                path: "record_path".to_string(),
                message: "record path must not be empty".to_string(),
                severity: Severity::Error,
            });
        }

        issues
    }
}

// ============================================================================
// Tests
// ============================================================================
