//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server connection settings.
    pub network: NetworkConfig,
    /// Match synchronization timing.
    pub game: GameConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Game server address.
    pub server_address: String,
    /// Game server port.
    pub server_port: u16,
    /// Client timeout in seconds.
    pub timeout_seconds: u32,
}

/// Match synchronization timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// How long to wait for a turn broadcast after the local turn expired
    /// before requesting a full resync.
    pub turn_grace_seconds: f32,
    /// Lifetime of an unanswered in-flight request key.
    pub dedup_ttl_seconds: f32,
    /// Rate at which the session clock is ticked (Hz).
    pub tick_rate_hz: u32,
    /// Turn length assumed when the server omits it.
    pub default_turn_seconds: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            timeout_seconds: 30,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_grace_seconds: 5.0,
            dedup_ttl_seconds: 10.0,
            tick_rate_hz: 60,
            default_turn_seconds: 30,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the client (`<config_dir>/blokus`), if the
/// platform exposes one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("blokus"))
}

// --- Persistence ---

impl GameConfig {
    /// Replaces timing values the session cannot run with by their defaults.
    fn sanitize(&mut self) {
        let defaults = GameConfig::default();
        if !(self.turn_grace_seconds.is_finite() && self.turn_grace_seconds >= 0.0) {
            log::warn!("turn_grace_seconds {} unusable, using default", self.turn_grace_seconds);
            self.turn_grace_seconds = defaults.turn_grace_seconds;
        }
        if !(self.dedup_ttl_seconds.is_finite() && self.dedup_ttl_seconds > 0.0) {
            log::warn!("dedup_ttl_seconds {} unusable, using default", self.dedup_ttl_seconds);
            self.dedup_ttl_seconds = defaults.dedup_ttl_seconds;
        }
        if self.tick_rate_hz == 0 {
            log::warn!("tick_rate_hz must be positive, using default");
            self.tick_rate_hz = defaults.tick_rate_hz;
        }
        if self.default_turn_seconds == 0 {
            log::warn!("default_turn_seconds must be positive, using default");
            self.default_turn_seconds = defaults.default_turn_seconds;
        }
    }
}

impl Config {
    /// Location of `config.ron` inside `config_dir`.
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Reads `config.ron` from `config_dir`. A missing file is written out
    /// with defaults so there is something to edit.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let config = Self::from_ron(&contents)?;
                log::info!("Loaded client config from {}", path.display());
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(config_dir)?;
                log::info!("Wrote default client config to {}", path.display());
                Ok(config)
            }
            Err(err) => Err(ConfigError::ReadError(err)),
        }
    }

    /// Parses a config document. Unusable timing values fall back to defaults.
    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = ron::from_str(contents).map_err(ConfigError::ParseError)?;
        config.game.sanitize();
        Ok(config)
    }

    /// Writes `config.ron`, creating `config_dir` if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new().depth_limit(2))
            .map_err(ConfigError::SerializeError)?;
        std::fs::write(Self::path_in(config_dir), text).map_err(ConfigError::WriteError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("server_port: 7777"));
        assert!(ron_str.contains("turn_grace_seconds: 5.0"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.game.dedup_ttl_seconds = 2.5;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(network: (server_port: 9000))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.network.server_port, 9000);
        assert_eq!(config.network.server_address, "127.0.0.1");
        assert_eq!(config.game, GameConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.game.turn_grace_seconds = 8.0;
        config.network.server_address = "10.0.0.1".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_unusable_timing_falls_back_to_defaults() {
        let config = Config::from_ron(
            "(game: (turn_grace_seconds: -1.0, dedup_ttl_seconds: 0.0, tick_rate_hz: 0, default_turn_seconds: 45))",
        )
        .unwrap();
        let defaults = GameConfig::default();
        assert_eq!(config.game.turn_grace_seconds, defaults.turn_grace_seconds);
        assert_eq!(config.game.dedup_ttl_seconds, defaults.dedup_ttl_seconds);
        assert_eq!(config.game.tick_rate_hz, defaults.tick_rate_hz);
        assert_eq!(config.game.default_turn_seconds, 45);
    }

    #[test]
    fn test_load_or_create_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_in(dir.path()), "(game: (tick_rate_hz: \"fast\"))").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
