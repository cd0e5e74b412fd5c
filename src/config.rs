// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::ContextOptions;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
    pub reload: ReloadConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Quad Renderer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Compiled SPIR-V shaders read at configure time
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/quad.vert.spv"),
            fragment: PathBuf::from("shaders/quad.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    /// Exit after this many presented frames. 0 runs until the window closes.
    pub max_frames: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            max_frames: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub watch_shaders: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch_shaders: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Instance options for `RenderContext::init`
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            application_name: self.window.title.clone(),
            validation: self.debug.validation_layers,
        }
    }

    /// Log level as a filter, defaulting to Info on unknown names
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            eprintln!(
                "Unknown log level '{}', defaulting to info",
                self.debug.log_level
            );
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("[window]\nwidth = 640\n").unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/quad.vert.spv"));
        assert!(config.reload.watch_shaders);
        assert_eq!(config.debug.max_frames, 0);
    }

    #[test]
    fn full_file_round_trips_into_options() {
        let config: Config = toml::from_str(
            r#"
            [window]
            title = "Test"
            width = 320
            height = 240

            [shaders]
            vertex = "a.spv"
            fragment = "b.spv"

            [debug]
            validation_layers = false
            log_level = "debug"
            max_frames = 3

            [reload]
            watch_shaders = false
            "#,
        )
        .unwrap();

        let options = config.context_options();
        assert_eq!(options.application_name, "Test");
        assert!(!options.validation);
        assert_eq!(config.shaders.fragment, PathBuf::from("b.spv"));
        assert_eq!(config.debug.max_frames, 3);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
        assert!(!config.reload.watch_shaders);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut config = Config::default();
        config.debug.log_level = "chatty".to_string();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn load_from_path_reads_file_and_reports_parse_errors() {
        let mut good = tempfile::NamedTempFile::new().unwrap();
        writeln!(good, "[debug]\nmax_frames = 10").unwrap();
        let config = Config::load_from_path(good.path()).unwrap();
        assert_eq!(config.debug.max_frames, 10);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[window]\nwidth = \"wide\"").unwrap();
        let err = Config::load_from_path(bad.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn absent_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(config.window.title, "Quad Renderer");
    }
}
