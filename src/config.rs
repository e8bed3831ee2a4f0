// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Settings come from config.toml with serde defaults for anything missing.
// The two frame-pacing knobs (present mode, frame-rate target) can also be
// overridden from the environment; the environment wins over the file.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Environment override for the present mode, read on every swap chain rebuild
pub const PRESENT_MODE_ENV: &str = "VK_BRINGUP_PRESENT_MODE";
/// Environment override for the frame-rate target, read once at init
pub const FPS_TARGET_ENV: &str = "VK_BRINGUP_FPS_TARGET";

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk-bringup".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
        }
    }
}

/// Frame pacing settings
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GraphicsConfig {
    /// One of `default-vsync`, `relaxed-vsync`, `low-latency-vsync`,
    /// `immediate-no-vsync` (or the Vulkan names `fifo`, `fifo_relaxed`,
    /// `mailbox`, `immediate`)
    pub present_mode: Option<String>,
    pub fps_target: Option<f64>,
}

/// Debug settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
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

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Requested present mode, if any. The environment is consulted on every
    /// call so each rebuild sees the current value.
    pub fn present_mode_override(&self) -> Option<vk::PresentModeKHR> {
        resolve_present_mode_override(
            std::env::var(PRESENT_MODE_ENV).ok().as_deref(),
            self.graphics.present_mode.as_deref(),
        )
    }

    /// Requested frame-rate target and whether it came from the environment.
    pub fn fps_target_override(&self) -> Option<(f32, bool)> {
        resolve_fps_target_override(
            std::env::var(FPS_TARGET_ENV).ok().as_deref(),
            self.graphics.fps_target,
        )
    }
}

/// Map a present-mode token to the Vulkan enum
pub fn parse_present_mode(token: &str) -> Option<vk::PresentModeKHR> {
    match token.trim().to_lowercase().as_str() {
        "default-vsync" | "fifo" => Some(vk::PresentModeKHR::FIFO),
        "relaxed-vsync" | "fifo_relaxed" => Some(vk::PresentModeKHR::FIFO_RELAXED),
        "low-latency-vsync" | "mailbox" => Some(vk::PresentModeKHR::MAILBOX),
        "immediate-no-vsync" | "immediate" => Some(vk::PresentModeKHR::IMMEDIATE),
        _ => None,
    }
}

/// Parse a frame-rate target; the whole string must be a positive float.
pub fn parse_fps_target(value: &str) -> Option<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|fps| fps.is_finite() && *fps > 0.0)
}

fn resolve_present_mode_override(
    env: Option<&str>,
    file: Option<&str>,
) -> Option<vk::PresentModeKHR> {
    let token = env.or(file)?;
    let mode = parse_present_mode(token);
    if mode.is_none() {
        log::warn!("Ignoring unknown presentation mode '{}'", token);
    }
    mode
}

fn resolve_fps_target_override(env: Option<&str>, file: Option<f64>) -> Option<(f32, bool)> {
    if let Some(raw) = env {
        return match parse_fps_target(raw) {
            Some(fps) => Some((fps, true)),
            None => {
                log::warn!("Can't set target fps from environment value '{}'", raw);
                None
            }
        };
    }

    let fps = file?;
    if fps.is_finite() && fps > 0.0 {
        Some((fps as f32, false))
    } else {
        log::warn!("Can't set target fps from config value {}", fps);
        None
    }
}
