//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`B2D_SECTION__KEY`)

use broad2d_physics::{OverlaySettings, PhysicsConfig};
use figment::{Figment, providers::{Format, Toml, Env}};
use serde::{Serialize, Deserialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Physics and broadphase configuration
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Demo scene configuration
    #[serde(default)]
    pub demo: DemoConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`B2D_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // B2D_PHYSICS__BROADPHASE__AABB_MARGIN=0.2 -> physics.broadphase.aabb_margin = 0.2
        figment = figment.merge(Env::prefixed("B2D_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }
}

/// Demo scene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of dynamic bodies dropped into the arena
    pub body_count: usize,
    /// Number of fixed steps to run
    pub ticks: u32,
    /// Fixed step length in seconds
    pub dt: f32,
    /// Half width of the square arena
    pub arena_half_extent: f32,
    /// Largest initial speed of a spawned body
    pub max_speed: f32,
    /// Seed for body placement
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            body_count: 200,
            ticks: 600,
            dt: 1.0 / 60.0,
            arena_half_extent: 40.0,
            max_speed: 12.0,
            seed: 7,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log every pair event instead of a per-tick summary
    pub log_pair_events: bool,
    /// Record the debug overlay for the final frame
    pub draw_final_frame: bool,
    pub overlay: OverlaySettings,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_pair_events: false,
            draw_final_frame: false,
            overlay: OverlaySettings::default(),
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}
