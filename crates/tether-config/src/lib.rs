//! Configuration system for the Tether session registry.
//!
//! Provides TOML-based configuration with:
//! - A `[session]` section for the idle timeout and its comparison mode
//! - Field-by-field layering of a user file and a project file
//! - Conversion into [`tether_session::RegistryConfig`]

pub mod error;
pub mod layers;
pub mod types;

pub use error::{ConfigError, Result};
pub use layers::{
    CONFIG_DIR_ENV, ConfigLayer, ConfigLayers, LayerKind, LayerStatus, PROJECT_CONFIG_FILE,
    ResolvedConfig, read_config, user_config_dir, write_config,
};
pub use types::{SessionConfig, SessionOverrides, TetherConfig};
