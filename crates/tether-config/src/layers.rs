//! Layered config files.
//!
//! Two files are consulted, lowest precedence first:
//! 1. the user file, `$TETHER_CONFIG_DIR/config.toml` or
//!    `<platform config dir>/tether/config.toml`
//! 2. the project file, `<project dir>/tether.toml`
//!
//! Layers merge field by field. A project file that only sets
//! `idle_timeout_minutes` keeps the `idle_clock` chosen in the user file.
//! A layer that cannot be read or parsed, or that would leave the merged
//! settings invalid, is rejected as a whole and the layers below it stand.

use std::fmt;
use std::path::{Path, PathBuf};

use tether_session::SessionRegistry;
use tracing::{debug, warn};

use crate::{ConfigError, Result, SessionConfig, TetherConfig};

/// Project file name, looked up in the project directory.
pub const PROJECT_CONFIG_FILE: &str = "tether.toml";

const USER_CONFIG_FILE: &str = "config.toml";

/// Overrides the user config directory when set and non-empty.
pub const CONFIG_DIR_ENV: &str = "TETHER_CONFIG_DIR";

/// Which file a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    User,
    Project,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// What happened to a layer during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// No file at the path.
    Missing,
    /// Merged into the result.
    Applied,
    /// Skipped; the reason is the error that caused it.
    Rejected(String),
}

/// One consulted config file.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// Outcome of resolving all layers.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Applied layers merged together, before defaults.
    pub merged: TetherConfig,
    /// Final session settings with defaults filled in.
    pub session: SessionConfig,
    /// Every consulted layer, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

impl ResolvedConfig {
    /// Layers that were skipped.
    pub fn rejected(&self) -> impl Iterator<Item = &ConfigLayer> {
        self.layers
            .iter()
            .filter(|layer| matches!(layer.status, LayerStatus::Rejected(_)))
    }

    /// Layers that contributed to the result.
    pub fn applied(&self) -> impl Iterator<Item = &ConfigLayer> {
        self.layers
            .iter()
            .filter(|layer| layer.status == LayerStatus::Applied)
    }

    /// Build a registry from the resolved session settings.
    pub fn build_registry(&self) -> SessionRegistry {
        SessionRegistry::new(self.session.registry_config())
    }
}

/// Where to look for config layers.
#[derive(Debug, Clone)]
pub struct ConfigLayers {
    user_dir: Option<PathBuf>,
    project_dir: PathBuf,
}

impl Default for ConfigLayers {
    fn default() -> Self {
        Self {
            user_dir: user_config_dir(),
            project_dir: PathBuf::from("."),
        }
    }
}

impl ConfigLayers {
    /// User directory from the environment, project directory `.`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `dir` as the user config directory.
    pub fn with_user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    /// Skip the user layer entirely.
    pub fn without_user_layer(mut self) -> Self {
        self.user_dir = None;
        self
    }

    /// Look for the project file in `dir`.
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// Paths consulted, lowest precedence first.
    pub fn paths(&self) -> Vec<(LayerKind, PathBuf)> {
        let mut paths = Vec::with_capacity(2);
        if let Some(dir) = &self.user_dir {
            paths.push((LayerKind::User, dir.join(USER_CONFIG_FILE)));
        }
        paths.push((LayerKind::Project, self.project_dir.join(PROJECT_CONFIG_FILE)));
        paths
    }

    /// Read and merge every layer.
    ///
    /// Bad layers never fail the call; they are recorded as
    /// [`LayerStatus::Rejected`] and logged.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let mut merged = TetherConfig::new();
        let mut layers = Vec::new();

        for (kind, path) in self.paths() {
            let status = match apply_layer(&merged, &path) {
                Ok(None) => LayerStatus::Missing,
                Ok(Some(candidate)) => {
                    debug!(layer = %kind, path = %path.display(), "Config layer applied");
                    merged = candidate;
                    LayerStatus::Applied
                }
                Err(e) => {
                    warn!(layer = %kind, path = %path.display(), error = %e, "Config layer rejected");
                    LayerStatus::Rejected(e.to_string())
                }
            };
            layers.push(ConfigLayer { kind, path, status });
        }

        let session = merged.resolve()?;
        Ok(ResolvedConfig {
            merged,
            session,
            layers,
        })
    }
}

/// Merge the file at `path` over `below`.
///
/// `Ok(None)` when there is no file. The merged config is only returned when
/// it still resolves.
fn apply_layer(below: &TetherConfig, path: &Path) -> Result<Option<TetherConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    let layer = read_config(path)?;
    let mut candidate = below.clone();
    candidate.merge(&layer);
    candidate.resolve()?;
    Ok(Some(candidate))
}

/// Read and parse a single config file.
pub fn read_config(path: &Path) -> Result<TetherConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    TetherConfig::from_toml(&contents)
}

/// Write a config file, creating parent directories.
pub fn write_config(config: &TetherConfig, path: &Path) -> Result<()> {
    let write_err = |target: &Path, source| ConfigError::WriteFile {
        path: target.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_err(path, e))
}

/// The user config directory: `TETHER_CONFIG_DIR`, else the platform
/// config directory joined with `tether`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join("tether")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tether_session::IdleClock;

    struct Dirs {
        user: TempDir,
        project: TempDir,
    }

    impl Dirs {
        fn new() -> Self {
            Self {
                user: TempDir::new().unwrap(),
                project: TempDir::new().unwrap(),
            }
        }

        fn user_file(&self, contents: &str) {
            fs::write(self.user.path().join(USER_CONFIG_FILE), contents).unwrap();
        }

        fn project_file(&self, contents: &str) {
            fs::write(self.project.path().join(PROJECT_CONFIG_FILE), contents).unwrap();
        }

        fn resolve(&self) -> ResolvedConfig {
            ConfigLayers::new()
                .with_user_dir(self.user.path())
                .with_project_dir(self.project.path())
                .resolve()
                .unwrap()
        }
    }

    fn statuses(resolved: &ResolvedConfig) -> Vec<(LayerKind, &LayerStatus)> {
        resolved
            .layers
            .iter()
            .map(|layer| (layer.kind, &layer.status))
            .collect()
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let resolved = Dirs::new().resolve();

        assert_eq!(resolved.session, SessionConfig::default());
        assert_eq!(
            statuses(&resolved),
            vec![
                (LayerKind::User, &LayerStatus::Missing),
                (LayerKind::Project, &LayerStatus::Missing),
            ]
        );
    }

    #[test]
    fn test_project_timeout_keeps_user_idle_clock() {
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 4\nidle_clock = \"minute-rollover\"\n");
        dirs.project_file("[session]\nidle_timeout_minutes = 11\n");

        let resolved = dirs.resolve();

        assert_eq!(resolved.session.idle_timeout_minutes, 11);
        assert_eq!(resolved.session.idle_clock, IdleClock::MinuteRollover);
        assert_eq!(resolved.applied().count(), 2);
    }

    #[test]
    fn test_project_clock_keeps_user_timeout() {
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 7\n");
        dirs.project_file("[session]\nidle_clock = \"minute-rollover\"\n");

        let session = dirs.resolve().session;
        assert_eq!(session.idle_timeout_minutes, 7);
        assert_eq!(session.idle_clock, IdleClock::MinuteRollover);
    }

    #[test]
    fn test_malformed_project_file_rejected() {
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 6\n");
        dirs.project_file("this is not valid toml {{{{");

        let resolved = dirs.resolve();

        assert_eq!(resolved.session.idle_timeout_minutes, 6);
        let rejected: Vec<_> = resolved.rejected().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].kind, LayerKind::Project);
        assert!(matches!(&rejected[0].status, LayerStatus::Rejected(r) if r.contains("parse")));
    }

    #[test]
    fn test_zero_timeout_layer_rejected() {
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 0\n");

        let resolved = dirs.resolve();

        assert_eq!(resolved.session, SessionConfig::default());
        assert!(matches!(
            &resolved.layers[0].status,
            LayerStatus::Rejected(r) if r.contains("at least 1")
        ));
    }

    #[test]
    fn test_layer_conflicting_with_lower_layer_rejected() {
        // The project timeout is fine alone but can never fire under the
        // user's minute-rollover clock
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 5\nidle_clock = \"minute-rollover\"\n");
        dirs.project_file("[session]\nidle_timeout_minutes = 90\n");

        let resolved = dirs.resolve();

        assert_eq!(resolved.session.idle_timeout_minutes, 5);
        assert_eq!(resolved.session.idle_clock, IdleClock::MinuteRollover);
        assert_eq!(resolved.merged.session.idle_timeout_minutes, Some(5));
        assert!(matches!(
            &resolved.layers[1].status,
            LayerStatus::Rejected(r) if r.contains("below 60")
        ));
    }

    #[test]
    fn test_without_user_layer() {
        let dirs = Dirs::new();
        dirs.user_file("[session]\nidle_timeout_minutes = 6\n");

        let resolved = ConfigLayers::new()
            .without_user_layer()
            .with_project_dir(dirs.project.path())
            .resolve()
            .unwrap();

        assert_eq!(resolved.layers.len(), 1);
        assert_eq!(resolved.layers[0].kind, LayerKind::Project);
        assert_eq!(resolved.session, SessionConfig::default());
    }

    #[test]
    fn test_resolved_registry_uses_settings() {
        let dirs = Dirs::new();
        dirs.project_file("[session]\nidle_timeout_minutes = 25\n");

        let registry = dirs.resolve().build_registry();
        assert_eq!(registry.idle_timeout(), 25);
    }

    #[test]
    fn test_read_config_missing_file() {
        let err = read_config(Path::new("/nonexistent/tether.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_write_then_read_partial_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(PROJECT_CONFIG_FILE);
        let config = TetherConfig::from_toml("[session]\nidle_clock = \"minute-rollover\"\n").unwrap();

        write_config(&config, &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("idle_timeout_minutes"));
        assert_eq!(read_config(&path).unwrap(), config);
    }
}
