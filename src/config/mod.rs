use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::autopin::{AnchorGrid, ContentRectDetector, FitMode, ObjectPosition};
use crate::editor::{HandleLayout, SizeConstraints};
use crate::element::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

/// Broken composition detected while wiring components together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required component: {0}")]
    MissingComponent(&'static str),
    #[error("element {0} is not registered")]
    UnknownElement(ElementId),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

const APP_DIR: &str = "spritepin";
const APP_CONFIG_FILE: &str = "config.json";

fn default_min_size() -> f64 {
    20.0
}

fn default_handle_size() -> f64 {
    8.0
}

fn default_hit_padding() -> f64 {
    4.0
}

fn default_resize_debounce_ms() -> u64 {
    100
}

fn default_mode_poll_interval_ms() -> u64 {
    250
}

fn default_object_position() -> String {
    "50% 50%".to_string()
}

fn default_anchor_grid() -> [f64; 2] {
    [0.33, 0.67]
}

/// Engine settings from `config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_min_size")]
    pub min_width: f64,
    #[serde(default = "default_min_size")]
    pub min_height: f64,
    #[serde(default = "default_handle_size")]
    pub handle_size: f64,
    #[serde(default = "default_hit_padding")]
    pub hit_padding: f64,
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    #[serde(default = "default_mode_poll_interval_ms")]
    pub mode_poll_interval_ms: u64,
    #[serde(default)]
    pub fit: FitMode,
    #[serde(default = "default_object_position")]
    pub object_position: String,
    #[serde(default = "default_anchor_grid")]
    pub anchor_grid: [f64; 2],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_size(),
            min_height: default_min_size(),
            handle_size: default_handle_size(),
            hit_padding: default_hit_padding(),
            resize_debounce_ms: default_resize_debounce_ms(),
            mode_poll_interval_ms: default_mode_poll_interval_ms(),
            fit: FitMode::default(),
            object_position: default_object_position(),
            anchor_grid: default_anchor_grid(),
        }
    }
}

impl EngineConfig {
    pub fn size_constraints(&self) -> SizeConstraints {
        SizeConstraints::new(self.min_width, self.min_height)
    }

    pub fn handle_layout(&self) -> HandleLayout {
        HandleLayout::new(self.handle_size, self.hit_padding)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn mode_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mode_poll_interval_ms)
    }

    pub fn anchor_grid(&self) -> AnchorGrid {
        AnchorGrid::from(self.anchor_grid)
    }

    /// An unparsable `object_position` falls back to centered.
    pub fn detector(&self) -> ContentRectDetector {
        let position = self
            .object_position
            .parse::<ObjectPosition>()
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "invalid object_position; using 50% 50%");
                ObjectPosition::default()
            });
        ContentRectDetector::new(self.fit, position)
    }
}

pub fn load_engine_config() -> EngineConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_engine_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_engine_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> EngineConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return EngineConfig::default(),
    };
    if !path.exists() {
        return EngineConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            EngineConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            EngineConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::autopin::PositionComponent;

    fn fixture_root(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "spritepin-config-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(root.join(APP_DIR)).expect("fixture root should be created");
        root
    }

    #[test]
    fn app_config_path_prefers_xdg_config_home() {
        let path = app_config_path(
            "spritepin",
            "config.json",
            Some(Path::new("/tmp/config-root")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(path, PathBuf::from("/tmp/config-root/spritepin/config.json"));
    }

    #[test]
    fn app_config_path_falls_back_to_home_dot_config() {
        let path = app_config_path("spritepin", "config.json", None, Some(Path::new("/tmp/home")))
            .expect("path should resolve");

        assert_eq!(path, PathBuf::from("/tmp/home/.config/spritepin/config.json"));
    }

    #[test]
    fn app_config_path_errors_when_home_missing_and_xdg_unset() {
        let error = app_config_path("spritepin", "config.json", None, None).unwrap_err();
        assert_eq!(error, ConfigPathError::MissingHomeDirectory);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let root = fixture_root("partial");
        fs::write(
            root.join(APP_DIR).join(APP_CONFIG_FILE),
            r#"{"min_width": 32, "fit": "cover", "object_position": "left top"}"#,
        )
        .expect("config should be written");

        let config = load_engine_config_with(Some(&root), None);
        assert_eq!(config.min_width, 32.0);
        assert_eq!(config.min_height, 20.0);
        assert_eq!(config.fit, FitMode::Cover);
        assert_eq!(config.resize_debounce(), Duration::from_millis(100));
        assert_eq!(config.detector().position.x, PositionComponent::Percent(0.0));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn malformed_or_missing_config_falls_back_to_defaults() {
        let root = fixture_root("malformed");
        assert_eq!(load_engine_config_with(Some(&root), None), EngineConfig::default());

        fs::write(root.join(APP_DIR).join(APP_CONFIG_FILE), "{ nope")
            .expect("config should be written");
        assert_eq!(load_engine_config_with(Some(&root), None), EngineConfig::default());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn invalid_object_position_falls_back_to_center() {
        let config = EngineConfig {
            object_position: "sideways".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.detector().position, ObjectPosition::default());
        assert_eq!(config.size_constraints(), SizeConstraints::default());
        assert_eq!(config.anchor_grid(), AnchorGrid::default());
    }
}
