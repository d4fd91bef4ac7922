//! Configuration loading and persistence.
//!
//! `Config` lives in `<config_dir>/threadview/config.json` and is overridden
//! by `THREADVIEW_*` environment variables. The renderer never reads the
//! file: the controller derives a [`PageConfig`] and ships it in the `Page`
//! frame.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf, time::Duration};

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_SCROLL_STEP, DEFAULT_VIEWPORT_HEIGHT};
use crate::transport::default_socket_dir;

/// Configuration for the threadview controller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding rendezvous sockets.
    pub socket_dir: PathBuf,
    /// Seconds to wait for the renderer to connect.
    pub connect_timeout: u64,
    /// Viewport height used by the headless renderer surface.
    pub viewport_height: f64,
    /// Small scroll step in pixels.
    pub scroll_step: f64,
    /// Indent replies by thread level.
    pub indent_messages: bool,
    /// Log every frame on the renderer side.
    pub log_frames: bool,
    /// Optional theme stylesheet loaded into the `Page` frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_css: Option<PathBuf>,
    /// Renderer executable; defaults to the running binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer_exe: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            scroll_step: DEFAULT_SCROLL_STEP,
            indent_messages: true,
            log_frames: false,
            theme_css: None,
            renderer_exe: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `THREADVIEW_CONFIG_DIR` wins; otherwise the platform config dir
    /// (`~/.config/threadview` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("THREADVIEW_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("threadview"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[config] using defaults: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    /// Parse a config document; missing keys take their defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("parse config.json")
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `THREADVIEW_*` overrides from an arbitrary lookup.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("THREADVIEW_SOCKET_DIR") {
            self.socket_dir = PathBuf::from(dir);
        }

        if let Some(timeout) = lookup("THREADVIEW_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.connect_timeout = secs;
            }
        }

        if let Some(height) = lookup("THREADVIEW_VIEWPORT_HEIGHT") {
            if let Ok(height) = height.parse::<f64>() {
                self.viewport_height = height;
            }
        }

        if let Some(step) = lookup("THREADVIEW_SCROLL_STEP") {
            if let Ok(step) = step.parse::<f64>() {
                self.scroll_step = step;
            }
        }

        if let Some(exe) = lookup("THREADVIEW_RENDERER") {
            self.renderer_exe = Some(PathBuf::from(exe));
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)?;
        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// How long to wait for the renderer to connect.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Settings forwarded to the renderer in the `Page` frame.
    pub fn page_config(&self) -> PageConfig {
        PageConfig {
            indent_messages: self.indent_messages,
            scroll_step: self.scroll_step,
            viewport_height: self.viewport_height,
            log_frames: self.log_frames,
        }
    }

    /// Read the theme stylesheet, if one is configured.
    pub fn load_stylesheet(&self) -> Result<String> {
        match &self.theme_css {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("read theme stylesheet: {}", path.display())),
            None => Ok(String::new()),
        }
    }
}

/// Session settings threaded into the renderer through the `Page` payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PageConfig {
    /// Indent replies by thread level.
    pub indent_messages: bool,
    /// Small scroll step in pixels.
    pub scroll_step: f64,
    /// Viewport height for surfaces without a real window.
    pub viewport_height: f64,
    /// Log every inbound frame.
    pub log_frames: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Config::default().page_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = Config::from_json(r#"{"scroll_step": 25.0}"#).unwrap();
        assert_eq!(config.scroll_step, 25.0);
        assert_eq!(config.viewport_height, DEFAULT_VIEWPORT_HEIGHT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(config.indent_messages);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("THREADVIEW_SOCKET_DIR", "/tmp/tv-sockets"),
            ("THREADVIEW_CONNECT_TIMEOUT", "3"),
            ("THREADVIEW_SCROLL_STEP", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.socket_dir, PathBuf::from("/tmp/tv-sockets"));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.scroll_step, DEFAULT_SCROLL_STEP);
    }

    #[test]
    fn test_page_config_mirrors_config() {
        let config = Config {
            indent_messages: false,
            viewport_height: 320.0,
            ..Config::default()
        };
        let page = config.page_config();
        assert!(!page.indent_messages);
        assert_eq!(page.viewport_height, 320.0);
    }

    #[test]
    fn test_stylesheet_is_read_from_theme_path() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("theme.css");
        fs::write(&css, ".focused { outline: 1px solid; }").unwrap();
        let config = Config {
            theme_css: Some(css),
            ..Config::default()
        };
        assert!(config.load_stylesheet().unwrap().contains(".focused"));
        assert_eq!(Config::default().load_stylesheet().unwrap(), "");
    }

    #[test]
    fn test_serialized_config_round_trips() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(!json.contains("theme_css"));
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }
}
