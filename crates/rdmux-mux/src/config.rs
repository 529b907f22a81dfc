//! TOML configuration for the multiplexer process.
//!
//! Loaded from the platform config file unless a path is given explicitly:
//! - Linux: `$XDG_CONFIG_HOME/rdmux/config.toml` (or `~/.config/rdmux/…`)
//! - macOS: `~/Library/Application Support/rdmux/config.toml`
//!
//! Every field carries a serde default so a partial (or absent) file works;
//! an explicitly passed path must exist.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level multiplexer configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MuxConfig {
    #[serde(default)]
    pub mux: MuxSection,
    #[serde(default)]
    pub listeners: ListenerSection,
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MuxSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bound of the outbound event FIFO shared by all listeners.
    #[serde(default = "default_queue_depth")]
    pub outbound_queue_depth: usize,
}

/// Defaults applied to newly registered listeners.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListenerSection {
    /// Whether new listeners require peer authentication.
    #[serde(default)]
    pub authentication: bool,
    /// First port handed out when the operator does not specify one.
    #[serde(default = "default_port_base")]
    pub port_base: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_queue_depth() -> usize {
    crate::worker::DEFAULT_QUEUE_DEPTH
}
fn default_port_base() -> u16 {
    3901
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            mux: MuxSection::default(),
            listeners: ListenerSection::default(),
        }
    }
}

impl Default for MuxSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            outbound_queue_depth: default_queue_depth(),
        }
    }
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            authentication: false,
            port_base: default_port_base(),
        }
    }
}

/// Loads the configuration.
///
/// With an explicit `path`, the file must exist and parse. Without one, the
/// platform config file is used if present, and defaults otherwise.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system failures, [`ConfigError::Parse`] for
/// malformed TOML, [`ConfigError::NoPlatformConfigDir`] when no explicit
/// path is given and the platform directory cannot be resolved.
pub fn load_config(path: Option<&Path>) -> Result<MuxConfig, ConfigError> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(toml::from_str(&content)?)
        }
        None => {
            let path = config_file_path()?;
            match std::fs::read_to_string(&path) {
                Ok(content) => Ok(toml::from_str(&content)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MuxConfig::default()),
                Err(source) => Err(ConfigError::Io { path, source }),
            }
        }
    }
}

/// Resolves the full path of the platform config file.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("rdmux")
        })
    }

    #[cfg(not(target_os = "macos"))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("rdmux"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = MuxConfig::default();
        assert_eq!(cfg.mux.log_level, "info");
        assert_eq!(cfg.mux.outbound_queue_depth, 64);
        assert!(!cfg.listeners.authentication);
        assert_eq!(cfg.listeners.port_base, 3901);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: MuxConfig = toml::from_str("").expect("empty TOML must parse");
        assert_eq!(cfg, MuxConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let cfg: MuxConfig = toml::from_str(
            r#"
[mux]
outbound_queue_depth = 256

[listeners]
authentication = true
"#,
        )
        .expect("partial TOML must parse");

        assert_eq!(cfg.mux.outbound_queue_depth, 256);
        assert_eq!(cfg.mux.log_level, "info");
        assert!(cfg.listeners.authentication);
        assert_eq!(cfg.listeners.port_base, 3901);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result: Result<MuxConfig, _> = toml::from_str("[[[ not toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_an_io_error() {
        let result = load_config(Some(Path::new("/nonexistent/rdmux/config.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_from_explicit_file() {
        let dir = std::env::temp_dir().join(format!("rdmux-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[mux]\nlog_level = \"debug\"\n").unwrap();

        let cfg = load_config(Some(&path)).expect("config must load");
        assert_eq!(cfg.mux.log_level, "debug");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
