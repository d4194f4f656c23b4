//! Config persistence: a versioned TOML file in the platform config
//! directory, recreated from defaults when its version is unknown.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use shared::{AppConfig, MigrationStrategy};

const CONFIG_DIR: &str = "tracelane";
const CONFIG_FILE: &str = "config.toml";

/// Platform config file location, e.g. `~/.config/tracelane/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no config directory on this platform")?;
    Ok(base.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load the config file, falling back to defaults when it is missing and
/// recreating it when its version is not understood. Parse failures are
/// surfaced; a corrupt file should not be silently overwritten.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("no config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;

    match config.app.get_migration_strategy() {
        MigrationStrategy::None => Ok(config),
        MigrationStrategy::Upgrade(description) => {
            info!("migrating config: {description}");
            let mut upgraded = config;
            upgraded.app = Default::default();
            Ok(upgraded)
        }
        MigrationStrategy::Recreate => {
            warn!(
                "config version {:?} is not supported, recreating defaults",
                config.app.version
            );
            Ok(AppConfig::default())
        }
    }
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config dir {}", parent.display()))?;
    }
    let text = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tracelane-config-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_missing_config_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/tracelane/config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = temp_path("round-trip");
        let path = dir.join(CONFIG_FILE);
        let mut config = AppConfig::default();
        config.ui.theme = "dark".to_string();
        config.viewer.redraw_debounce_ms = 100;
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unknown_version_recreates_defaults() {
        let dir = temp_path("unknown-version");
        let path = dir.join(CONFIG_FILE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &path,
            "[app]\nversion = \"99.0.0\"\n[ui]\ntheme = \"dark\"\n[viewer]\nredraw_debounce_ms = 1\nindicator_debounce_ms = 1\n",
        )
        .unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, AppConfig::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_corrupt_config_is_an_error() {
        let dir = temp_path("corrupt");
        let path = dir.join(CONFIG_FILE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "not toml at all [[[").unwrap();
        assert!(load_config(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
