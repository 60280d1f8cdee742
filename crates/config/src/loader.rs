use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HagglerConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["haggler.toml", "haggler.yaml", "haggler.yml", "haggler.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped).
/// Can be called multiple times (e.g. in tests) — each call replaces the
/// previous override.
pub fn set_config_dir(path: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.lock().ok().and_then(|g| g.clone())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HagglerConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./haggler.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/haggler/haggler.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HagglerConfig::default()` if no config file is found.
pub fn discover_and_load() -> HagglerConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HagglerConfig::default()
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched —
/// project-local and user-global paths are skipped for isolation.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        // Override is set — don't fall through to other locations.
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/haggler/
    if let Some(dir) = home_dir().map(|h| h.join(".config").join("haggler")) {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HagglerConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    // Mutating the process environment needs `unsafe` on edition 2024.
    #![allow(unsafe_code)]

    use super::*;

    #[test]
    fn loads_toml_with_env_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haggler.toml");
        unsafe { std::env::set_var("HAGGLER_LOADER_TEST_UNB", "unb=7") };
        std::fs::write(
            &path,
            "[[accounts]]\nlabel = \"shop\"\ncookies = \"${HAGGLER_LOADER_TEST_UNB}\"\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.accounts.len(), 1);
        assert_eq!(cfg.accounts[0].cookies, "unb=7");
        // Untouched sections fall back to defaults.
        assert_eq!(cfg.gateway.heartbeat_secs, 10);
        unsafe { std::env::remove_var("HAGGLER_LOADER_TEST_UNB") };
    }

    #[test]
    fn discovery_with_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("haggler.json"),
            r#"{"gateway": {"reconnect_secs": 9}}"#,
        )
        .unwrap();
        set_config_dir(dir.path().to_path_buf());
        let cfg = discover_and_load();
        assert_eq!(cfg.gateway.reconnect_secs, 9);

        // Empty override dir falls back to defaults, not to other locations.
        let empty = tempfile::tempdir().unwrap();
        set_config_dir(empty.path().to_path_buf());
        let cfg = discover_and_load();
        assert_eq!(cfg.gateway.reconnect_secs, 5);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haggler.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }
}
