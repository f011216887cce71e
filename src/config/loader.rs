//! Load `settings.ini` and the optional `settings.local.ini` override from a directory.

use crate::config::types::{Section, Settings};
use crate::error::ConfigError;
use ini::Ini;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const BASE_FILE: &str = "settings.ini";
pub const LOCAL_FILE: &str = "settings.local.ini";

/// Overrides the settings directory. Defaults to the running executable's directory.
pub const SETTINGS_DIR_ENV: &str = "TAO_SETTINGS_DIR";

impl Settings {
    /// Load from `SETTINGS_DIR_ENV`, or the executable's directory.
    pub fn load_default() -> Result<Settings, ConfigError> {
        Settings::load(&default_dir()?)
    }

    /// Load `settings.ini` from `dir` (required), then merge `settings.local.ini` over it if readable.
    pub fn load(dir: &Path) -> Result<Settings, ConfigError> {
        let base = parse_file(&dir.join(BASE_FILE))?;
        let local_path = dir.join(LOCAL_FILE);
        if !local_path.is_file() {
            return Ok(base);
        }
        let local = parse_file(&local_path)?;
        tracing::debug!(path = %local_path.display(), "merged local settings");
        Ok(Settings::merge(base, local))
    }

    /// Parse INI text. Keys before the first section land in section `""`.
    pub fn parse(text: &str) -> Result<Settings, ConfigError> {
        parse_str(text, Path::new("<memory>"))
    }
}

fn default_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var(SETTINGS_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().map_err(|source| ConfigError::Read {
        path: PathBuf::from("<current_exe>"),
        source,
    })?;
    Ok(exe.parent().map(Path::to_path_buf).unwrap_or_default())
}

fn parse_file(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text, path)
}

fn parse_str(text: &str, path: &Path) -> Result<Settings, ConfigError> {
    let ini = Ini::load_from_str_noescape(text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut sections: HashMap<String, Section> = HashMap::new();
    for (name, props) in ini.iter() {
        let section = sections.entry(name.unwrap_or_default().to_string()).or_default();
        for (key, value) in props.iter() {
            section.insert(key.to_string(), value.to_string());
        }
    }
    sections.retain(|_, values| !values.is_empty());
    Ok(Settings::from_sections(sections))
}
