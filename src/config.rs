use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use toml;

use crate::provider::tz::ZoneId;
use crate::provider::{Error, Result};

const CONFIG_PATH_ENV_VAR: &str = "GLANCE_CONFIG_FILE";

/// Locations tried in order when no explicit path is given: the env var
/// override first, then the usual spots under the user's config directory.
pub(crate) fn find_configfile() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let base = dirs::config_dir()?;
    [base.join("glance.toml"), base.join("glance").join("config.toml")]
        .into_iter()
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub color: String,
}

fn default_lookahead_days() -> u32 {
    30
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default)]
    pub timezone: ZoneId,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
    #[serde(default, rename = "calendar")]
    pub calendars: Vec<CalendarConfig>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            path: PathBuf::new(),
            timezone: ZoneId::default(),
            lookahead_days: default_lookahead_days(),
            calendars: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read '{}': {}", path.display(), err)))?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|err| Error::Config(format!("cannot parse '{}': {}", path.display(), err)))?;
        config.path = path.to_owned();
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Loads the config from the explicit path if given, otherwise from the
/// usual locations; falls back to defaults when nothing is found.
pub fn load_suitable_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path);
    }

    match find_configfile() {
        Some(path) => Config::load(&path),
        None => {
            log::warn!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}
