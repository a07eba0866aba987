use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

use crate::utils::path::DEFAULT_SEARCH_PATH;

pub struct Config {
    pub name: String,
    pub theme: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    pub search_path: Vec<PathBuf>,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/shellgibi")
        } else {
            PathBuf::from("tmp")
        }
    }

    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: String::from("shellgibi"),
            theme: String::from("default"),
            logger_level: String::from("info"),
            logger_dir: config_dir.join("logs"),
            search_path: DEFAULT_SEARCH_PATH.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn new() -> Self {
        // dotenv files only fill variables that are not already set
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();

        if let Ok(theme) = env::var("SHELLGIBI_THEME") {
            config.theme = theme;
        }

        if let Ok(level) = env::var("SHELLGIBI_LOG_LEVEL") {
            config.logger_level = level;
        }

        if let Ok(dir) = env::var("SHELLGIBI_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        if let Ok(path) = env::var("SHELLGIBI_PATH") {
            if let Some(search_path) = parse_search_path(&path) {
                config.search_path = search_path;
            }
        }

        config
    }
}

/// Splits a colon-separated list, skipping empty segments.
/// Returns None when nothing usable is left.
fn parse_search_path(value: &str) -> Option<Vec<PathBuf>> {
    let dirs: Vec<PathBuf> = value
        .split(':')
        .filter(|segment| !segment.trim().is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        None
    } else {
        Some(dirs)
    }
}
