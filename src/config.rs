use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};
use crate::infra::github::DEFAULT_ENDPOINT;

pub const TOKEN_VAR: &str = "README_TOKEN";
pub const USERNAME_VAR: &str = "USERNAME";
pub const API_URL_VAR: &str = "LOCSTAT_API_URL";
pub const CACHE_DIR_VAR: &str = "LOCSTAT_CACHE_DIR";
pub const OUTPUTS_VAR: &str = "LOCSTAT_OUTPUTS";

const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_OUTPUTS: [&str; 2] = ["dark_mode.svg", "light_mode.svg"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token: String,
    pub username: String,
    pub api_url: String,
    pub cache_dir: PathBuf,
    pub outputs: Vec<PathBuf>,
}

impl AppConfig {
    /// Loads `.env` from the working directory if present, then reads the
    /// process environment.
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &str| {
            value(key).ok_or_else(|| AppError::Configuration(format!("{key} is not set")))
        };

        let outputs = match value(OUTPUTS_VAR) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(PathBuf::from)
                .collect(),
            None => DEFAULT_OUTPUTS.iter().map(PathBuf::from).collect(),
        };

        Ok(Self {
            token: required(TOKEN_VAR)?,
            username: required(USERNAME_VAR)?,
            api_url: value(API_URL_VAR).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            cache_dir: value(CACHE_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            outputs,
        })
    }
}
