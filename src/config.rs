use std::path::PathBuf;

use anyhow::{Context, bail};

use crate::detection::reconstruct::DEFAULT_INTEGER_DIGITS;

pub const DEFAULT_MODEL_PATH: &str = "models/digits.onnx";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Digits before the decimal point when the detector misses it. `None` disables insertion.
    pub integer_digits: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: String,
    pub db: DbConfig,
    pub detector: DetectorConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source. Used by `from_env` and tests.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> anyhow::Result<String> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => bail!("Missing required environment variable {}", name),
            }
        };

        let port = required("DB_PORT")?;
        let db = DbConfig {
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
            name: required("DB_NAME")?,
            host: required("DB_HOST")?,
            port: port
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT must be a port number, got {:?}", port))?,
        };

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            db,
            detector: DetectorConfig::from_lookup(&lookup)?,
        })
    }
}

impl DetectorConfig {
    /// Detector settings only; the offline `detect` command needs nothing else.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: &F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let integer_digits = match lookup("READING_INTEGER_DIGITS") {
            None => Some(DEFAULT_INTEGER_DIGITS),
            Some(value) => parse_integer_digits(&value)?,
        };

        Ok(Self {
            model_path,
            integer_digits,
        })
    }
}

fn parse_integer_digits(value: &str) -> anyhow::Result<Option<usize>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value == "0" {
        return Ok(None);
    }
    let digits = value
        .parse()
        .with_context(|| format!("READING_INTEGER_DIGITS must be a number or `none`, got {:?}", value))?;
    Ok(Some(digits))
}
