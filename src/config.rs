use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};

use crate::engagement::CounterBackend;
use crate::error::{AppError, Result};

pub const DEFAULT_RAZORPAY_KEY: &str = "rzp_test_default";

/// SMTP relay used for welcome mails
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
}

/// Runtime settings, read from the environment (and `.env` when the server starts)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub counter_backend: CounterBackend,
    pub counter_db: PathBuf,
    /// `None` disables welcome mails
    pub smtp: Option<SmtpConfig>,
    pub razorpay_key: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir: PathBuf = try_load("DATA_DIR", "data")?;
        let default_db = data_dir.join("engagement.db");

        Ok(Self {
            host: try_load("HOST", "127.0.0.1")?,
            port: try_load("PORT", "5000")?,
            static_dir: try_load("STATIC_DIR", "static")?,
            counter_backend: try_load("COUNTER_BACKEND", "sqlite")?,
            counter_db: match var("COUNTER_DB") {
                Some(path) => PathBuf::from(path),
                None => default_db,
            },
            smtp: load_smtp()?,
            razorpay_key: try_load("RAZORPAY_KEY_ID", DEFAULT_RAZORPAY_KEY)?,
            data_dir,
        })
    }

    /// Settings for tests and offline tools: everything under `data_dir`, no mail
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: PathBuf::from("static"),
            counter_backend: CounterBackend::Sqlite,
            counter_db: data_dir.join("engagement.db"),
            smtp: None,
            razorpay_key: DEFAULT_RAZORPAY_KEY.to_string(),
            data_dir,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("{key}: {e}"))
        })
}

fn load_smtp() -> Result<Option<SmtpConfig>> {
    let (Some(host), Some(username), Some(password), Some(sender)) = (
        var("SMTP_HOST"),
        var("SMTP_USERNAME"),
        var("SMTP_PASSWORD"),
        var("SENDER_EMAIL"),
    ) else {
        warn!("SMTP not configured, welcome emails will be skipped");
        return Ok(None);
    };

    Ok(Some(SmtpConfig {
        host,
        port: try_load("SMTP_PORT", "465")?,
        username,
        password,
        sender,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_config_points_everything_inside_it() {
        let config = Config::for_data_dir("/tmp/site");
        assert_eq!(config.counter_db, PathBuf::from("/tmp/site/engagement.db"));
        assert!(config.smtp.is_none());
        assert_eq!(config.address(), "127.0.0.1:5000");
    }

    #[test]
    fn unparseable_value_is_a_config_error() {
        // Key is unique to this test so parallel tests never see it
        unsafe { env::set_var("BPI_TEST_BAD_PORT", "not-a-port") };
        let result: Result<u16> = try_load("BPI_TEST_BAD_PORT", "5000");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn missing_value_falls_back_to_default() {
        let value: u16 = try_load("BPI_TEST_UNSET_PORT", "8080").unwrap();
        assert_eq!(value, 8080);
    }
}
