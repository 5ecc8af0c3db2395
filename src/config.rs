use anyhow::{bail, Result};
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::constants;
use crate::database::DatabaseConfig;
use crate::utils::timezone::parse_timezone;

/// Which persistence backend the server runs on
#[derive(Debug, Clone)]
pub enum StorageConfig {
    SqlServer(DatabaseConfig),
    Local { path: PathBuf },
    Unconfigured,
}

impl StorageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StorageConfig::SqlServer(_) => "sqlserver",
            StorageConfig::Local { .. } => "local",
            StorageConfig::Unconfigured => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: String,
    pub production: bool,
    pub storage: StorageConfig,
    pub strict_pulls: bool,
    pub jwt_secret: Option<String>,
    pub jwt_duration_hours: i64,
    pub data_dir: PathBuf,
    pub static_assets_path: PathBuf,
    pub timezone: Tz,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
}

impl AppConfig {
    /// Load from the process environment, after reading `.env` when present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false)
        };

        let database = DatabaseConfig::from_lookup(&lookup)?;
        let storage = match get("STORAGE_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("sqlserver") | Some("mssql") => match database {
                Some(db) => StorageConfig::SqlServer(db),
                None => bail!("STORAGE_BACKEND=sqlserver requires DATABASE_SERVER"),
            },
            Some("local") => StorageConfig::Local {
                path: local_store_path(&get),
            },
            Some("none") => StorageConfig::Unconfigured,
            Some(other) => bail!("Unknown STORAGE_BACKEND '{other}' (expected sqlserver, local or none)"),
            None => match database {
                Some(db) => StorageConfig::SqlServer(db),
                None => StorageConfig::Local {
                    path: local_store_path(&get),
                },
            },
        };

        let server_port = match get("SERVER_PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("Invalid SERVER_PORT '{port}'"))?,
            None => constants::DEFAULT_SERVER_PORT,
        };

        Ok(Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| constants::DEFAULT_SERVER_HOST.to_string()),
            server_port,
            cors_origins: get("CORS_ORIGINS").unwrap_or_else(|| "*".to_string()),
            production: get("RUST_ENV").as_deref() == Some("production"),
            storage,
            strict_pulls: flag("STRICT_PULLS"),
            jwt_secret: get("JWT_SECRET"),
            jwt_duration_hours: get("JWT_DURATION_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|h: &i64| *h > 0)
                .unwrap_or(constants::DEFAULT_JWT_DURATION_HOURS),
            data_dir: get("DATA_DIR")
                .unwrap_or_else(|| constants::DEFAULT_DATA_DIR.to_string())
                .into(),
            static_assets_path: get("STATIC_ASSETS_PATH")
                .unwrap_or_else(|| constants::DEFAULT_STATIC_ASSETS_PATH.to_string())
                .into(),
            timezone: parse_timezone(
                &get("APP_TIMEZONE").unwrap_or_else(|| constants::DEFAULT_TIMEZONE.to_string()),
            ),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_model: get("ANTHROPIC_MODEL")
                .unwrap_or_else(|| constants::DEFAULT_ANTHROPIC_MODEL.to_string()),
        })
    }
}

fn local_store_path(get: &impl Fn(&str) -> Option<String>) -> PathBuf {
    get("LOCAL_STORE_PATH")
        .unwrap_or_else(|| constants::DEFAULT_LOCAL_STORE_PATH.to_string())
        .into()
}
