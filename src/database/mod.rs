use crate::constants;
use anyhow::{Context, Result};
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use std::time::Duration;
use tiberius::{AuthMethod, Config, EncryptionLevel, Query, Row};
use tracing::{info, warn};

pub mod inventory_db;
pub mod schema;

pub use inventory_db::SqlServerStore;

/// SQL Server connection and pool settings
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_secs: u64,
    pub encryption: bool,
    pub trust_cert: bool,
}

impl DatabaseConfig {
    /// Read `DATABASE_*` settings through `lookup`; `None` when no server is set
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(server) = lookup("DATABASE_SERVER").filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let required = |key: &str| {
            lookup(key).with_context(|| format!("Missing environment variable: {key}"))
        };
        let parsed = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        Ok(Some(Self {
            server,
            database: required("DATABASE_NAME")?,
            username: required("DATABASE_USERNAME")?,
            password: required("DATABASE_PASSWORD")?,
            port: lookup("DATABASE_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::DEFAULT_DATABASE_PORT),
            max_connections: parsed(
                "DATABASE_MAX_CONNECTIONS",
                u64::from(constants::DEFAULT_MAX_CONNECTIONS),
            ) as u32,
            min_connections: parsed(
                "DATABASE_MIN_CONNECTIONS",
                u64::from(constants::DEFAULT_MIN_CONNECTIONS),
            ) as u32,
            connection_timeout_secs: parsed(
                "DATABASE_CONNECTION_TIMEOUT_SECS",
                constants::DEFAULT_CONNECTION_TIMEOUT_SECS,
            ),
            encryption: flag("DATABASE_ENCRYPTION"),
            trust_cert: flag("DATABASE_TRUST_CERT"),
        }))
    }
}

/// Pooled SQL Server access
#[derive(Clone)]
pub struct Database {
    pool: Pool<ConnectionManager>,
    config: DatabaseConfig,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("database", &self.config.database)
            .field("server", &self.config.server)
            .field("max_connections", &self.config.max_connections)
            .finish()
    }
}

impl Database {
    /// Open the pool and verify one connection
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        info!("🔄 Initializing database with connection pooling");

        let mut tiberius_config = Config::new();
        tiberius_config.host(&config.server);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.authentication(AuthMethod::sql_server(&config.username, &config.password));

        if config.encryption {
            info!("🔒 Database encryption enabled");
            tiberius_config.encryption(EncryptionLevel::Required);
        } else {
            info!("⚠️  Database encryption disabled (not recommended for production)");
            tiberius_config.encryption(EncryptionLevel::NotSupported);
        }

        if config.trust_cert {
            warn!("⚠️  Database certificate trust enabled (accepting self-signed certificates)");
            tiberius_config.trust_cert();
        }

        let manager = ConnectionManager::new(tiberius_config);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(300)))
            .max_lifetime(Some(Duration::from_secs(1800)))
            .build(manager)
            .await
            .context("Failed to create connection pool")?;

        let test_conn = pool
            .get()
            .await
            .context("Failed to get test connection from pool")?;
        drop(test_conn);

        info!(
            "✅ Connection pool initialized - Database: {}, Max connections: {}, Min idle: {}",
            config.database, config.max_connections, config.min_connections
        );

        Ok(Self { pool, config })
    }

    pub async fn get_client(&self) -> Result<bb8::PooledConnection<'_, ConnectionManager>> {
        self.pool.get().await.with_context(|| {
            format!(
                "Failed to get connection from pool for database: {}",
                self.config.database
            )
        })
    }

    /// A connection that never returns to the pool. Dropping it closes the
    /// session, which rolls back anything still open on the server.
    pub async fn dedicated_client(&self) -> Result<bb8_tiberius::rt::Client> {
        self.pool.dedicated_connection().await.with_context(|| {
            format!(
                "Failed to open dedicated connection for database: {}",
                self.config.database
            )
        })
    }

    pub fn get_database_name(&self) -> &str {
        &self.config.database
    }

    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let mut client = self.get_client().await?;

        let query = r#"
            SELECT COUNT(*) as table_count
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_NAME = @P1 AND TABLE_TYPE = 'BASE TABLE'
        "#;

        let mut query_builder = Query::new(query);
        query_builder.bind(table_name);

        let stream = query_builder.query(&mut *client).await?;
        let rows: Vec<Vec<Row>> = stream.into_results().await?;

        if let Some(row) = rows.first().and_then(|r| r.first()) {
            let count: i32 = row.get("table_count").unwrap_or(0);
            Ok(count > 0)
        } else {
            Ok(false)
        }
    }

    /// Create any missing inventory tables
    pub async fn ensure_schema(&self) -> Result<()> {
        for (table, ddl) in schema::TABLES {
            if self.table_exists(table).await? {
                continue;
            }
            let mut client = self.get_client().await?;
            client
                .simple_query(ddl)
                .await
                .with_context(|| format!("Failed to create table '{table}'"))?
                .into_results()
                .await
                .with_context(|| format!("Failed to create table '{table}'"))?;
            info!("🧱 Created table '{}'", table);
        }
        Ok(())
    }

    pub fn get_pool_status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            total_connections: state.connections,
            idle_connections: state.idle_connections,
            max_size: self.config.max_connections,
        }
    }
}

/// Connection pool status for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStatus {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
}

impl PoolStatus {
    pub fn usage_percent(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        (self.total_connections as f64 / self.max_size as f64) * 100.0
    }
}
