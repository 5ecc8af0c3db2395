// Application Constants
// Centralized constants to avoid magic numbers

/// Default server configuration
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 4410;

/// Database connection pool defaults
pub const DEFAULT_DATABASE_PORT: u16 = 1433;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 5;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Local (offline) store defaults
pub const DEFAULT_LOCAL_STORE_PATH: &str = "data/inventory.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_STATIC_ASSETS_PATH: &str = "frontend/dist";

/// JWT configuration defaults
pub const DEFAULT_JWT_DURATION_HOURS: i64 = 8;
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Rate limiting configuration
pub const AUTH_RATE_LIMIT_PER_MINUTE: u32 = 5;

/// Pool monitoring interval
pub const POOL_MONITOR_INTERVAL_SECS: u64 = 60;
pub const POOL_HIGH_USAGE_THRESHOLD: f64 = 80.0;
pub const POOL_ELEVATED_USAGE_THRESHOLD: f64 = 70.0;

/// Seeded administrator, recreated on reset
pub const DEFAULT_ADMIN_ID: &str = "admin";
pub const DEFAULT_ADMIN_NAME: &str = "Admin";
pub const DEFAULT_ADMIN_PIN: &str = "1234";

/// PIN rules
pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 8;

/// Listing defaults
pub const DEFAULT_RECENT_ACTIVITY_LIMIT: usize = 20;
pub const DEFAULT_COMPLETED_SESSIONS_LIMIT: usize = 10;
pub const DEFAULT_AI_LOG_LIMIT: usize = 50;

/// Spreadsheet files accepted from the data directory
pub const DATA_FILE_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

/// AI assistant
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const VISION_MAX_TOKENS: u32 = 1024;
pub const CHAT_MAX_TOKENS: u32 = 2048;
pub const ASSISTANT_TIMEOUT_SECS: u64 = 60;

/// Display timezone for exports
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// API response messages
pub const MSG_AUTH_SUCCESS: &str = "Authentication successful";
pub const MSG_AUTH_FAILED: &str = "Invalid PIN";
pub const MSG_UNAUTHORIZED: &str = "Unauthorized";
pub const MSG_FORBIDDEN: &str = "Administrator role required";
