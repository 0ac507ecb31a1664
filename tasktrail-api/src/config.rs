/// Configuration for the API server
///
/// Everything comes from environment variables; a `.env` file is loaded first
/// when present.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 3001)
/// - `CORS_ORIGINS`: `*` or a comma-separated origin list (default: `*`)
/// - `ENABLE_HSTS`: Send `Strict-Transport-Security` (default: false)
/// - `JWT_SECRET`: Token signing secret, at least 32 characters (required)
/// - `JWT_TTL_HOURS`: Token validity window (default: 24)
/// - `RUN_MIGRATIONS`: Apply pending migrations at startup (default: true)
/// - `DATABASE_URL` or `DB_*`: see [`DatabaseConfig::from_env`]
///
/// # Example
///
/// ```no_run
/// use tasktrail_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use chrono::Duration;
use tasktrail_shared::auth::jwt::DEFAULT_TOKEN_TTL_HOURS;
use tasktrail_shared::db::pool::DatabaseConfig;

/// Shortest accepted signing secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server settings
    pub api: ApiConfig,

    /// Connection pool settings
    pub database: DatabaseConfig,

    /// Token settings
    pub jwt: JwtConfig,

    /// Apply migrations before serving
    pub run_migrations: bool,
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    /// Send HSTS on every response (only behind HTTPS)
    pub enable_hsts: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origins: vec!["*".to_string()],
            enable_hsts: false,
        }
    }
}

impl ApiConfig {
    /// Whether any origin is allowed
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

/// Token settings
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC signing secret
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Token validity window in hours
    pub ttl_hours: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

impl JwtConfig {
    /// Validity window as a duration
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET` is missing or shorter than 32 characters
    /// - a numeric or boolean variable cannot be parsed
    /// - the database settings are invalid
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let defaults = ApiConfig::default();

        let api = ApiConfig {
            host: env::var("API_HOST").unwrap_or(defaults.host),
            port: parse_var("API_PORT", defaults.port)?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(defaults.cors_origins),
            enable_hsts: parse_var("ENABLE_HSTS", defaults.enable_hsts)?,
        };

        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        let jwt = JwtConfig {
            secret,
            ttl_hours: parse_var("JWT_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?,
        };
        jwt.validate()?;

        Ok(Self {
            api,
            database: DatabaseConfig::from_env()?,
            jwt,
            run_migrations: parse_var("RUN_MIGRATIONS", true)?,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl JwtConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} characters long", MIN_JWT_SECRET_LEN);
        }
        if self.ttl_hours <= 0 {
            anyhow::bail!("JWT_TTL_HOURS must be positive");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", name, raw, e)),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}
