use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default name of the visitor cookie.
pub const DEFAULT_COOKIE_NAME: &str = "visitor_info";

/// Default deadline for a single identity store call.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

/// Longest cookie lifetime browsers honour (RFC 6265bis caps Max-Age at 400 days).
pub const MAX_EXPIRE_DAYS: u32 = 400;

/// Default request header budget, as a power of two (1 MiB).
pub const DEFAULT_MAX_HEADER_BYTES_SHIFT: u32 = 20;

/// Default request body budget is `8 << 20` bytes (8 MiB).
pub const DEFAULT_BODY_LIMIT_BASE: u64 = 8;
pub const DEFAULT_BODY_LIMIT_SHIFT: u32 = 20;

/// Deployment environment; drives logging format and cookie security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::Dev)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is present but out of range or malformed.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { field, reason } => {
                write!(f, "Invalid configuration for `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Identity resolution settings injected into the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Name of the cookie carrying the visitor token
    pub cookie_name: String,
    /// Bytes of entropy per generated token
    pub token_bytes: usize,
    /// Cookie lifetime in days
    pub expire_days: u32,
    /// Whether the cookie carries the Secure attribute
    pub cookie_secure: bool,
    /// Deadline applied to every store call
    pub store_timeout: Duration,
    /// Log a presented-but-unknown cookie at warn (possible tampering)
    /// instead of debug. Recovery is identical either way.
    pub flag_unknown_cookies: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            token_bytes: 16,
            expire_days: 7,
            cookie_secure: true,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            flag_unknown_cookies: true,
        }
    }
}

impl IdentityConfig {
    /// Check the values that clap cannot range-check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_bytes == 0 {
            return Err(invalid("token_bytes", "must be at least 1"));
        }
        validate_expire_days(self.expire_days)?;
        if self.store_timeout.is_zero() {
            return Err(invalid("store_timeout", "must be greater than zero"));
        }
        validate_cookie_name(&self.cookie_name)
    }
}

/// Cookie lifetime must be between 1 and `MAX_EXPIRE_DAYS` days.
pub fn validate_expire_days(days: u32) -> Result<(), ConfigError> {
    if days == 0 {
        return Err(invalid("expire_days", "must be at least 1"));
    }
    if days > MAX_EXPIRE_DAYS {
        return Err(invalid(
            "expire_days",
            format!("must be at most {} days", MAX_EXPIRE_DAYS),
        ));
    }
    Ok(())
}

/// Cookie names must be an RFC 6265 token: visible ASCII minus separators.
pub fn validate_cookie_name(name: &str) -> Result<(), ConfigError> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";

    if name.is_empty() {
        return Err(invalid("cookie_name", "must not be empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_graphic() || SEPARATORS.contains(*c))
    {
        return Err(invalid(
            "cookie_name",
            format!("contains forbidden character {:?}", c),
        ));
    }
    Ok(())
}

/// Connection parameters for the identity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Logical database index
    pub database: i64,
}

impl StoreConfig {
    /// Build the `redis://` connection URL.
    pub fn connection_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse("redis://localhost")
            .map_err(|e| invalid("redis_host", e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| invalid("redis_host", e.to_string()))?;
        url.set_port(Some(self.port))
            .map_err(|_| invalid("redis_port", "cannot be set on this URL"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("redis_password", "cannot be set on this URL"))?;
        }
        url.set_path(&format!("/{}", self.database));
        Ok(url)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    /// Upper bound on receiving the request body
    pub read_timeout: Duration,
    /// Upper bound on producing the response once the request is routed
    pub write_timeout: Duration,
    /// How long in-flight requests may drain after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Combined size of the request line and headers
    pub max_header_bytes: usize,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
            max_header_bytes: 1 << DEFAULT_MAX_HEADER_BYTES_SHIFT,
            max_body_bytes: (DEFAULT_BODY_LIMIT_BASE << DEFAULT_BODY_LIMIT_SHIFT) as usize,
        }
    }
}

/// `base << shift` as a byte count, rejecting anything that overflows.
fn shifted_bytes(field: &'static str, base: u64, shift: u32) -> Result<usize, ConfigError> {
    base.checked_shl(shift)
        .filter(|bytes| bytes >> shift == base)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .filter(|bytes| *bytes > 0)
        .ok_or_else(|| invalid(field, format!("{} << {} is not a usable byte count", base, shift)))
}

/// Validated gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub http: HttpConfig,
    pub identity: IdentityConfig,
    pub store: StoreConfig,
}

/// Store connection arguments, shared by every subcommand that talks to Redis.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: String,
    #[arg(long, env = "REDIS_PORT")]
    pub redis_port: u16,
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: String,
    /// Logical database index holding visitor records
    #[arg(long, env = "IDENTITY_DB", value_parser = clap::value_parser!(i64).range(0..))]
    pub identity_db: i64,
}

impl From<StoreArgs> for StoreConfig {
    fn from(args: StoreArgs) -> Self {
        Self {
            host: args.redis_host,
            port: args.redis_port,
            password: args.redis_password,
            database: args.identity_db,
        }
    }
}

/// Arguments for `serve`; every value may come from the environment.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Deployment environment (dev or prod)
    #[arg(long, env = "ENVIRONMENT", value_enum)]
    pub environment: Environment,
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: u16,
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: std::net::IpAddr,
    /// Request body read timeout in seconds
    #[arg(long, env = "READ_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout: u64,
    /// Response deadline in seconds, measured from routing
    #[arg(long, env = "WRITE_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..))]
    pub write_timeout: u64,
    /// Graceful shutdown deadline in seconds
    #[arg(long, env = "SHUTDOWN_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..))]
    pub shutdown_timeout: u64,
    /// Bytes of entropy per visitor token
    #[arg(long, env = "SIZE_IDENTITY_TOKEN", value_parser = clap::value_parser!(u16).range(1..))]
    pub token_bytes: u16,
    /// Visitor cookie lifetime in days
    #[arg(long, env = "VISITOR_TOKEN_EXPIRE_DAYS", value_parser = clap::value_parser!(u32).range(1..=MAX_EXPIRE_DAYS as i64))]
    pub expire_days: u32,
    #[arg(long, env = "VISITOR_COOKIE_NAME", default_value = DEFAULT_COOKIE_NAME)]
    pub cookie_name: String,
    /// Override the Secure cookie attribute (defaults to on outside dev)
    #[arg(long, env = "COOKIE_SECURE", value_parser = clap::builder::BoolishValueParser::new())]
    pub cookie_secure: Option<bool>,
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = DEFAULT_STORE_TIMEOUT_MS)]
    pub store_timeout_ms: u64,
    /// Header budget as a power of two (20 means 1 MiB)
    #[arg(
        long,
        env = "MAX_HEADER_BYTES",
        default_value_t = DEFAULT_MAX_HEADER_BYTES_SHIFT,
        value_parser = clap::value_parser!(u32).range(10..=30)
    )]
    pub max_header_bytes: u32,
    /// Body budget multiplier; the limit is `MIN_MULTIPART_MEMORY << MAX_MULTIPART_MEMORY`
    #[arg(long, env = "MIN_MULTIPART_MEMORY", default_value_t = DEFAULT_BODY_LIMIT_BASE)]
    pub min_multipart_memory: u64,
    /// Body budget shift
    #[arg(long, env = "MAX_MULTIPART_MEMORY", default_value_t = DEFAULT_BODY_LIMIT_SHIFT)]
    pub max_multipart_memory: u32,
    /// Log unknown visitor cookies at warn level
    #[arg(long, env = "FLAG_UNKNOWN_COOKIES", default_value_t = true, action = clap::ArgAction::Set)]
    pub flag_unknown_cookies: bool,
    #[command(flatten)]
    pub store: StoreArgs,
}

impl ServeArgs {
    /// Validate the arguments into a `GatewayConfig`.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let identity = IdentityConfig {
            cookie_name: self.cookie_name,
            token_bytes: usize::from(self.token_bytes),
            expire_days: self.expire_days,
            cookie_secure: self
                .cookie_secure
                .unwrap_or(!self.environment.is_dev()),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            flag_unknown_cookies: self.flag_unknown_cookies,
        };
        identity.validate()?;

        let store = StoreConfig::from(self.store);
        store.connection_url()?;

        Ok(GatewayConfig {
            environment: self.environment,
            http: HttpConfig {
                bind: SocketAddr::new(self.bind_host, self.http_port),
                read_timeout: Duration::from_secs(self.read_timeout),
                write_timeout: Duration::from_secs(self.write_timeout),
                shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
                max_header_bytes: shifted_bytes("max_header_bytes", 1, self.max_header_bytes)?,
                max_body_bytes: shifted_bytes(
                    "max_multipart_memory",
                    self.min_multipart_memory,
                    self.max_multipart_memory,
                )?,
            },
            identity,
            store,
        })
    }
}
