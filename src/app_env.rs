use anyhow::{Context, bail};
use std::env;
use std::net::SocketAddr;

/// URL for accessing the PostrgeSQL database (should contain a schema name in the path)
pub const DB_URL: &str = "DATABASE_URL";
/// Log level configuration for the application. For formatting info, see [EnvFilter's documentation](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html)
pub const LOG_LEVEL: &str = "LOG_LEVEL";

/// OpenTelemetry span export URL. Should be http://localhost:4317 by default, as the service should
/// have an OpenTelemetry collector sidecar which directs metrics to the correct place
pub const OTEL_SPAN_EXPORT_URL: &str = "OTEL_SPAN_EXPORT_URL";
/// OpenTelemetry metrics export URL. Should be http://localhost:4317 by default, as the service should
/// have an OpenTelemetry collector sidecar which directs metrics to the correct place
pub const OTEL_METRIC_EXPORT_URL: &str = "OTEL_METRIC_EXPORT_URL";

/// Secret used to sign and verify bearer tokens
pub const JWT_SECRET: &str = "JWT_SECRET";
/// Lifetime of an issued bearer token, in seconds. Defaults to one day.
pub const JWT_TTL_SECONDS: &str = "JWT_TTL_SECONDS";
/// Socket address the HTTP server listens on. Defaults to 0.0.0.0:8080.
pub const BIND_ADDRESS: &str = "BIND_ADDRESS";

const DEFAULT_JWT_TTL_SECONDS: i64 = 86_400;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Both OpenTelemetry endpoints, present only when export is configured
pub struct OtelEndpoints {
    pub spans: String,
    pub metrics: String,
}

/// Runtime configuration pulled from the process environment
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub bind_address: SocketAddr,
    pub otel: Option<OtelEndpoints>,
}

impl AppConfig {
    /// Reads configuration from the environment. Call after loading any .env file.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database_url =
            env::var(DB_URL).with_context(|| format!("reading {DB_URL} from the environment"))?;

        let jwt_secret = env::var(JWT_SECRET)
            .with_context(|| format!("reading {JWT_SECRET} from the environment"))?;
        if jwt_secret.trim().is_empty() {
            bail!("{JWT_SECRET} must not be empty");
        }

        let jwt_ttl = parse_jwt_ttl(env::var(JWT_TTL_SECONDS).ok().as_deref())?;

        let bind_address = env::var(BIND_ADDRESS)
            .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_owned())
            .parse::<SocketAddr>()
            .with_context(|| format!("parsing {BIND_ADDRESS} as a socket address"))?;

        let otel = match (env::var(OTEL_SPAN_EXPORT_URL), env::var(OTEL_METRIC_EXPORT_URL)) {
            (Ok(spans), Ok(metrics)) => Some(OtelEndpoints { spans, metrics }),
            _ => None,
        };

        Ok(AppConfig {
            database_url,
            jwt_secret,
            jwt_ttl,
            bind_address,
            otel,
        })
    }
}

/// Token lifetime from the raw [JWT_TTL_SECONDS] value, or the one day default when unset
fn parse_jwt_ttl(raw_ttl: Option<&str>) -> Result<chrono::Duration, anyhow::Error> {
    let ttl_seconds = match raw_ttl {
        Some(raw_ttl) => raw_ttl
            .trim()
            .parse::<i64>()
            .with_context(|| format!("parsing {JWT_TTL_SECONDS} as a number of seconds"))?,
        None => DEFAULT_JWT_TTL_SECONDS,
    };
    if ttl_seconds <= 0 {
        bail!("{JWT_TTL_SECONDS} must be positive, got {ttl_seconds}");
    }

    chrono::Duration::try_seconds(ttl_seconds)
        .with_context(|| format!("{JWT_TTL_SECONDS} of {ttl_seconds} is too large"))
}
