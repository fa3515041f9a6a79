//! Runtime configuration, read from the environment and `.env`.

use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;
const DEFAULT_RECONCILE_GRACE_SECS: u64 = 10;
const DATABASE_POOL_SIZE: u32 = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// sqlite url; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// `None` disables the delivery sweep.
    pub reconcile_interval: Option<Duration>,
    pub reconcile_grace: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secs = |key: &str, default: u64| -> anyhow::Result<u64> {
            match var(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{key}={v:?} is not a number of seconds")),
                None => Ok(default),
            }
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_owned())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_owned()]);

        let interval = secs("RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?;

        Ok(Self {
            listen_addr: var("RELAY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_owned()),
            database_url: var("DATABASE_URL"),
            allowed_origins,
            reconcile_interval: (interval > 0).then(|| Duration::from_secs(interval)),
            reconcile_grace: Duration::from_secs(secs(
                "RECONCILE_GRACE_SECS",
                DEFAULT_RECONCILE_GRACE_SECS,
            )?),
        })
    }

    /// An in-memory sqlite database exists per connection, so it gets exactly one.
    pub fn database_pool_size(&self) -> u32 {
        match &self.database_url {
            Some(url) if url.contains(":memory:") || url.contains("mode=memory") => 1,
            _ => DATABASE_POOL_SIZE,
        }
    }

    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        // credentials rule out a literal `*`, so any-origin mirrors the request
        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::mirror_request()
        } else {
            let origins = self
                .allowed_origins
                .iter()
                .map(|o| HeaderValue::from_str(o).with_context(|| format!("bad origin {o:?}")))
                .collect::<anyhow::Result<Vec<_>>>()?;
            AllowOrigin::list(origins)
        };

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true))
    }
}
