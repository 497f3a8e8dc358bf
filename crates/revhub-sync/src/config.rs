use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use revhub_adapters::DEFAULT_PLACES_BASE_URL;
use revhub_storage::{HttpClientConfig, HttpFetcher, MemoryRepository, PgRepository, ReviewRepository};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend `{other}` (expected memory or postgres)"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub hostaway_seed_path: PathBuf,
    pub admin_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_base_url: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub web_host: String,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        let storage = match var("REVHUB_STORAGE") {
            Some(value) => value.parse()?,
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };

        Ok(Self {
            storage,
            database_url,
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            hostaway_seed_path: var("HOSTAWAY_SEED_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./fixtures/hostaway/reviews.json")),
            admin_key: var("ADMIN_KEY"),
            google_api_key: var("GOOGLE_PLACES_API_KEY"),
            google_base_url: var("GOOGLE_PLACES_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PLACES_BASE_URL.to_string()),
            http_timeout_secs: var("REVHUB_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            user_agent: var("REVHUB_USER_AGENT").unwrap_or_else(|| "revhub/0.1".to_string()),
            web_host: var("REVHUB_WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port: var("REVHUB_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
        })
    }

    pub fn http_fetcher(&self) -> Result<Arc<HttpFetcher>> {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            user_agent: Some(self.user_agent.clone()),
        })?;
        Ok(Arc::new(fetcher))
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redacted(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("AppConfig")
            .field("storage", &self.storage)
            .field("database_url", &redacted(&self.database_url))
            .field("database_max_connections", &self.database_max_connections)
            .field("hostaway_seed_path", &self.hostaway_seed_path)
            .field("admin_key", &redacted(&self.admin_key))
            .field("google_api_key", &redacted(&self.google_api_key))
            .field("google_base_url", &self.google_base_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("web_host", &self.web_host)
            .field("web_port", &self.web_port)
            .finish()
    }
}

pub async fn open_repository(config: &AppConfig) -> Result<Arc<dyn ReviewRepository>> {
    match config.storage {
        StorageBackend::Memory => {
            info!(backend = "memory", "opening review repository");
            Ok(Arc::new(MemoryRepository::new()))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            info!(
                backend = "postgres",
                max_connections = config.database_max_connections,
                "opening review repository"
            );
            let repo = PgRepository::connect(url, config.database_max_connections)
                .await
                .context("connecting to postgres")?;
            repo.migrate().await.context("running migrations")?;
            Ok(Arc::new(repo))
        }
    }
}
