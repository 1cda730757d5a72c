//! Cache Configuration Module
//!
//! Selects and parameterizes the cache backend. Configuration is loaded from
//! environment variables with defaults suitable for development (an
//! in-memory cache with no expiration).

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cirrus_core::{CacheError, Cacher, CirrusResult, ConfigError};
use tracing::debug;

use crate::lmdb_backend::LmdbCacher;
use crate::memory::MemoryCacher;

pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 100;

/// Which [`Cacher`] implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Lmdb,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lmdb => "lmdb",
            Self::Redis => "redis",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: other.to_string(),
                reason: "expected one of: memory, lmdb, redis".to_string(),
            }),
        }
    }
}

/// Cache backend configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: BackendKind,

    /// Lifetime of each cached entry. `None` means entries never expire.
    pub expiration: Option<Duration>,

    /// Directory for the LMDB files. Required for the LMDB backend.
    pub lmdb_path: Option<PathBuf>,

    pub lmdb_max_size_mb: usize,

    /// Connection URL, e.g. `redis://127.0.0.1/`. Required for the Redis backend.
    pub redis_url: Option<String>,

    /// Prefix prepended to every Redis key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            expiration: None,
            lmdb_path: None,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            redis_url: None,
            key_prefix: String::new(),
        }
    }
}

impl CacheConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn lmdb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Lmdb,
            lmdb_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_lmdb_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.lmdb_max_size_mb = max_size_mb;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CIRRUS_CACHE_BACKEND`: "memory", "lmdb" or "redis" (default: memory)
    /// - `CIRRUS_CACHE_EXPIRATION_SECS`: Entry lifetime, 0 = never expire (default: 0)
    /// - `CIRRUS_CACHE_LMDB_PATH`: LMDB directory
    /// - `CIRRUS_CACHE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 100)
    /// - `CIRRUS_CACHE_REDIS_URL`: Redis connection URL
    /// - `CIRRUS_CACHE_KEY_PREFIX`: Redis key prefix (default: empty)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`CacheConfig::from_env`], reading variables through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match var("CIRRUS_CACHE_BACKEND") {
            Some(s) if !s.trim().is_empty() => s.parse()?,
            _ => BackendKind::default(),
        };

        let expiration = match var("CIRRUS_CACHE_EXPIRATION_SECS") {
            Some(s) => {
                let secs: u64 = parse_number("CIRRUS_CACHE_EXPIRATION_SECS", &s)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let lmdb_max_size_mb = match var("CIRRUS_CACHE_LMDB_MAX_SIZE_MB") {
            Some(s) => parse_number("CIRRUS_CACHE_LMDB_MAX_SIZE_MB", &s)?,
            None => DEFAULT_LMDB_MAX_SIZE_MB,
        };

        let config = Self {
            backend,
            expiration,
            lmdb_path: var("CIRRUS_CACHE_LMDB_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            lmdb_max_size_mb,
            redis_url: var("CIRRUS_CACHE_REDIS_URL").filter(|s| !s.is_empty()),
            key_prefix: var("CIRRUS_CACHE_KEY_PREFIX").unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the selected backend has what it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::Memory => Ok(()),
            BackendKind::Lmdb => {
                if self.lmdb_path.is_none() {
                    return Err(ConfigError::MissingRequired {
                        field: "lmdb_path".to_string(),
                    });
                }
                if self.lmdb_max_size_mb == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "lmdb_max_size_mb".to_string(),
                        value: "0".to_string(),
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Ok(())
            }
            BackendKind::Redis => {
                if self.redis_url.is_none() {
                    return Err(ConfigError::MissingRequired {
                        field: "redis_url".to_string(),
                    });
                }
                if !cfg!(feature = "redis") {
                    return Err(ConfigError::BackendNotEnabled {
                        backend: BackendKind::Redis.as_str().to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Build the configured backend.
    pub async fn build(&self) -> CirrusResult<Arc<dyn Cacher>> {
        self.validate()?;
        debug!(backend = self.backend.as_str(), expiration = ?self.expiration, "building cache backend");

        match self.backend {
            BackendKind::Memory => Ok(Arc::new(MemoryCacher::new(self.expiration))),
            BackendKind::Lmdb => {
                let path = self.lmdb_path.as_ref().ok_or_else(|| ConfigError::MissingRequired {
                    field: "lmdb_path".to_string(),
                })?;
                let cacher = LmdbCacher::new(path, self.lmdb_max_size_mb, self.expiration)
                    .map_err(CacheError::from)?;
                Ok(Arc::new(cacher))
            }
            BackendKind::Redis => self.build_redis().await,
        }
    }

    #[cfg(feature = "redis")]
    async fn build_redis(&self) -> CirrusResult<Arc<dyn Cacher>> {
        let url = self.redis_url.as_deref().ok_or_else(|| ConfigError::MissingRequired {
            field: "redis_url".to_string(),
        })?;
        let cacher = crate::redis_backend::RedisCacher::connect(url, self.expiration)
            .await?
            .with_key_prefix(self.key_prefix.clone());
        Ok(Arc::new(cacher))
    }

    #[cfg(not(feature = "redis"))]
    async fn build_redis(&self) -> CirrusResult<Arc<dyn Cacher>> {
        Err(ConfigError::BackendNotEnabled {
            backend: BackendKind::Redis.as_str().to_string(),
        }
        .into())
    }
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}
