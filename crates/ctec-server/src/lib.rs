//! Configuration, bootstrap and observability for the ctec operator binary.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod observability;

pub use bootstrap::{Services, connect_postgres, connect_query_cache, create_query_cache};
pub use config::{
    AppConfig, CacheConfig, LoggingConfig, PostgresConfig, RedisConfig, WhitelistConfig,
};
pub use observability::{apply_logging_level, init_tracing};
