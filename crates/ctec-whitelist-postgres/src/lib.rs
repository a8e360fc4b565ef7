//! PostgreSQL storage backend for ctec-whitelist.
//!
//! Provides:
//!
//! - [`PgWhitelistStore`]: the five cascade lookups
//! - [`WhitelistAdmin`]: mutations that invalidate the cached lookups they affect
//! - embedded schema migrations and pool construction
//!
//! # Example
//!
//! ```ignore
//! use ctec_whitelist_postgres::{PgWhitelistStore, PostgresSettings, create_pool, migrations};
//!
//! let pool = create_pool(&PostgresSettings::default()).await?;
//! migrations::run(&pool).await?;
//! let store = PgWhitelistStore::new(pool.clone());
//! ```

pub mod admin;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod store;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use admin::{EventStatus, WhitelistAdmin};
pub use error::{AdminError, AdminResult, PostgresError, Result};
pub use pool::{PostgresSettings, create_pool, mask_password, test_connection};
pub use store::PgWhitelistStore;
