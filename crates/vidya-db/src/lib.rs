//! Vidya DB - Database abstractions
//!
//! SQLx-based persistence for subscriptions, entitlements, payments and
//! referrals. Services depend on the repository traits; the PostgreSQL
//! implementations live under [`pg`].
//!
//! # Example
//!
//! ```rust,ignore
//! use vidya_db::{create_pool, run_migrations, Repositories};
//!
//! let pool = create_pool("postgres://localhost/vidya").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::postgres(pool);
//!
//! let sub = repos.subscriptions.find_by_user(user_id).await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
