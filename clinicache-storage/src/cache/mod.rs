//! Tenant-scoped cache layer.
//!
//! A single shared backend serves every clinic. Isolation is enforced purely
//! by key namespacing, so key derivation is the security boundary of this
//! module.
//!
//! # Tenant Isolation
//!
//! The [`CacheKey`] type cannot be constructed without a tenant, and every
//! [`CacheEngine`] operation takes a `&TenantContext`. Tenant patterns end in
//! `clinic_<id>:` before the wildcard, so one tenant's pattern can never
//! match another tenant's keys.
//!
//! # Strategies
//!
//! - cache-aside: miss returns the loaded value and populates on a detached task
//! - read-through: miss populates before returning
//! - write-through: store write, then cache write, then fan-out invalidation
//!
//! # Example
//!
//! ```ignore
//! let engine = CacheEngine::new(Arc::new(InMemoryCacheBackend::new()), &CacheConfig::default())?;
//! let contact = engine
//!     .cache_aside(Domain::Contacts, &format!("detail:{id}"), &ctx, || store.get_contact(ctx.tenant_id, id))
//!     .await?;
//! ```

pub mod engine;
pub mod key_trace;
pub mod memory_backend;
pub mod metrics;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod tenant_key;
pub mod traits;

pub use engine::{CacheEngine, CacheWriteFailure};
pub use key_trace::trace_keys;
pub use memory_backend::InMemoryCacheBackend;
pub use metrics::{CacheMetrics, MetricsSnapshot, TenantMetrics};
pub use pattern::GlobPattern;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacheBackend;
pub use tenant_key::CacheKey;
pub use traits::CacheBackend;
