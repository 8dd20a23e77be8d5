//! Clinicache Repository - Cached Repository Facade
//!
//! One method per business operation over a `ClinicStorage`. Each method
//! picks the cache strategy from its domain's policy, derives tenant-scoped
//! keys and applies the invalidation rules for writes. Persistence errors
//! pass through unchanged; cache faults never surface.

mod aggregates;
mod appointments;
mod contacts;
mod conversations;
mod directory;
pub mod keys;
mod records;
mod repository;

pub use aggregates::{DASHBOARD_RECORD_WINDOW_DAYS, DASHBOARD_UPCOMING_LIMIT};
pub use repository::CachedRepository;
