//! Identifier shapes used under each domain's tenant namespace.
//!
//! The engine prefixes these with `<namespace>:<domain>:clinic_<tenant>:`.

use clinicache_core::{AppointmentFilter, CacheSignature, DateRange, EntityId};

/// Aggregate entries: dashboard summary.
pub const SUMMARY: &str = "summary";
pub const CLINIC: &str = "clinic";
pub const STAFF: &str = "staff";

/// Every list-shaped identifier of a domain. Writes clear all of them.
pub const LIST_PATTERNS: [&str; 2] = ["list:*", "range:*"];

pub fn detail(id: EntityId) -> String {
    format!("detail:{id}")
}

pub fn list(filter: &impl CacheSignature) -> String {
    format!("list:{}", filter.cache_signature())
}

pub fn range(range: &DateRange) -> String {
    range.key_suffix()
}

/// A filter that is only a date range is keyed by its bounds; anything else
/// by its signature.
pub fn appointment_list(filter: &AppointmentFilter) -> String {
    match filter {
        AppointmentFilter {
            range: Some(r),
            statuses,
            contact_id: None,
            practitioner_id: None,
        } if statuses.is_empty() => range(r),
        _ => list(filter),
    }
}
