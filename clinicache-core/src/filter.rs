//! Query filters and their cache signatures.
//!
//! A list query is cached under `list:<signature>`. The signature is a hash
//! of a canonical form of the filter: fields sorted by name, unset fields
//! omitted, set-valued fields sorted and deduplicated. Two filters that
//! describe the same query share a signature regardless of the order in
//! which their values were supplied.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::entities::{Appointment, AppointmentStatus, Contact, Conversation, MedicalRecord};
use crate::error::ValidationError;
use crate::EntityId;

/// Bytes of the sha256 digest kept in the signature.
const SIGNATURE_BYTES: usize = 16;

/// Deterministic, order-independent identity of a query.
pub trait CacheSignature {
    /// Canonical field map. Unset fields must be left out.
    fn signature_fields(&self) -> BTreeMap<&'static str, Value>;

    /// Hex signature of the canonical field map.
    fn cache_signature(&self) -> String {
        // BTreeMap serializes in key order, so the JSON text is canonical.
        let canonical = serde_json::to_string(&self.signature_fields()).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..SIGNATURE_BYTES])
    }
}

fn normalize_set(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn normalize_text(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidDateRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Key suffix with ISO-8601 bounds: `range:<from>:<to>`.
    pub fn key_suffix(&self) -> String {
        format!("range:{}:{}", self.from, self.to)
    }
}

// ============================================================================
// FILTERS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilter {
    /// Case-insensitive match on name, phone or email.
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        if let Some(search) = normalize_text(&self.search) {
            let needle = search.to_lowercase();
            let hit = contact.name.to_lowercase().contains(&needle)
                || contact.phone.contains(&needle)
                || contact
                    .email
                    .as_ref()
                    .is_some_and(|e| e.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        normalize_set(&self.tags)
            .iter()
            .all(|tag| contact.tags.iter().any(|t| t == tag))
    }
}

impl CacheSignature for ContactFilter {
    fn signature_fields(&self) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        if let Some(search) = normalize_text(&self.search) {
            fields.insert("search", json!(search.to_lowercase()));
        }
        let tags = normalize_set(&self.tags);
        if !tags.is_empty() {
            fields.insert("tags", json!(tags));
        }
        if let Some(limit) = self.limit {
            fields.insert("limit", json!(limit));
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            fields.insert("offset", json!(offset));
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub range: Option<DateRange>,
    pub statuses: Vec<AppointmentStatus>,
    pub contact_id: Option<EntityId>,
    pub practitioner_id: Option<String>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        if let Some(range) = &self.range {
            if !range.contains(appointment.scheduled_at.date_naive()) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&appointment.status) {
            return false;
        }
        if let Some(contact_id) = self.contact_id {
            if appointment.contact_id != contact_id {
                return false;
            }
        }
        if let Some(practitioner) = normalize_text(&self.practitioner_id) {
            if appointment.practitioner_id.as_deref() != Some(practitioner.as_str()) {
                return false;
            }
        }
        true
    }
}

impl CacheSignature for AppointmentFilter {
    fn signature_fields(&self) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        if let Some(range) = &self.range {
            fields.insert("from", json!(range.from().to_string()));
            fields.insert("to", json!(range.to().to_string()));
        }
        let mut statuses: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
        statuses.sort_unstable();
        statuses.dedup();
        if !statuses.is_empty() {
            fields.insert("statuses", json!(statuses));
        }
        if let Some(contact_id) = self.contact_id {
            fields.insert("contact_id", json!(contact_id.to_string()));
        }
        if let Some(practitioner) = normalize_text(&self.practitioner_id) {
            fields.insert("practitioner_id", json!(practitioner));
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecordFilter {
    pub contact_id: Option<EntityId>,
    pub record_types: Vec<String>,
}

impl MedicalRecordFilter {
    pub fn for_contact(contact_id: EntityId) -> Self {
        Self {
            contact_id: Some(contact_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &MedicalRecord) -> bool {
        if let Some(contact_id) = self.contact_id {
            if record.contact_id != contact_id {
                return false;
            }
        }
        let types = normalize_set(&self.record_types);
        types.is_empty() || types.contains(&record.record_type)
    }
}

impl CacheSignature for MedicalRecordFilter {
    fn signature_fields(&self) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        if let Some(contact_id) = self.contact_id {
            fields.insert("contact_id", json!(contact_id.to_string()));
        }
        let types = normalize_set(&self.record_types);
        if !types.is_empty() {
            fields.insert("record_types", json!(types));
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationFilter {
    pub open_only: bool,
    pub unread_only: bool,
    pub channels: Vec<String>,
}

impl ConversationFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if self.open_only && !conversation.open {
            return false;
        }
        if self.unread_only && conversation.unread_count == 0 {
            return false;
        }
        let channels = normalize_set(&self.channels);
        channels.is_empty() || channels.contains(&conversation.channel)
    }
}

impl CacheSignature for ConversationFilter {
    fn signature_fields(&self) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        if self.open_only {
            fields.insert("open_only", json!(true));
        }
        if self.unread_only {
            fields.insert("unread_only", json!(true));
        }
        let channels = normalize_set(&self.channels);
        if !channels.is_empty() {
            fields.insert("channels", json!(channels));
        }
        fields
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Permuting tag order never changes the signature.
        #[test]
        fn prop_tag_permutation_is_stable(
            mut tags in prop::collection::vec("[a-z]{1,8}", 0..6),
            search in proptest::option::of("[a-z ]{0,12}"),
        ) {
            let a = ContactFilter { search: search.clone(), tags: tags.clone(), ..Default::default() };
            tags.reverse();
            let b = ContactFilter { search, tags, ..Default::default() };
            prop_assert_eq!(a.cache_signature(), b.cache_signature());
        }
    }
}
