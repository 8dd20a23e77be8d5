//! Clinicache Core - Shared Types
//!
//! Data structures shared by every Clinicache crate: tenant context, domain
//! cache policies, clinic entities, query filters, errors and configuration.
//! This crate contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod domain;
pub mod entities;
pub mod error;
pub mod filter;
pub mod health;
pub mod tenant;

pub use config::{CacheConfig, DEFAULT_NAMESPACE};
pub use domain::{CacheStrategy, Domain, DomainPolicy, PolicyTable};
pub use entities::{
    AnalyticsSummary, Appointment, AppointmentStatus, Clinic, ClinicUpdate, Contact,
    ContactUpdate, Conversation, DashboardMetrics, MedicalRecord, NewAppointment, NewContact,
    NewConversation, NewMedicalRecord, StaffUser, TenantOwned,
};
pub use error::{
    CacheError, ClinicError, ClinicResult, ConfigError, StorageError, ValidationError,
};
pub use filter::{
    AppointmentFilter, CacheSignature, ContactFilter, ConversationFilter, DateRange,
    MedicalRecordFilter,
};
pub use health::{HealthCheck, HealthStatus};
pub use tenant::{Role, TenantContext, TenantId};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Kind of clinic record, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contact,
    Appointment,
    MedicalRecord,
    Conversation,
    Clinic,
    StaffUser,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Appointment => "appointment",
            EntityType::MedicalRecord => "medical_record",
            EntityType::Conversation => "conversation",
            EntityType::Clinic => "clinic",
            EntityType::StaffUser => "staff_user",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
